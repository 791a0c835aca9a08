//! FIFO of blocks decoded ahead of the caller.

use anyhow::Result;
use std::collections::VecDeque;

/// Pre-decoded buffers, handed out strictly in stream order.
#[derive(Debug, Default)]
pub struct PrefetchQueue {
    entries: VecDeque<Vec<u8>>,
}

impl PrefetchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a batch. The queue must be fully drained first.
    pub fn fill(&mut self, batch: Vec<Vec<u8>>) -> Result<()> {
        if !self.entries.is_empty() {
            anyhow::bail!("prefetch queue still holds {} undrained entries", self.entries.len());
        }
        self.entries.extend(batch);
        Ok(())
    }

    /// Next buffer, transferring ownership to the caller.
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.entries.pop_front()
    }

    /// Up to `n` buffers from the front of the queue.
    pub fn take(&mut self, n: usize) -> Vec<Vec<u8>> {
        let n = n.min(self.entries.len());
        self.entries.drain(..n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut q = PrefetchQueue::new();
        q.fill(vec![b"a".to_vec(), Vec::new(), b"c".to_vec()]).unwrap();
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop().unwrap(), b"a");
        assert_eq!(q.take(5), vec![Vec::new(), b"c".to_vec()]);
        assert!(q.is_empty());
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_fill_requires_drained_queue() {
        let mut q = PrefetchQueue::new();
        q.fill(vec![b"x".to_vec()]).unwrap();
        assert!(q.fill(vec![b"y".to_vec()]).is_err());
        q.pop();
        q.fill(vec![b"y".to_vec()]).unwrap();
        assert_eq!(q.pop().unwrap(), b"y");
    }
}
