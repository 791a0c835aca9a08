//! Stream-level reading and writing of compressed blocks.
//!
//! `CompressedWriter` owns the plain-text debug switch and `CompressedReader`
//! owns the prefetch queue, so neither is process-wide state.

use super::collective::{self, CompressionJob};
use super::descriptor::CodecDescriptor;
use super::dispatch;
use super::header;
use super::prefetch::PrefetchQueue;
use super::DEFAULT_ESTIMATED_RATIO;
use anyhow::Result;
use bytemuck::Pod;
use std::io::{Read, Write};
use tracing::debug;

/// Compress `src` and append the block to `writer`.
pub fn write_compressed<W: Write>(writer: &mut W, src: &[u8], descriptor: &mut CodecDescriptor) -> Result<()> {
    let frame = dispatch::compress(src, descriptor, DEFAULT_ESTIMATED_RATIO)?;
    writer.write_all(&frame)?;
    Ok(())
}

/// Read and decode the next block from `reader`.
pub fn read_compressed<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let frame = header::read_frame(reader)?;
    dispatch::decompress(&frame)
}

pub struct CompressedWriter<W: Write> {
    inner: W,
    plain_text: bool,
    estimated_ratio: f64,
}

impl<W: Write> CompressedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, plain_text: false, estimated_ratio: DEFAULT_ESTIMATED_RATIO }
    }

    /// Emit every block as stored so the stream stays human-readable.
    pub fn plain_text(mut self, enabled: bool) -> Self {
        self.plain_text = enabled;
        self
    }

    pub fn estimated_ratio(mut self, ratio: f64) -> Self {
        self.estimated_ratio = ratio;
        self
    }

    pub fn is_plain_text(&self) -> bool {
        self.plain_text
    }

    pub fn write_compressed(&mut self, src: &[u8], descriptor: &mut CodecDescriptor) -> Result<()> {
        let frame = if self.plain_text {
            dispatch::stored_frame(src)
        } else {
            dispatch::compress(src, descriptor, self.estimated_ratio)?
        };
        self.inner.write_all(&frame)?;
        Ok(())
    }

    /// Write a typed array as one block of its native byte representation.
    pub fn write_compressed_array<T: Pod>(&mut self, items: &[T], descriptor: &mut CodecDescriptor) -> Result<()> {
        self.write_compressed(bytemuck::cast_slice(items), descriptor)
    }

    pub fn write_compressed_collective(&mut self, jobs: &mut [CompressionJob<'_>]) -> Result<()> {
        if self.plain_text {
            for job in jobs.iter() {
                self.inner.write_all(&dispatch::stored_frame(job.src))?;
            }
            return Ok(());
        }
        collective::write_compressed_collective(&mut self.inner, jobs)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

pub struct CompressedReader<R: Read> {
    inner: R,
    queue: PrefetchQueue,
}

impl<R: Read> CompressedReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, queue: PrefetchQueue::new() }
    }

    /// Number of decoded blocks waiting in the prefetch queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Next block: from the prefetch queue while it lasts, then from the source.
    pub fn read_compressed(&mut self) -> Result<Vec<u8>> {
        if let Some(data) = self.queue.pop() {
            return Ok(data);
        }
        read_compressed(&mut self.inner)
    }

    /// Next `n` blocks, taking queued blocks first.
    pub fn read_compressed_collective(&mut self, n: usize) -> Result<Vec<Vec<u8>>> {
        let mut out = self.queue.take(n);
        let remaining = n - out.len();
        if remaining > 0 {
            out.extend(collective::read_compressed_collective(&mut self.inner, remaining)?);
        }
        Ok(out)
    }

    /// Decode the next `n` blocks ahead of time into the queue.
    pub fn prefetch_collective(&mut self, n: usize) -> Result<()> {
        if !self.queue.is_empty() {
            anyhow::bail!("cannot prefetch {} blocks: {} prefetched blocks not yet consumed", n, self.queue.len());
        }
        let batch = collective::read_compressed_collective(&mut self.inner, n)?;
        debug!("Prefetched {} blocks", batch.len());
        self.queue.fill(batch)
    }

    /// Read a block written by `write_compressed_array`.
    pub fn read_compressed_array<T: Pod>(&mut self) -> Result<Vec<T>> {
        if !self.queue.is_empty() {
            anyhow::bail!("typed array read while {} prefetched blocks are queued", self.queue.len());
        }
        let bytes = read_compressed(&mut self.inner)?;
        let size = std::mem::size_of::<T>();
        if size == 0 || bytes.len() % size != 0 {
            anyhow::bail!(
                "block of {} bytes is not an array of {}-byte elements",
                bytes.len(), size
            );
        }
        let mut items = vec![T::zeroed(); bytes.len() / size];
        bytemuck::cast_slice_mut::<T, u8>(&mut items).copy_from_slice(&bytes);
        Ok(items)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::backend::LeafCoder;
    use crate::compression::header::TAG_STORED;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| b"CCGGAATT"[(i / 5) % 8]).collect()
    }

    #[test]
    fn test_single_stream_roundtrip() {
        let data = sample(5000);
        let mut stream = Vec::new();
        write_compressed(&mut stream, &data, &mut LeafCoder::zstd(3).into()).unwrap();
        write_compressed(&mut stream, &[], &mut LeafCoder::zstd(3).into()).unwrap();
        let mut reader = stream.as_slice();
        assert_eq!(read_compressed(&mut reader).unwrap(), data);
        assert!(read_compressed(&mut reader).unwrap().is_empty());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_plain_text_writes_stored_blocks() {
        let data = sample(300);
        let mut writer = CompressedWriter::new(Vec::new()).plain_text(true);
        writer.write_compressed(&data, &mut LeafCoder::zstd(19).into()).unwrap();
        let stream = writer.into_inner();
        assert_eq!(stream[16], TAG_STORED);
        assert_eq!(&stream[17..], &data[..]);
        assert_eq!(read_compressed(&mut stream.as_slice()).unwrap(), data);
    }

    #[test]
    fn test_prefetch_is_transparent() {
        let blocks: Vec<Vec<u8>> = (0..5).map(|i| sample(i * 1000)).collect();
        let mut writer = CompressedWriter::new(Vec::new());
        for block in &blocks {
            writer.write_compressed(block, &mut LeafCoder::Range.into()).unwrap();
        }
        let stream = writer.into_inner();

        let mut reader = CompressedReader::new(stream.as_slice());
        reader.prefetch_collective(3).unwrap();
        assert_eq!(reader.queued(), 3);
        assert!(reader.prefetch_collective(1).is_err());
        let mut out = Vec::new();
        for _ in 0..5 {
            out.push(reader.read_compressed().unwrap());
        }
        assert_eq!(out, blocks);
        assert_eq!(reader.queued(), 0);
    }

    #[test]
    fn test_collective_read_drains_queue_first() {
        let blocks: Vec<Vec<u8>> = (1..=4).map(|i| sample(i * 700)).collect();
        let mut writer = CompressedWriter::new(Vec::new());
        for block in &blocks {
            writer.write_compressed(block, &mut LeafCoder::Entropy.into()).unwrap();
        }
        let stream = writer.into_inner();

        let mut reader = CompressedReader::new(stream.as_slice());
        reader.prefetch_collective(2).unwrap();
        let first = reader.read_compressed().unwrap();
        let rest = reader.read_compressed_collective(3).unwrap();
        assert_eq!(first, blocks[0]);
        assert_eq!(rest, blocks[1..].to_vec());
    }

    #[test]
    fn test_typed_array_roundtrip() {
        let positions: Vec<u32> = (0..2000u32).map(|i| i * 3 + (i % 7)).collect();
        let mut writer = CompressedWriter::new(Vec::new());
        writer.write_compressed_array(&positions, &mut LeafCoder::zstd(3).into()).unwrap();
        writer.write_compressed(b"tail", &mut CodecDescriptor::Stored).unwrap();
        let stream = writer.into_inner();

        let mut reader = CompressedReader::new(stream.as_slice());
        assert_eq!(reader.read_compressed_array::<u32>().unwrap(), positions);
        assert!(reader.read_compressed_array::<u64>().is_err());
    }

    #[test]
    fn test_typed_array_rejected_while_prefetching() {
        let mut writer = CompressedWriter::new(Vec::new());
        writer.write_compressed_array(&[1u16, 2, 3], &mut CodecDescriptor::Stored).unwrap();
        writer.write_compressed_array(&[4u16, 5, 6], &mut CodecDescriptor::Stored).unwrap();
        let stream = writer.into_inner();

        let mut reader = CompressedReader::new(stream.as_slice());
        reader.prefetch_collective(1).unwrap();
        let err = reader.read_compressed_array::<u16>().unwrap_err();
        assert!(err.to_string().contains("prefetched"));
    }
}
