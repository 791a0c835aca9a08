//! Speculative output-buffer sizing.
//!
//! Every encoder writes into a buffer reserved up front from the caller's
//! estimated compression ratio. A failed reservation is retried once with half
//! the estimate; a second failure is fatal.

use anyhow::Result;
use std::collections::TryReserveError;
use tracing::warn;

/// Fixed headroom on top of the ratio-scaled estimate (headers, coder flush bytes).
pub(crate) const OUTPUT_SLACK: usize = 1024;

/// Initial capacity for a block of `src_len` bytes: `slack + (n + n/3) * ratio`.
pub(crate) fn estimate_capacity(src_len: usize, estimated_ratio: f64) -> usize {
    let scaled = (src_len + src_len / 3) as f64 * estimated_ratio.max(0.0);
    // float -> int casts saturate, so absurd ratios land on usize::MAX
    OUTPUT_SLACK.saturating_add(scaled as usize)
}

fn try_with_capacity(capacity: usize) -> std::result::Result<Vec<u8>, TryReserveError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(capacity)?;
    Ok(buf)
}

/// Reserve an output buffer, shrinking the estimate once on failure.
pub(crate) fn output_buffer(src_len: usize, estimated_ratio: f64) -> Result<Vec<u8>> {
    reserve_with(src_len, estimated_ratio, try_with_capacity)
}

/// The shrink-once policy over an arbitrary reservation function.
fn reserve_with(
    src_len: usize,
    estimated_ratio: f64,
    try_alloc: impl Fn(usize) -> std::result::Result<Vec<u8>, TryReserveError>,
) -> Result<Vec<u8>> {
    let capacity = estimate_capacity(src_len, estimated_ratio);
    match try_alloc(capacity) {
        Ok(buf) => Ok(buf),
        Err(first) => {
            let shrunk = OUTPUT_SLACK + (capacity - OUTPUT_SLACK) / 2;
            warn!("Output reservation of {} bytes failed ({}), retrying with {} bytes", capacity, first, shrunk);
            try_alloc(shrunk).map_err(|second| {
                anyhow::anyhow!(
                    "cannot reserve output buffer for {} source bytes: {} (retry with {} bytes: {})",
                    src_len, first, shrunk, second
                )
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_estimate_formula() {
        assert_eq!(estimate_capacity(0, 1.0), OUTPUT_SLACK);
        assert_eq!(estimate_capacity(300, 1.0), OUTPUT_SLACK + 400);
        assert_eq!(estimate_capacity(300, 0.5), OUTPUT_SLACK + 200);
        assert_eq!(estimate_capacity(300, -2.0), OUTPUT_SLACK);
    }

    #[test]
    fn test_reserves_estimate() {
        let buf = output_buffer(3000, 1.0).unwrap();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= OUTPUT_SLACK + 4000);
    }

    #[test]
    fn test_second_failure_is_fatal() {
        // usize::MAX and its half both exceed isize::MAX: capacity overflow twice
        let err = output_buffer(1 << 20, f64::MAX).unwrap_err();
        assert!(err.to_string().contains("cannot reserve output buffer"));
    }

    #[test]
    fn test_first_failure_retries_with_shrunk_capacity() {
        let requests = RefCell::new(Vec::new());
        let buf = reserve_with(30_000, 1.0, |capacity| {
            requests.borrow_mut().push(capacity);
            if requests.borrow().len() == 1 {
                Vec::<u8>::new().try_reserve_exact(usize::MAX).map(|_| Vec::new())
            } else {
                try_with_capacity(capacity)
            }
        })
        .unwrap();

        let first = estimate_capacity(30_000, 1.0);
        let shrunk = OUTPUT_SLACK + (first - OUTPUT_SLACK) / 2;
        assert_eq!(*requests.borrow(), vec![first, shrunk]);
        assert!(buf.capacity() >= shrunk);
    }
}
