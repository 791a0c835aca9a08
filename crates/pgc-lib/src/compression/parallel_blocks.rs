//! Data-parallel block splitting.
//!
//! ```text
//! [outer header, tag 88]
//! [block_count: u32]
//! for every block but the last: [frame_len: u32 | u64][block frame]
//! [last block frame]   (runs to the end of the body)
//! ```
//!
//! Length prefixes widen to u64 when the original length exceeds `u32::MAX`.

use super::descriptor::CodecDescriptor;
use super::dispatch::{self, Decoded, Encoded};
use super::header::{BlockHeader, FIXED_HEADER_SIZE, TAG_PARALLEL_BLOCKS};
use super::{read_le_u32, read_le_u64};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::ops::Range;
use tracing::debug;

/// Split configuration: the inner descriptor plus how to cut the buffer.
#[derive(Clone, Debug)]
pub struct BlockSplit {
    inner: Box<CodecDescriptor>,
    num_blocks: usize,
    min_block_len: usize,
    alignment: usize,
    threads: usize,
}

impl BlockSplit {
    /// The inner descriptor is cloned into every concurrent block, so it may
    /// not carry selector state.
    pub fn new(inner: CodecDescriptor, num_blocks: usize, min_block_len: usize, alignment: usize) -> Result<Self> {
        if inner.contains_selector() {
            anyhow::bail!("parallel-blocks inner descriptor must not contain a selector ({})", inner.label());
        }
        if min_block_len == 0 {
            anyhow::bail!("parallel-blocks minimum block length must be positive");
        }
        if alignment == 0 {
            anyhow::bail!("parallel-blocks alignment must be positive");
        }
        Ok(Self { inner: Box::new(inner), num_blocks, min_block_len, alignment, threads: 0 })
    }

    /// Run blocks on a dedicated pool of `threads` workers (0 = ambient pool).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn inner(&self) -> &CodecDescriptor {
        &self.inner
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    pub fn min_block_len(&self) -> usize {
        self.min_block_len
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Block ranges for a buffer of `src_len` bytes. Every block but the last
    /// is a multiple of the alignment; the last absorbs the remainder.
    pub fn block_ranges(&self, src_len: usize) -> Vec<Range<usize>> {
        let max_blocks = (src_len / self.min_block_len).max(1);
        let mut n = self.num_blocks.clamp(1, max_blocks);
        let mut base = (src_len / n) / self.alignment * self.alignment;
        if base == 0 {
            n = 1;
            base = src_len;
        }
        (0..n)
            .map(|i| {
                let start = i * base;
                let end = if i + 1 == n { src_len } else { start + base };
                start..end
            })
            .collect()
    }
}

fn in_pool<T: Send>(threads: usize, op: impl FnOnce() -> T + Send) -> Result<T> {
    if threads == 0 {
        return Ok(op());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("failed to build parallel-blocks thread pool")?;
    Ok(pool.install(op))
}

fn write_block_len(out: &mut Vec<u8>, len: usize, wide: bool) -> Result<()> {
    if wide {
        out.extend_from_slice(&(len as u64).to_le_bytes());
    } else {
        let len = u32::try_from(len).context("block frame exceeds u32 length prefix")?;
        out.extend_from_slice(&len.to_le_bytes());
    }
    Ok(())
}

fn read_block_len(body: &[u8], offset: &mut usize, wide: bool) -> Result<usize> {
    let len = if wide {
        let v = read_le_u64(body, *offset)?;
        *offset += 8;
        usize::try_from(v).context("block frame length does not fit in memory")?
    } else {
        let v = read_le_u32(body, *offset)?;
        *offset += 4;
        v as usize
    };
    Ok(len)
}

pub(crate) fn compress(src: &[u8], split: &mut BlockSplit, estimated_ratio: f64) -> Result<Encoded> {
    let ranges = split.block_ranges(src.len());
    if ranges.len() == 1 {
        return dispatch::compress_block(src, &mut split.inner, estimated_ratio);
    }

    let inner: &CodecDescriptor = &split.inner;
    let blocks: Vec<Encoded> = in_pool(split.threads, || {
        ranges
            .par_iter()
            .map(|range| {
                let mut descriptor = inner.clone();
                dispatch::compress_block(&src[range.clone()], &mut descriptor, estimated_ratio)
                    .with_context(|| format!("parallel block at offset {}", range.start))
            })
            .collect::<Result<Vec<_>>>()
    })??;

    let wide = src.len() as u64 > u32::MAX as u64;
    let body_len: usize = blocks.iter().map(|b| b.frame.len()).sum::<usize>() + blocks.len() * 8;
    let mut frame = Vec::with_capacity(FIXED_HEADER_SIZE + 4 + body_len);
    frame.resize(FIXED_HEADER_SIZE, 0);
    frame.extend_from_slice(&(blocks.len() as u32).to_le_bytes());
    let last = blocks.len() - 1;
    for (i, block) in blocks.iter().enumerate() {
        if i != last {
            write_block_len(&mut frame, block.frame.len(), wide)?;
        }
        frame.extend_from_slice(&block.frame);
    }

    let header = BlockHeader {
        original_len: src.len() as u64,
        stored_len: (frame.len() - FIXED_HEADER_SIZE) as u64,
        tag: TAG_PARALLEL_BLOCKS,
    };
    header.patch(&mut frame[..FIXED_HEADER_SIZE]);

    debug!(
        "Split {} bytes into {} blocks (min {} bytes, aligned to {}) with {}",
        src.len(), blocks.len(), split.min_block_len(), split.alignment(), split.inner.label()
    );
    let note = format!("{} blocks: {}", blocks.len(), blocks[0].note);
    Ok(Encoded { frame, note })
}

/// Decode a parallel-blocks body (everything after the outer fixed header).
pub(crate) fn decode(body: &[u8], original_len: usize) -> Result<(Vec<u8>, String)> {
    let count = read_le_u32(body, 0)? as usize;
    if count == 0 || count > original_len {
        anyhow::bail!("corrupt parallel-blocks body: {} blocks for {} bytes", count, original_len);
    }
    let wide = original_len as u64 > u32::MAX as u64;

    let mut offset = 4;
    let mut spans = Vec::with_capacity(count);
    for _ in 0..count - 1 {
        let len = read_block_len(body, &mut offset, wide)?;
        let end = offset.checked_add(len)
            .filter(|&end| end <= body.len())
            .ok_or_else(|| anyhow::anyhow!("truncated parallel-blocks body: block of {} bytes at offset {}", len, offset))?;
        spans.push(offset..end);
        offset = end;
    }
    spans.push(offset..body.len());

    let decoded: Vec<Decoded> = spans
        .par_iter()
        .map(|span| {
            let block = &body[span.clone()];
            let decoded = dispatch::decode_frame(block)?;
            if decoded.consumed != block.len() {
                anyhow::bail!("parallel block at offset {} has {} trailing bytes", span.start, block.len() - decoded.consumed);
            }
            Ok(decoded)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut data = Vec::new();
    data.try_reserve_exact(original_len)
        .with_context(|| format!("cannot reserve {} bytes for parallel-blocks output", original_len))?;
    for block in &decoded {
        data.extend_from_slice(&block.data);
    }
    let note = format!("{} blocks: {}", count, decoded[0].note);
    Ok((data, note))
}
