//! Block header protocol.
//!
//! Every compressed block is self-describing:
//!
//! ```text
//! [original_len: u64][stored_len: u64][tag: u8][tag fields + payload: stored_len bytes]
//! ```
//!
//! `stored_len` covers everything after the 17-byte fixed prefix, so a reader can
//! step over any block without understanding its tag. A block whose
//! `original_len` is zero is written as the 8-byte length alone.

use anyhow::{Context, Result};
use std::io::Read;

pub const TAG_STORED: u8 = 0;
pub const TAG_DICTIONARY: u8 = 1;
pub const TAG_CONTEXT_MODEL: u8 = 3;
pub const TAG_RANGE: u8 = 4;
pub const TAG_ENTROPY: u8 = 5;
pub const TAG_NUCLEOTIDE: u8 = 11;
pub const TAG_COMPOUND: u8 = 77;
pub const TAG_PARALLEL_BLOCKS: u8 = 88;
/// Structural only: a selector resolves to a concrete coder before anything is framed.
pub const TAG_SELECTOR: u8 = 99;

/// original_len(8) + stored_len(8) + tag(1)
pub const FIXED_HEADER_SIZE: usize = 17;
/// A zero-length block is only its original_len field.
pub const ZERO_MARKER_SIZE: usize = 8;

/// Human-readable tag name for diagnostics.
pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        TAG_STORED => "stored",
        TAG_DICTIONARY => "dictionary",
        TAG_CONTEXT_MODEL => "context-model",
        TAG_RANGE => "range",
        TAG_ENTROPY => "entropy",
        TAG_NUCLEOTIDE => "nucleotide",
        TAG_COMPOUND => "compound",
        TAG_PARALLEL_BLOCKS => "parallel-blocks",
        TAG_SELECTOR => "selector",
        _ => "unknown",
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub original_len: u64,
    pub stored_len: u64,
    pub tag: u8,
}

impl BlockHeader {
    /// Header for a zero-length block.
    pub fn empty() -> Self {
        Self { original_len: 0, stored_len: 0, tag: TAG_STORED }
    }

    pub fn is_empty(&self) -> bool {
        self.original_len == 0
    }

    /// Bytes the header itself occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        if self.is_empty() { ZERO_MARKER_SIZE } else { FIXED_HEADER_SIZE }
    }

    /// Bytes of the whole block (header + tag fields + payload).
    pub fn frame_len(&self) -> Result<usize> {
        let stored = usize::try_from(self.stored_len)
            .context("stored length does not fit in memory")?;
        self.encoded_len()
            .checked_add(stored)
            .ok_or_else(|| anyhow::anyhow!("block length overflow"))
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.original_len.to_le_bytes());
        if self.is_empty() {
            return;
        }
        out.extend_from_slice(&self.stored_len.to_le_bytes());
        out.push(self.tag);
    }

    /// Overwrite a reserved 17-byte prefix in place.
    pub(crate) fn patch(&self, prefix: &mut [u8]) {
        prefix[0..8].copy_from_slice(&self.original_len.to_le_bytes());
        prefix[8..16].copy_from_slice(&self.stored_len.to_le_bytes());
        prefix[16] = self.tag;
    }

    /// Parse the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let original_len = super::read_le_u64(data, 0)?;
        if original_len == 0 {
            return Ok(Self::empty());
        }
        let stored_len = super::read_le_u64(data, 8)?;
        let tag = *data.get(16).ok_or_else(|| anyhow::anyhow!("truncated block header: missing tag"))?;
        Ok(Self { original_len, stored_len, tag })
    }
}

/// Read one complete block (header, tag fields and payload) from a stream.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut frame = Vec::new();
    read_frame_into(reader, &mut frame)?;
    Ok(frame)
}

/// Append one complete block to `buf`, returning its parsed header.
///
/// The header is read first because its length decides how much more to pull;
/// the body is read through `take` so a corrupt length cannot trigger a huge
/// up-front allocation.
pub(crate) fn read_frame_into<R: Read>(reader: &mut R, buf: &mut Vec<u8>) -> Result<BlockHeader> {
    let start = buf.len();
    buf.resize(start + ZERO_MARKER_SIZE, 0);
    reader.read_exact(&mut buf[start..]).context("truncated stream: missing block header")?;
    let original_len = super::read_le_u64(buf, start)?;
    if original_len == 0 {
        return Ok(BlockHeader::empty());
    }

    buf.resize(start + FIXED_HEADER_SIZE, 0);
    reader.read_exact(&mut buf[start + ZERO_MARKER_SIZE..])
        .context("truncated stream: incomplete block header")?;
    let header = BlockHeader::parse(&buf[start..])?;

    let body_len = header.frame_len()? - FIXED_HEADER_SIZE;
    let read = reader.by_ref().take(header.stored_len).read_to_end(buf)?;
    if read != body_len {
        anyhow::bail!(
            "truncated stream: {} block declares {} stored bytes, only {} available",
            tag_name(header.tag), body_len, read
        );
    }
    Ok(header)
}
