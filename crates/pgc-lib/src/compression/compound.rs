//! Two-stage compound blocks.
//!
//! ```text
//! [outer header, tag 77]
//! [intermediate_len: u64][primary_tag: u8][primary fields]
//! [nested block: full header + payload of the secondary stage]
//! ```
//!
//! The primary (flat-framed) stage runs first through the ordinary dispatcher;
//! its tag and tag-specific fields stay in the compound header and only its
//! payload is handed to the secondary. A parallel-blocks primary has no fields
//! that can be split off its payload, so its whole body (block table included)
//! is the intermediate. When the primary fails to shrink the data it is skipped
//! and `primary_tag` is written as stored, so the decoder passes the nested
//! output through untouched.

use super::backend::LeafCoder;
use super::descriptor::CodecDescriptor;
use super::dispatch::{self, Encoded};
use super::header::{
    tag_name, BlockHeader, FIXED_HEADER_SIZE, TAG_COMPOUND, TAG_PARALLEL_BLOCKS, TAG_SELECTOR, TAG_STORED,
};
use super::{parallel_blocks, read_le_u64};
use anyhow::{Context, Result};
use tracing::debug;

/// How the decoder undoes the primary stage.
enum PrimaryStage {
    Verbatim,
    Blocks,
    Leaf(LeafCoder),
}

/// Length of the tag-specific fields at the start of a primary frame body.
fn primary_fields_len(tag: u8, body: &[u8]) -> Result<usize> {
    match tag {
        TAG_PARALLEL_BLOCKS => Ok(0),
        TAG_COMPOUND | TAG_SELECTOR => {
            anyhow::bail!("compound primary cannot be framed as {}", tag_name(tag))
        }
        tag => Ok(LeafCoder::read_params(tag, body)?.1),
    }
}

pub(crate) fn compress(
    src: &[u8],
    primary: &mut CodecDescriptor,
    secondary: &mut CodecDescriptor,
    estimated_ratio: f64,
) -> Result<Encoded> {
    let stage1 = dispatch::compress_block(src, primary, estimated_ratio)
        .with_context(|| format!("compound primary {} failed on {} bytes", primary.label(), src.len()))?;
    let stage1_header = BlockHeader::parse(&stage1.frame)?;

    // compress_block only keeps a non-stored tag when the body is smaller than src
    let (primary_tag, fields, intermediate): (u8, &[u8], &[u8]) = if stage1_header.tag == TAG_STORED {
        debug!("compound primary {} did not shrink {} bytes, skipping", primary.label(), src.len());
        (TAG_STORED, &src[..0], src)
    } else {
        let body = &stage1.frame[FIXED_HEADER_SIZE..];
        let split = primary_fields_len(stage1_header.tag, body)?;
        (stage1_header.tag, &body[..split], &body[split..])
    };

    let nested = dispatch::compress_block(intermediate, secondary, estimated_ratio)?;

    let mut frame = Vec::with_capacity(FIXED_HEADER_SIZE + 8 + 1 + fields.len() + nested.frame.len());
    frame.resize(FIXED_HEADER_SIZE, 0);
    frame.extend_from_slice(&(intermediate.len() as u64).to_le_bytes());
    frame.push(primary_tag);
    frame.extend_from_slice(fields);
    frame.extend_from_slice(&nested.frame);

    let header = BlockHeader {
        original_len: src.len() as u64,
        stored_len: (frame.len() - FIXED_HEADER_SIZE) as u64,
        tag: TAG_COMPOUND,
    };
    header.patch(&mut frame[..FIXED_HEADER_SIZE]);

    let first = if primary_tag == TAG_STORED { "verbatim" } else { stage1.note.as_str() };
    Ok(Encoded { frame, note: format!("{}+{}", first, nested.note) })
}

/// Decode a compound body (everything after the outer fixed header).
pub(crate) fn decode(body: &[u8], original_len: usize) -> Result<(Vec<u8>, String)> {
    let intermediate_len = usize::try_from(read_le_u64(body, 0)?)
        .context("compound intermediate length does not fit in memory")?;
    let primary_tag = *body.get(8)
        .ok_or_else(|| anyhow::anyhow!("truncated compound block: missing primary tag"))?;
    let mut offset = 9;

    let primary = match primary_tag {
        TAG_STORED => PrimaryStage::Verbatim,
        TAG_PARALLEL_BLOCKS => PrimaryStage::Blocks,
        TAG_COMPOUND | TAG_SELECTOR => {
            anyhow::bail!("corrupt compound block: primary stage tagged {}", tag_name(primary_tag))
        }
        tag => {
            let (coder, used) = LeafCoder::read_params(tag, &body[offset..])
                .context("compound primary stage")?;
            offset += used;
            PrimaryStage::Leaf(coder)
        }
    };

    let nested = dispatch::decode_frame(&body[offset..]).context("compound nested block")?;
    if offset + nested.consumed != body.len() {
        anyhow::bail!(
            "corrupt compound block: {} bytes after the nested block",
            body.len() - offset - nested.consumed
        );
    }
    if nested.data.len() != intermediate_len {
        anyhow::bail!(
            "corrupt compound block: nested stage produced {} bytes, expected {}",
            nested.data.len(), intermediate_len
        );
    }

    match primary {
        PrimaryStage::Verbatim => Ok((nested.data, format!("verbatim+{}", nested.note))),
        PrimaryStage::Blocks => {
            let (data, note) = parallel_blocks::decode(&nested.data, original_len)?;
            Ok((data, format!("{}+{}", note, nested.note)))
        }
        PrimaryStage::Leaf(coder) => {
            let data = dispatch::decode_with(coder, &nested.data, original_len)?;
            Ok((data, format!("{}+{}", coder.label(), nested.note)))
        }
    }
}
