//! Resolve a descriptor against a buffer and frame the result.
//!
//! `compress_block` / `decode_frame` are the recursive workers shared by every
//! composite descriptor; `compress` / `decompress` are the public entry points
//! that add ratio reporting and strict whole-frame checks.

use super::alloc;
use super::backend::{ByteCoder, LeafCoder};
use super::descriptor::CodecDescriptor;
use super::header::{
    tag_name, BlockHeader, FIXED_HEADER_SIZE, TAG_COMPOUND, TAG_PARALLEL_BLOCKS, TAG_SELECTOR, TAG_STORED,
};
use super::{compound, parallel_blocks, selector};
use anyhow::{Context, Result};
use tracing::{debug, warn};

/// A framed block plus the diagnostic text describing how it was coded.
pub(crate) struct Encoded {
    pub(crate) frame: Vec<u8>,
    pub(crate) note: String,
}

/// A decoded block and the number of frame bytes it occupied.
pub(crate) struct Decoded {
    pub(crate) data: Vec<u8>,
    pub(crate) note: String,
    pub(crate) consumed: usize,
}

/// Compress `src` into one self-describing block.
///
/// The output never declares more stored bytes than `src.len()`: when the
/// chosen coder does not shrink the data the block is re-framed as stored.
pub fn compress(src: &[u8], descriptor: &mut CodecDescriptor, estimated_ratio: f64) -> Result<Vec<u8>> {
    let encoded = compress_block(src, descriptor, estimated_ratio)?;
    if !src.is_empty() {
        let header = BlockHeader::parse(&encoded.frame)?;
        let actual_ratio = header.stored_len as f64 / src.len() as f64;
        debug!(
            "{}: {} -> {} bytes (ratio {:.4}, estimated {:.4}) via {}",
            descriptor.label(), src.len(), encoded.frame.len(), actual_ratio, estimated_ratio, encoded.note
        );
        if actual_ratio > estimated_ratio {
            warn!(
                "{}: compression ratio {:.4} exceeds estimate {:.4} ({} bytes)",
                descriptor.label(), actual_ratio, estimated_ratio, src.len()
            );
        }
    }
    Ok(encoded.frame)
}

/// Decode one complete block. Trailing bytes after the block are an error.
pub fn decompress(frame: &[u8]) -> Result<Vec<u8>> {
    let decoded = decode_frame(frame)?;
    if decoded.consumed != frame.len() {
        anyhow::bail!(
            "{} trailing bytes after {}-byte block",
            frame.len() - decoded.consumed, decoded.consumed
        );
    }
    Ok(decoded.data)
}

pub(crate) fn empty_frame() -> Vec<u8> {
    let mut frame = Vec::with_capacity(BlockHeader::empty().encoded_len());
    BlockHeader::empty().write_to(&mut frame);
    frame
}

pub(crate) fn stored_frame(src: &[u8]) -> Vec<u8> {
    if src.is_empty() {
        return empty_frame();
    }
    let mut frame = Vec::with_capacity(FIXED_HEADER_SIZE + src.len());
    BlockHeader { original_len: src.len() as u64, stored_len: src.len() as u64, tag: TAG_STORED }
        .write_to(&mut frame);
    frame.extend_from_slice(src);
    frame
}

pub(crate) fn compress_block(src: &[u8], descriptor: &mut CodecDescriptor, estimated_ratio: f64) -> Result<Encoded> {
    if src.is_empty() {
        return Ok(Encoded { frame: empty_frame(), note: "empty".to_string() });
    }

    let encoded = match descriptor {
        CodecDescriptor::Stored => Encoded { frame: stored_frame(src), note: "stored".to_string() },
        CodecDescriptor::Leaf(coder) => encode_leaf(src, *coder, estimated_ratio)?,
        CodecDescriptor::Compound { primary, secondary } => {
            compound::compress(src, primary, secondary, estimated_ratio)?
        }
        CodecDescriptor::ParallelBlocks(split) => parallel_blocks::compress(src, split, estimated_ratio)?,
        CodecDescriptor::Selector(sel) => selector::compress(src, sel, estimated_ratio)?,
    };

    let header = BlockHeader::parse(&encoded.frame)?;
    if header.tag != TAG_STORED && header.stored_len >= src.len() as u64 {
        debug!(
            "{} did not shrink {} bytes ({} stored), keeping verbatim",
            encoded.note, src.len(), header.stored_len
        );
        return Ok(Encoded { frame: stored_frame(src), note: format!("stored ({} expanded)", encoded.note) });
    }
    Ok(encoded)
}

fn encode_leaf(src: &[u8], coder: LeafCoder, estimated_ratio: f64) -> Result<Encoded> {
    let mut frame = alloc::output_buffer(src.len(), estimated_ratio)?;
    frame.resize(FIXED_HEADER_SIZE, 0);
    coder.write_params(&mut frame);
    coder.encode(src, &mut frame)
        .with_context(|| format!("{} backend failed on {} bytes", coder.label(), src.len()))?;

    let header = BlockHeader {
        original_len: src.len() as u64,
        stored_len: (frame.len() - FIXED_HEADER_SIZE) as u64,
        tag: coder.tag(),
    };
    header.patch(&mut frame[..FIXED_HEADER_SIZE]);
    Ok(Encoded { frame, note: coder.label() })
}

/// Decode the block at the start of `frame`, which may be followed by other data.
pub(crate) fn decode_frame(frame: &[u8]) -> Result<Decoded> {
    let header = BlockHeader::parse(frame)?;
    let frame_len = header.frame_len()?;
    if frame.len() < frame_len {
        anyhow::bail!(
            "truncated {} block: {} bytes declared, {} available",
            tag_name(header.tag), frame_len, frame.len()
        );
    }
    if header.is_empty() {
        return Ok(Decoded { data: Vec::new(), note: "empty".to_string(), consumed: frame_len });
    }

    let original_len = usize::try_from(header.original_len)
        .context("declared block length does not fit in memory")?;
    let body = &frame[FIXED_HEADER_SIZE..frame_len];
    let (data, note) = match header.tag {
        TAG_STORED => (body.to_vec(), "stored".to_string()),
        TAG_COMPOUND => compound::decode(body, original_len)?,
        TAG_PARALLEL_BLOCKS => parallel_blocks::decode(body, original_len)?,
        TAG_SELECTOR => anyhow::bail!("selector tag {} cannot appear in a block header", TAG_SELECTOR),
        tag => decode_leaf(tag, body, original_len)?,
    };

    if data.len() != original_len {
        anyhow::bail!(
            "corrupt {} block: decoded {} bytes, header declares {}",
            tag_name(header.tag), data.len(), original_len
        );
    }
    Ok(Decoded { data, note, consumed: frame_len })
}

/// Decode a block that must use flat framing (anything but compound).
pub(crate) fn decode_flat_frame(frame: &[u8]) -> Result<Decoded> {
    let header = BlockHeader::parse(frame)?;
    if !header.is_empty() && header.tag == TAG_COMPOUND {
        anyhow::bail!("compound block found in a flat-framed slot");
    }
    decode_frame(frame)
}

/// Run a leaf backend over `body` (tag fields + payload).
pub(crate) fn decode_leaf(tag: u8, body: &[u8], original_len: usize) -> Result<(Vec<u8>, String)> {
    let (coder, used) = LeafCoder::read_params(tag, body)?;
    let data = decode_with(coder, &body[used..], original_len)?;
    Ok((data, coder.label()))
}

pub(crate) fn decode_with(coder: LeafCoder, payload: &[u8], original_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.try_reserve_exact(original_len)
        .with_context(|| format!("cannot reserve {} bytes for {} output", original_len, coder.label()))?;
    coder.decode(payload, &mut out, original_len)
        .with_context(|| format!("{} backend failed to decode {} bytes", coder.label(), payload.len()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::header::{TAG_DICTIONARY, ZERO_MARKER_SIZE};

    fn genome(len: usize) -> Vec<u8> {
        let motif = b"ACGGTCATTGCAGGCTTAACCGT";
        (0..len).map(|i| motif[(i * 7 + i / 97) % motif.len()]).collect()
    }

    fn noise(len: usize) -> Vec<u8> {
        let mut state = 0x2545_F491_4F6C_DD1Du64;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 24) as u8
            })
            .collect()
    }

    fn leaves() -> Vec<CodecDescriptor> {
        vec![
            CodecDescriptor::Stored,
            LeafCoder::zstd(3).into(),
            LeafCoder::lzma(6).into(),
            LeafCoder::ContextModel { order: 2 }.into(),
            LeafCoder::Range.into(),
            LeafCoder::Entropy.into(),
            LeafCoder::Nucleotide.into(),
        ]
    }

    #[test]
    fn test_roundtrip_all_leaves() {
        for data in [genome(10_000), noise(3_000), vec![b'N'; 1], b"ACGT".to_vec()] {
            for mut descriptor in leaves() {
                let frame = compress(&data, &mut descriptor, 1.0).unwrap();
                let header = BlockHeader::parse(&frame).unwrap();
                assert!(header.stored_len <= data.len() as u64, "{}", descriptor.label());
                assert_eq!(decompress(&frame).unwrap(), data, "{}", descriptor.label());
            }
        }
    }

    #[test]
    fn test_empty_input_is_zero_marker() {
        for mut descriptor in leaves() {
            let frame = compress(&[], &mut descriptor, 1.0).unwrap();
            assert_eq!(frame, vec![0u8; ZERO_MARKER_SIZE]);
            assert!(decompress(&frame).unwrap().is_empty());
        }
    }

    #[test]
    fn test_no_expansion_falls_back_to_stored() {
        let data = noise(4096);
        let mut descriptor: CodecDescriptor = LeafCoder::zstd(19).into();
        let frame = compress(&data, &mut descriptor, 1.0).unwrap();
        let header = BlockHeader::parse(&frame).unwrap();
        assert_eq!(header.tag, TAG_STORED);
        assert_eq!(header.stored_len, data.len() as u64);
        assert_eq!(frame.len(), FIXED_HEADER_SIZE + data.len());
    }

    #[test]
    fn test_compressible_keeps_backend_tag() {
        let data = genome(50_000);
        let mut descriptor: CodecDescriptor = LeafCoder::zstd(3).into();
        let frame = compress(&data, &mut descriptor, 0.5).unwrap();
        assert_eq!(frame[16], TAG_DICTIONARY);
        assert!(frame.len() < data.len() / 4);
    }

    #[test]
    fn test_length_mismatch_is_corruption() {
        let data = genome(1000);
        let mut frame = compress(&data, &mut CodecDescriptor::Leaf(LeafCoder::Nucleotide), 1.0).unwrap();
        // Declare one more byte than the payload decodes to
        frame[0..8].copy_from_slice(&1001u64.to_le_bytes());
        assert!(decompress(&frame).is_err());

        let mut stored = stored_frame(b"abc");
        stored[0..8].copy_from_slice(&4u64.to_le_bytes());
        let err = decompress(&stored).unwrap_err();
        assert!(err.to_string().contains("corrupt stored block"));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut frame = stored_frame(b"abc");
        frame.push(0);
        assert!(decompress(&frame).is_err());
        assert_eq!(decode_frame(&frame).unwrap().consumed, FIXED_HEADER_SIZE + 3);
    }

    #[test]
    fn test_selector_tag_never_decodes() {
        let mut frame = stored_frame(b"abc");
        frame[16] = TAG_SELECTOR;
        let err = decompress(&frame).unwrap_err();
        assert!(err.to_string().contains("selector tag"));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut frame = stored_frame(b"abc");
        frame[16] = 42;
        assert!(decompress(&frame).is_err());
    }
}
