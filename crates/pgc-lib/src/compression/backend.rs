//! Leaf backends: one encode/decode pair per algorithm family.
//!
//! Backends are opaque to the rest of the layer. They append coded bytes to an
//! output buffer that the dispatcher reserved up front, and report failures as a
//! small status enum rather than rich errors; the dispatcher attaches context.

use super::header::{TAG_CONTEXT_MODEL, TAG_DICTIONARY, TAG_ENTROPY, TAG_NUCLEOTIDE, TAG_RANGE};
use super::{context_model, entropy, nucleotide, range_coder};
use anyhow::Result;
use std::io::{Read, Write};

/// Failure status reported by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("corrupt or inconsistent coded data")]
    Data,
    #[error("backend ran out of memory")]
    Memory,
    #[error("invalid coder parameters")]
    Param,
    #[error("coded input ended early")]
    TruncatedInput,
}

impl BackendError {
    fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::OutOfMemory => BackendError::Memory,
            std::io::ErrorKind::UnexpectedEof => BackendError::TruncatedInput,
            std::io::ErrorKind::InvalidInput => BackendError::Param,
            _ => BackendError::Data,
        }
    }
}

/// Dictionary-family engine, stored as one byte after the tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DictEngine {
    Zstd,
    Lzma,
}

impl DictEngine {
    fn code(self) -> u8 {
        match self {
            DictEngine::Zstd => 0,
            DictEngine::Lzma => 1,
        }
    }

    fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(DictEngine::Zstd),
            1 => Ok(DictEngine::Lzma),
            _ => anyhow::bail!("Invalid dictionary engine code: {}", code),
        }
    }
}

/// A concrete coder with its parameter block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafCoder {
    /// LZ-style dictionary coder. `level` only matters when encoding.
    Dictionary { engine: DictEngine, level: i32 },
    /// Order-k adaptive context model over a range coder.
    ContextModel { order: u8 },
    /// Order-0 adaptive range coder.
    Range,
    /// Static order-0 ANS entropy coder.
    Entropy,
    /// 2-bit nucleotide packing with an exception list.
    Nucleotide,
}

pub(crate) const MAX_CONTEXT_ORDER: u8 = 4;

impl LeafCoder {
    pub fn zstd(level: i32) -> Self {
        LeafCoder::Dictionary { engine: DictEngine::Zstd, level }
    }

    pub fn lzma(preset: i32) -> Self {
        LeafCoder::Dictionary { engine: DictEngine::Lzma, level: preset }
    }

    pub fn tag(&self) -> u8 {
        match self {
            LeafCoder::Dictionary { .. } => TAG_DICTIONARY,
            LeafCoder::ContextModel { .. } => TAG_CONTEXT_MODEL,
            LeafCoder::Range => TAG_RANGE,
            LeafCoder::Entropy => TAG_ENTROPY,
            LeafCoder::Nucleotide => TAG_NUCLEOTIDE,
        }
    }

    pub fn label(&self) -> String {
        match self {
            LeafCoder::Dictionary { engine: DictEngine::Zstd, level } => format!("zstd-{}", level),
            LeafCoder::Dictionary { engine: DictEngine::Lzma, level } => format!("lzma-{}", level),
            LeafCoder::ContextModel { order } => format!("ctx-o{}", order),
            LeafCoder::Range => "range-o0".to_string(),
            LeafCoder::Entropy => "ans-o0".to_string(),
            LeafCoder::Nucleotide => "nucleotide-2bit".to_string(),
        }
    }

    /// Reject parameter blocks the backend cannot honour.
    pub(crate) fn validate(&self) -> Result<()> {
        match *self {
            LeafCoder::Dictionary { engine: DictEngine::Zstd, level } if !(1..=22).contains(&level) => {
                anyhow::bail!("zstd level must be in 1..=22, got {}", level)
            }
            LeafCoder::Dictionary { engine: DictEngine::Lzma, level } if !(0..=9).contains(&level) => {
                anyhow::bail!("lzma preset must be in 0..=9, got {}", level)
            }
            LeafCoder::ContextModel { order } if order == 0 || order > MAX_CONTEXT_ORDER => {
                anyhow::bail!("context-model order must be in 1..={}, got {}", MAX_CONTEXT_ORDER, order)
            }
            _ => Ok(()),
        }
    }

    /// Tag-specific header fields written right after the fixed header.
    pub(crate) fn write_params(&self, out: &mut Vec<u8>) {
        match self {
            LeafCoder::Dictionary { engine, .. } => out.push(engine.code()),
            LeafCoder::ContextModel { order } => out.push(*order),
            LeafCoder::Range | LeafCoder::Entropy | LeafCoder::Nucleotide => {}
        }
    }

    /// Parse the tag-specific fields for `tag`; returns the coder and bytes consumed.
    pub(crate) fn read_params(tag: u8, data: &[u8]) -> Result<(Self, usize)> {
        let byte = |what: &str| {
            data.first().copied()
                .ok_or_else(|| anyhow::anyhow!("truncated {} field in block header", what))
        };
        match tag {
            TAG_DICTIONARY => {
                let engine = DictEngine::from_code(byte("dictionary engine")?)?;
                Ok((LeafCoder::Dictionary { engine, level: 0 }, 1))
            }
            TAG_CONTEXT_MODEL => {
                let coder = LeafCoder::ContextModel { order: byte("context order")? };
                coder.validate()?;
                Ok((coder, 1))
            }
            TAG_RANGE => Ok((LeafCoder::Range, 0)),
            TAG_ENTROPY => Ok((LeafCoder::Entropy, 0)),
            TAG_NUCLEOTIDE => Ok((LeafCoder::Nucleotide, 0)),
            _ => anyhow::bail!("Invalid leaf coder tag: {}", tag),
        }
    }
}

pub(crate) trait ByteCoder {
    /// Append the coded form of `src` to `out`.
    fn encode(&self, src: &[u8], out: &mut Vec<u8>) -> std::result::Result<(), BackendError>;
    /// Append exactly `original_len` decoded bytes to `out`.
    fn decode(&self, src: &[u8], out: &mut Vec<u8>, original_len: usize) -> std::result::Result<(), BackendError>;
}

impl ByteCoder for LeafCoder {
    fn encode(&self, src: &[u8], out: &mut Vec<u8>) -> std::result::Result<(), BackendError> {
        match *self {
            LeafCoder::Dictionary { engine: DictEngine::Zstd, level } => encode_zstd(src, level, out),
            LeafCoder::Dictionary { engine: DictEngine::Lzma, level } => encode_lzma(src, level, out),
            LeafCoder::ContextModel { order } => context_model::encode(src, order, out),
            LeafCoder::Range => range_coder::encode_order0(src, out),
            LeafCoder::Entropy => entropy::encode(src, out),
            LeafCoder::Nucleotide => nucleotide::encode(src, out),
        }
    }

    fn decode(&self, src: &[u8], out: &mut Vec<u8>, original_len: usize) -> std::result::Result<(), BackendError> {
        match *self {
            LeafCoder::Dictionary { engine: DictEngine::Zstd, .. } => decode_zstd(src, out, original_len),
            LeafCoder::Dictionary { engine: DictEngine::Lzma, .. } => decode_lzma(src, out, original_len),
            LeafCoder::ContextModel { order } => context_model::decode(src, order, out, original_len),
            LeafCoder::Range => range_coder::decode_order0(src, out, original_len),
            LeafCoder::Entropy => entropy::decode(src, out, original_len),
            LeafCoder::Nucleotide => nucleotide::decode(src, out, original_len),
        }
    }
}

fn encode_zstd(src: &[u8], level: i32, out: &mut Vec<u8>) -> std::result::Result<(), BackendError> {
    let compressed = zstd::bulk::compress(src, level).map_err(|e| BackendError::from_io(&e))?;
    out.extend_from_slice(&compressed);
    Ok(())
}

fn decode_zstd(src: &[u8], out: &mut Vec<u8>, original_len: usize) -> std::result::Result<(), BackendError> {
    // Capacity is the declared size: zstd refuses to produce more than that.
    let decompressed = zstd::bulk::decompress(src, original_len).map_err(|e| BackendError::from_io(&e))?;
    out.extend_from_slice(&decompressed);
    Ok(())
}

fn encode_lzma(src: &[u8], preset: i32, out: &mut Vec<u8>) -> std::result::Result<(), BackendError> {
    let preset = u32::try_from(preset).map_err(|_| BackendError::Param)?;
    let mut encoder = xz2::write::XzEncoder::new(out, preset);
    encoder.write_all(src).map_err(|e| BackendError::from_io(&e))?;
    encoder.finish().map_err(|e| BackendError::from_io(&e))?;
    Ok(())
}

fn decode_lzma(src: &[u8], out: &mut Vec<u8>, original_len: usize) -> std::result::Result<(), BackendError> {
    let start = out.len();
    // One byte past the declared size is enough to detect an overlong stream.
    let limit = original_len as u64 + 1;
    xz2::read::XzDecoder::new(src)
        .take(limit)
        .read_to_end(out)
        .map_err(|e| BackendError::from_io(&e))?;
    if out.len() - start != original_len {
        return Err(BackendError::Data);
    }
    Ok(())
}
