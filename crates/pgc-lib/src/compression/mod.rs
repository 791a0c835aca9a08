mod alloc;
mod backend;
mod collective;
mod compound;
mod context_model;
mod dispatch;
mod entropy;
mod nucleotide;
mod parallel_blocks;
mod prefetch;
mod range_coder;
mod selector;
mod stream;
mod compress_impl;
mod decompress_impl;
pub mod descriptor;
pub mod header;

use crate::cli::{CompressConfig, DecompressConfig};
use anyhow::Result;

pub use backend::{BackendError, DictEngine, LeafCoder};
pub use collective::{read_compressed_collective, write_compressed_collective, CompressionJob};
#[allow(deprecated)]
pub use collective::read_compressed_collective_legacy;
pub use descriptor::CodecDescriptor;
pub use dispatch::{compress, decompress};
pub use header::BlockHeader;
pub use parallel_blocks::BlockSplit;
pub use prefetch::PrefetchQueue;
pub use selector::{Branch, ProbeOutcome, ProbeSelector};
pub use stream::{read_compressed, write_compressed, CompressedReader, CompressedWriter};

/// Container magic bytes (file identification)
const ARCHIVE_MAGIC: [u8; 2] = *b"PG";
/// Current container format version
const ARCHIVE_VERSION: u8 = 1;
/// Size of the container prefix: magic(2) + version(1) + reserved(1) + original_size(8) + chunk_count(4)
const ARCHIVE_PREFIX_SIZE: usize = 16;
/// Number of chunks decoded ahead of the writer in each prefetch batch
const DECOMPRESS_BATCH_SIZE: usize = 8;
/// Estimated compressed/original ratio used when a caller gives no hint
pub const DEFAULT_ESTIMATED_RATIO: f64 = 1.0;

/// Read a little-endian u32 from `data` at `offset`, returning an error on truncation.
fn read_le_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .and_then(|s| <[u8; 4]>::try_from(s).ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| anyhow::anyhow!("truncated block at offset {offset}"))
}

/// Read a little-endian u64 from `data` at `offset`, returning an error on truncation.
fn read_le_u64(data: &[u8], offset: usize) -> Result<u64> {
    data.get(offset..offset + 8)
        .and_then(|s| <[u8; 8]>::try_from(s).ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| anyhow::anyhow!("truncated block at offset {offset}"))
}

/// Compress a file into a PG container.
pub fn compress_file(args: &CompressConfig) -> Result<()> {
    compress_impl::compress(args)
}

/// Decompress a PG container back to the original bytes.
pub fn decompress_file(args: &DecompressConfig) -> Result<()> {
    decompress_impl::decompress(args)
}

/// Write variable-length integer
pub(crate) fn write_varint(out: &mut Vec<u8>, mut value: usize) {
    while value >= 0x80 {
        out.push(((value & 0x7F) | 0x80) as u8);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Maximum varint size in bytes (10 bytes = up to 70 bits, enough for usize on 64-bit)
const MAX_VARINT_BYTES: usize = 10;

/// Read variable-length integer
fn read_varint(data: &[u8], offset: &mut usize) -> Option<usize> {
    let mut value = 0usize;
    let mut shift = 0;
    let mut bytes_read = 0;

    loop {
        if *offset >= data.len() {
            return None;
        }

        let byte = data[*offset];
        *offset += 1;
        bytes_read += 1;

        value |= ((byte & 0x7F) as usize) << shift;

        if byte & 0x80 == 0 {
            return Some(value);
        }

        shift += 7;
        if bytes_read >= MAX_VARINT_BYTES {
            return None; // Malformed varint: too many continuation bytes
        }
    }
}
