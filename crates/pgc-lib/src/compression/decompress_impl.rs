//! File decompression: prefetch chunks in batches and write them out in order.

use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::time::Instant;
use tracing::info;
use crate::cli::{num_cpus, DecompressConfig};
use super::*;

/// Validate the container prefix; returns (original size, chunk count).
fn read_archive_prefix<R: Read>(input: &mut R) -> Result<(u64, u32)> {
    let mut prefix = [0u8; ARCHIVE_PREFIX_SIZE];
    input.read_exact(&mut prefix)
        .context("Failed to read archive header")?;
    if prefix[0..2] != ARCHIVE_MAGIC {
        anyhow::bail!("Not a PG archive (bad magic {:02x?})", &prefix[0..2]);
    }
    if prefix[2] != ARCHIVE_VERSION {
        anyhow::bail!("Unsupported archive version {} (expected {})", prefix[2], ARCHIVE_VERSION);
    }
    let original_size = read_le_u64(&prefix, 4)?;
    let chunk_count = read_le_u32(&prefix, 12)?;
    Ok((original_size, chunk_count))
}

pub(super) fn decompress(args: &DecompressConfig) -> Result<()> {
    let start_time = Instant::now();

    let num_threads = if args.num_threads == 0 { num_cpus() } else { args.num_threads };
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .ok(); // Ignore error if already initialized

    info!("Input file: {:?}", args.input);
    info!("Output file: {:?}", args.output);

    let file = std::fs::File::open(&args.input)
        .with_context(|| format!("Failed to open archive: {:?}", args.input))?;
    let mut input = std::io::BufReader::with_capacity(4 * 1024 * 1024, file);
    let (original_size, chunk_count) = read_archive_prefix(&mut input)?;
    info!("Archive: {} bytes in {} chunks", original_size, chunk_count);

    let out_file = std::fs::File::create(&args.output)
        .with_context(|| format!("Failed to create output: {:?}", args.output))?;
    let mut out = std::io::BufWriter::with_capacity(4 * 1024 * 1024, out_file);

    let mut reader = CompressedReader::new(input);
    let mut remaining = chunk_count as usize;
    let mut written = 0u64;
    while remaining > 0 {
        let batch = remaining.min(DECOMPRESS_BATCH_SIZE);
        reader.prefetch_collective(batch)
            .with_context(|| format!("chunk batch starting at {}", chunk_count as usize - remaining))?;
        for _ in 0..batch {
            let chunk = reader.read_compressed()?;
            out.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        remaining -= batch;
    }
    out.flush()?;

    if written != original_size {
        anyhow::bail!("Archive declares {} bytes but {} were decoded", original_size, written);
    }
    let mut trailing = [0u8; 1];
    if reader.into_inner().read(&mut trailing)? != 0 {
        anyhow::bail!("Unexpected trailing data after {} chunks", chunk_count);
    }

    let elapsed = start_time.elapsed();
    info!("Decompressed {} bytes", written);
    info!("Decompression completed in {:.2}s", elapsed.as_secs_f64());
    Ok(())
}
