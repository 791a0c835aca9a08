//! File compression: chunk the input and write one collective stream.

use anyhow::{Context, Result};
use std::io::Write;
use std::time::Instant;
use tracing::info;
use crate::cli::{num_cpus, CompressConfig};
use super::*;

fn write_archive_prefix<W: Write>(out: &mut W, original_size: u64, chunk_count: u32) -> Result<()> {
    let mut prefix = Vec::with_capacity(ARCHIVE_PREFIX_SIZE);
    prefix.extend_from_slice(&ARCHIVE_MAGIC);
    prefix.push(ARCHIVE_VERSION);
    prefix.push(0); // reserved
    prefix.extend_from_slice(&original_size.to_le_bytes());
    prefix.extend_from_slice(&chunk_count.to_le_bytes());
    out.write_all(&prefix)?;
    Ok(())
}

pub(super) fn compress(args: &CompressConfig) -> Result<()> {
    let start_time = Instant::now();

    // Set up thread pool
    let num_threads = if args.threads == 0 { num_cpus() } else { args.threads };
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .ok(); // Ignore error if already initialized

    info!("Using {} threads for compression", num_threads);
    info!("Coder preset: {:?}", args.preset);
    info!("Input file: {:?}", args.input);
    info!("Output: {:?}", args.output);

    if args.chunk_size == 0 {
        anyhow::bail!("chunk size must be positive");
    }

    let data = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read input: {:?}", args.input))?;
    let chunks: Vec<&[u8]> = data.chunks(args.chunk_size).collect();
    let chunk_count = u32::try_from(chunks.len())
        .context("too many chunks; raise --chunk-size")?;
    let mut descriptors = chunks
        .iter()
        .map(|_| args.descriptor())
        .collect::<Result<Vec<_>>>()?;
    info!("Compressing {} bytes in {} chunks with {}", data.len(), chunks.len(),
        descriptors.first().map(|d| d.label()).unwrap_or_else(|| "-".to_string()));

    let file = std::fs::File::create(&args.output)
        .with_context(|| format!("Failed to create output: {:?}", args.output))?;
    let mut out = std::io::BufWriter::with_capacity(4 * 1024 * 1024, file);
    write_archive_prefix(&mut out, data.len() as u64, chunk_count)?;

    let mut writer = CompressedWriter::new(out).plain_text(args.plain_text);
    {
        let mut jobs: Vec<CompressionJob> = chunks
            .iter()
            .zip(descriptors.iter_mut())
            .enumerate()
            .map(|(i, (chunk, descriptor))| CompressionJob::new(format!("chunk {}", i), chunk, descriptor))
            .collect();
        writer.write_compressed_collective(&mut jobs)?;
    }
    writer.flush()?;

    for (i, descriptor) in descriptors.iter().enumerate() {
        if let CodecDescriptor::Selector(_) = descriptor {
            info!("  chunk {}: {}", i, descriptor.label());
        }
    }

    let compressed_size = std::fs::metadata(&args.output)?.len();
    let elapsed = start_time.elapsed();
    info!("Compression completed in {:.2}s", elapsed.as_secs_f64());
    info!("Original size: {} bytes", data.len());
    info!("Compressed size: {} bytes", compressed_size);
    if compressed_size > 0 {
        info!("Compression ratio: {:.2}x", data.len() as f64 / compressed_size as f64);
    }
    Ok(())
}
