//! Many independent blocks in one physical stream.
//!
//! Writing compresses every job concurrently and appends the frames strictly
//! in job order. Reading walks the headers sequentially (a block's extent is
//! only known once its header is read) and then decodes all slots at once.

use super::descriptor::CodecDescriptor;
use super::dispatch::{self, Decoded};
use super::header::{self, TAG_COMPOUND};
use super::DEFAULT_ESTIMATED_RATIO;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::io::{Read, Write};
use tracing::debug;

/// One buffer to compress as part of a collective batch.
pub struct CompressionJob<'a> {
    pub label: String,
    pub src: &'a [u8],
    pub descriptor: &'a mut CodecDescriptor,
    pub estimated_ratio: f64,
}

impl<'a> CompressionJob<'a> {
    pub fn new(label: impl Into<String>, src: &'a [u8], descriptor: &'a mut CodecDescriptor) -> Self {
        Self { label: label.into(), src, descriptor, estimated_ratio: DEFAULT_ESTIMATED_RATIO }
    }

    pub fn with_ratio(mut self, estimated_ratio: f64) -> Self {
        self.estimated_ratio = estimated_ratio;
        self
    }
}

/// Location of one block inside the batch buffer.
struct Slot {
    offset: usize,
    len: usize,
    tag: u8,
}

/// Compress every job concurrently; frames come back in job order.
/// Zero-length jobs become the bare zero marker without reaching a worker.
pub(crate) fn compress_jobs(jobs: &mut [CompressionJob<'_>]) -> Result<Vec<Vec<u8>>> {
    let mut frames: Vec<Vec<u8>> = jobs.iter().map(|_| dispatch::empty_frame()).collect();
    let pending: Vec<(usize, &mut CompressionJob<'_>)> = jobs
        .iter_mut()
        .enumerate()
        .filter(|(_, job)| !job.src.is_empty())
        .collect();

    let encoded = pending
        .into_par_iter()
        .map(|(i, job)| {
            dispatch::compress(job.src, job.descriptor, job.estimated_ratio)
                .with_context(|| format!("collective job '{}'", job.label))
                .map(|frame| (i, frame))
        })
        .collect::<Result<Vec<_>>>()?;
    for (i, frame) in encoded {
        frames[i] = frame;
    }
    Ok(frames)
}

/// Compress `jobs` and append their blocks to `writer` in job order.
pub fn write_compressed_collective<W: Write>(writer: &mut W, jobs: &mut [CompressionJob<'_>]) -> Result<()> {
    let frames = compress_jobs(jobs)?;
    let total: usize = frames.iter().map(Vec::len).sum();
    for frame in &frames {
        writer.write_all(frame)?;
    }
    debug!("Wrote {} collective blocks ({} bytes)", frames.len(), total);
    Ok(())
}

fn read_slots<R: Read>(reader: &mut R, n: usize) -> Result<(Vec<u8>, Vec<Slot>)> {
    let mut buf = Vec::new();
    let mut slots = Vec::with_capacity(n);
    for i in 0..n {
        let offset = buf.len();
        let header = header::read_frame_into(reader, &mut buf)
            .with_context(|| format!("collective block {} of {}", i + 1, n))?;
        slots.push(Slot { offset, len: buf.len() - offset, tag: header.tag });
    }
    Ok((buf, slots))
}

fn decode_slots(buf: &[u8], slots: &[Slot], decode: impl Fn(usize, &[u8]) -> Result<Decoded> + Sync) -> Result<Vec<Vec<u8>>> {
    slots
        .par_iter()
        .enumerate()
        .map(|(i, slot)| {
            let decoded = decode(i, &buf[slot.offset..slot.offset + slot.len])
                .with_context(|| format!("collective block {} ({})", i + 1, header::tag_name(slot.tag)))?;
            Ok(decoded.data)
        })
        .collect()
}

/// Read `n` consecutive blocks and decode them concurrently.
pub fn read_compressed_collective<R: Read>(reader: &mut R, n: usize) -> Result<Vec<Vec<u8>>> {
    let (buf, slots) = read_slots(reader, n)?;
    decode_slots(&buf, &slots, |_, frame| dispatch::decode_frame(frame))
}

/// Read `n` blocks where only `compound_slot` may use compound framing.
#[deprecated(note = "streams written by the collective writer mark compound blocks by tag; use read_compressed_collective")]
pub fn read_compressed_collective_legacy<R: Read>(reader: &mut R, n: usize, compound_slot: usize) -> Result<Vec<Vec<u8>>> {
    if compound_slot >= n {
        anyhow::bail!("compound slot {} out of range for {} blocks", compound_slot, n);
    }
    let (buf, slots) = read_slots(reader, n)?;
    if let Some(i) = slots.iter().enumerate().position(|(i, s)| i != compound_slot && s.tag == TAG_COMPOUND) {
        anyhow::bail!("collective block {} is compound but only slot {} may be", i + 1, compound_slot + 1);
    }
    decode_slots(&buf, &slots, |i, frame| {
        if i == compound_slot {
            dispatch::decode_frame(frame)
        } else {
            dispatch::decode_flat_frame(frame)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::backend::LeafCoder;
    use crate::compression::header::{FIXED_HEADER_SIZE, ZERO_MARKER_SIZE};

    fn payload(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| b"ACGT"[(i / (seed as usize + 1)) % 4]).collect()
    }

    #[test]
    fn test_order_preserved_with_empty_jobs() {
        let sizes = [0usize, 7, 50_000, 0, 1, 3_000];
        let buffers: Vec<Vec<u8>> = sizes.iter().enumerate().map(|(i, &n)| payload(n, i as u8)).collect();
        let mut descriptors: Vec<CodecDescriptor> = (0..sizes.len()).map(|_| LeafCoder::zstd(3).into()).collect();
        let mut jobs: Vec<CompressionJob> = buffers
            .iter()
            .zip(descriptors.iter_mut())
            .enumerate()
            .map(|(i, (buf, d))| CompressionJob::new(format!("job{}", i), buf, d))
            .collect();

        let mut stream = Vec::new();
        write_compressed_collective(&mut stream, &mut jobs).unwrap();
        let decoded = read_compressed_collective(&mut stream.as_slice(), sizes.len()).unwrap();
        assert_eq!(decoded, buffers);
    }

    #[test]
    fn test_zero_job_layout() {
        let empty: &[u8] = &[];
        let body = vec![b'Q'; 500];
        let mut d0 = CodecDescriptor::Stored;
        let mut d1 = CodecDescriptor::Stored;
        let mut d2 = CodecDescriptor::Stored;
        let mut jobs = vec![
            CompressionJob::new("a", empty, &mut d0),
            CompressionJob::new("b", &body, &mut d1),
            CompressionJob::new("c", empty, &mut d2),
        ];
        let mut stream = Vec::new();
        write_compressed_collective(&mut stream, &mut jobs).unwrap();
        assert_eq!(stream.len(), ZERO_MARKER_SIZE * 2 + FIXED_HEADER_SIZE + 500);
        assert_eq!(&stream[..8], &[0u8; 8]);
        assert_eq!(&stream[stream.len() - 8..], &[0u8; 8]);
    }

    #[test]
    fn test_empty_jobs_framed_without_compression() {
        let empty: &[u8] = &[];
        let body = payload(2_000, 5);
        let mut untouched = CodecDescriptor::selector(CodecDescriptor::Stored, LeafCoder::Range.into(), 0.5, 16).unwrap();
        let mut used = CodecDescriptor::selector(CodecDescriptor::Stored, LeafCoder::Range.into(), 0.5, 16).unwrap();
        let mut jobs = vec![
            CompressionJob::new("empty", empty, &mut untouched),
            CompressionJob::new("body", &body, &mut used),
        ];
        let frames = compress_jobs(&mut jobs).unwrap();
        drop(jobs);

        assert_eq!(frames[0], vec![0u8; ZERO_MARKER_SIZE]);
        assert!(frames[1].len() > ZERO_MARKER_SIZE);
        let CodecDescriptor::Selector(untouched) = &untouched else { panic!("descriptor changed kind") };
        let CodecDescriptor::Selector(used) = &used else { panic!("descriptor changed kind") };
        assert!(!untouched.is_selected());
        assert!(used.is_selected());
    }

    #[test]
    fn test_truncated_stream_fails() {
        let body = payload(1000, 3);
        let mut d = CodecDescriptor::Stored;
        let mut jobs = vec![CompressionJob::new("only", &body, &mut d)];
        let mut stream = Vec::new();
        write_compressed_collective(&mut stream, &mut jobs).unwrap();
        assert!(read_compressed_collective(&mut stream.as_slice(), 2).is_err());
    }

    #[test]
    #[allow(deprecated)]
    fn test_legacy_compound_slot() {
        let flat = payload(4000, 1);
        let reads = payload(20_000, 2);
        let mut flat_desc: CodecDescriptor = LeafCoder::Range.into();
        let mut compound = CodecDescriptor::compound(LeafCoder::Nucleotide.into(), LeafCoder::zstd(5).into()).unwrap();
        let mut jobs = vec![
            CompressionJob::new("flat", &flat, &mut flat_desc),
            CompressionJob::new("reads", &reads, &mut compound),
        ];
        let mut stream = Vec::new();
        write_compressed_collective(&mut stream, &mut jobs).unwrap();

        let decoded = read_compressed_collective_legacy(&mut stream.as_slice(), 2, 1).unwrap();
        assert_eq!(decoded, vec![flat.clone(), reads.clone()]);

        // Wrong designated slot: the compound block sits in a flat slot
        let err = read_compressed_collective_legacy(&mut stream.as_slice(), 2, 0).unwrap_err();
        assert!(err.to_string().contains("only slot 1 may be"));
        assert!(read_compressed_collective_legacy(&mut stream.as_slice(), 2, 2).is_err());
    }
}
