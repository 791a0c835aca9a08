use pgc_lib::cli::{CoderPreset, CompressConfig, DecompressConfig};
use pgc_lib::compression::header::{BlockHeader, FIXED_HEADER_SIZE, TAG_DICTIONARY, TAG_STORED, ZERO_MARKER_SIZE};
use pgc_lib::compression::{
    read_compressed_collective, write_compressed_collective, Branch, CodecDescriptor, CompressedReader,
    CompressedWriter, CompressionJob, LeafCoder,
};
use std::fs;
use tempfile::TempDir;

/// Pseudo-genome with reads sampled from it, the shape of data the pipeline hands us.
fn pseudogenome_reads(num_reads: usize, read_len: usize) -> Vec<u8> {
    let mut state = 0x1234_5678u32;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state
    };
    let genome: Vec<u8> = (0..20_000).map(|_| b"ACGT"[(next() % 4) as usize]).collect();
    let mut out = Vec::with_capacity(num_reads * (read_len + 1));
    for _ in 0..num_reads {
        let start = next() as usize % (genome.len() - read_len);
        out.extend_from_slice(&genome[start..start + read_len]);
        if next() % 50 == 0 {
            let pos = out.len() - 1 - (next() as usize % read_len);
            out[pos] = b'N';
        }
        out.push(b'\n');
    }
    out
}

/// Roundtrip helper: compress a file with config overrides, decompress, assert exact match.
/// Returns the archive size.
fn roundtrip(data: &[u8], config_fn: impl FnOnce(&mut CompressConfig)) -> u64 {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path().to_path_buf();

    let input = temp_path.join("input.bin");
    fs::write(&input, data).unwrap();

    let archive_path = temp_path.join("test.pg");
    let mut compress_args = CompressConfig {
        input: input.clone(),
        output: archive_path.clone(),
        threads: 1,
        ..CompressConfig::default()
    };
    config_fn(&mut compress_args);

    pgc_lib::compression::compress_file(&compress_args).unwrap();
    assert!(archive_path.exists());
    let archive_size = fs::metadata(&archive_path).unwrap().len();

    let output = temp_path.join("output.bin");
    pgc_lib::compression::decompress_file(&DecompressConfig {
        input: archive_path,
        output: output.clone(),
        num_threads: 1,
    })
    .unwrap();

    let decompressed = fs::read(&output).unwrap();
    assert_eq!(decompressed.len(), data.len(), "length mismatch");
    assert!(decompressed == data, "content mismatch");
    archive_size
}

#[test]
fn test_file_roundtrip_every_preset() {
    let data = pseudogenome_reads(400, 100);
    for preset in [
        CoderPreset::Stored,
        CoderPreset::Zstd,
        CoderPreset::Lzma,
        CoderPreset::Range,
        CoderPreset::Context,
        CoderPreset::Entropy,
        CoderPreset::Nucleotide,
        CoderPreset::NucleotideZstd,
        CoderPreset::Auto,
    ] {
        roundtrip(&data, |c| {
            c.preset = preset;
            c.chunk_size = 9_000;
            c.min_probe = 1_000;
        });
    }
}

#[test]
fn test_file_roundtrip_many_chunks_and_blocks() {
    // 20 chunks: more than two prefetch batches
    let data = pseudogenome_reads(2_000, 100);
    let size = roundtrip(&data, |c| {
        c.preset = CoderPreset::Context;
        c.chunk_size = 10_100;
        c.blocks = 3;
        c.min_block_len = 2_000;
    });
    assert!(size < data.len() as u64 / 2, "archive {} bytes", size);
}

#[test]
fn test_file_roundtrip_empty_and_plain_text() {
    roundtrip(&[], |_| {});
    let data = pseudogenome_reads(50, 80);
    let size = roundtrip(&data, |c| {
        c.plain_text = true;
        c.chunk_size = 1_000;
    });
    // 16-byte prefix + one 17-byte stored header per chunk
    let chunks = (data.len() + 999) / 1_000;
    assert_eq!(size, 16 + (chunks * FIXED_HEADER_SIZE + data.len()) as u64);
}

#[test]
fn test_corrupt_archive_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("bad.pg");
    fs::write(&input, b"QZ\x01\x00garbage-garbage").unwrap();
    let result = pgc_lib::compression::decompress_file(&DecompressConfig {
        input,
        output: temp_dir.path().join("out.bin"),
        num_threads: 1,
    });
    assert!(result.is_err());
}

#[test]
fn test_scenario_selector_on_zeros() {
    let data = vec![0u8; 1_000_000];
    let mut descriptor = CodecDescriptor::selector(CodecDescriptor::Stored, LeafCoder::zstd(3).into(), 0.01, 1).unwrap();
    let frame = pgc_lib::compression::compress(&data, &mut descriptor, 1.0).unwrap();

    let CodecDescriptor::Selector(selector) = &descriptor else { panic!("descriptor changed kind") };
    let outcome = selector.selected().unwrap();
    assert_eq!(outcome.probe_len, 10_000);
    assert_eq!(outcome.branch, Branch::B);
    assert!(outcome.size_b < outcome.size_a);

    assert_eq!(frame[16], TAG_DICTIONARY);
    assert!(frame.len() < data.len() / 100, "frame {} bytes", frame.len());
    assert_eq!(pgc_lib::compression::decompress(&frame).unwrap(), data);
}

#[test]
fn test_scenario_zero_jobs_in_collective() {
    let empty: &[u8] = &[];
    let body: Vec<u8> = (0..500u32).map(|i| (i * 7919 % 251) as u8).collect();
    let mut descriptors = [CodecDescriptor::Stored, LeafCoder::zstd(3).into(), LeafCoder::Range.into()];
    let [d0, d1, d2] = &mut descriptors;
    let mut jobs = vec![
        CompressionJob::new("first", empty, d0),
        CompressionJob::new("reads", &body, d1),
        CompressionJob::new("last", empty, d2),
    ];

    let mut stream = Vec::new();
    write_compressed_collective(&mut stream, &mut jobs).unwrap();

    assert_eq!(&stream[..ZERO_MARKER_SIZE], &[0u8; 8]);
    let middle = BlockHeader::parse(&stream[ZERO_MARKER_SIZE..]).unwrap();
    assert_eq!(middle.original_len, 500);
    assert!(middle.stored_len <= 500);
    let middle_len = middle.frame_len().unwrap();
    assert_eq!(stream.len(), ZERO_MARKER_SIZE + middle_len + ZERO_MARKER_SIZE);
    assert_eq!(&stream[stream.len() - ZERO_MARKER_SIZE..], &[0u8; 8]);

    let decoded = read_compressed_collective(&mut stream.as_slice(), 3).unwrap();
    assert_eq!(decoded, vec![Vec::new(), body, Vec::new()]);
}

#[test]
fn test_writer_reader_mixed_session() {
    let reads = pseudogenome_reads(300, 90);
    let positions: Vec<u64> = (0..300u64).map(|i| i * 90 + i % 3).collect();
    let quality = b"IIIIIHHHHGGGFFF#".repeat(400);

    let mut writer = CompressedWriter::new(Vec::new());
    let mut seq = CodecDescriptor::compound(LeafCoder::Nucleotide.into(), LeafCoder::zstd(6).into()).unwrap();
    writer.write_compressed(&reads, &mut seq).unwrap();
    writer.write_compressed_array(&positions, &mut LeafCoder::zstd(3).into()).unwrap();
    {
        let mut q = CodecDescriptor::Leaf(LeafCoder::ContextModel { order: 2 });
        let mut s = CodecDescriptor::Leaf(LeafCoder::Entropy);
        let mut jobs = vec![
            CompressionJob::new("quality", &quality, &mut q).with_ratio(0.3),
            CompressionJob::new("sequence", &reads, &mut s),
        ];
        writer.write_compressed_collective(&mut jobs).unwrap();
    }
    writer.write_compressed(b"", &mut CodecDescriptor::Stored).unwrap();
    let stream = writer.into_inner();

    let mut reader = CompressedReader::new(stream.as_slice());
    assert_eq!(reader.read_compressed().unwrap(), reads);
    assert_eq!(reader.read_compressed_array::<u64>().unwrap(), positions);
    reader.prefetch_collective(3).unwrap();
    assert_eq!(reader.read_compressed_collective(2).unwrap(), vec![quality.clone(), reads.clone()]);
    assert!(reader.read_compressed().unwrap().is_empty());
    assert_eq!(reader.queued(), 0);
}

#[test]
fn test_cascade_decides_once_per_instance() {
    let reads = pseudogenome_reads(500, 100);
    let mut cascade = CodecDescriptor::cascade(
        vec![
            CodecDescriptor::Stored,
            LeafCoder::Nucleotide.into(),
            CodecDescriptor::compound(LeafCoder::Nucleotide.into(), LeafCoder::zstd(9).into()).unwrap(),
        ],
        0.1,
        4_096,
    )
    .unwrap();

    let first = pgc_lib::compression::compress(&reads, &mut cascade, 0.5).unwrap();
    let label = cascade.label();
    assert!(!label.contains('|'), "cascade still undecided: {}", label);
    assert_eq!(pgc_lib::compression::decompress(&first).unwrap(), reads);

    // Same instance, different data: no new probe, same branch chain
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    let noise: Vec<u8> = (0..20_000)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 32) as u8
        })
        .collect();
    let second = pgc_lib::compression::compress(&noise, &mut cascade, 1.0).unwrap();
    assert_eq!(cascade.label(), label);
    assert_eq!(second[16], TAG_STORED);
    assert_eq!(pgc_lib::compression::decompress(&second).unwrap(), noise);
}
