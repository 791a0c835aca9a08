use crate::compression::{CodecDescriptor, LeafCoder};
use anyhow::Result;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoderPreset {
    /// No compression (container framing only)
    Stored,
    /// zstd at `level`
    Zstd,
    /// LZMA (xz) at preset `level`
    Lzma,
    /// Order-0 adaptive range coder
    Range,
    /// Order-k context model (`context_order`)
    Context,
    /// Static order-0 ANS
    Entropy,
    /// 2-bit nucleotide packing
    Nucleotide,
    /// 2-bit packing followed by zstd on the packed stream
    NucleotideZstd,
    /// Probe each chunk and keep the best of several coders
    Auto,
}

#[derive(Clone)]
pub struct CompressConfig {
    /// Input file
    pub input: PathBuf,
    /// Output PG archive file
    pub output: PathBuf,
    /// Number of threads (0 = auto-detect)
    pub threads: usize,
    /// Coder applied to every chunk
    pub preset: CoderPreset,
    /// zstd level (1-22) or LZMA preset (0-9)
    pub level: i32,
    /// Context-model order (1-4)
    pub context_order: u8,
    /// Bytes per independently coded chunk
    pub chunk_size: usize,
    /// Parallel blocks per chunk (1 = no splitting)
    pub blocks: usize,
    /// Smallest block worth splitting off
    pub min_block_len: usize,
    /// Block boundaries are multiples of this
    pub block_alignment: usize,
    /// Fraction of each chunk the auto preset probes
    pub probe_fraction: f64,
    /// Minimum probe size in bytes for the auto preset
    pub min_probe: usize,
    /// Write stored blocks only (debugging aid)
    pub plain_text: bool,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::new(),
            threads: 0,
            preset: CoderPreset::Zstd,
            level: 3,
            context_order: 2,
            chunk_size: 8 << 20,
            blocks: 1,
            min_block_len: 1 << 20,
            block_alignment: 64,
            probe_fraction: 0.05,
            min_probe: 64 << 10,
            plain_text: false,
        }
    }
}

impl CompressConfig {
    fn leaf(&self, preset: CoderPreset) -> Result<CodecDescriptor> {
        let descriptor = match preset {
            CoderPreset::Stored => CodecDescriptor::Stored,
            CoderPreset::Zstd => CodecDescriptor::leaf(LeafCoder::zstd(self.level))?,
            CoderPreset::Lzma => CodecDescriptor::leaf(LeafCoder::lzma(self.level))?,
            CoderPreset::Range => CodecDescriptor::leaf(LeafCoder::Range)?,
            CoderPreset::Context => CodecDescriptor::leaf(LeafCoder::ContextModel { order: self.context_order })?,
            CoderPreset::Entropy => CodecDescriptor::leaf(LeafCoder::Entropy)?,
            CoderPreset::Nucleotide => CodecDescriptor::leaf(LeafCoder::Nucleotide)?,
            CoderPreset::NucleotideZstd => CodecDescriptor::compound(
                LeafCoder::Nucleotide.into(),
                CodecDescriptor::leaf(LeafCoder::zstd(self.level.clamp(1, 22)))?,
            )?,
            CoderPreset::Auto => anyhow::bail!("auto is not a single coder"),
        };
        if self.blocks > 1 && preset != CoderPreset::Stored {
            return CodecDescriptor::parallel_blocks(descriptor, self.blocks, self.min_block_len, self.block_alignment);
        }
        Ok(descriptor)
    }

    /// Descriptor tree for one chunk. Each chunk gets its own tree so selector
    /// decisions are made per chunk.
    pub fn descriptor(&self) -> Result<CodecDescriptor> {
        match self.preset {
            CoderPreset::Auto => {
                // Tie-break priority: cheapest to decode first
                let candidates = [
                    CoderPreset::NucleotideZstd,
                    CoderPreset::Zstd,
                    CoderPreset::Context,
                ]
                .into_iter()
                .map(|p| {
                    // Level is interpreted per coder; keep it in range for zstd
                    let cfg = CompressConfig { level: self.level.clamp(1, 22), ..self.clone() };
                    cfg.leaf(p)
                })
                .collect::<Result<Vec<_>>>()?;
                CodecDescriptor::cascade(candidates, self.probe_fraction, self.min_probe)
            }
            preset => self.leaf(preset),
        }
    }
}

#[derive(Clone)]
pub struct DecompressConfig {
    /// Input PG archive
    pub input: PathBuf,
    /// Output file
    pub output: PathBuf,
    /// Number of threads (0 = auto-detect)
    pub num_threads: usize,
}

impl Default for DecompressConfig {
    fn default() -> Self {
        Self { input: PathBuf::new(), output: PathBuf::new(), num_threads: 0 }
    }
}

pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
}
