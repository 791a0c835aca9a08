use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use pgc_lib::cli::{CoderPreset, CompressConfig, DecompressConfig};

#[derive(Parser)]
#[command(name = "pgc")]
#[command(author = "PGC Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Block compression for pseudogenome read streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a PG archive
    Compress(CompressArgs),
    /// Decompress a PG archive
    Decompress(DecompressArgs),
}

/// Coder applied to every chunk
#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum CliCoder {
    /// No compression
    Stored,
    /// zstd (level 1-22)
    Zstd,
    /// LZMA/xz (preset 0-9)
    Lzma,
    /// Order-0 adaptive range coder
    Range,
    /// Order-k context model
    Context,
    /// Static order-0 ANS
    Entropy,
    /// 2-bit nucleotide packing
    Nucleotide,
    /// 2-bit packing, then zstd
    NucleotideZstd,
    /// Probe each chunk and keep the smallest coder
    Auto,
}

#[derive(Parser)]
struct CompressArgs {
    /// Input file
    #[arg(short, long, value_name = "FILE", required = true)]
    input: PathBuf,

    /// Output PG archive file
    #[arg(short, long, value_name = "FILE", required = true)]
    output: PathBuf,

    /// Number of threads (0 = auto-detect)
    #[arg(short = 't', long, default_value = "0")]
    threads: usize,

    /// Coder
    #[arg(short, long, value_enum, default_value = "zstd")]
    coder: CliCoder,

    /// zstd level (1-22) or LZMA preset (0-9)
    #[arg(short, long, default_value = "3")]
    level: i32,

    /// Context-model order (1-4)
    #[arg(long, default_value = "2")]
    order: u8,

    /// Parallel blocks per chunk (1 = no splitting)
    #[arg(long, default_value = "1")]
    blocks: usize,

    /// Chunk size in bytes
    #[arg(long, default_value_t = 8 << 20)]
    chunk_size: usize,

    /// Write stored blocks only (debugging)
    #[arg(long)]
    plain_text: bool,
}

#[derive(Parser)]
struct DecompressArgs {
    /// Input PG archive
    #[arg(short, long, value_name = "FILE", required = true)]
    input: PathBuf,

    /// Output file
    #[arg(short, long, value_name = "FILE", required = true)]
    output: PathBuf,

    /// Number of threads
    #[arg(short = 't', long, default_value_t = pgc_lib::cli::num_cpus())]
    threads: usize,
}

impl CompressArgs {
    fn into_config(self) -> CompressConfig {
        let preset = match self.coder {
            CliCoder::Stored => CoderPreset::Stored,
            CliCoder::Zstd => CoderPreset::Zstd,
            CliCoder::Lzma => CoderPreset::Lzma,
            CliCoder::Range => CoderPreset::Range,
            CliCoder::Context => CoderPreset::Context,
            CliCoder::Entropy => CoderPreset::Entropy,
            CliCoder::Nucleotide => CoderPreset::Nucleotide,
            CliCoder::NucleotideZstd => CoderPreset::NucleotideZstd,
            CliCoder::Auto => CoderPreset::Auto,
        };
        CompressConfig {
            input: self.input,
            output: self.output,
            threads: self.threads,
            preset,
            level: self.level,
            context_order: self.order,
            blocks: self.blocks,
            chunk_size: self.chunk_size,
            plain_text: self.plain_text,
            ..CompressConfig::default()
        }
    }
}

impl DecompressArgs {
    fn into_config(self) -> DecompressConfig {
        DecompressConfig {
            input: self.input,
            output: self.output,
            num_threads: self.threads,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compress(args) => {
            info!("Starting compression...");
            let config = args.into_config();
            pgc_lib::compression::compress_file(&config)?;
            info!("Compression complete!");
        }
        Commands::Decompress(args) => {
            info!("Starting decompression...");
            let config = args.into_config();
            pgc_lib::compression::decompress_file(&config)?;
            info!("Decompression complete!");
        }
    }

    Ok(())
}
