//! Command line argument parsing for shardex using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShardexError};
use crate::parallel_index::config::{DEFAULT_SHARD_BASENAME, IndexConfig};

const MIB: u64 = 1024 * 1024;

/// Shardex - builds sharded inverted indexes from large text corpora
#[derive(Parser, Debug, Clone)]
#[command(name = "shardex")]
#[command(about = "Build a sharded inverted index from a large text corpus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct ShardexArgs {
    /// Increase log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl ShardexArgs {
    /// Effective verbosity: 0 quiet, 1 normal, 2 verbose, 3+ debug.
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose.saturating_add(1)
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build an index from a text file
    Build(BuildArgs),

    /// Check the shards of a built index
    Verify(VerifyArgs),
}

/// Arguments for building an index
#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    /// Text corpus to index
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Directory receiving the shards and the summary
    #[arg(short, long, value_name = "DIR")]
    pub outdir: PathBuf,

    /// Number of map workers (0 = number of CPU cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Number of lines per document
    #[arg(long)]
    pub lines_per_doc: Option<usize>,

    /// Number of documents per map batch
    #[arg(long)]
    pub batch_docs: Option<usize>,

    /// Shard size threshold in MiB
    #[arg(long, conflicts_with = "shard_bytes")]
    pub shard_mb: Option<u64>,

    /// Shard size threshold in bytes
    #[arg(long)]
    pub shard_bytes: Option<u64>,

    /// Shard file basename
    #[arg(long)]
    pub basename: Option<String>,

    /// Regex matching one token; matches are lowercased
    #[arg(long, value_name = "REGEX")]
    pub token_pattern: Option<String>,

    /// Parent directory for temporary runs (defaults to the output directory)
    #[arg(long, value_name = "DIR")]
    pub run_dir: Option<PathBuf>,

    /// JSON configuration file; flags given on the command line take precedence
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl BuildArgs {
    /// Merge the configuration file (if any) with the flags.
    pub fn to_config(&self) -> Result<IndexConfig> {
        let mut config = match &self.config {
            Some(path) => IndexConfig::from_json_file(path)?,
            None => IndexConfig::default(),
        };

        if let Some(threads) = self.threads {
            config.concurrency = Some(threads);
        }
        if let Some(lines_per_doc) = self.lines_per_doc {
            config.lines_per_doc = lines_per_doc;
        }
        if let Some(batch_docs) = self.batch_docs {
            config.batch_docs = batch_docs;
        }
        if let Some(shard_mb) = self.shard_mb {
            config.shard_size_bytes = shard_mb.checked_mul(MIB).ok_or_else(|| {
                ShardexError::invalid_config(format!("--shard-mb {shard_mb} is too large"))
            })?;
        }
        if let Some(shard_bytes) = self.shard_bytes {
            config.shard_size_bytes = shard_bytes;
        }
        if let Some(basename) = &self.basename {
            config.shard_basename = basename.clone();
        }
        if let Some(pattern) = &self.token_pattern {
            config.token_pattern = Some(pattern.clone());
        }
        if let Some(run_dir) = &self.run_dir {
            config.run_directory = Some(run_dir.clone());
        }

        Ok(config)
    }
}

/// Arguments for verifying an index
#[derive(Parser, Debug, Clone)]
pub struct VerifyArgs {
    /// Directory holding the shards
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Shard file basename
    #[arg(long, default_value = DEFAULT_SHARD_BASENAME)]
    pub basename: String,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}
