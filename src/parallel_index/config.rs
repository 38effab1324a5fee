//! Configuration for index builds.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::tokenizer::RegexTokenizer;
use crate::error::{Result, ShardexError};

/// Default number of lines grouped into one document.
pub const DEFAULT_LINES_PER_DOC: usize = 10;

/// Default number of documents per map batch.
pub const DEFAULT_BATCH_DOCS: usize = 50_000;

/// Default shard size threshold (256 MiB).
pub const DEFAULT_SHARD_SIZE_BYTES: u64 = 256 * 1024 * 1024;

/// Default shard file basename.
pub const DEFAULT_SHARD_BASENAME: &str = "index";

/// User-facing configuration for an index build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Number of contiguous lines per document.
    pub lines_per_doc: usize,

    /// Number of documents per map batch. Bounds the memory of one worker.
    pub batch_docs: usize,

    /// Number of concurrent map workers.
    /// If None or 0, uses the number of CPU cores.
    pub concurrency: Option<usize>,

    /// Soft size bound for each shard, in bytes.
    pub shard_size_bytes: u64,

    /// Shard files are named `{shard_basename}_{index:03}.tsv`.
    pub shard_basename: String,

    /// Custom token regex. If None, the default word tokenizer is used.
    pub token_pattern: Option<String>,

    /// Parent directory for the temporary run directory.
    /// If None, runs are spilled under the output directory.
    pub run_directory: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            lines_per_doc: DEFAULT_LINES_PER_DOC,
            batch_docs: DEFAULT_BATCH_DOCS,
            concurrency: None,
            shard_size_bytes: DEFAULT_SHARD_SIZE_BYTES,
            shard_basename: DEFAULT_SHARD_BASENAME.to_string(),
            token_pattern: None,
            run_directory: None,
        }
    }
}

impl IndexConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file. Missing keys take their
    /// default values.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ShardexError::invalid_config(format!(
                "cannot read config file {}: {e}",
                path.display()
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Set the number of lines per document.
    pub fn with_lines_per_doc(mut self, lines_per_doc: usize) -> Self {
        self.lines_per_doc = lines_per_doc;
        self
    }

    /// Set the number of documents per batch.
    pub fn with_batch_docs(mut self, batch_docs: usize) -> Self {
        self.batch_docs = batch_docs;
        self
    }

    /// Set the worker count. 0 selects the number of CPU cores.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Set the shard size threshold in bytes.
    pub fn with_shard_size_bytes(mut self, shard_size_bytes: u64) -> Self {
        self.shard_size_bytes = shard_size_bytes;
        self
    }

    /// Set the shard file basename.
    pub fn with_shard_basename<S: Into<String>>(mut self, basename: S) -> Self {
        self.shard_basename = basename.into();
        self
    }

    /// Use a custom token regex.
    pub fn with_token_pattern<S: Into<String>>(mut self, pattern: S) -> Self {
        self.token_pattern = Some(pattern.into());
        self
    }

    /// Spill runs under `dir` instead of the output directory.
    pub fn with_run_directory<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.run_directory = Some(dir.into());
        self
    }

    /// Validate the configuration and resolve automatic values.
    ///
    /// This is the only place the "0 = auto" concurrency convention is
    /// interpreted.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        if self.lines_per_doc == 0 {
            return Err(ShardexError::invalid_config(
                "lines_per_doc must be at least 1",
            ));
        }
        if self.batch_docs == 0 {
            return Err(ShardexError::invalid_config("batch_docs must be at least 1"));
        }
        if self.shard_size_bytes == 0 {
            return Err(ShardexError::invalid_config(
                "shard_size_bytes must be at least 1",
            ));
        }
        validate_basename(&self.shard_basename)?;
        if let Some(pattern) = &self.token_pattern {
            RegexTokenizer::with_pattern(pattern)?;
        }

        let concurrency = match self.concurrency {
            Some(n) if n > 0 => n,
            _ => num_cpus::get().max(1),
        };

        Ok(ResolvedConfig {
            lines_per_doc: self.lines_per_doc,
            batch_docs: self.batch_docs,
            concurrency,
            shard_size_bytes: self.shard_size_bytes,
            shard_basename: self.shard_basename.clone(),
            token_pattern: self.token_pattern.clone(),
            run_directory: self.run_directory.clone(),
        })
    }
}

fn validate_basename(basename: &str) -> Result<()> {
    if basename.is_empty() {
        return Err(ShardexError::invalid_config("shard basename must not be empty"));
    }
    if basename.contains(['/', '\\']) || basename == "." || basename == ".." {
        return Err(ShardexError::invalid_config(format!(
            "shard basename {basename:?} must be a plain file name"
        )));
    }
    Ok(())
}

/// A validated configuration with every automatic value made concrete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub lines_per_doc: usize,
    pub batch_docs: usize,
    pub concurrency: usize,
    pub shard_size_bytes: u64,
    pub shard_basename: String,
    pub token_pattern: Option<String>,
    pub run_directory: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Maximum number of batches dispatched but not yet spilled.
    pub fn max_batches_in_flight(&self) -> usize {
        self.concurrency * 2
    }
}
