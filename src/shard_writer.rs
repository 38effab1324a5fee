//! Size-bounded shard output.
//!
//! The merged posting stream is cut into shard files named
//! `{basename}_{index:03}.tsv`. A shard is closed right after the record that
//! brings it to (or past) the size threshold, so a record is never split and
//! every shard but the last holds at least `threshold` bytes. The next shard
//! is only created when another record arrives; shard 0 always exists, even
//! for an empty index.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShardexError};
use crate::posting::Posting;

/// Description of one written shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    /// Sequential shard number, from 0.
    pub index: usize,

    /// File name inside the output directory.
    pub file_name: String,

    /// Number of postings in the shard.
    pub record_count: u64,

    /// Size of the shard in bytes.
    pub byte_size: u64,
}

/// Totals returned once all records are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardWriterResult {
    /// Number of postings written across all shards.
    pub record_count: u64,

    /// Number of shard files produced.
    pub shard_count: usize,

    /// Every shard, in order.
    pub shards: Vec<ShardInfo>,
}

/// File name of shard `index`.
pub fn shard_file_name(basename: &str, index: usize) -> String {
    format!("{basename}_{index:03}.tsv")
}

/// Parse a shard file name back into its index.
pub fn parse_shard_index(basename: &str, file_name: &str) -> Option<usize> {
    let digits = file_name
        .strip_prefix(basename)?
        .strip_prefix('_')?
        .strip_suffix(".tsv")?;
    if digits.len() < 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// List the shard files of `basename` in `dir`, ordered by shard index.
pub fn list_shards(dir: &Path, basename: &str) -> Result<Vec<(usize, PathBuf)>> {
    let mut shards = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(index) = parse_shard_index(basename, file_name) {
            shards.push((index, entry.path()));
        }
    }
    shards.sort_by_key(|(index, _)| *index);
    Ok(shards)
}

/// Remove shards of `basename` left in `dir` by an earlier build.
pub fn remove_existing_shards(dir: &Path, basename: &str) -> Result<usize> {
    let shards = list_shards(dir, basename)?;
    for (_, path) in &shards {
        fs::remove_file(path).map_err(|e| {
            ShardexError::shard(format!("cannot remove stale shard {}: {e}", path.display()))
        })?;
    }
    Ok(shards.len())
}

struct OpenShard {
    writer: BufWriter<File>,
    info: ShardInfo,
}

/// Writes a sorted posting stream into size-bounded shards.
pub struct ShardWriter {
    dir: PathBuf,
    basename: String,
    threshold: u64,
    current: Option<OpenShard>,
    closed: Vec<ShardInfo>,
    record_count: u64,
}

impl ShardWriter {
    /// Create a writer and open shard 0 in `dir`.
    pub fn new<P: Into<PathBuf>>(dir: P, basename: &str, threshold: u64) -> Result<Self> {
        let mut writer = ShardWriter {
            dir: dir.into(),
            basename: basename.to_string(),
            threshold: threshold.max(1),
            current: None,
            closed: Vec::new(),
            record_count: 0,
        };
        writer.open_next()?;
        Ok(writer)
    }

    fn open_next(&mut self) -> Result<()> {
        let index = self.closed.len();
        let file_name = shard_file_name(&self.basename, index);
        let path = self.dir.join(&file_name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| ShardexError::shard(format!("cannot create {}: {e}", path.display())))?;

        self.current = Some(OpenShard {
            writer: BufWriter::new(file),
            info: ShardInfo {
                index,
                file_name,
                record_count: 0,
                byte_size: 0,
            },
        });
        Ok(())
    }

    fn close_current(&mut self) -> Result<()> {
        let Some(OpenShard { writer, info }) = self.current.take() else {
            return Ok(());
        };
        let file_name = info.file_name.clone();
        // Record the shard before flushing so abort() still removes it.
        self.closed.push(info);
        writer
            .into_inner()
            .map_err(|e| ShardexError::shard(format!("cannot flush {file_name}: {}", e.error())))?;
        debug!("Closed shard {file_name}");
        Ok(())
    }

    /// Append one posting, rolling over to a new shard once the threshold
    /// is reached.
    pub fn write(&mut self, posting: &Posting) -> Result<()> {
        if self.current.is_none() {
            self.open_next()?;
        }
        let Some(shard) = self.current.as_mut() else {
            return Err(ShardexError::shard("no open shard"));
        };

        let written = posting.write_record(&mut shard.writer).map_err(|e| {
            ShardexError::shard(format!("cannot write to {}: {e}", shard.info.file_name))
        })?;
        shard.info.byte_size += written;
        shard.info.record_count += 1;
        self.record_count += 1;

        if shard.info.byte_size >= self.threshold {
            self.close_current()?;
        }
        Ok(())
    }

    /// Close the last shard and return the totals.
    pub fn finish(mut self) -> Result<ShardWriterResult> {
        self.close_current()?;
        let shards = std::mem::take(&mut self.closed);
        Ok(ShardWriterResult {
            record_count: self.record_count,
            shard_count: shards.len(),
            shards,
        })
    }

    /// Delete every shard this writer created.
    pub fn abort(mut self) {
        if let Some(shard) = self.current.take() {
            drop(shard.writer);
            self.closed.push(shard.info);
        }
        remove_shard_files(&self.dir, &self.closed);
    }

    /// Write every posting of `postings`, then finish. On any error, from
    /// the stream or from writing, all shards written so far are removed.
    pub fn write_all<I>(mut self, postings: I) -> Result<ShardWriterResult>
    where
        I: IntoIterator<Item = Result<Posting>>,
    {
        for posting in postings {
            let written = posting.and_then(|posting| self.write(&posting));
            if let Err(e) = written {
                self.abort();
                return Err(e);
            }
        }

        let dir = self.dir.clone();
        let partial = self.closed.clone();
        let current = self.current.as_ref().map(|shard| shard.info.clone());
        self.finish().inspect_err(|_| {
            remove_shard_files(&dir, partial.iter().chain(current.iter()));
        })
    }
}

/// Best-effort removal of shard files, used on failed builds.
pub fn remove_shard_files<'a, I>(dir: &Path, shards: I)
where
    I: IntoIterator<Item = &'a ShardInfo>,
{
    for shard in shards {
        let path = dir.join(&shard.file_name);
        if let Err(e) = fs::remove_file(&path) {
            warn!("Failed to remove shard {}: {e}", path.display());
        }
    }
}
