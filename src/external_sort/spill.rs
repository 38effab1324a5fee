//! Spilling batch tables to sorted run files.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use log::debug;

use crate::error::{Result, ShardexError};
use crate::parallel_index::batch_processor::BatchTable;

/// A closed, sorted run on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFile {
    /// Location of the run.
    pub path: PathBuf,

    /// Batch the run was built from; orders runs for the merge.
    pub batch_index: usize,

    /// Number of postings in the run.
    pub record_count: u64,

    /// Size of the run file.
    pub byte_size: u64,
}

impl RunFile {
    /// Delete the run file.
    pub fn remove(&self) -> Result<()> {
        fs::remove_file(&self.path).map_err(|e| {
            ShardexError::merge(format!(
                "failed to delete run {}: {e}",
                self.path.display()
            ))
        })
    }
}

/// Writes batch tables as sorted runs into one directory.
#[derive(Debug, Clone)]
pub struct RunSpiller {
    dir: PathBuf,
}

impl RunSpiller {
    /// Create a spiller writing into `dir`, which must exist.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        RunSpiller { dir: dir.into() }
    }

    /// Path of the run for `batch_index`.
    pub fn run_path(&self, batch_index: usize) -> PathBuf {
        self.dir.join(format!("run_{batch_index:06}.tsv"))
    }

    /// Sort the table's postings by (term, doc_id) and write them to a new
    /// run file. The file is flushed and closed before this returns.
    pub fn spill(&self, table: BatchTable) -> Result<RunFile> {
        let batch_index = table.batch_index;
        let path = self.run_path(batch_index);

        let mut postings = table.into_postings();
        postings.sort_by(|a, b| a.key.cmp(&b.key));

        let spill_err =
            |e: std::io::Error| ShardexError::spill(format!("{}: {e}", path.display()));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(spill_err)?;
        let mut writer = BufWriter::new(file);

        let mut byte_size = 0;
        for posting in &postings {
            byte_size += posting.write_record(&mut writer).map_err(spill_err)?;
        }

        let file: File = writer
            .into_inner()
            .map_err(|e| spill_err(e.into_error()))?;
        drop(file);

        debug!(
            "Spilled batch {batch_index} ({} postings, {byte_size} bytes) to {}",
            postings.len(),
            path.display()
        );

        Ok(RunFile {
            path,
            batch_index,
            record_count: postings.len() as u64,
            byte_size,
        })
    }
}
