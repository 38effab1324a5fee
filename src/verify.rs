//! Consistency checks for a built index.
//!
//! Verification re-reads every shard in order and checks that the records
//! parse, that (term, doc_id) keys are strictly increasing across all shards,
//! and that the totals agree with `summary.json` when one is present.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShardexError};
use crate::posting::{Posting, RecordReader};
use crate::shard_writer::list_shards;
use crate::summary::IndexSummary;

/// Totals found by [`verify_index`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub shard_count: usize,
    pub record_count: u64,
    pub term_count: u64,
}

/// Verify the shards of `basename` in `dir`.
pub fn verify_index(dir: &Path, basename: &str) -> Result<VerifyReport> {
    let shards = list_shards(dir, basename)
        .map_err(|e| ShardexError::index(format!("cannot list {}: {e}", dir.display())))?;
    if shards.is_empty() {
        return Err(ShardexError::index(format!(
            "no shards named {basename}_NNN.tsv in {}",
            dir.display()
        )));
    }

    let mut report = VerifyReport {
        shard_count: shards.len(),
        record_count: 0,
        term_count: 0,
    };
    let mut previous: Option<Posting> = None;

    for (expected, (index, path)) in shards.iter().enumerate() {
        if *index != expected {
            return Err(ShardexError::index(format!(
                "shard {expected} is missing (found {} next)",
                path.display()
            )));
        }

        let shard_name = path.display();
        let file = File::open(path)
            .map_err(|e| ShardexError::index(format!("cannot open {shard_name}: {e}")))?;
        let mut reader = RecordReader::new(BufReader::new(file));
        let mut shard_records = 0_u64;

        loop {
            let posting = reader.read_posting().map_err(|e| {
                ShardexError::index(format!("{shard_name} line {}: {e}", reader.line_number()))
            })?;
            let Some(posting) = posting else {
                break;
            };

            if let Some(previous) = &previous {
                if posting.key <= previous.key {
                    return Err(ShardexError::index(format!(
                        "{shard_name} line {}: {posting} is not after {previous}",
                        reader.line_number()
                    )));
                }
            }
            if previous.as_ref().is_none_or(|p| p.term() != posting.term()) {
                report.term_count += 1;
            }

            shard_records += 1;
            previous = Some(posting);
        }

        debug!("{shard_name}: {shard_records} records");
        report.record_count += shard_records;
    }

    if let Some(summary) = IndexSummary::load(dir)? {
        if summary.posting_count != report.record_count {
            return Err(ShardexError::index(format!(
                "summary lists {} postings but the shards hold {}",
                summary.posting_count, report.record_count
            )));
        }
        if summary.shard_count != report.shard_count {
            return Err(ShardexError::index(format!(
                "summary lists {} shards but {} were found",
                summary.shard_count, report.shard_count
            )));
        }
    }

    info!(
        "Verified {} shards, {} postings, {} terms",
        report.shard_count, report.record_count, report.term_count
    );
    Ok(report)
}
