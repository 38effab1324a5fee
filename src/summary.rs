//! Build summary report.
//!
//! After a successful build the summary is written next to the shards as
//! `summary.txt` (human readable) and `summary.json`. Writing it is purely
//! observational: failures surface as a [`ShardexError::Report`] warning and
//! never invalidate the index.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShardexError};
use crate::shard_writer::ShardInfo;

/// File name of the text report.
pub const SUMMARY_TEXT_FILE: &str = "summary.txt";

/// File name of the structured report.
pub const SUMMARY_JSON_FILE: &str = "summary.json";

/// Aggregate counts and timings of one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Source corpus.
    pub input: PathBuf,

    /// Directory holding the shards.
    pub output_directory: PathBuf,

    /// Number of documents, including ones without tokens.
    pub document_count: u64,

    /// Number of (term, doc_id, frequency) records.
    pub posting_count: u64,

    /// Number of shard files.
    pub shard_count: usize,

    /// Number of distinct terms.
    pub term_count: u64,

    /// Number of sorted runs spilled by the map phase.
    pub run_count: usize,

    /// Keys found in more than one run. Always 0 for a healthy build.
    pub duplicate_keys: u64,

    pub lines_per_doc: usize,
    pub batch_docs: usize,
    pub concurrency: usize,

    /// Wall-clock time of the whole build.
    pub elapsed_seconds: f64,

    /// Time spent segmenting, tokenizing and spilling.
    pub map_seconds: f64,

    /// Time spent merging and writing shards.
    pub merge_seconds: f64,

    pub generated_at: DateTime<Utc>,

    /// Every shard, in order.
    pub shards: Vec<ShardInfo>,
}

impl IndexSummary {
    /// Render the human-readable report.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "Inverted index in '{}'", self.output_directory.display());
        let _ = writeln!(text, "Input                : {}", self.input.display());
        let _ = writeln!(
            text,
            "Documents ({} lines) : {}",
            self.lines_per_doc,
            group_thousands(self.document_count)
        );
        let _ = writeln!(text, "Postings             : {}", group_thousands(self.posting_count));
        let _ = writeln!(text, "Terms                : {}", group_thousands(self.term_count));
        let _ = writeln!(text, "Shards               : {}", self.shard_count);
        let _ = writeln!(text, "Runs                 : {}", self.run_count);
        if self.duplicate_keys > 0 {
            let _ = writeln!(text, "Duplicate keys       : {}", self.duplicate_keys);
        }
        let _ = writeln!(text, "Map phase            : {:.2}s", self.map_seconds);
        let _ = writeln!(text, "Merge phase          : {:.2}s", self.merge_seconds);
        let _ = writeln!(text, "Total time           : {:.2}s", self.elapsed_seconds);
        let _ = writeln!(text, "Generated at         : {}", self.generated_at.to_rfc3339());
        text
    }

    /// Write `summary.txt` and `summary.json` into `dir`.
    pub fn write_report(&self, dir: &Path) -> Result<()> {
        let text_path = dir.join(SUMMARY_TEXT_FILE);
        fs::write(&text_path, self.to_text()).map_err(|e| {
            ShardexError::report(format!("cannot write {}: {e}", text_path.display()))
        })?;

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ShardexError::report(format!("cannot serialize summary: {e}")))?;
        let json_path = dir.join(SUMMARY_JSON_FILE);
        fs::write(&json_path, json).map_err(|e| {
            ShardexError::report(format!("cannot write {}: {e}", json_path.display()))
        })?;
        Ok(())
    }

    /// Remove the report files of an earlier build from `dir`.
    ///
    /// Only regular files are removed. Returns the number of files deleted.
    pub fn remove_report(dir: &Path) -> Result<usize> {
        let mut removed = 0;
        for name in [SUMMARY_TEXT_FILE, SUMMARY_JSON_FILE] {
            let path = dir.join(name);
            if path.is_file() {
                fs::remove_file(&path).map_err(|e| {
                    ShardexError::report(format!("cannot remove {}: {e}", path.display()))
                })?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Load `summary.json` from `dir`, if present.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(SUMMARY_JSON_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

/// Format a count with `,` thousands separators.
fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    fn summary(dir: &Path) -> IndexSummary {
        IndexSummary {
            input: PathBuf::from("corpus.txt"),
            output_directory: dir.to_path_buf(),
            document_count: 1_234_567,
            posting_count: 42,
            shard_count: 1,
            term_count: 7,
            run_count: 3,
            duplicate_keys: 0,
            lines_per_doc: 10,
            batch_docs: 50_000,
            concurrency: 4,
            elapsed_seconds: 1.5,
            map_seconds: 1.0,
            merge_seconds: 0.5,
            generated_at: Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap(),
            shards: vec![ShardInfo {
                index: 0,
                file_name: "index_000.tsv".to_string(),
                record_count: 42,
                byte_size: 420,
            }],
        }
    }

    #[test]
    fn test_text_report() {
        let temp_dir = TempDir::new().unwrap();
        let text = summary(temp_dir.path()).to_text();

        assert!(text.contains("Documents (10 lines) : 1,234,567"));
        assert!(text.contains("Postings             : 42"));
        assert!(text.contains("Shards               : 1"));
        assert!(text.contains("Total time           : 1.50s"));
        assert!(!text.contains("Duplicate keys"));
    }

    #[test]
    fn test_write_and_load_report() {
        let temp_dir = TempDir::new().unwrap();
        let summary = summary(temp_dir.path());
        summary.write_report(temp_dir.path()).unwrap();

        assert!(temp_dir.path().join(SUMMARY_TEXT_FILE).exists());
        let loaded = IndexSummary::load(temp_dir.path()).unwrap().unwrap();
        assert_eq!(loaded, summary);
    }

    #[test]
    fn test_report_into_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");
        let err = summary(&missing).write_report(&missing).unwrap_err();
        assert!(matches!(err, ShardexError::Report(_)));
    }

    #[test]
    fn test_remove_report() {
        let temp_dir = TempDir::new().unwrap();
        summary(temp_dir.path())
            .write_report(temp_dir.path())
            .unwrap();

        assert_eq!(IndexSummary::remove_report(temp_dir.path()).unwrap(), 2);
        assert!(!temp_dir.path().join(SUMMARY_TEXT_FILE).exists());
        assert!(IndexSummary::load(temp_dir.path()).unwrap().is_none());
        assert_eq!(IndexSummary::remove_report(temp_dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(50_000_000), "50,000,000");
    }
}
