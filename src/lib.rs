//! # Shardex
//!
//! Builds an inverted index of a large plain-text corpus as a set of sorted,
//! size-bounded shard files.
//!
//! ## Pipeline
//!
//! - The input is cut into documents of `lines_per_doc` lines and grouped
//!   into batches.
//! - A rayon pool tokenizes each batch into a term table and spills it as a
//!   sorted run.
//! - Once every run is on disk, a k-way merge streams the postings in global
//!   (term, doc_id) order into `{basename}_{NNN}.tsv` shards.
//! - A summary is written next to the shards.
//!
//! ```no_run
//! use shardex::parallel_index::config::IndexConfig;
//! use shardex::parallel_index::engine::ParallelIndexEngine;
//!
//! let engine = ParallelIndexEngine::new(IndexConfig::default().with_lines_per_doc(5))?;
//! let outcome = engine.build("corpus.txt", "index")?;
//! println!("{} postings", outcome.summary.posting_count);
//! # Ok::<(), shardex::error::ShardexError>(())
//! ```

pub mod analysis;
pub mod cli;
pub mod document;
pub mod error;
pub mod external_sort;
pub mod parallel_index;
pub mod posting;
pub mod shard_writer;
pub mod summary;
pub mod verify;

pub mod prelude {
    pub use crate::error::{Result, ShardexError};
    pub use crate::parallel_index::config::IndexConfig;
    pub use crate::parallel_index::engine::{BuildOutcome, ParallelIndexEngine};
    pub use crate::posting::Posting;
    pub use crate::summary::IndexSummary;
    pub use crate::verify::{VerifyReport, verify_index};
}
