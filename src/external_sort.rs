//! Bounded-memory external sort: sorted runs on disk and their k-way merge.

pub mod merge_engine;
pub mod spill;

pub use merge_engine::{MergeEngine, MergeStats};
pub use spill::{RunFile, RunSpiller};
