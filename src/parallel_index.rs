//! Parallel map phase and build orchestration.
//!
//! The segmenter feeds batches to a bounded rayon pool; each worker builds
//! its own batch table and spills it as a sorted run. Once every run is
//! closed the engine merges them into shards and writes the summary.

pub mod batch_processor;
pub mod config;
pub mod engine;
