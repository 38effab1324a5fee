//! Main index build engine.

use std::any::Any;
use std::fs::{self, File};
use std::io::BufReader;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tempfile::TempDir;

use crate::analysis::tokenizer::{Tokenizer, tokenizer_for};
use crate::document::{DocumentBatch, DocumentSegmenter};
use crate::error::{Result, ShardexError};
use crate::external_sort::{MergeEngine, MergeStats, RunFile, RunSpiller};
use crate::parallel_index::batch_processor::BatchTable;
use crate::parallel_index::config::{IndexConfig, ResolvedConfig};
use crate::shard_writer::{self, ShardWriter, ShardWriterResult};
use crate::summary::IndexSummary;

/// Read buffer for the source corpus.
const INPUT_READ_BUFFER: usize = 1024 * 1024;

/// Result of a successful build.
#[derive(Debug)]
pub struct BuildOutcome {
    /// Counts and timings of the build.
    pub summary: IndexSummary,

    /// Set if the summary report could not be written. The index itself is
    /// complete and valid.
    pub report_warning: Option<ShardexError>,
}

/// What the map phase hands to the merge phase.
#[derive(Debug)]
struct MapPhaseResult {
    runs: Vec<RunFile>,
    document_count: u64,
    elapsed: Duration,
}

/// Builds a sharded inverted index from one text corpus.
///
/// Batches are cut on the calling thread and processed on a dedicated rayon
/// pool. Each worker owns its batch and its table outright and reports back
/// through a channel; no map state is shared between workers.
pub struct ParallelIndexEngine {
    /// Resolved configuration.
    config: ResolvedConfig,

    /// Tokenizer shared by every worker.
    tokenizer: Arc<dyn Tokenizer>,

    /// Thread pool for the map phase.
    thread_pool: ThreadPool,
}

impl ParallelIndexEngine {
    /// Create a new engine. The configuration is resolved and validated here.
    pub fn new(config: IndexConfig) -> Result<Self> {
        let config = config.resolve()?;
        let tokenizer = tokenizer_for(config.token_pattern.as_deref())?;

        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(config.concurrency)
            .thread_name(|i| format!("shardex-map-{i}"))
            .build()
            .map_err(|e| ShardexError::worker(format!("Failed to create thread pool: {e}")))?;

        Ok(Self {
            config,
            tokenizer,
            thread_pool,
        })
    }

    /// The resolved configuration.
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Build the index for `input` into `output_dir`.
    ///
    /// On failure every run file and every shard written by this build is
    /// removed and the first root-cause error is returned.
    pub fn build<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output_dir: Q,
    ) -> Result<BuildOutcome> {
        let started = Instant::now();
        let input = input.as_ref();
        let output_dir = output_dir.as_ref();

        let reader = open_input(input)?;
        fs::create_dir_all(output_dir)?;
        let removed = shard_writer::remove_existing_shards(output_dir, &self.config.shard_basename)?;
        if removed > 0 {
            info!("Removed {removed} shards left by a previous build");
        }
        // A summary must never describe shards that are gone.
        IndexSummary::remove_report(output_dir)?;

        let run_parent = self.config.run_directory.as_deref().unwrap_or(output_dir);
        fs::create_dir_all(run_parent)?;
        let run_dir = tempfile::Builder::new()
            .prefix(".shardex-runs-")
            .tempdir_in(run_parent)?;
        debug!("Spilling runs to {}", run_dir.path().display());

        info!(
            "Indexing {} ({} lines/doc, {} docs/batch, {} workers)",
            input.display(),
            self.config.lines_per_doc,
            self.config.batch_docs,
            self.config.concurrency
        );

        let map = match self.run_map_phase(reader, run_dir.path()) {
            Ok(map) => map,
            Err(e) => {
                discard_run_dir(run_dir);
                return Err(e);
            }
        };
        info!(
            "Map phase done: {} documents in {} runs ({:.2}s)",
            map.document_count,
            map.runs.len(),
            map.elapsed.as_secs_f64()
        );

        let merge_started = Instant::now();
        let run_count = map.runs.len();
        let (shards, merge_stats) = match self.run_merge_phase(map.runs, output_dir) {
            Ok(merged) => merged,
            Err(e) => {
                discard_run_dir(run_dir);
                return Err(e);
            }
        };

        if let Err(e) = run_dir.close() {
            shard_writer::remove_shard_files(output_dir, &shards.shards);
            return Err(ShardexError::merge(format!(
                "failed to remove run directory: {e}"
            )));
        }
        let merge_elapsed = merge_started.elapsed();
        info!(
            "Merge phase done: {} postings in {} shards ({:.2}s)",
            shards.record_count,
            shards.shard_count,
            merge_elapsed.as_secs_f64()
        );

        let summary = IndexSummary {
            input: input.to_path_buf(),
            output_directory: output_dir.to_path_buf(),
            document_count: map.document_count,
            posting_count: shards.record_count,
            shard_count: shards.shard_count,
            term_count: merge_stats.distinct_terms,
            run_count,
            duplicate_keys: merge_stats.duplicate_keys,
            lines_per_doc: self.config.lines_per_doc,
            batch_docs: self.config.batch_docs,
            concurrency: self.config.concurrency,
            elapsed_seconds: started.elapsed().as_secs_f64(),
            map_seconds: map.elapsed.as_secs_f64(),
            merge_seconds: merge_elapsed.as_secs_f64(),
            generated_at: Utc::now(),
            shards: shards.shards,
        };

        let report_warning = summary.write_report(output_dir).err();
        if let Some(warning) = &report_warning {
            warn!("Index built, but the summary was not written: {warning}");
        }

        Ok(BuildOutcome {
            summary,
            report_warning,
        })
    }

    /// Segment the input and run every batch through the pool.
    ///
    /// At most `2 * concurrency` batches are in flight; the segmenter blocks
    /// on the result channel beyond that, which bounds memory. Returns only
    /// after every dispatched worker has reported.
    fn run_map_phase(&self, reader: BufReader<File>, run_dir: &Path) -> Result<MapPhaseResult> {
        let started = Instant::now();
        let spiller = RunSpiller::new(run_dir);
        let cancel = Arc::new(AtomicBool::new(false));
        let (result_sender, result_receiver) = unbounded();

        let mut collector = RunCollector::new(Arc::clone(&cancel));
        let mut batches =
            DocumentSegmenter::new(reader, self.config.lines_per_doc).batches(self.config.batch_docs);

        for batch in batches.by_ref() {
            let batch = match batch {
                Ok(batch) => batch,
                Err(e) => {
                    collector.fail(e);
                    break;
                }
            };

            while collector.in_flight >= self.config.max_batches_in_flight() {
                collector.collect_one(&result_receiver);
            }
            if collector.has_failed() {
                break;
            }

            debug!(
                "Dispatching batch {} (documents {}..{})",
                batch.batch_index,
                batch.start_id,
                batch.end_id()
            );
            self.dispatch(batch, &spiller, &cancel, &result_sender);
            collector.in_flight += 1;
        }

        // Barrier: every dispatched batch must report before the merge.
        while collector.in_flight > 0 {
            collector.collect_one(&result_receiver);
        }

        let document_count = batches.documents_emitted();
        let runs = collector.finish()?;
        Ok(MapPhaseResult {
            runs,
            document_count,
            elapsed: started.elapsed(),
        })
    }

    /// Hand one batch to the pool. The worker builds the batch table, spills
    /// it and sends the run (or the failure) back.
    fn dispatch(
        &self,
        batch: DocumentBatch,
        spiller: &RunSpiller,
        cancel: &Arc<AtomicBool>,
        results: &Sender<Result<RunFile>>,
    ) {
        let tokenizer = Arc::clone(&self.tokenizer);
        let spiller = spiller.clone();
        let cancel = Arc::clone(cancel);
        let results = results.clone();

        self.thread_pool.spawn(move || {
            let batch_index = batch.batch_index;
            let result = if cancel.load(Ordering::Relaxed) {
                Err(ShardexError::cancelled(format!(
                    "batch {batch_index} skipped"
                )))
            } else {
                panic::catch_unwind(AssertUnwindSafe(|| {
                    let table = BatchTable::from_batch(&batch, tokenizer.as_ref(), &cancel)?;
                    debug!(
                        "Batch {batch_index}: {} documents, {} terms, {} postings in {:.3}s",
                        table.document_count,
                        table.term_count(),
                        table.posting_count(),
                        table.processing_time.as_secs_f64()
                    );
                    spiller.spill(table)
                }))
                .unwrap_or_else(|payload| {
                    Err(ShardexError::worker(format!(
                        "batch {batch_index} panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                })
            };

            if matches!(&result, Err(e) if !e.is_cancellation()) {
                cancel.store(true, Ordering::Relaxed);
            }
            // The receiver outlives every worker; a send can only fail if
            // the build itself was torn down.
            let _ = results.send(result);
        });
    }

    /// Merge all runs into shards. Shards are removed if anything fails.
    fn run_merge_phase(
        &self,
        runs: Vec<RunFile>,
        output_dir: &Path,
    ) -> Result<(ShardWriterResult, MergeStats)> {
        let writer = ShardWriter::new(
            output_dir,
            &self.config.shard_basename,
            self.config.shard_size_bytes,
        )?;

        let mut merge = match MergeEngine::open(runs) {
            Ok(merge) => merge,
            Err(e) => {
                writer.abort();
                return Err(e);
            }
        };

        let result = writer.write_all(merge.by_ref())?;
        Ok((result, merge.stats().clone()))
    }
}

/// Tracks in-flight workers and the first root-cause failure.
struct RunCollector {
    cancel: Arc<AtomicBool>,
    runs: Vec<RunFile>,
    in_flight: usize,
    error: Option<ShardexError>,
}

impl RunCollector {
    fn new(cancel: Arc<AtomicBool>) -> Self {
        Self {
            cancel,
            runs: Vec::new(),
            in_flight: 0,
            error: None,
        }
    }

    fn has_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Record a failure and cancel the remaining workers. A cancellation is
    /// only kept if no root cause was seen.
    fn fail(&mut self, error: ShardexError) {
        self.cancel.store(true, Ordering::Relaxed);
        let replace = match &self.error {
            None => true,
            Some(existing) => existing.is_cancellation() && !error.is_cancellation(),
        };
        if replace {
            self.error = Some(error);
        }
    }

    /// Block until one worker reports.
    fn collect_one(&mut self, receiver: &Receiver<Result<RunFile>>) {
        match receiver.recv() {
            Ok(Ok(run)) => self.runs.push(run),
            Ok(Err(e)) => self.fail(e),
            Err(e) => self.fail(ShardexError::worker(format!("worker channel closed: {e}"))),
        }
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn finish(self) -> Result<Vec<RunFile>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.runs),
        }
    }
}

fn open_input(input: &Path) -> Result<BufReader<File>> {
    let metadata = fs::metadata(input)
        .map_err(|e| ShardexError::input(format!("{}: {e}", input.display())))?;
    if metadata.is_dir() {
        return Err(ShardexError::input(format!(
            "{} is a directory",
            input.display()
        )));
    }
    let file = File::open(input)
        .map_err(|e| ShardexError::input(format!("{}: {e}", input.display())))?;
    Ok(BufReader::with_capacity(INPUT_READ_BUFFER, file))
}

/// Remove the run directory after a failed build.
fn discard_run_dir(run_dir: TempDir) {
    let path: PathBuf = run_dir.path().to_path_buf();
    if let Err(e) = run_dir.close() {
        warn!("Failed to remove run directory {}: {e}", path.display());
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
