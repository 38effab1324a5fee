//! K-way merge of sorted runs.
//!
//! Every run is opened as a forward-only cursor. The cursors live in an arena
//! (`Vec<RunCursor>`) and the priority queue stores only the head key of each
//! open run together with its arena index, so the heap never owns a reader.
//! Popping the smallest entry yields the next posting of the global order;
//! the owning cursor is then advanced and its new head pushed back.
//!
//! Runs come from batches with disjoint doc_id ranges, so two runs never hold
//! the same (term, doc_id). If they do, both postings are emitted in run order
//! and the anomaly is counted in [`MergeStats::duplicate_keys`].

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::BufReader;

use log::{debug, warn};

use crate::error::{Result, ShardexError};
use crate::external_sort::spill::RunFile;
use crate::posting::{Posting, PostingKey, RecordReader};

/// Read buffer per open run.
const RUN_READ_BUFFER: usize = 64 * 1024;

/// Statistics about a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Number of runs merged.
    pub runs_merged: usize,

    /// Number of postings emitted.
    pub records_merged: u64,

    /// Number of distinct terms emitted.
    pub distinct_terms: u64,

    /// Number of (term, doc_id) keys emitted more than once.
    pub duplicate_keys: u64,
}

/// One open run: its reader plus the part of its head record the heap does
/// not hold.
struct RunCursor {
    run: RunFile,
    reader: RecordReader<BufReader<File>>,
    head_frequency: u64,
}

impl RunCursor {
    fn open(run: RunFile) -> Result<Self> {
        let file = File::open(&run.path).map_err(|e| {
            ShardexError::merge(format!("cannot open run {}: {e}", run.path.display()))
        })?;
        Ok(RunCursor {
            run,
            reader: RecordReader::new(BufReader::with_capacity(RUN_READ_BUFFER, file)),
            head_frequency: 0,
        })
    }

    /// Read the next record, keeping its frequency and returning its key.
    fn advance(&mut self) -> Result<Option<PostingKey>> {
        let posting = self.reader.read_posting().map_err(|e| {
            ShardexError::merge(format!(
                "{} line {}: {e}",
                self.run.path.display(),
                self.reader.line_number()
            ))
        })?;

        Ok(posting.map(|posting| {
            self.head_frequency = posting.term_frequency;
            posting.key
        }))
    }
}

/// Heap entry: the head key of one run and the run's arena index.
#[derive(Debug, PartialEq, Eq)]
struct HeadEntry {
    key: PostingKey,
    run_index: usize,
}

impl Ord for HeadEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the smallest (key, run_index).
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.run_index.cmp(&self.run_index))
    }
}

impl PartialOrd for HeadEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Streams the postings of several sorted runs in global (term, doc_id)
/// order.
///
/// Each run file is deleted as soon as its cursor is exhausted. After an
/// error the iterator yields nothing further.
pub struct MergeEngine {
    cursors: Vec<RunCursor>,
    heap: BinaryHeap<HeadEntry>,
    stats: MergeStats,
    last_term: Option<String>,
    failed: bool,
}

impl MergeEngine {
    /// Open every run and load its first record.
    ///
    /// Runs are ordered by batch index first, which fixes the tie-break
    /// order no matter in which order the map workers finished.
    pub fn open(mut runs: Vec<RunFile>) -> Result<Self> {
        runs.sort_by_key(|run| run.batch_index);

        let mut engine = MergeEngine {
            cursors: Vec::with_capacity(runs.len()),
            heap: BinaryHeap::with_capacity(runs.len()),
            stats: MergeStats {
                runs_merged: runs.len(),
                ..Default::default()
            },
            last_term: None,
            failed: false,
        };

        for run in runs {
            let run_index = engine.cursors.len();
            engine.cursors.push(RunCursor::open(run)?);
            engine.refill(run_index, None)?;
        }

        debug!(
            "Merging {} runs ({} non-empty)",
            engine.cursors.len(),
            engine.heap.len()
        );
        Ok(engine)
    }

    /// Statistics so far; final once the iterator is exhausted.
    pub fn stats(&self) -> &MergeStats {
        &self.stats
    }

    /// Advance cursor `run_index` and push its new head, or delete the run if
    /// it is exhausted. `previous` is the key just taken from this run; the
    /// new head must be strictly greater.
    fn refill(&mut self, run_index: usize, previous: Option<&PostingKey>) -> Result<()> {
        let cursor = &mut self.cursors[run_index];
        match cursor.advance()? {
            Some(key) => {
                if let Some(previous) = previous {
                    if key <= *previous {
                        return Err(ShardexError::merge(format!(
                            "run {} is not sorted: ({}, {}) follows ({}, {})",
                            cursor.run.path.display(),
                            key.term,
                            key.doc_id,
                            previous.term,
                            previous.doc_id
                        )));
                    }
                }
                self.heap.push(HeadEntry { key, run_index });
            }
            None => {
                cursor.run.remove()?;
                debug!("Run {} exhausted", cursor.run.path.display());
            }
        }
        Ok(())
    }

    fn next_posting(&mut self) -> Result<Option<Posting>> {
        let Some(HeadEntry { key, run_index }) = self.heap.pop() else {
            return Ok(None);
        };
        let term_frequency = self.cursors[run_index].head_frequency;

        self.refill(run_index, Some(&key))?;

        if self.heap.peek().is_some_and(|next| next.key == key) {
            self.stats.duplicate_keys += 1;
            warn!(
                "Key ({}, {}) appears in more than one run; emitting each occurrence",
                key.term, key.doc_id
            );
        }

        if self.last_term.as_deref() != Some(key.term.as_str()) {
            self.stats.distinct_terms += 1;
            let last = self.last_term.get_or_insert_with(String::new);
            last.clear();
            last.push_str(&key.term);
        }

        self.stats.records_merged += 1;
        Ok(Some(Posting::from_key(key, term_frequency)))
    }
}

impl Iterator for MergeEngine {
    type Item = Result<Posting>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_posting() {
            Ok(posting) => posting.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
