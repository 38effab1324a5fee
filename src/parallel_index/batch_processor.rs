//! Map-phase processing of one document batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ahash::AHashMap;

use crate::analysis::tokenizer::Tokenizer;
use crate::document::DocumentBatch;
use crate::error::{Result, ShardexError};
use crate::posting::Posting;

/// Per-batch inverted table: term -> [(doc_id, term_frequency)].
///
/// Documents are visited in ID order, so each term's list is strictly
/// increasing in doc_id by construction. A table is owned by exactly one
/// worker until it is handed to the spiller.
#[derive(Debug)]
pub struct BatchTable {
    /// Sequence number of the batch this table was built from.
    pub batch_index: usize,

    /// Number of documents in the batch, including ones without tokens.
    pub document_count: usize,

    /// Time spent tokenizing and counting.
    pub processing_time: Duration,

    postings: AHashMap<String, Vec<(u64, u64)>>,
    posting_count: usize,
}

impl BatchTable {
    /// Tokenize every document of `batch` and count per-document term
    /// frequencies.
    ///
    /// Documents yielding no tokens contribute nothing. The cancellation flag
    /// is checked between documents; once set, the table is abandoned with a
    /// `Cancelled` error.
    pub fn from_batch(
        batch: &DocumentBatch,
        tokenizer: &dyn Tokenizer,
        cancel: &AtomicBool,
    ) -> Result<Self> {
        let started = Instant::now();
        let mut postings: AHashMap<String, Vec<(u64, u64)>> = AHashMap::new();
        let mut doc_counts: AHashMap<String, u64> = AHashMap::with_capacity(256);
        let mut posting_count = 0;

        for document in &batch.documents {
            if cancel.load(Ordering::Relaxed) {
                return Err(ShardexError::cancelled(format!(
                    "batch {} abandoned at document {}",
                    batch.batch_index, document.id
                )));
            }

            for token in tokenizer.tokenize(&document.text) {
                *doc_counts.entry(token).or_insert(0) += 1;
            }

            posting_count += doc_counts.len();
            for (term, tf) in doc_counts.drain() {
                postings.entry(term).or_default().push((document.id, tf));
            }
        }

        Ok(BatchTable {
            batch_index: batch.batch_index,
            document_count: batch.len(),
            processing_time: started.elapsed(),
            postings,
            posting_count,
        })
    }

    /// Number of distinct terms in the batch.
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// Number of (term, doc_id) postings in the batch.
    pub fn posting_count(&self) -> usize {
        self.posting_count
    }

    /// Check if no document of the batch produced a token.
    pub fn is_empty(&self) -> bool {
        self.posting_count == 0
    }

    /// Frequency of `term` in document `doc_id`, if present.
    pub fn frequency(&self, term: &str, doc_id: u64) -> Option<u64> {
        let docs = self.postings.get(term)?;
        docs.binary_search_by_key(&doc_id, |&(id, _)| id)
            .ok()
            .map(|i| docs[i].1)
    }

    /// Flatten the table into unsorted postings, consuming it.
    pub fn into_postings(self) -> Vec<Posting> {
        let mut flat = Vec::with_capacity(self.posting_count);
        for (term, docs) in self.postings {
            let last = docs.len().saturating_sub(1);
            for (i, (doc_id, tf)) in docs.into_iter().enumerate() {
                // The final document of a term takes the owned string.
                if i == last {
                    flat.push(Posting::new(term, doc_id, tf));
                    break;
                }
                flat.push(Posting::new(term.clone(), doc_id, tf));
            }
        }
        flat
    }
}
