//! Documents and the segmenter that cuts a corpus into them.
//!
//! A document is a fixed number of contiguous source lines. IDs are dense,
//! zero-based and assigned in input order; a trailing group shorter than
//! `lines_per_doc` is still a document. Documents are grouped into
//! [`DocumentBatch`]es whose ID ranges are contiguous and disjoint, which is
//! what keeps (term, doc_id) unique across map workers.

use std::io::{self, BufRead};

use crate::error::{Result, ShardexError};

/// A group of contiguous source lines, the unit of indexing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    /// Dense zero-based ID.
    pub id: u64,

    /// Concatenated lines, line breaks preserved.
    pub text: String,
}

/// A contiguous run of documents handed to one map worker.
#[derive(Debug)]
pub struct DocumentBatch {
    /// Sequence number of this batch, starting at 0.
    pub batch_index: usize,

    /// ID of the first document; equals the number of documents emitted
    /// before this batch.
    pub start_id: u64,

    /// Documents in ID order.
    pub documents: Vec<Document>,
}

impl DocumentBatch {
    /// Get the number of documents in the batch.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// One past the last document ID in this batch.
    pub fn end_id(&self) -> u64 {
        self.start_id + self.documents.len() as u64
    }
}

/// Groups every `lines_per_doc` lines of a reader into one [`Document`].
///
/// Input is decoded as UTF-8 on a best-effort basis: invalid byte sequences
/// are dropped, never reported. Lines end at `\n`, `\r\n` or a lone `\r`;
/// every line break is stored as `\n` in the document text.
pub struct DocumentSegmenter<R> {
    reader: R,
    lines_per_doc: usize,
    next_id: u64,
    line: Vec<u8>,
    /// The last line ended with `\r`; a `\n` right after it belongs to it.
    skip_lf: bool,
    finished: bool,
}

impl<R: BufRead> DocumentSegmenter<R> {
    /// Create a segmenter. `lines_per_doc` is clamped to at least 1.
    pub fn new(reader: R, lines_per_doc: usize) -> Self {
        DocumentSegmenter {
            reader,
            lines_per_doc: lines_per_doc.max(1),
            next_id: 0,
            line: Vec::with_capacity(256),
            skip_lf: false,
            finished: false,
        }
    }

    /// Number of documents emitted so far.
    pub fn documents_emitted(&self) -> u64 {
        self.next_id
    }

    /// Turn this segmenter into an iterator of batches of `batch_docs`
    /// documents (the last batch may be shorter).
    pub fn batches(self, batch_docs: usize) -> Batches<R> {
        Batches {
            segmenter: self,
            batch_docs: batch_docs.max(1),
            next_batch: 0,
        }
    }

    /// Read one line into `self.line`, normalizing its terminator to `\n`.
    /// Returns false at end of input.
    fn read_line(&mut self) -> io::Result<bool> {
        self.line.clear();
        loop {
            let available = match self.reader.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(!self.line.is_empty());
            }

            if self.skip_lf {
                self.skip_lf = false;
                if available[0] == b'\n' {
                    self.reader.consume(1);
                    continue;
                }
            }

            let line_end = available.iter().position(|&b| b == b'\n' || b == b'\r');
            let (used, complete) = match line_end {
                Some(end) => {
                    self.line.extend_from_slice(&available[..end]);
                    self.line.push(b'\n');
                    self.skip_lf = available[end] == b'\r';
                    (end + 1, true)
                }
                None => {
                    self.line.extend_from_slice(available);
                    (available.len(), false)
                }
            };
            self.reader.consume(used);
            if complete {
                return Ok(true);
            }
        }
    }

    fn next_document(&mut self) -> Result<Option<Document>> {
        if self.finished {
            return Ok(None);
        }

        let mut text = String::new();
        let mut lines = 0;
        while lines < self.lines_per_doc {
            let read = self
                .read_line()
                .map_err(|e| ShardexError::input(format!("failed to read input: {e}")))?;
            if !read {
                self.finished = true;
                break;
            }
            push_lossy(&mut text, &self.line);
            lines += 1;
        }

        if lines == 0 {
            return Ok(None);
        }

        let document = Document {
            id: self.next_id,
            text,
        };
        self.next_id += 1;
        Ok(Some(document))
    }
}

impl<R: BufRead> Iterator for DocumentSegmenter<R> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_document() {
            Ok(document) => document.map(Ok),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Iterator over the [`DocumentBatch`]es of a segmenter.
pub struct Batches<R> {
    segmenter: DocumentSegmenter<R>,
    batch_docs: usize,
    next_batch: usize,
}

impl<R: BufRead> Batches<R> {
    /// Number of documents emitted so far.
    pub fn documents_emitted(&self) -> u64 {
        self.segmenter.documents_emitted()
    }
}

impl<R: BufRead> Iterator for Batches<R> {
    type Item = Result<DocumentBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let start_id = self.segmenter.documents_emitted();
        let mut documents = Vec::with_capacity(self.batch_docs.min(4096));

        while documents.len() < self.batch_docs {
            match self.segmenter.next() {
                Some(Ok(document)) => documents.push(document),
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            }
        }

        if documents.is_empty() {
            return None;
        }

        let batch = DocumentBatch {
            batch_index: self.next_batch,
            start_id,
            documents,
        };
        self.next_batch += 1;
        Some(Ok(batch))
    }
}

/// Append the valid UTF-8 parts of `bytes` to `text`, skipping invalid
/// sequences.
fn push_lossy(text: &mut String, bytes: &[u8]) {
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
}
