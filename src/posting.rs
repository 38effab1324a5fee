//! Postings and their on-disk record format.
//!
//! Runs and shards share one record layout: one posting per line,
//! `term \t doc_id \t term_frequency \n`. Every sorted structure in the crate
//! (the spiller's in-memory sort, the merge heap, index verification) orders
//! postings by [`PostingKey`] and nothing else.

use std::cmp::Ordering;
use std::fmt;
use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The sort key of a posting: term first, then document ID.
///
/// Terms compare byte-wise on their UTF-8 encoding, which is the same as
/// comparing Unicode scalar values. Document IDs compare numerically. The
/// derived `Ord` follows field order, so this is the single comparator used by
/// the run spiller, the k-way merge and the verifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PostingKey {
    /// The lowercase term.
    pub term: String,

    /// The document the term occurs in.
    pub doc_id: u64,
}

impl PostingKey {
    /// Create a new posting key.
    pub fn new<S: Into<String>>(term: S, doc_id: u64) -> Self {
        PostingKey {
            term: term.into(),
            doc_id,
        }
    }
}

/// A (term, document, frequency) fact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// The (term, doc_id) key.
    pub key: PostingKey,

    /// Number of occurrences of the term in the document.
    pub term_frequency: u64,
}

impl Posting {
    /// Create a new posting.
    pub fn new<S: Into<String>>(term: S, doc_id: u64, term_frequency: u64) -> Self {
        Posting {
            key: PostingKey::new(term, doc_id),
            term_frequency,
        }
    }

    /// Build a posting from an already owned key.
    pub fn from_key(key: PostingKey, term_frequency: u64) -> Self {
        Posting {
            key,
            term_frequency,
        }
    }

    /// The posting's term.
    pub fn term(&self) -> &str {
        &self.key.term
    }

    /// The posting's document ID.
    pub fn doc_id(&self) -> u64 {
        self.key.doc_id
    }

    /// Number of bytes [`Posting::write_record`] produces for this posting.
    pub fn encoded_len(&self) -> u64 {
        (self.key.term.len() + decimal_len(self.key.doc_id) + decimal_len(self.term_frequency) + 3)
            as u64
    }

    /// Write this posting as one record and return the number of bytes written.
    ///
    /// Terms must be non-empty and must not contain the tab or newline
    /// delimiters; such terms are rejected with `InvalidData` rather than
    /// producing a record that cannot be read back.
    pub fn write_record<W: Write>(&self, writer: &mut W) -> io::Result<u64> {
        let term = &self.key.term;
        if term.is_empty() || term.contains(['\t', '\n', '\r']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("term {term:?} cannot be stored in a tab-separated record"),
            ));
        }
        writeln!(writer, "{}\t{}\t{}", term, self.key.doc_id, self.term_frequency)?;
        Ok(self.encoded_len())
    }

    /// Parse one record line, with or without its trailing newline.
    pub fn parse_record(line: &str) -> Result<Self, RecordError> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let mut fields = line.split('\t');

        let term = fields
            .next()
            .filter(|t| !t.is_empty())
            .ok_or(RecordError::MissingField("term"))?;
        let doc_id = parse_number(fields.next(), "doc_id")?;
        let term_frequency = parse_number(fields.next(), "term_frequency")?;
        if fields.next().is_some() {
            return Err(RecordError::TrailingField);
        }

        Ok(Posting::new(term, doc_id, term_frequency))
    }
}

impl PartialOrd for Posting {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Posting {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then(self.term_frequency.cmp(&other.term_frequency))
    }
}

impl fmt::Display for Posting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.key.term, self.key.doc_id, self.term_frequency
        )
    }
}

fn decimal_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 10 {
        value /= 10;
        len += 1;
    }
    len
}

fn parse_number(field: Option<&str>, name: &'static str) -> Result<u64, RecordError> {
    let field = field.ok_or(RecordError::MissingField(name))?;
    field.parse().map_err(|_| RecordError::InvalidNumber {
        field: name,
        value: field.to_string(),
    })
}

/// Errors produced while reading records back.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid `{field}` value {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("unexpected extra field")]
    TrailingField,

    #[error("record is not valid UTF-8")]
    InvalidUtf8,
}

/// Forward-only reader over a stream of records.
pub struct RecordReader<R> {
    reader: R,
    line: Vec<u8>,
    line_number: u64,
}

impl<R: BufRead> RecordReader<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        RecordReader {
            reader,
            line: Vec::with_capacity(64),
            line_number: 0,
        }
    }

    /// One-based number of the last line read (0 before the first read).
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Read the next posting, or `None` at end of stream.
    pub fn read_posting(&mut self) -> Result<Option<Posting>, RecordError> {
        self.line.clear();
        if self.reader.read_until(b'\n', &mut self.line)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        let line = std::str::from_utf8(&self.line).map_err(|_| RecordError::InvalidUtf8)?;
        Posting::parse_record(line).map(Some)
    }
}
