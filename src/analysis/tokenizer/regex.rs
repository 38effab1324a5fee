//! Regex-based tokenizer implementation.

use std::sync::Arc;

use regex::Regex;

use super::{TokenStream, Tokenizer};
use crate::error::{Result, ShardexError};

/// A regex-based tokenizer that emits every match, lowercased.
///
/// Used when the default letter/digit rule does not fit a corpus. Terms are
/// stored tab-separated on disk, so a pattern that can match tabs or newlines
/// will make the spill fail on such a term.
#[derive(Clone, Debug)]
pub struct RegexTokenizer {
    /// The regex pattern used to extract tokens
    pattern: Arc<Regex>,
}

impl RegexTokenizer {
    /// Create a regex tokenizer with a custom pattern.
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            ShardexError::invalid_config(format!("Invalid token pattern: {e}"))
        })?;

        Ok(RegexTokenizer {
            pattern: Arc::new(regex),
        })
    }

    /// Get the regex pattern used by this tokenizer.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl Tokenizer for RegexTokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> TokenStream<'a> {
        Box::new(Matches {
            pattern: Arc::clone(&self.pattern),
            text,
            offset: 0,
        })
    }

    fn name(&self) -> &'static str {
        "regex"
    }
}

/// Lazy match scanner; owns a handle to the regex so the stream only
/// borrows the text.
struct Matches<'a> {
    pattern: Arc<Regex>,
    text: &'a str,
    offset: usize,
}

impl Iterator for Matches<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if self.offset > self.text.len() {
                return None;
            }
            let m = self.pattern.find_at(self.text, self.offset)?;
            if m.is_empty() {
                // Step over one character so empty matches cannot stall the scan.
                let step = self.text[m.end()..].chars().next()?.len_utf8();
                self.offset = m.end() + step;
                continue;
            }
            self.offset = m.end();
            return Some(m.as_str().to_lowercase());
        }
    }
}
