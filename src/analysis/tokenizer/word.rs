//! Letter/digit/apostrophe tokenizer implementation.

use super::{TokenStream, Tokenizer};

/// The default tokenizer.
///
/// A token is a maximal run of Unicode letters (accented Latin letters
/// included), ASCII digits and apostrophes. Every other character is a
/// delimiter and is discarded. Tokens are lowercased.
#[derive(Clone, Debug, Default)]
pub struct WordTokenizer;

impl WordTokenizer {
    /// Create a new word tokenizer.
    pub fn new() -> Self {
        WordTokenizer
    }

    /// Whether `c` belongs to a token.
    #[inline]
    pub fn is_token_char(c: char) -> bool {
        c.is_alphabetic() || c.is_ascii_digit() || c == '\''
    }
}

impl Tokenizer for WordTokenizer {
    fn tokenize<'a>(&self, text: &'a str) -> TokenStream<'a> {
        Box::new(Words { text, offset: 0 })
    }

    fn name(&self) -> &'static str {
        "word"
    }
}

/// Lazy scanner over the token runs of a string.
struct Words<'a> {
    text: &'a str,
    offset: usize,
}

impl Iterator for Words<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let rest = &self.text[self.offset..];
        let start = rest.find(WordTokenizer::is_token_char)?;
        let token = &rest[start..];
        let len = token
            .find(|c: char| !WordTokenizer::is_token_char(c))
            .unwrap_or(token.len());

        self.offset += start + len;
        Some(token[..len].to_lowercase())
    }
}
