//! Tokenizer implementations for text analysis.
//!
//! A tokenizer turns a document's text into a lazy stream of lowercase terms.
//! Tokenizing the same text twice always yields the same sequence, and no
//! input is ever an error: text without any token characters simply yields
//! an empty stream.
//!
//! # Available Tokenizers
//!
//! - [`word::WordTokenizer`] - Maximal runs of letters, digits and apostrophes (default)
//! - [`regex::RegexTokenizer`] - Custom regex-based tokenization
//!
//! # Examples
//!
//! ```
//! use shardex::analysis::tokenizer::Tokenizer;
//! use shardex::analysis::tokenizer::word::WordTokenizer;
//!
//! let tokenizer = WordTokenizer::new();
//! let tokens: Vec<String> = tokenizer.tokenize("La casa, l'ÁRBOL!").collect();
//! assert_eq!(tokens, vec!["la", "casa", "l'árbol"]);
//! ```

use std::sync::Arc;

use crate::error::Result;

/// A lazy stream of lowercase tokens borrowed from the input text.
pub type TokenStream<'a> = Box<dyn Iterator<Item = String> + 'a>;

/// Trait for tokenizers that convert text into terms.
///
/// The trait requires `Send + Sync` so a single tokenizer can be shared by
/// every map worker.
pub trait Tokenizer: Send + Sync {
    /// Tokenize the given text into a stream of lowercase terms.
    fn tokenize<'a>(&self, text: &'a str) -> TokenStream<'a>;

    /// Get the name of this tokenizer (for debugging and configuration).
    fn name(&self) -> &'static str;
}

// Individual tokenizer modules
pub mod regex;
pub mod word;

pub use self::regex::RegexTokenizer;
pub use self::word::WordTokenizer;

/// Build the tokenizer selected by an optional custom pattern.
///
/// `None` selects the default [`WordTokenizer`].
pub fn tokenizer_for(pattern: Option<&str>) -> Result<Arc<dyn Tokenizer>> {
    match pattern {
        Some(pattern) => Ok(Arc::new(RegexTokenizer::with_pattern(pattern)?)),
        None => Ok(Arc::new(WordTokenizer::new())),
    }
}
