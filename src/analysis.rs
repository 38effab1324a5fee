//! Text analysis for shardex.
//!
//! Analysis is limited to tokenization: documents are split into lowercase
//! terms which then become posting keys.

pub mod tokenizer;
