//! Text analysis used when building index fixtures.
//!
//! A [`Tokenizer`](tokenizer::Tokenizer) splits text into tokens and an
//! [`Analyzer`](analyzer::Analyzer) normalizes them. Fields can also carry a
//! pre-built token list, which skips analysis entirely.

pub mod analyzer;
pub mod token;
pub mod tokenizer;
