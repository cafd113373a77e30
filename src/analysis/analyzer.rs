//! Analyzers that turn field text into indexed tokens.

use std::sync::Arc;

use crate::analysis::token::{Token, TokenStream};
use crate::analysis::tokenizer::{Tokenizer, UnicodeWordTokenizer, WhitespaceTokenizer};
use crate::error::Result;

/// Trait for analyzers that convert text into processed tokens.
pub trait Analyzer: Send + Sync + std::fmt::Debug {
    /// Analyze the given text and return a stream of tokens.
    fn analyze(&self, text: &str) -> Result<TokenStream>;

    /// Get the name of this analyzer (for debugging and configuration).
    fn name(&self) -> &'static str;
}

/// Unicode word segmentation followed by lowercasing.
///
/// ```
/// use sarissa_check::analysis::analyzer::{Analyzer, StandardAnalyzer};
///
/// let tokens: Vec<_> = StandardAnalyzer::new().analyze("Hello World").unwrap().collect();
/// assert_eq!(tokens[0].text, "hello");
/// assert_eq!(tokens[1].text, "world");
/// ```
#[derive(Clone, Debug)]
pub struct StandardAnalyzer {
    tokenizer: Arc<dyn Tokenizer>,
}

impl StandardAnalyzer {
    /// Create a new standard analyzer.
    pub fn new() -> Self {
        StandardAnalyzer {
            tokenizer: Arc::new(UnicodeWordTokenizer::new()),
        }
    }
}

impl Default for StandardAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let tokens = self.tokenizer.tokenize(text)?;
        Ok(Box::new(tokens.map(|token| Token {
            text: token.text.to_lowercase(),
            ..token
        })))
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

/// Whitespace splitting with no normalization.
#[derive(Clone, Debug, Default)]
pub struct WhitespaceAnalyzer {
    tokenizer: WhitespaceTokenizer,
}

impl WhitespaceAnalyzer {
    /// Create a new whitespace analyzer.
    pub fn new() -> Self {
        WhitespaceAnalyzer::default()
    }
}

impl Analyzer for WhitespaceAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        self.tokenizer.tokenize(text)
    }

    fn name(&self) -> &'static str {
        "whitespace"
    }
}
