//! Field values and per-field indexing options.
//!
//! # Examples
//!
//! ```
//! use sarissa_check::document::field::{Field, FieldType, FieldValue};
//!
//! let field_type = FieldType::TEXT_STORED.with_term_vectors(true, true);
//! let field = Field::new("body", FieldValue::Text("Rust Programming".to_string()), field_type);
//! assert_eq!(field.value.as_text(), Some("Rust Programming"));
//! assert!(field.field_type.store_term_vector_offsets);
//! ```

use serde::{Deserialize, Serialize};

use crate::analysis::token::Token;

/// How much postings detail an indexed field keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexOptions {
    /// Document ids only.
    Docs,
    /// Document ids and term frequencies.
    DocsAndFreqs,
    /// Document ids, frequencies and positions.
    DocsAndFreqsAndPositions,
}

impl IndexOptions {
    /// Whether term frequencies are recorded.
    pub fn has_freqs(self) -> bool {
        self >= IndexOptions::DocsAndFreqs
    }

    /// Whether positions are recorded.
    pub fn has_positions(self) -> bool {
        self == IndexOptions::DocsAndFreqsAndPositions
    }

    /// Encode as a single byte.
    pub fn to_byte(self) -> u8 {
        match self {
            IndexOptions::Docs => 0,
            IndexOptions::DocsAndFreqs => 1,
            IndexOptions::DocsAndFreqsAndPositions => 2,
        }
    }

    /// Decode from a single byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(IndexOptions::Docs),
            1 => Some(IndexOptions::DocsAndFreqs),
            2 => Some(IndexOptions::DocsAndFreqsAndPositions),
            _ => None,
        }
    }
}

/// Indexing options for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldType {
    /// Whether the field is inverted into postings.
    pub indexed: bool,
    /// Whether the original value is kept in stored fields.
    pub stored: bool,
    /// Whether text is run through the analyzer.
    pub tokenized: bool,
    /// Skip the per-document length norm.
    pub omit_norms: bool,
    /// Postings detail.
    pub index_options: IndexOptions,
    /// Keep a per-document term vector.
    pub store_term_vectors: bool,
    /// Keep positions in the term vector.
    pub store_term_vector_positions: bool,
    /// Keep offsets in the term vector.
    pub store_term_vector_offsets: bool,
}

impl FieldType {
    /// Analyzed text that is also stored.
    pub const TEXT_STORED: FieldType = FieldType {
        indexed: true,
        stored: true,
        tokenized: true,
        omit_norms: false,
        index_options: IndexOptions::DocsAndFreqsAndPositions,
        store_term_vectors: false,
        store_term_vector_positions: false,
        store_term_vector_offsets: false,
    };

    /// Analyzed text that is not stored.
    pub const TEXT_NOT_STORED: FieldType = FieldType {
        stored: false,
        ..FieldType::TEXT_STORED
    };

    /// A single untokenized term that is also stored, e.g. an id.
    pub const STRING_STORED: FieldType = FieldType {
        indexed: true,
        stored: true,
        tokenized: false,
        omit_norms: true,
        index_options: IndexOptions::Docs,
        store_term_vectors: false,
        store_term_vector_positions: false,
        store_term_vector_offsets: false,
    };

    /// Stored only, never indexed.
    pub const STORED_ONLY: FieldType = FieldType {
        indexed: false,
        stored: true,
        tokenized: false,
        omit_norms: true,
        index_options: IndexOptions::Docs,
        store_term_vectors: false,
        store_term_vector_positions: false,
        store_term_vector_offsets: false,
    };

    /// Enable term vectors, optionally with positions and offsets.
    pub const fn with_term_vectors(mut self, positions: bool, offsets: bool) -> Self {
        self.store_term_vectors = true;
        self.store_term_vector_positions = positions;
        self.store_term_vector_offsets = offsets;
        self
    }

    /// Whether a length norm is written for this field.
    pub fn has_norms(&self) -> bool {
        self.indexed && !self.omit_norms
    }
}

/// Represents a value for a field in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Text value
    Text(String),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Binary data
    Binary(Vec<u8>),
}

impl FieldValue {
    /// Get the text value, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The text that gets indexed for this value.
    pub fn index_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::Binary(_) => None,
        }
    }
}

/// A named field with its value and indexing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// The field name.
    pub name: String,

    /// The field value.
    pub value: FieldValue,

    /// The field indexing options.
    pub field_type: FieldType,

    /// Pre-analyzed tokens that replace analysis of `value`.
    pub tokens: Option<Vec<Token>>,
}

impl Field {
    /// Create a new field.
    pub fn new<S: Into<String>>(name: S, value: FieldValue, field_type: FieldType) -> Self {
        Field {
            name: name.into(),
            value,
            field_type,
            tokens: None,
        }
    }

    /// Create a text field.
    pub fn text<S: Into<String>, T: Into<String>>(name: S, text: T, field_type: FieldType) -> Self {
        Field::new(name, FieldValue::Text(text.into()), field_type)
    }

    /// Attach a canned token list. Offsets and positions are indexed as given.
    pub fn with_tokens(mut self, tokens: Vec<Token>) -> Self {
        self.tokens = Some(tokens);
        self
    }
}
