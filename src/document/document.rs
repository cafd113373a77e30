//! Document structure for indexing.

use serde::{Deserialize, Serialize};

use crate::document::field::{Field, FieldType, FieldValue};

/// A document is an ordered list of fields. A name may repeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    fields: Vec<Field>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Document { fields: Vec::new() }
    }

    /// Add a field to the document.
    pub fn add(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Add a text field.
    pub fn add_text<S: Into<String>, T: Into<String>>(
        &mut self,
        name: S,
        text: T,
        field_type: FieldType,
    ) {
        self.add(Field::text(name, text, field_type));
    }

    /// Get the first value of a field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// All fields in insertion order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Create a builder for constructing documents.
    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::new()
    }
}

/// Builder for [`Document`].
///
/// ```
/// use sarissa_check::document::{Document, FieldType};
///
/// let doc = Document::builder()
///     .add_text("id", "1", FieldType::STRING_STORED)
///     .add_text("body", "hello world", FieldType::TEXT_STORED)
///     .build();
/// assert_eq!(doc.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    document: Document,
}

impl DocumentBuilder {
    /// Create a new document builder.
    pub fn new() -> Self {
        DocumentBuilder::default()
    }

    /// Add a text field.
    pub fn add_text<S: Into<String>, T: Into<String>>(
        mut self,
        name: S,
        text: T,
        field_type: FieldType,
    ) -> Self {
        self.document.add_text(name, text, field_type);
        self
    }

    /// Add an arbitrary field.
    pub fn add_field(mut self, field: Field) -> Self {
        self.document.add(field);
        self
    }

    /// Build the document.
    pub fn build(self) -> Document {
        self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_fields_keep_order() {
        let mut doc = Document::new();
        doc.add_text("a", "one", FieldType::TEXT_STORED);
        doc.add_text("b", "two", FieldType::STORED_ONLY);
        doc.add_text("a", "three", FieldType::TEXT_STORED);

        let names: Vec<&str> = doc.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "a"]);
        assert_eq!(doc.get("a").and_then(|v| v.as_text()), Some("one"));
        assert!(doc.get("c").is_none());
    }

    #[test]
    fn test_empty_document() {
        let doc = Document::builder().build();
        assert!(doc.is_empty());
    }
}
