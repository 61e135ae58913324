//! Secondary index definitions and value projection.

use docmap_store::RawDocument;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// The store-level type of a secondary index.
///
/// The kind only affects the index-name suffix; the mapper always projects
/// values to their string form before handing them to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexKind {
    /// Binary (string-valued) index, suffix `bin`.
    #[default]
    Binary,
    /// Integer index, suffix `int`.
    Integer,
}

impl IndexKind {
    /// The index-name suffix for this kind.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Binary => "bin",
            Self::Integer => "int",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A declared secondary index on one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    attribute: String,
    kind: IndexKind,
}

impl IndexDefinition {
    /// Creates a binary index on `attribute`.
    #[must_use]
    pub fn new(attribute: impl Into<String>) -> Self {
        Self::with_kind(attribute, IndexKind::Binary)
    }

    /// Creates an index of the given kind on `attribute`.
    #[must_use]
    pub fn with_kind(attribute: impl Into<String>, kind: IndexKind) -> Self {
        Self {
            attribute: attribute.into(),
            kind,
        }
    }

    /// The source attribute this index projects.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// The index kind.
    #[must_use]
    pub const fn kind(&self) -> IndexKind {
        self.kind
    }

    /// Store-facing index name: attribute name plus type suffix.
    #[must_use]
    pub fn store_name(&self) -> String {
        format!("{}_{}", self.attribute, self.kind.suffix())
    }

    /// Projects the indexable values out of an attribute map.
    ///
    /// An absent or null attribute contributes nothing; a sequence
    /// contributes one value per element (multi-valued indices such as
    /// tags); any scalar contributes its string form. It is best to
    /// normalize user-supplied data before it reaches an indexed slot.
    #[must_use]
    pub fn values_from(&self, attributes: &RawDocument) -> BTreeSet<String> {
        let mut values = BTreeSet::new();
        match attributes.get(&self.attribute) {
            None | Some(Value::Null) => {}
            Some(Value::Array(elements)) => {
                for element in elements {
                    if let Some(v) = encode_scalar(element) {
                        values.insert(v);
                    }
                }
            }
            Some(other) => {
                if let Some(v) = encode_scalar(other) {
                    values.insert(v);
                }
            }
        }
        values
    }
}

/// Renders a scalar attribute value into its index form.
///
/// Strings index verbatim; numbers and booleans through their display
/// form. Nested structures are not indexable and yield `None`.
pub(crate) fn encode_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
