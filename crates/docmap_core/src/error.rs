//! Error types for the mapping core.

use docmap_store::StoreError;
use thiserror::Error;

/// Result type for mapping operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur in mapping operations.
///
/// Store-level not-found conditions never surface here; they come back as
/// an absent result (`None` / empty). Store failures propagate unchanged
/// through [`ModelError::Store`], with one exception: entity deletion
/// downgrades them to a `false` return.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Query against an attribute with no declared index.
    #[error("no index declared for {type_name}.{attribute}")]
    IndexNotFound {
        /// The queried type.
        type_name: String,
        /// The attribute without an index.
        attribute: String,
    },

    /// A write would duplicate the value of a unique attribute.
    #[error("{attribute} is not unique")]
    UniqueIndexViolation {
        /// The violated unique attribute.
        attribute: String,
    },

    /// An association write was given an object of the wrong declared type.
    #[error("invalid association type: expected {expected}, got {actual}")]
    InvalidAssociationType {
        /// The declared target type.
        expected: String,
        /// The declared type of the object passed in.
        actual: String,
    },

    /// An embedding write was given an object whose type is not embeddable.
    #[error("{type_name} is not embeddable")]
    NotEmbeddable {
        /// The offending type.
        type_name: String,
    },

    /// An embedded object's parent was accessed before assignment.
    #[error("embedded object has no parent")]
    ParentMissing,

    /// Pagination was advanced past the last page.
    #[error("there is no next page")]
    NoNextPage,

    /// An attribute that the type's schema does not declare.
    #[error("unknown attribute {type_name}.{attribute}")]
    UnknownAttribute {
        /// The type consulted.
        type_name: String,
        /// The undeclared attribute.
        attribute: String,
    },

    /// The attribute exists but does not expose the requested accessor.
    #[error("attribute {attribute} has no {mode} accessor")]
    AccessorMissing {
        /// The attribute consulted.
        attribute: String,
        /// The missing accessor mode.
        mode: &'static str,
    },

    /// An association that the type's schema does not declare.
    #[error("unknown association {type_name}.{name}")]
    UnknownAssociation {
        /// The type consulted.
        type_name: String,
        /// The undeclared association.
        name: String,
    },

    /// A type name with no registered schema.
    #[error("no schema registered for type {name}")]
    UnknownType {
        /// The unresolved type name.
        name: String,
    },

    /// Mutation of a deleted (frozen) entity.
    #[error("entity is frozen")]
    Frozen,

    /// A raw document that cannot be mapped onto the schema.
    #[error("malformed document: {message}")]
    MalformedDocument {
        /// Description of the mismatch.
        message: String,
    },

    /// Store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ModelError {
    /// Creates an index-not-found error.
    pub fn index_not_found(type_name: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::IndexNotFound {
            type_name: type_name.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates a uniqueness-violation error.
    pub fn unique_index_violation(attribute: impl Into<String>) -> Self {
        Self::UniqueIndexViolation {
            attribute: attribute.into(),
        }
    }

    /// Creates an unknown-attribute error.
    pub fn unknown_attribute(type_name: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::UnknownAttribute {
            type_name: type_name.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates an unknown-association error.
    pub fn unknown_association(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownAssociation {
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// Creates a malformed-document error.
    pub fn malformed_document(message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            message: message.into(),
        }
    }
}
