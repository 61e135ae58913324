//! Store client trait definition and wire types.

use crate::error::StoreResult;
use std::collections::BTreeSet;

/// A raw document as the store sees it.
///
/// String-keyed mapping of scalars, sequences, and nested mappings. The
/// mapper reserves the `"_type"` field at any nesting level as a type
/// discriminator; the store does not interpret it.
pub type RawDocument = serde_json::Map<String, serde_json::Value>;

/// The full set of projected values for one secondary index of one document.
///
/// A `put` carries one assignment per declared index; the store replaces
/// the document's previous values for that index wholesale. A multi-valued
/// attribute (e.g. tags) contributes one value per element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAssignment {
    /// Store-facing index name, e.g. `"name_bin"`.
    pub index_name: String,
    /// Projected values. Empty means "remove this document from the index".
    pub values: BTreeSet<String>,
}

impl IndexAssignment {
    /// Creates an assignment with a single value.
    #[must_use]
    pub fn single(index_name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut values = BTreeSet::new();
        values.insert(value.into());
        Self {
            index_name: index_name.into(),
            values,
        }
    }

    /// Creates an assignment from a value set.
    #[must_use]
    pub fn new(index_name: impl Into<String>, values: BTreeSet<String>) -> Self {
        Self {
            index_name: index_name.into(),
            values,
        }
    }
}

/// Options for a paginated index query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Maximum number of keys per page. `None` returns everything.
    ///
    /// `Some(0)` yields an empty complete page regardless of matches;
    /// a caller that wants to make progress must request at least one key.
    pub max_results: Option<usize>,
    /// Opaque continuation token from a previous page.
    pub continuation: Option<String>,
}

impl QueryOptions {
    /// Options limiting the page size.
    #[must_use]
    pub fn max_results(max: usize) -> Self {
        Self {
            max_results: Some(max),
            continuation: None,
        }
    }

    /// Returns a copy of these options with the continuation replaced.
    #[must_use]
    pub fn with_continuation(&self, token: impl Into<String>) -> Self {
        Self {
            max_results: self.max_results,
            continuation: Some(token.into()),
        }
    }
}

/// One page of an index query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPage {
    /// Matching keys in stable (sorted) order.
    pub keys: Vec<String>,
    /// Continuation token, present iff more matches remain.
    pub continuation: Option<String>,
}

impl IndexPage {
    /// A page holding the given keys with no further pages.
    #[must_use]
    pub fn complete(keys: Vec<String>) -> Self {
        Self {
            keys,
            continuation: None,
        }
    }
}

/// A client for a schemaless key-value document store with secondary indexes.
///
/// # Invariants
///
/// - `put` replaces the document and its index assignments atomically with
///   respect to other calls on the same handle
/// - `get` of an absent key is `Ok(None)`, never an error
/// - `query_index` returns keys in a stable order so continuation tokens
///   remain meaningful across pages
/// - Clients must be `Send + Sync`; one handle is shared per logical
///   execution context
///
/// # Implementors
///
/// - [`super::MemoryStore`] - For testing
pub trait StoreClient: Send + Sync {
    /// Checks whether a key exists in a bucket.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::Backend`](crate::StoreError::Backend) when
    /// the backend cannot serve the request.
    fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool>;

    /// Fetches the document stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::Backend`](crate::StoreError::Backend) when
    /// the backend cannot serve the request.
    fn get(&self, bucket: &str, key: &str) -> StoreResult<Option<RawDocument>>;

    /// Stores a document together with its secondary index assignments.
    ///
    /// When `key` is `None` the store assigns a fresh key. Returns the key
    /// under which the document now lives. Previous index assignments for
    /// this document are replaced by `indexes`.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::Backend`](crate::StoreError::Backend) when
    /// the backend cannot serve the request.
    fn put(
        &self,
        bucket: &str,
        key: Option<&str>,
        doc: RawDocument,
        indexes: &[IndexAssignment],
    ) -> StoreResult<String>;

    /// Deletes the document stored under `key`.
    ///
    /// Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::Backend`](crate::StoreError::Backend) when
    /// the backend cannot serve the request.
    fn delete(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Equality lookup against a secondary index.
    ///
    /// Returns the keys of all documents whose index `index_name` contains
    /// `value`, honoring `max_results` and `continuation`. Querying an
    /// index the store has never seen yields an empty page; rejecting
    /// undeclared indices is the mapper's job.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::Backend`](crate::StoreError::Backend) when
    /// the backend cannot serve the request.
    fn query_index(
        &self,
        bucket: &str,
        index_name: &str,
        value: &str,
        options: &QueryOptions,
    ) -> StoreResult<IndexPage>;

    /// Lists every key in a bucket.
    ///
    /// **Warning**: this is a full scan of the bucket and is unsuitable
    /// for production-scale use.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::Backend`](crate::StoreError::Backend) when
    /// the backend cannot serve the request.
    fn list_keys(&self, bucket: &str) -> StoreResult<Vec<String>>;

    /// Batch-fetches documents by key.
    ///
    /// Keys that no longer resolve to a document are silently skipped;
    /// the result order follows the requested key order.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::Backend`](crate::StoreError::Backend) when
    /// the backend cannot serve the request.
    fn fetch_many(&self, bucket: &str, keys: &[String]) -> StoreResult<Vec<(String, RawDocument)>>;
}
