//! # docmap Store
//!
//! Store client boundary for docmap.
//!
//! This crate defines the contract between the object-document mapper and
//! the backing key-value store. Stores hold **raw documents** (string-keyed
//! JSON maps) in named buckets and maintain **secondary indexes**: mappings
//! from a projected value to the set of document keys carrying that value.
//!
//! ## Design Principles
//!
//! - Stores are dumb document holders: no schema knowledge, no uniqueness
//!   enforcement, no association semantics. All of that lives in
//!   `docmap_core`.
//! - Index assignments travel with every `put`; the store replaces a
//!   document's previous assignments wholesale.
//! - Index queries are equality-only and paginate through an opaque
//!   continuation token.
//!
//! ## Available Stores
//!
//! - [`MemoryStore`] - For testing and ephemeral data
//!
//! ## Example
//!
//! ```rust
//! use docmap_store::{IndexAssignment, MemoryStore, QueryOptions, StoreClient};
//! use std::collections::BTreeSet;
//!
//! let store = MemoryStore::new();
//! let mut doc = serde_json::Map::new();
//! doc.insert("name".into(), "Ada".into());
//!
//! let indexes = vec![IndexAssignment::single("name_bin", "Ada")];
//! let key = store.put("users", None, doc, &indexes).unwrap();
//!
//! let page = store
//!     .query_index("users", "name_bin", "Ada", &QueryOptions::default())
//!     .unwrap();
//! assert_eq!(page.keys, vec![key]);
//! ```

mod client;
mod error;
mod memory;

pub use client::{IndexAssignment, IndexPage, QueryOptions, RawDocument, StoreClient};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
