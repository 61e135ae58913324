//! # docmap Core
//!
//! Object-document mapping core for docmap.
//!
//! This crate projects typed application records onto a schemaless
//! key-value store with secondary-index lookups. It provides:
//! - Per-type [`AttributeSchema`]s: declared attributes, defaults,
//!   accessor modes, indices, and uniqueness constraints
//! - Associations: owning references, reverse lookups, id-list
//!   collections, and embedded sub-documents with a type discriminator
//! - A persistence lifecycle handling serialization, index projection,
//!   and best-effort uniqueness checks
//! - [`ResultSet`]: a lazy, continuation-paginated cursor over index
//!   queries and full-bucket scans
//!
//! The store itself stays behind the [`docmap_store::StoreClient`]
//! boundary; only by-id lookup, full-bucket scan, and single-field
//! equality lookups against pre-declared indices are supported.
//!
//! ## Example
//!
//! ```rust
//! use docmap_core::{AttributeSchema, Session};
//! use docmap_store::MemoryStore;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let mut session = Session::new(Arc::new(MemoryStore::new()));
//! session.register(
//!     AttributeSchema::build("User")
//!         .attribute("name")
//!         .attribute("email")
//!         .index("name")
//!         .unique("email")
//!         .finish(),
//! );
//!
//! let users = session.model("User").unwrap();
//! let user = users
//!     .create([("name".to_owned(), json!("Ada"))].into_iter().collect())
//!     .unwrap();
//!
//! let found = users.find("name", json!("Ada")).unwrap();
//! assert!(found.contains(&user).unwrap());
//! ```

mod entity;
mod error;
mod registry;
mod result_set;
mod session;

pub mod schema;

pub use entity::Entity;
pub use error::{ModelError, ModelResult};
pub use registry::ModelRegistry;
pub use result_set::ResultSet;
pub use schema::{
    AccessorSet, Association, AssociationKind, AttributeSchema, IndexDefinition, IndexKind,
    SchemaBuilder, DEFAULT_PARENT_KEY, TYPE_FIELD,
};
pub use session::{Model, Session};

#[cfg(test)]
mod tests;
