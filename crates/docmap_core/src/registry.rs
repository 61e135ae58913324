//! Model registry: type-name to schema resolution.
//!
//! Associations refer to their target type by *name*, and those names are
//! looked up here lazily on first access. That removes any declaration
//! ordering constraint between cooperating types.

use crate::error::{ModelError, ModelResult};
use crate::schema::AttributeSchema;
use std::collections::HashMap;
use std::sync::Arc;

/// A registry mapping type names to their schemas.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    schemas: HashMap<String, Arc<AttributeSchema>>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema under its type name.
    ///
    /// Re-registering a name replaces the previous schema.
    pub fn register(&mut self, schema: Arc<AttributeSchema>) {
        self.schemas.insert(schema.type_name().to_owned(), schema);
    }

    /// Resolves a type name to its schema.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownType`] for an unregistered name.
    pub fn resolve(&self, name: &str) -> ModelResult<Arc<AttributeSchema>> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::UnknownType {
                name: name.to_owned(),
            })
    }

    /// Whether a type name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }
}
