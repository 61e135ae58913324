//! Session: the store handle, the model registry, and the per-type
//! operation surface.

use crate::entity::Entity;
use crate::error::{ModelError, ModelResult};
use crate::registry::ModelRegistry;
use crate::result_set::ResultSet;
use crate::schema::{encode_scalar, AttributeSchema};
use docmap_store::{QueryOptions, RawDocument, StoreClient};
use serde_json::Value;
use std::sync::Arc;

/// A logical execution context: one shared store handle plus the schema
/// registry.
///
/// All operations are synchronous request/response calls against the
/// store; the session performs no locking of its own, and the only
/// cross-operation ordering guarantee is what the store provides for a
/// single key on one handle.
pub struct Session {
    store: Arc<dyn StoreClient>,
    registry: ModelRegistry,
}

impl Session {
    /// Creates a session over a store handle.
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self {
            store,
            registry: ModelRegistry::new(),
        }
    }

    /// Registers a type's schema.
    pub fn register(&mut self, schema: Arc<AttributeSchema>) {
        self.registry.register(schema);
    }

    /// The store handle.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StoreClient> {
        &self.store
    }

    /// The schema registry.
    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The operation surface for a registered type.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownType`] for an unregistered name.
    pub fn model(&self, type_name: &str) -> ModelResult<Model<'_>> {
        Ok(self.model_of(self.registry.resolve(type_name)?))
    }

    pub(crate) fn model_of(&self, schema: Arc<AttributeSchema>) -> Model<'_> {
        Model {
            session: self,
            schema,
        }
    }
}

/// Per-type operations: construction, lookup, and index queries.
pub struct Model<'a> {
    session: &'a Session,
    schema: Arc<AttributeSchema>,
}

impl<'a> Model<'a> {
    /// The type's schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<AttributeSchema> {
        &self.schema
    }

    /// Builds an unsaved entity from an attribute map.
    ///
    /// # Errors
    ///
    /// Fails as [`Entity::new`] does.
    pub fn new_entity(&self, attributes: RawDocument) -> ModelResult<Entity> {
        Entity::new(&self.schema, attributes)
    }

    /// Builds and immediately saves an entity.
    ///
    /// # Errors
    ///
    /// Fails as [`Entity::new`] and [`Entity::save`] do.
    pub fn create(&self, attributes: RawDocument) -> ModelResult<Entity> {
        let entity = self.new_entity(attributes)?;
        entity.save(self.session)?;
        Ok(entity)
    }

    /// Retrieves a record by id.
    ///
    /// An absent record is `Ok(None)`, never an error.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Store`] when the fetch fails;
    /// reconstruction failures propagate.
    pub fn get(&self, id: &str) -> ModelResult<Option<Entity>> {
        match self.session.store().get(self.schema.bucket_name(), id)? {
            Some(doc) => Ok(Some(Entity::from_store(
                self.session.registry(),
                Arc::clone(&self.schema),
                id,
                doc,
            )?)),
            None => Ok(None),
        }
    }

    /// Whether a record with this id exists.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Store`] when the store request fails.
    pub fn exists(&self, id: &str) -> ModelResult<bool> {
        Ok(self.session.store().exists(self.schema.bucket_name(), id)?)
    }

    /// Every record in the type's bucket.
    ///
    /// **Warning**: backed by a full key listing of the bucket;
    /// unsuitable for production-scale use.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Store`] when the key listing fails.
    pub fn all(&self) -> ModelResult<ResultSet<'a>> {
        let keys = self.session.store().list_keys(self.schema.bucket_name())?;
        Ok(ResultSet::full_scan(
            self.session,
            Arc::clone(&self.schema),
            keys,
        ))
    }

    /// Equality lookup against a declared index.
    ///
    /// # Errors
    ///
    /// Fails as [`Model::find_with`] does.
    pub fn find(&self, attribute: &str, value: Value) -> ModelResult<ResultSet<'a>> {
        self.find_with(attribute, value, QueryOptions::default())
    }

    /// Equality lookup with pagination options.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::IndexNotFound`] when no index is declared
    /// on `attribute` and [`ModelError::MalformedDocument`] when `value`
    /// is not an indexable scalar.
    pub fn find_with(
        &self,
        attribute: &str,
        value: Value,
        options: QueryOptions,
    ) -> ModelResult<ResultSet<'a>> {
        let index = self
            .schema
            .index_for(attribute)
            .ok_or_else(|| ModelError::index_not_found(self.schema.type_name(), attribute))?
            .clone();
        let query_value = encode_scalar(&value).ok_or_else(|| {
            ModelError::malformed_document(format!("value of {attribute} is not indexable"))
        })?;
        tracing::debug!(
            bucket = self.schema.bucket_name(),
            index = index.store_name(),
            value = %query_value,
            "index query"
        );
        Ok(ResultSet::query(
            self.session,
            Arc::clone(&self.schema),
            index,
            query_value,
            options,
        ))
    }

    /// Batch-resolves a list of ids into entities.
    ///
    /// Ids that no longer resolve are skipped; order follows the id list.
    pub(crate) fn batch(&self, ids: &[String]) -> ModelResult<Vec<Entity>> {
        let fetched = self
            .session
            .store()
            .fetch_many(self.schema.bucket_name(), ids)?;
        fetched
            .into_iter()
            .map(|(key, doc)| {
                Entity::from_store(self.session.registry(), Arc::clone(&self.schema), &key, doc)
            })
            .collect()
    }
}
