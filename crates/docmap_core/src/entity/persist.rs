//! Persistence lifecycle: serialization, uniqueness checks, index
//! projection, store writes, and deserialization with embedded
//! reconstruction.

use crate::entity::{Cached, Entity};
use crate::error::{ModelError, ModelResult};
use crate::registry::ModelRegistry;
use crate::schema::{encode_scalar, AssociationKind, AttributeSchema, TYPE_FIELD};
use crate::session::Session;
use docmap_store::{IndexAssignment, QueryOptions, RawDocument};
use serde_json::Value;
use std::sync::Arc;

impl Entity {
    /// Persists the entity: serialize, check unique indices, project
    /// index values, write to the store, adopt the assigned key.
    ///
    /// The uniqueness check and the write are two store round trips, not
    /// one atomic operation: a concurrent writer committing the same
    /// unique value in between can still produce a duplicate. The check
    /// is a best-effort constraint.
    ///
    /// Saving an embeddable entity saves its parent.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Frozen`] after deletion,
    /// [`ModelError::UniqueIndexViolation`] when a unique value is already
    /// taken, [`ModelError::ParentMissing`] for an embeddable entity with
    /// no parent, and [`ModelError::Store`] when a store request fails.
    pub fn save(&self, session: &Session) -> ModelResult<()> {
        if self.is_frozen() {
            return Err(ModelError::Frozen);
        }
        let schema = self.schema();
        if schema.is_embeddable() {
            return self.parent()?.save(session);
        }

        let doc = self.persisted();
        self.check_unique_indices(session, &schema)?;
        let assignments = self.index_assignments(&schema);

        tracing::debug!(
            bucket = schema.bucket_name(),
            id = self.id().as_deref().unwrap_or("<new>"),
            "saving entity"
        );
        let key = session
            .store()
            .put(schema.bucket_name(), self.id().as_deref(), doc, &assignments)?;
        self.inner.borrow_mut().id = Some(key);
        Ok(())
    }

    /// Assigns attributes and saves.
    ///
    /// # Errors
    ///
    /// Fails as [`Entity::update_attributes`] and [`Entity::save`] do.
    pub fn update(&self, session: &Session, attributes: RawDocument) -> ModelResult<()> {
        self.update_attributes(attributes)?;
        self.save(session)
    }

    /// Replaces the entity's attributes wholesale with the store's
    /// current copy.
    ///
    /// A no-op for new entities, for embeddable entities (they have no
    /// store copy of their own), and when the stored copy is gone.
    /// Embedded children are re-installed from the fetched snapshots;
    /// other memoized associations are **not** invalidated.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Store`] when the fetch fails.
    pub fn reload(&self, session: &Session) -> ModelResult<()> {
        let schema = self.schema();
        if schema.is_embeddable() {
            return Ok(());
        }
        let Some(id) = self.id() else {
            return Ok(());
        };
        let Some(doc) = session.store().get(schema.bucket_name(), &id)? else {
            return Ok(());
        };
        tracing::debug!(bucket = schema.bucket_name(), id = %id, "reloading entity");
        self.install_raw(session.registry(), doc)
    }

    /// Deletes the entity from the store and freezes the instance.
    ///
    /// A store failure is downgraded to `Ok(false)`, leaving the instance
    /// mutable; the identity is retained either way. Deleting an
    /// embeddable entity detaches it from its parent and persists the
    /// parent instead.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::ParentMissing`] for an embeddable entity
    /// whose parent is gone; store failures come back as `Ok(false)`, not
    /// as errors.
    pub fn delete(&self, session: &Session) -> ModelResult<bool> {
        let schema = self.schema();
        if schema.is_embeddable() {
            return self.delete_embedded(session);
        }

        if let Some(id) = self.id() {
            tracing::debug!(bucket = schema.bucket_name(), id = %id, "deleting entity");
            if let Err(error) = session.store().delete(schema.bucket_name(), &id) {
                tracing::debug!(%error, "delete failed, leaving entity mutable");
                return Ok(false);
            }
        }
        self.freeze();
        Ok(true)
    }

    fn delete_embedded(&self, session: &Session) -> ModelResult<bool> {
        if !self.is_new() {
            let parent = self.parent()?;
            parent.detach_embedded(self)?;
            match parent.save(session) {
                Ok(()) => {}
                Err(ModelError::Store(error)) => {
                    tracing::debug!(%error, "parent save failed, leaving embedded entity attached");
                    return Ok(false);
                }
                Err(other) => return Err(other),
            }
        }
        self.set_parent(None);
        self.freeze();
        Ok(true)
    }

    /// Removes `child` from whichever embedded slot holds it.
    fn detach_embedded(&self, child: &Entity) -> ModelResult<()> {
        let schema = self.schema();
        for field in schema.embedded_fields() {
            let Some(association) = schema.association(field) else {
                continue;
            };
            match association.kind() {
                AssociationKind::Embed => {
                    let held = match self.cached_one(field) {
                        Some(cached) => cached.same_instance(child) || cached == *child,
                        None => {
                            let snapshot = Value::Object(child.persisted());
                            self.inner.borrow().embedding.get(field) == Some(&snapshot)
                        }
                    };
                    if held {
                        self.clear_embedded(field)?;
                        return Ok(());
                    }
                }
                AssociationKind::EmbedCollection => {
                    if self.embedded_remove(field, child)?.is_some() {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Flattens the entity into its persisted form: the attribute map
    /// plus the type discriminator, with each embedded field replaced by
    /// the persisted form of the currently-resolved embedded object(s).
    ///
    /// Embedded forms keep their own discriminator so heterogeneous
    /// embedded collections reconstruct polymorphically. The parent
    /// back-reference never serializes.
    pub(crate) fn persisted(&self) -> RawDocument {
        let inner = self.inner.borrow();
        let mut doc = inner.attributes.clone();
        doc.insert(
            TYPE_FIELD.to_owned(),
            Value::String(inner.schema.type_name().to_owned()),
        );

        for field in inner.schema.embedded_fields() {
            match inner.memo.get(field) {
                Some(Cached::One(child)) => {
                    doc.insert(field.clone(), Value::Object(child.persisted()));
                }
                Some(Cached::Many(children)) => {
                    doc.insert(
                        field.clone(),
                        Value::Array(
                            children
                                .iter()
                                .map(|child| Value::Object(child.persisted()))
                                .collect(),
                        ),
                    );
                }
                // No live objects resolved; the raw snapshot is current.
                None => {
                    if let Some(raw) = inner.embedding.get(field) {
                        doc.insert(field.clone(), raw.clone());
                    }
                }
            }
        }
        doc
    }

    /// Builds one index assignment per declared index from the current
    /// attribute values.
    fn index_assignments(&self, schema: &Arc<AttributeSchema>) -> Vec<IndexAssignment> {
        let attributes = self.attributes();
        schema
            .indices()
            .map(|index| IndexAssignment::new(index.store_name(), index.values_from(&attributes)))
            .collect()
    }

    /// Looks up every declared-unique attribute value in the store.
    ///
    /// A value already indexed under a different key rejects the write;
    /// the record's own key re-saving its unchanged value never does.
    fn check_unique_indices(
        &self,
        session: &Session,
        schema: &Arc<AttributeSchema>,
    ) -> ModelResult<()> {
        let attributes = self.attributes();
        let own_id = self.id();

        for attribute in schema.uniques() {
            let Some(value) = attributes.get(attribute).and_then(encode_scalar) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            let Some(index) = schema.index_for(attribute) else {
                continue;
            };
            let page = session.store().query_index(
                schema.bucket_name(),
                &index.store_name(),
                &value,
                &QueryOptions::default(),
            )?;
            let only_self = page.keys.len() == 1
                && own_id.as_deref() == Some(page.keys[0].as_str());
            if !(page.keys.is_empty() || only_self) {
                return Err(ModelError::unique_index_violation(attribute));
            }
        }
        Ok(())
    }

    /// Reconstructs an entity fetched from the store.
    pub(crate) fn from_store(
        registry: &ModelRegistry,
        schema: Arc<AttributeSchema>,
        id: &str,
        doc: RawDocument,
    ) -> ModelResult<Entity> {
        let entity = Entity::blank(schema);
        entity.inner.borrow_mut().id = Some(id.to_owned());
        entity.install_raw(registry, doc)?;
        Ok(entity)
    }

    /// Installs a raw document into this entity.
    ///
    /// Extracts each declared embedded field's sub-structure, assigns the
    /// remaining scalar attributes wholesale, and eagerly reconstructs
    /// the embedded children into the association cache with their parent
    /// wired to self. Non-embedded memo entries are left untouched.
    pub(crate) fn install_raw(
        &self,
        registry: &ModelRegistry,
        mut doc: RawDocument,
    ) -> ModelResult<()> {
        doc.remove(TYPE_FIELD);
        let schema = self.schema();

        let mut embedded_data = RawDocument::new();
        for field in schema.embedded_fields() {
            if let Some(value) = doc.remove(field) {
                embedded_data.insert(field.clone(), value);
            }
        }
        {
            let mut inner = self.inner.borrow_mut();
            inner.attributes.clear();
            inner.embedding = embedded_data;
        }
        self.update_attributes(doc)?;

        for field in schema.embedded_fields() {
            let Some(association) = schema.association(field) else {
                continue;
            };
            let raw = self.inner.borrow().embedding.get(field).cloned();
            match (association.kind(), raw) {
                (AssociationKind::Embed, Some(Value::Object(map))) => {
                    let child = self.materialize_child(registry, association.target(), map)?;
                    self.memoize_one(field, &child);
                }
                (AssociationKind::EmbedCollection, Some(Value::Array(items))) => {
                    let mut children = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::Object(map) => children.push(self.materialize_child(
                                registry,
                                association.target(),
                                map,
                            )?),
                            other => {
                                return Err(ModelError::malformed_document(format!(
                                    "embedded element of {field} is not a mapping: {other}"
                                )))
                            }
                        }
                    }
                    self.memoize_many(field, &children);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Reconstructs one embedded child from its snapshot.
    ///
    /// The concrete type comes from the snapshot's discriminator when
    /// present, else from the statically declared target; the child's
    /// parent back-reference is wired to self.
    pub(crate) fn materialize_child(
        &self,
        registry: &ModelRegistry,
        declared_target: &str,
        snapshot: RawDocument,
    ) -> ModelResult<Entity> {
        let schema = match snapshot.get(TYPE_FIELD).and_then(Value::as_str) {
            Some(discriminator) => registry.resolve(discriminator)?,
            None => registry.resolve(declared_target)?,
        };
        let child = Entity::blank(schema);
        child.install_raw(registry, snapshot)?;
        child.set_parent(Some(self));
        Ok(child)
    }
}
