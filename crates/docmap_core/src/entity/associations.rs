//! Association resolution on entities.
//!
//! Four reference kinds (owning reference, reverse single, reverse
//! collection, owning id list) plus two embedding kinds. Target types are
//! resolved by name through the session's registry at access time, so
//! cooperating types can declare each other in any order.
//!
//! Reads memoize into the entity's association cache; the staleness
//! contract is documented on [`Entity`].

use crate::entity::{Cached, Entity};
use crate::error::{ModelError, ModelResult};
use crate::schema::{Association, AssociationKind};
use crate::session::Session;
use serde_json::Value;

impl Entity {
    /// Resolves an owning reference: a memoized by-id lookup of the
    /// target type through the `{name}_id` attribute.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAssociation`] when `name` is not
    /// a declared owning reference; resolution failures propagate.
    pub fn reference(&self, session: &Session, name: &str) -> ModelResult<Option<Entity>> {
        let association = self.association_of(name, AssociationKind::Reference)?;
        if let Some(cached) = self.cached_one(name) {
            return Ok(Some(cached));
        }

        let raw = self.get(&association.id_attribute())?;
        let Some(id) = raw.as_str() else {
            return Ok(None);
        };
        let target = session.registry().resolve(association.target())?;
        let resolved = session.model_of(target).get(id)?;
        if let Some(entity) = &resolved {
            self.memoize_one(name, entity);
        }
        Ok(resolved)
    }

    /// Assigns an owning reference.
    ///
    /// Stores the object's id under `{name}_id` and caches the object;
    /// `None` clears both. The object's declared type must match the
    /// association's target exactly.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAssociation`] when `name` is not
    /// a declared owning reference and
    /// [`ModelError::InvalidAssociationType`] when the object is not of
    /// the target type.
    pub fn set_reference(&self, name: &str, object: Option<&Entity>) -> ModelResult<()> {
        let association = self.association_of(name, AssociationKind::Reference)?;
        if let Some(object) = object {
            assert_association_type(&association, object)?;
        }

        let id_value = object
            .and_then(Entity::id)
            .map_or(Value::Null, Value::String);
        self.set(&association.id_attribute(), id_value)?;

        match object {
            Some(object) => self.memoize_one(name, object),
            None => self.refresh(name),
        }
        Ok(())
    }

    /// Resolves a reverse single lookup: the first record of the target
    /// type whose `{reference}_id` equals self's id. Memoized.
    ///
    /// An unsaved entity resolves to `None` without touching the store.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAssociation`] when `name` is not
    /// a declared reverse lookup; query failures propagate.
    pub fn referenced(&self, session: &Session, name: &str) -> ModelResult<Option<Entity>> {
        let association = self.association_of(name, AssociationKind::Referenced)?;
        if let Some(cached) = self.cached_one(name) {
            return Ok(Some(cached));
        }

        let Some(self_id) = self.id() else {
            return Ok(None);
        };
        let reference_attribute =
            association.reference_attribute(&self.schema().default_reference());
        let target = session.registry().resolve(association.target())?;
        let results = session
            .model_of(target)
            .find(&reference_attribute, Value::String(self_id))?;
        let first = results.first()?;
        if let Some(entity) = &first {
            self.memoize_one(name, entity);
        }
        Ok(first)
    }

    /// Resolves a reverse collection: every record of the target type
    /// whose `{reference}_id` equals self's id. A fresh query each read.
    ///
    /// An unsaved entity resolves to an empty sequence.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAssociation`] when `name` is not
    /// a declared reverse collection; query failures propagate.
    pub fn many(&self, session: &Session, name: &str) -> ModelResult<Vec<Entity>> {
        let association = self.association_of(name, AssociationKind::Many)?;
        let Some(self_id) = self.id() else {
            return Ok(Vec::new());
        };
        let reference_attribute =
            association.reference_attribute(&self.schema().default_reference());
        let target = session.registry().resolve(association.target())?;
        session
            .model_of(target)
            .find(&reference_attribute, Value::String(self_id))?
            .all()
    }

    /// Resolves an owning id-list collection: a memoized batch lookup of
    /// the ids stored under `{name}_ids`.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAssociation`] when `name` is not
    /// a declared collection; batch-fetch failures propagate.
    pub fn collection(&self, session: &Session, name: &str) -> ModelResult<Vec<Entity>> {
        let association = self.association_of(name, AssociationKind::Collection)?;
        if let Some(cached) = self.cached_many(name) {
            return Ok(cached);
        }
        if self.id().is_none() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = match self.get(&association.ids_attribute())? {
            Value::Array(values) => values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        };
        let target = session.registry().resolve(association.target())?;
        let entities = session.model_of(target).batch(&ids)?;
        self.memoize_many(name, &entities);
        Ok(entities)
    }

    /// Appends an object to an owning collection.
    ///
    /// Mutates the id list and, when the collection is memoized, the
    /// cached sequence in lockstep.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAssociation`] when `name` is not
    /// a declared collection and
    /// [`ModelError::InvalidAssociationType`] when the object is not of
    /// the target type.
    pub fn collection_add(&self, name: &str, object: &Entity) -> ModelResult<()> {
        let association = self.association_of(name, AssociationKind::Collection)?;
        assert_association_type(&association, object)?;

        let ids_attribute = association.ids_attribute();
        let mut ids = match self.get(&ids_attribute)? {
            Value::Array(values) => values,
            _ => Vec::new(),
        };
        ids.push(object.id().map_or(Value::Null, Value::String));
        self.set(&ids_attribute, Value::Array(ids))?;

        let mut inner = self.inner.borrow_mut();
        if let Some(Cached::Many(cache)) = inner.memo.get_mut(name) {
            cache.push(object.clone());
        }
        Ok(())
    }

    /// Removes an object from an owning collection.
    ///
    /// Returns `None` and changes nothing when the object's id is not in
    /// the list; otherwise removes it from the id list and the memoized
    /// sequence and returns the object.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAssociation`] when `name` is not
    /// a declared collection and
    /// [`ModelError::InvalidAssociationType`] when the object is not of
    /// the target type.
    pub fn collection_remove(&self, name: &str, object: &Entity) -> ModelResult<Option<Entity>> {
        let association = self.association_of(name, AssociationKind::Collection)?;
        assert_association_type(&association, object)?;

        let Some(object_id) = object.id() else {
            return Ok(None);
        };
        let ids_attribute = association.ids_attribute();
        let mut ids = match self.get(&ids_attribute)? {
            Value::Array(values) => values,
            _ => return Ok(None),
        };
        let Some(position) = ids
            .iter()
            .position(|value| value.as_str() == Some(object_id.as_str()))
        else {
            return Ok(None);
        };
        ids.remove(position);
        self.set(&ids_attribute, Value::Array(ids))?;

        // Entity equality borrows both operands, so the memoized sequence
        // is rebuilt under a shared borrow: a collection holding a handle
        // to its own owner would double-borrow under `borrow_mut`.
        let retained = match self.inner.borrow().memo.get(name) {
            Some(Cached::Many(cache)) => Some(
                cache
                    .iter()
                    .filter(|cached| *cached != object)
                    .cloned()
                    .collect::<Vec<_>>(),
            ),
            _ => None,
        };
        if let Some(cache) = retained {
            self.memoize_many(name, &cache);
        }
        Ok(Some(object.clone()))
    }

    /// Resolves a single embedded field: a memoized materialization of
    /// the stored snapshot into an instance of the embedded type, parent
    /// wired to self.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAssociation`] when `name` is not
    /// a declared embedded field; reconstruction failures propagate.
    pub fn embedded(&self, session: &Session, name: &str) -> ModelResult<Option<Entity>> {
        let association = self.association_of(name, AssociationKind::Embed)?;
        if let Some(cached) = self.cached_one(name) {
            return Ok(Some(cached));
        }

        let snapshot = self.inner.borrow().embedding.get(name).cloned();
        match snapshot {
            Some(Value::Object(map)) => {
                let child = self.materialize_child(session.registry(), association.target(), map)?;
                self.memoize_one(name, &child);
                Ok(Some(child))
            }
            _ => Ok(None),
        }
    }

    /// Assigns a single embedded field.
    ///
    /// Stores an attribute snapshot of the object, sets its parent
    /// back-reference to self, and caches the live object. The object's
    /// type must declare itself embeddable.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAssociation`] when `name` is not
    /// a declared embedded field, [`ModelError::NotEmbeddable`] for a
    /// non-embeddable object, and [`ModelError::Frozen`] after deletion.
    pub fn set_embedded(&self, name: &str, object: &Entity) -> ModelResult<()> {
        let _ = self.association_of(name, AssociationKind::Embed)?;
        assert_embeddable(object)?;
        self.assert_mutable()?;

        let snapshot = object.persisted();
        self.inner
            .borrow_mut()
            .embedding
            .insert(name.to_owned(), Value::Object(snapshot));
        object.set_parent(Some(self));
        self.memoize_one(name, object);
        Ok(())
    }

    /// Resolves an embedded collection: a memoized materialization of
    /// each stored snapshot, parents wired to self.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAssociation`] when `name` is not
    /// a declared embedded collection and
    /// [`ModelError::MalformedDocument`] when a stored element is not a
    /// mapping; reconstruction failures propagate.
    pub fn embedded_collection(&self, session: &Session, name: &str) -> ModelResult<Vec<Entity>> {
        let association = self.association_of(name, AssociationKind::EmbedCollection)?;
        if let Some(cached) = self.cached_many(name) {
            return Ok(cached);
        }

        let snapshots = self.inner.borrow().embedding.get(name).cloned();
        match snapshots {
            Some(Value::Array(items)) => {
                let mut children = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(map) => children.push(self.materialize_child(
                            session.registry(),
                            association.target(),
                            map,
                        )?),
                        other => {
                            return Err(ModelError::malformed_document(format!(
                                "embedded element of {name} is not a mapping: {other}"
                            )))
                        }
                    }
                }
                self.memoize_many(name, &children);
                Ok(children)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Appends an object to an embedded collection.
    ///
    /// Sets the parent back-reference, appends a snapshot to the
    /// persisted sequence, and maintains the memoized sequence in
    /// lockstep when one exists.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAssociation`] when `name` is not
    /// a declared embedded collection, [`ModelError::NotEmbeddable`]
    /// for a non-embeddable object, and [`ModelError::Frozen`] after
    /// deletion.
    pub fn embedded_add(&self, name: &str, object: &Entity) -> ModelResult<()> {
        let _ = self.association_of(name, AssociationKind::EmbedCollection)?;
        assert_embeddable(object)?;
        self.assert_mutable()?;

        object.set_parent(Some(self));
        let snapshot = Value::Object(object.persisted());

        let mut inner = self.inner.borrow_mut();
        if let Some(Cached::Many(cache)) = inner.memo.get_mut(name) {
            cache.push(object.clone());
        }
        match inner.embedding.get_mut(name) {
            Some(Value::Array(items)) => items.push(snapshot),
            _ => {
                inner
                    .embedding
                    .insert(name.to_owned(), Value::Array(vec![snapshot]));
            }
        }
        Ok(())
    }

    /// Removes an object from an embedded collection.
    ///
    /// Detaches the object's parent back-reference and removes it from
    /// both the live cache and the persisted sequence. Returns `None` and
    /// changes nothing for an object that was never added.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAssociation`] when `name` is not
    /// a declared embedded collection, [`ModelError::NotEmbeddable`]
    /// for a non-embeddable object, and [`ModelError::Frozen`] after
    /// deletion.
    pub fn embedded_remove(&self, name: &str, object: &Entity) -> ModelResult<Option<Entity>> {
        let _ = self.association_of(name, AssociationKind::EmbedCollection)?;
        assert_embeddable(object)?;
        self.assert_mutable()?;

        // The cache and the persisted sequence move in lockstep, so a
        // memoized position locates the snapshot as well.
        let memo_position = match self.inner.borrow().memo.get(name) {
            Some(Cached::Many(cache)) => cache
                .iter()
                .position(|cached| cached.same_instance(object) || cached == object),
            _ => None,
        };

        let position = match memo_position {
            Some(position) => Some(position),
            None => {
                let snapshot = Value::Object(object.persisted());
                match self.inner.borrow().embedding.get(name) {
                    Some(Value::Array(items)) => {
                        items.iter().position(|item| *item == snapshot)
                    }
                    _ => None,
                }
            }
        };
        let Some(position) = position else {
            return Ok(None);
        };

        {
            let mut inner = self.inner.borrow_mut();
            if let Some(Value::Array(items)) = inner.embedding.get_mut(name) {
                if position < items.len() {
                    items.remove(position);
                }
            }
            if let Some(Cached::Many(cache)) = inner.memo.get_mut(name) {
                if position < cache.len() {
                    cache.remove(position);
                }
            }
        }
        object.set_parent(None);
        Ok(Some(object.clone()))
    }

    /// Clears a single embedded field.
    ///
    /// Removes the stored snapshot and the cached object, detaching the
    /// object's parent back-reference. Returns the previously cached
    /// object when one was resolved.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAssociation`] when `name` is not
    /// a declared embedded field and [`ModelError::Frozen`] after
    /// deletion.
    pub fn clear_embedded(&self, name: &str) -> ModelResult<Option<Entity>> {
        let _ = self.association_of(name, AssociationKind::Embed)?;
        self.assert_mutable()?;

        let existing = self.cached_one(name);
        {
            let mut inner = self.inner.borrow_mut();
            inner.embedding.remove(name);
            inner.memo.remove(name);
        }
        if let Some(entity) = &existing {
            entity.set_parent(None);
        }
        Ok(existing)
    }

    pub(crate) fn association_of(&self, name: &str, kind: AssociationKind) -> ModelResult<Association> {
        let inner = self.inner.borrow();
        match inner.schema.association(name) {
            Some(association) if association.kind() == kind => Ok(association.clone()),
            _ => Err(ModelError::unknown_association(
                inner.schema.type_name(),
                name,
            )),
        }
    }

    pub(crate) fn assert_mutable(&self) -> ModelResult<()> {
        if self.inner.borrow().frozen {
            return Err(ModelError::Frozen);
        }
        Ok(())
    }

    pub(crate) fn cached_one(&self, name: &str) -> Option<Entity> {
        match self.inner.borrow().memo.get(name) {
            Some(Cached::One(entity)) => Some(entity.clone()),
            _ => None,
        }
    }

    pub(crate) fn cached_many(&self, name: &str) -> Option<Vec<Entity>> {
        match self.inner.borrow().memo.get(name) {
            Some(Cached::Many(entities)) => Some(entities.clone()),
            _ => None,
        }
    }

    pub(crate) fn memoize_one(&self, name: &str, entity: &Entity) {
        self.inner
            .borrow_mut()
            .memo
            .insert(name.to_owned(), Cached::One(entity.clone()));
    }

    pub(crate) fn memoize_many(&self, name: &str, entities: &[Entity]) {
        self.inner
            .borrow_mut()
            .memo
            .insert(name.to_owned(), Cached::Many(entities.to_vec()));
    }
}

fn assert_association_type(association: &Association, object: &Entity) -> ModelResult<()> {
    let actual = object.type_name();
    if actual != association.target() {
        return Err(ModelError::InvalidAssociationType {
            expected: association.target().to_owned(),
            actual,
        });
    }
    Ok(())
}

fn assert_embeddable(object: &Entity) -> ModelResult<()> {
    if !object.schema().is_embeddable() {
        return Err(ModelError::NotEmbeddable {
            type_name: object.type_name(),
        });
    }
    Ok(())
}
