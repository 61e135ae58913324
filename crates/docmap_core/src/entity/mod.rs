//! Entity instances: identity, attribute map, association memo cache,
//! embedded children, and the parent back-reference of embeddable types.

mod associations;
mod persist;

use crate::error::{ModelError, ModelResult};
use crate::schema::{AttributeSchema, TYPE_FIELD};
use docmap_store::RawDocument;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// A record instance of a declared type.
///
/// `Entity` is a cheap-to-clone handle; clones share state and identity.
/// An entity without an id is *new* (unsaved). All attribute access goes
/// through the generic [`get`](Entity::get) / [`set`](Entity::set) /
/// [`has`](Entity::has) accessors, which consult the type's
/// [`AttributeSchema`] for the declared accessor modes.
///
/// # Association caching
///
/// Association reads memoize their resolved objects. Mutating the raw
/// backing slot afterwards (the `{name}_id` attribute, the `{name}_ids`
/// list, or an embedded snapshot) does **not** invalidate the memo, so a
/// later association read may return a stale object. Call
/// [`refresh`](Entity::refresh) to force re-resolution.
///
/// # Threading
///
/// Entities are instance-local, single-threaded values (`Rc`-based); the
/// shared store handle is the only cross-thread object.
#[derive(Clone)]
pub struct Entity {
    pub(crate) inner: Rc<RefCell<EntityInner>>,
}

pub(crate) struct EntityInner {
    pub(crate) schema: Arc<AttributeSchema>,
    pub(crate) id: Option<String>,
    pub(crate) attributes: RawDocument,
    /// Raw embedded snapshots, keyed by embedded field name.
    pub(crate) embedding: RawDocument,
    /// Memoized association resolutions, keyed by association name.
    pub(crate) memo: HashMap<String, Cached>,
    /// Back-reference of an embeddable instance to its owning parent.
    pub(crate) parent: Option<Weak<RefCell<EntityInner>>>,
    pub(crate) frozen: bool,
}

#[derive(Clone)]
pub(crate) enum Cached {
    One(Entity),
    Many(Vec<Entity>),
}

impl Entity {
    /// Creates a new in-memory entity from an attribute map.
    ///
    /// Declared defaults apply first, then `attributes` on top of them.
    /// Every incoming attribute must be declared with a writer.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAttribute`] for an undeclared incoming
    /// attribute and [`ModelError::AccessorMissing`] when one lacks a writer.
    pub fn new(schema: &Arc<AttributeSchema>, attributes: RawDocument) -> ModelResult<Self> {
        let entity = Self::blank(Arc::clone(schema));
        {
            let mut inner = entity.inner.borrow_mut();
            for name in schema.attributes() {
                if let Some(default) = schema.default(name) {
                    inner.attributes.insert(name.clone(), default.clone());
                }
            }
        }
        entity.update_attributes(attributes)?;
        Ok(entity)
    }

    pub(crate) fn blank(schema: Arc<AttributeSchema>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EntityInner {
                schema,
                id: None,
                attributes: RawDocument::new(),
                embedding: RawDocument::new(),
                memo: HashMap::new(),
                parent: None,
                frozen: false,
            })),
        }
    }

    /// The entity's schema.
    #[must_use]
    pub fn schema(&self) -> Arc<AttributeSchema> {
        Arc::clone(&self.inner.borrow().schema)
    }

    /// The declared type name.
    #[must_use]
    pub fn type_name(&self) -> String {
        self.inner.borrow().schema.type_name().to_owned()
    }

    /// The store key, absent while the entity is unsaved.
    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.inner.borrow().id.clone()
    }

    /// Whether the entity has never been saved.
    ///
    /// An embeddable entity is new iff its parent is (or it has no parent
    /// yet); it shares the parent's persistence lifecycle.
    #[must_use]
    pub fn is_new(&self) -> bool {
        let embeddable = self.inner.borrow().schema.is_embeddable();
        if embeddable {
            self.parent().map_or(true, |parent| parent.is_new())
        } else {
            self.inner.borrow().id.is_none()
        }
    }

    /// Whether the entity was deleted and is now immutable.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.inner.borrow().frozen
    }

    /// Reads a declared attribute through its reader.
    ///
    /// Returns the stored value, the declared default when nothing is
    /// stored, or `Null`.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAttribute`] for an undeclared
    /// attribute and [`ModelError::AccessorMissing`] when no reader is
    /// declared.
    pub fn get(&self, attribute: &str) -> ModelResult<Value> {
        let inner = self.inner.borrow();
        let accessors = inner
            .schema
            .accessors(attribute)
            .ok_or_else(|| ModelError::unknown_attribute(inner.schema.type_name(), attribute))?;
        if !accessors.reader {
            return Err(ModelError::AccessorMissing {
                attribute: attribute.to_owned(),
                mode: "reader",
            });
        }
        Ok(inner
            .attributes
            .get(attribute)
            .or_else(|| inner.schema.default(attribute))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Writes a declared attribute through its writer.
    ///
    /// The value is stored unchanged; there is no coercion or validation
    /// layer. Does **not** invalidate association memos backed by this
    /// slot (see the type-level caching contract).
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Frozen`] after deletion,
    /// [`ModelError::UnknownAttribute`] for an undeclared attribute, and
    /// [`ModelError::AccessorMissing`] when no writer is declared.
    pub fn set(&self, attribute: &str, value: Value) -> ModelResult<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.frozen {
            return Err(ModelError::Frozen);
        }
        let accessors = inner
            .schema
            .accessors(attribute)
            .ok_or_else(|| ModelError::unknown_attribute(inner.schema.type_name(), attribute))?;
        if !accessors.writer {
            return Err(ModelError::AccessorMissing {
                attribute: attribute.to_owned(),
                mode: "writer",
            });
        }
        inner.attributes.insert(attribute.to_owned(), value);
        Ok(())
    }

    /// Tests a declared attribute through its presence predicate.
    ///
    /// Truthiness of the stored (or default) value: `null` and `false`
    /// are false, everything else is true.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::UnknownAttribute`] for an undeclared
    /// attribute and [`ModelError::AccessorMissing`] when no predicate is
    /// declared.
    pub fn has(&self, attribute: &str) -> ModelResult<bool> {
        let inner = self.inner.borrow();
        let accessors = inner
            .schema
            .accessors(attribute)
            .ok_or_else(|| ModelError::unknown_attribute(inner.schema.type_name(), attribute))?;
        if !accessors.predicate {
            return Err(ModelError::AccessorMissing {
                attribute: attribute.to_owned(),
                mode: "predicate",
            });
        }
        let value = inner
            .attributes
            .get(attribute)
            .or_else(|| inner.schema.default(attribute));
        Ok(!matches!(value, None | Some(Value::Null) | Some(Value::Bool(false))))
    }

    /// Writes a dictionary of attributes to the entity.
    ///
    /// The reserved discriminator field is dropped before assignment.
    ///
    /// # Errors
    ///
    /// Fails as [`Entity::set`] does, per incoming attribute.
    pub fn update_attributes(&self, mut attributes: RawDocument) -> ModelResult<()> {
        attributes.remove(TYPE_FIELD);
        for (name, value) in attributes {
            self.set(&name, value)?;
        }
        Ok(())
    }

    /// A snapshot of the current attribute map.
    #[must_use]
    pub fn attributes(&self) -> RawDocument {
        self.inner.borrow().attributes.clone()
    }

    /// The owning parent of an embeddable entity.
    ///
    /// Accessing the parent before assignment (or after the parent was
    /// dropped) is an error.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::ParentMissing`] when no parent is assigned
    /// or the parent was dropped.
    pub fn parent(&self) -> ModelResult<Entity> {
        self.inner
            .borrow()
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Entity { inner })
            .ok_or(ModelError::ParentMissing)
    }

    pub(crate) fn set_parent(&self, parent: Option<&Entity>) {
        self.inner.borrow_mut().parent = parent.map(|p| Rc::downgrade(&p.inner));
    }

    /// Drops the memoized resolution of one association, forcing the next
    /// read to re-resolve from the raw slot.
    pub fn refresh(&self, name: &str) {
        self.inner.borrow_mut().memo.remove(name);
    }

    pub(crate) fn freeze(&self) {
        self.inner.borrow_mut().frozen = true;
    }

    /// Whether two handles share the same underlying instance.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Entity {
    /// Identified types compare by declared type and id (two unsaved
    /// instances of the same type compare equal on the absent id).
    /// Embeddable types have no identity; they compare by declared type
    /// and attribute content, the parent slot excluded.
    fn eq(&self, other: &Self) -> bool {
        if self.same_instance(other) {
            return true;
        }
        let a = self.inner.borrow();
        let b = other.inner.borrow();
        if a.schema.type_name() != b.schema.type_name() {
            return false;
        }
        if a.schema.is_embeddable() {
            a.attributes == b.attributes && a.embedding == b.embedding
        } else {
            a.id == b.id
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        if inner.schema.is_embeddable() {
            write!(
                f,
                "#<{} {}>",
                inner.schema.type_name(),
                Value::Object(inner.attributes.clone())
            )
        } else {
            write!(
                f,
                "#<{}:{} {}>",
                inner.schema.type_name(),
                inner.id.as_deref().unwrap_or("nil"),
                Value::Object(inner.attributes.clone())
            )
        }
    }
}
