//! Attribute schemas: the per-type registry of declared attributes,
//! defaults, accessor modes, indices, uniques, associations, and embedded
//! fields.
//!
//! Where a dynamic language would synthesize accessor methods per declared
//! name, the schema here is a static table consulted by the generic
//! `get`/`set`/`has` functions on [`crate::Entity`].

mod association;
mod index;

pub use association::{Association, AssociationKind};
pub use index::{IndexDefinition, IndexKind};

pub(crate) use index::encode_scalar;

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Default name of the slot an embeddable type reserves for its parent
/// back-reference. The slot never serializes.
pub const DEFAULT_PARENT_KEY: &str = "_parent";

/// The reserved type-discriminator field.
pub const TYPE_FIELD: &str = "_type";

/// Which generic accessors an attribute exposes.
///
/// The default for a plain `attribute` declaration is reader + writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessorSet {
    /// `Entity::get` is allowed.
    pub reader: bool,
    /// `Entity::set` is allowed.
    pub writer: bool,
    /// `Entity::has` is allowed.
    pub predicate: bool,
}

impl AccessorSet {
    /// Reader and writer, the default accessor set.
    #[must_use]
    pub const fn read_write() -> Self {
        Self {
            reader: true,
            writer: true,
            predicate: false,
        }
    }

    /// Parses accessor-mode tokens.
    ///
    /// Recognized tokens are `"reader"`, `"writer"` and `"predicate"`. An
    /// unrecognized token contributes no accessor for any mode and is
    /// *not* an error; callers that rely on a mode being present must test
    /// for it explicitly.
    #[must_use]
    pub fn from_tokens(tokens: &[&str]) -> Self {
        let mut set = Self::default();
        for token in tokens {
            match *token {
                "reader" => set.reader = true,
                "writer" => set.writer = true,
                "predicate" => set.predicate = true,
                _ => {}
            }
        }
        set
    }
}

/// The immutable per-type schema.
///
/// Built once per declared type via [`AttributeSchema::build`] and shared
/// behind an `Arc` through the [`crate::ModelRegistry`].
#[derive(Debug)]
pub struct AttributeSchema {
    type_name: String,
    bucket_name: String,
    attributes: Vec<String>,
    defaults: HashMap<String, Value>,
    accessors: HashMap<String, AccessorSet>,
    indices: BTreeMap<String, IndexDefinition>,
    uniques: Vec<String>,
    embedded: Vec<String>,
    associations: HashMap<String, Association>,
    embeddable: bool,
    parent_key: String,
}

impl AttributeSchema {
    /// Starts building a schema for the given type name.
    ///
    /// The type name doubles as the discriminator value written into the
    /// persisted form; the bucket name defaults to its lowercase.
    #[must_use]
    pub fn build(type_name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(type_name)
    }

    /// The declared type name (and discriminator value).
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The bucket holding documents of this type.
    #[must_use]
    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    /// Declared attribute names in declaration order.
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Whether `attribute` is a declared slot.
    #[must_use]
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.accessors.contains_key(attribute)
    }

    /// The declared default for an attribute, if any.
    #[must_use]
    pub fn default(&self, attribute: &str) -> Option<&Value> {
        self.defaults.get(attribute)
    }

    /// The accessor set of a declared attribute.
    #[must_use]
    pub fn accessors(&self, attribute: &str) -> Option<AccessorSet> {
        self.accessors.get(attribute).copied()
    }

    /// The index declared on `attribute`, if any.
    #[must_use]
    pub fn index_for(&self, attribute: &str) -> Option<&IndexDefinition> {
        self.indices.get(attribute)
    }

    /// All declared indices, keyed by source attribute.
    pub fn indices(&self) -> impl Iterator<Item = &IndexDefinition> {
        self.indices.values()
    }

    /// Attributes declared unique, in declaration order.
    ///
    /// Every unique attribute has a corresponding index by construction.
    #[must_use]
    pub fn uniques(&self) -> &[String] {
        &self.uniques
    }

    /// Embedded field names in declaration order.
    #[must_use]
    pub fn embedded_fields(&self) -> &[String] {
        &self.embedded
    }

    /// The declared association named `name`, if any.
    #[must_use]
    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.get(name)
    }

    /// Whether instances of this type embed into a parent record.
    #[must_use]
    pub const fn is_embeddable(&self) -> bool {
        self.embeddable
    }

    /// The slot name reserved for the parent back-reference.
    #[must_use]
    pub fn parent_key(&self) -> &str {
        &self.parent_key
    }

    /// The name a reverse lookup defaults to when the target references
    /// this type: the lowercased type name.
    pub(crate) fn default_reference(&self) -> String {
        snake_case(&self.type_name)
    }
}

impl PartialEq for AttributeSchema {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

/// Builder for [`AttributeSchema`].
#[derive(Debug)]
pub struct SchemaBuilder {
    schema: AttributeSchema,
}

impl SchemaBuilder {
    fn new(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let bucket_name = type_name.to_lowercase();
        Self {
            schema: AttributeSchema {
                type_name,
                bucket_name,
                attributes: Vec::new(),
                defaults: HashMap::new(),
                accessors: HashMap::new(),
                indices: BTreeMap::new(),
                uniques: Vec::new(),
                embedded: Vec::new(),
                associations: HashMap::new(),
                embeddable: false,
                parent_key: DEFAULT_PARENT_KEY.to_owned(),
            },
        }
    }

    /// Overrides the bucket name.
    #[must_use]
    pub fn bucket(mut self, name: impl Into<String>) -> Self {
        self.schema.bucket_name = name.into();
        self
    }

    /// Declares a persisted attribute with the default accessor set.
    ///
    /// Redeclaring an existing name is a registration no-op.
    #[must_use]
    pub fn attribute(self, name: impl Into<String>) -> Self {
        self.declare(name.into(), AccessorSet::read_write(), None)
    }

    /// Declares an attribute with a default value.
    ///
    /// Redeclaring updates the default even though registration is a no-op.
    #[must_use]
    pub fn attribute_default(self, name: impl Into<String>, default: Value) -> Self {
        self.declare(name.into(), AccessorSet::read_write(), Some(default))
    }

    /// Declares an attribute with explicit accessor-mode tokens.
    ///
    /// See [`AccessorSet::from_tokens`] for the unrecognized-token quirk.
    #[must_use]
    pub fn attribute_with_accessors(self, name: impl Into<String>, tokens: &[&str]) -> Self {
        self.declare(name.into(), AccessorSet::from_tokens(tokens), None)
    }

    /// Declares a secondary index on an attribute.
    #[must_use]
    pub fn index(self, attribute: impl Into<String>) -> Self {
        self.index_kind(attribute, IndexKind::Binary)
    }

    /// Declares a secondary index of the given kind.
    #[must_use]
    pub fn index_kind(mut self, attribute: impl Into<String>, kind: IndexKind) -> Self {
        let attribute = attribute.into();
        self.schema
            .indices
            .entry(attribute.clone())
            .or_insert_with(|| IndexDefinition::with_kind(attribute, kind));
        self
    }

    /// Declares an attribute unique.
    ///
    /// Implies an index on the attribute, so the "unique implies indexed"
    /// invariant holds by construction. The check-then-write enforcement
    /// is best-effort; see `Entity::save`.
    #[must_use]
    pub fn unique(mut self, attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        if !self.schema.uniques.contains(&attribute) {
            self.schema.uniques.push(attribute.clone());
        }
        self.index(attribute)
    }

    /// Declares an owning reference to `target`.
    ///
    /// Registers a `{name}_id` attribute plus an index on it; the
    /// high-level accessors live on `Entity`.
    #[must_use]
    pub fn reference(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let association =
            Association::new(AssociationKind::Reference, name.into(), target.into(), None);
        let id_attribute = association.id_attribute();

        self = self
            .declare(id_attribute.clone(), AccessorSet::read_write(), None)
            .index(id_attribute);
        self.schema
            .associations
            .insert(association.name.clone(), association);
        self
    }

    /// Declares a reverse single lookup on `target`.
    ///
    /// Reads query the target's `{reference}_id` index for self's id,
    /// where `reference` defaults to this type's lowercased name.
    #[must_use]
    pub fn referenced(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.push_association(AssociationKind::Referenced, name, target, None)
    }

    /// Declares a reverse single lookup with an explicit reference name.
    #[must_use]
    pub fn referenced_as(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        self.push_association(AssociationKind::Referenced, name, target, Some(reference.into()))
    }

    /// Declares a reverse collection on `target`.
    #[must_use]
    pub fn many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.push_association(AssociationKind::Many, name, target, None)
    }

    /// Declares a reverse collection with an explicit reference name.
    #[must_use]
    pub fn many_as(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        self.push_association(AssociationKind::Many, name, target, Some(reference.into()))
    }

    /// Declares an owning id-list collection of `target`.
    ///
    /// Registers a `{name}_ids` attribute holding the ordered id list.
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let association =
            Association::new(AssociationKind::Collection, name.into(), target.into(), None);
        self = self.declare(association.ids_attribute(), AccessorSet::read_write(), None);
        self.schema
            .associations
            .insert(association.name.clone(), association);
        self
    }

    /// Declares a single embedded field of `target`.
    #[must_use]
    pub fn embed(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let name = name.into();
        if !self.schema.embedded.contains(&name) {
            self.schema.embedded.push(name.clone());
        }
        self.push_association(AssociationKind::Embed, name, target, None)
    }

    /// Declares an embedded collection field of `target`.
    #[must_use]
    pub fn embed_collection(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let name = name.into();
        if !self.schema.embedded.contains(&name) {
            self.schema.embedded.push(name.clone());
        }
        self.push_association(AssociationKind::EmbedCollection, name, target, None)
    }

    /// Marks this type embeddable.
    ///
    /// Embeddable instances live inside exactly one parent record and have
    /// no identity or persistence lifecycle of their own.
    #[must_use]
    pub fn embeddable(mut self) -> Self {
        self.schema.embeddable = true;
        self
    }

    /// Overrides the parent back-reference slot name.
    #[must_use]
    pub fn parent_key(mut self, name: impl Into<String>) -> Self {
        self.schema.parent_key = name.into();
        self
    }

    /// Finishes the schema.
    #[must_use]
    pub fn finish(self) -> Arc<AttributeSchema> {
        Arc::new(self.schema)
    }

    fn declare(mut self, name: String, accessors: AccessorSet, default: Option<Value>) -> Self {
        if !self.schema.accessors.contains_key(&name) {
            self.schema.attributes.push(name.clone());
            self.schema.accessors.insert(name.clone(), accessors);
        }
        if let Some(default) = default {
            self.schema.defaults.insert(name, default);
        }
        self
    }

    fn push_association(
        mut self,
        kind: AssociationKind,
        name: impl Into<String>,
        target: impl Into<String>,
        reference: Option<String>,
    ) -> Self {
        let association = Association::new(kind, name.into(), target.into(), reference);
        self.schema
            .associations
            .insert(association.name.clone(), association);
        self
    }
}

/// Lowercases a CamelCase type name with underscores between words.
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attributes_keep_declaration_order() {
        let schema = AttributeSchema::build("Event")
            .attribute("name")
            .attribute("location")
            .finish();
        assert_eq!(schema.attributes(), ["name", "location"]);
    }

    #[test]
    fn redeclaring_is_a_registration_noop_but_updates_default() {
        let schema = AttributeSchema::build("Event")
            .attribute("name")
            .attribute_default("name", json!("untitled"))
            .finish();
        assert_eq!(schema.attributes(), ["name"]);
        assert_eq!(schema.default("name"), Some(&json!("untitled")));
    }

    #[test]
    fn default_accessor_set_is_reader_writer() {
        let schema = AttributeSchema::build("Event").attribute("name").finish();
        let set = schema.accessors("name").unwrap();
        assert!(set.reader && set.writer && !set.predicate);
    }

    #[test]
    fn unrecognized_accessor_token_generates_nothing() {
        let set = AccessorSet::from_tokens(&["reader", "frobnicate"]);
        assert!(set.reader && !set.writer && !set.predicate);

        // A wholly unrecognized token list leaves every mode off, without
        // erroring. Callers must test for the modes they rely on.
        let none = AccessorSet::from_tokens(&["getter"]);
        assert_eq!(none, AccessorSet::default());
    }

    #[test]
    fn bucket_name_defaults_to_lowercase_type_name() {
        let schema = AttributeSchema::build("Event").finish();
        assert_eq!(schema.bucket_name(), "event");

        let custom = AttributeSchema::build("Event").bucket("happenings").finish();
        assert_eq!(custom.bucket_name(), "happenings");
    }

    #[test]
    fn unique_implies_index() {
        let schema = AttributeSchema::build("Event")
            .attribute("name")
            .unique("name")
            .finish();
        assert_eq!(schema.uniques(), ["name"]);
        assert_eq!(schema.index_for("name").unwrap().store_name(), "name_bin");
    }

    #[test]
    fn reference_declares_id_attribute_and_index() {
        let schema = AttributeSchema::build("Post")
            .reference("author", "User")
            .finish();
        assert!(schema.has_attribute("author_id"));
        assert!(schema.index_for("author_id").is_some());
        let association = schema.association("author").unwrap();
        assert_eq!(association.kind(), AssociationKind::Reference);
        assert_eq!(association.target(), "User");
    }

    #[test]
    fn collection_declares_ids_attribute() {
        let schema = AttributeSchema::build("User")
            .collection("posts", "Post")
            .finish();
        assert!(schema.has_attribute("posts_ids"));
        assert!(schema.index_for("posts_ids").is_none());
    }

    #[test]
    fn embed_registers_embedded_field_order() {
        let schema = AttributeSchema::build("Post")
            .embed("author", "Author")
            .embed_collection("tags", "Tag")
            .finish();
        assert_eq!(schema.embedded_fields(), ["author", "tags"]);
    }

    #[test]
    fn default_reference_is_snake_cased_type_name() {
        assert_eq!(AttributeSchema::build("BlogPost").finish().default_reference(), "blog_post");
        assert_eq!(AttributeSchema::build("User").finish().default_reference(), "user");
    }
}
