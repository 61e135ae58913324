//! Association descriptors.
//!
//! Associations are declared on the schema and resolved at runtime against
//! the model registry, so cooperating types may refer to each other by
//! name regardless of declaration order.

/// The relationship kinds a schema can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// Owning reference: a foreign-id attribute plus an index on it.
    Reference,
    /// Reverse single lookup: first record whose reference id equals self.
    Referenced,
    /// Reverse collection: every record whose reference id equals self.
    Many,
    /// Owning ordered id list with batch lookup.
    Collection,
    /// Single embedded sub-document.
    Embed,
    /// Ordered sequence of embedded sub-documents.
    EmbedCollection,
}

/// One declared association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub(crate) kind: AssociationKind,
    pub(crate) name: String,
    pub(crate) target: String,
    /// For reverse lookups: the name under which the *target* type
    /// references self, i.e. it queries the target's `{reference}_id`.
    pub(crate) reference: Option<String>,
}

impl Association {
    pub(crate) fn new(
        kind: AssociationKind,
        name: impl Into<String>,
        target: impl Into<String>,
        reference: Option<String>,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            target: target.into(),
            reference,
        }
    }

    /// The association kind.
    #[must_use]
    pub const fn kind(&self) -> AssociationKind {
        self.kind
    }

    /// The association name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The target type name, resolved through the registry on access.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The foreign-id attribute slot of a `Reference` association.
    #[must_use]
    pub fn id_attribute(&self) -> String {
        format!("{}_id", self.name)
    }

    /// The id-list attribute slot of a `Collection` association.
    #[must_use]
    pub fn ids_attribute(&self) -> String {
        format!("{}_ids", self.name)
    }

    /// The target-side foreign-id attribute a reverse lookup queries.
    pub(crate) fn reference_attribute(&self, default_reference: &str) -> String {
        let reference = self.reference.as_deref().unwrap_or(default_reference);
        format!("{reference}_id")
    }
}
