//! Lazy, paginated result sets over index queries and full-bucket scans.

use crate::entity::Entity;
use crate::error::{ModelError, ModelResult};
use crate::schema::{AttributeSchema, IndexDefinition};
use crate::session::Session;
use docmap_store::{IndexPage, QueryOptions};
use std::cell::RefCell;
use std::sync::Arc;

/// An index query being paged through.
#[derive(Debug, Clone)]
struct Query {
    index: IndexDefinition,
    value: String,
}

/// A lazy cursor over the records matching an index query or a full
/// bucket scan.
///
/// The set moves through three states: *unfetched* (no store traffic
/// yet), *keys-fetched* (matching keys known, entities not loaded), and
/// *fully-loaded*. Size and emptiness need only the key set;
/// iteration, `first`/`last`, and containment force the entity load. A
/// full-scan set starts keys-fetched, adopting the bucket's key listing.
pub struct ResultSet<'a> {
    session: &'a Session,
    schema: Arc<AttributeSchema>,
    /// `None` for a full-bucket scan.
    query: Option<Query>,
    options: QueryOptions,
    keys: RefCell<Option<IndexPage>>,
    entities: RefCell<Option<Vec<Entity>>>,
}

impl<'a> ResultSet<'a> {
    pub(crate) fn query(
        session: &'a Session,
        schema: Arc<AttributeSchema>,
        index: IndexDefinition,
        value: String,
        options: QueryOptions,
    ) -> Self {
        Self {
            session,
            schema,
            query: Some(Query { index, value }),
            options,
            keys: RefCell::new(None),
            entities: RefCell::new(None),
        }
    }

    pub(crate) fn full_scan(
        session: &'a Session,
        schema: Arc<AttributeSchema>,
        keys: Vec<String>,
    ) -> Self {
        Self {
            session,
            schema,
            query: None,
            options: QueryOptions::default(),
            keys: RefCell::new(Some(IndexPage::complete(keys))),
            entities: RefCell::new(None),
        }
    }

    /// The matching keys, fetching them on first request.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Store`] when the key fetch fails.
    pub fn keys(&self) -> ModelResult<Vec<String>> {
        Ok(self.page()?.keys)
    }

    /// The number of matches, computable without loading entities.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Store`] when the key fetch fails.
    pub fn len(&self) -> ModelResult<usize> {
        Ok(self.page()?.keys.len())
    }

    /// Whether the set matches nothing.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Store`] when the key fetch fails.
    pub fn is_empty(&self) -> ModelResult<bool> {
        Ok(self.page()?.keys.is_empty())
    }

    /// All matching entities, resolved in one batch fetch.
    ///
    /// Keys whose document no longer resolves are skipped.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Store`] when a fetch fails; reconstruction
    /// failures propagate.
    pub fn all(&self) -> ModelResult<Vec<Entity>> {
        if let Some(entities) = self.entities.borrow().as_ref() {
            return Ok(entities.clone());
        }

        let keys = self.keys()?;
        let entities = self
            .session
            .model_of(Arc::clone(&self.schema))
            .batch(&keys)?;
        *self.entities.borrow_mut() = Some(entities.clone());
        Ok(entities)
    }

    /// Iterates over the matching entities, forcing the full load.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Store`] when a fetch fails; reconstruction
    /// failures propagate.
    pub fn iter(&self) -> ModelResult<impl Iterator<Item = Entity>> {
        Ok(self.all()?.into_iter())
    }

    /// The first matching entity.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Store`] when a fetch fails; reconstruction
    /// failures propagate.
    pub fn first(&self) -> ModelResult<Option<Entity>> {
        Ok(self.all()?.first().cloned())
    }

    /// The last matching entity.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Store`] when a fetch fails; reconstruction
    /// failures propagate.
    pub fn last(&self) -> ModelResult<Option<Entity>> {
        Ok(self.all()?.last().cloned())
    }

    /// Whether the set contains the given entity.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Store`] when a fetch fails; reconstruction
    /// failures propagate.
    pub fn contains(&self, entity: &Entity) -> ModelResult<bool> {
        Ok(self.all()?.iter().any(|candidate| candidate == entity))
    }

    /// Whether the most recent key fetch carried a continuation token.
    ///
    /// Forces the key fetch if it has not happened yet.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::Store`] when the key fetch fails.
    pub fn has_next_page(&self) -> ModelResult<bool> {
        Ok(self.page()?.continuation.is_some())
    }

    /// A new, unfetched result set for the next page of the same query.
    ///
    /// # Errors
    ///
    /// Fails with [`ModelError::NoNextPage`] when the current page has no
    /// continuation (including any full-scan set).
    pub fn next_page(&self) -> ModelResult<ResultSet<'a>> {
        let continuation = self
            .page()?
            .continuation
            .ok_or(ModelError::NoNextPage)?;
        let query = self.query.clone().ok_or(ModelError::NoNextPage)?;

        Ok(Self::query(
            self.session,
            Arc::clone(&self.schema),
            query.index,
            query.value,
            self.options.with_continuation(continuation),
        ))
    }

    fn page(&self) -> ModelResult<IndexPage> {
        if let Some(page) = self.keys.borrow().as_ref() {
            return Ok(page.clone());
        }

        // Only query-backed sets can be unfetched.
        let query = self
            .query
            .as_ref()
            .expect("unfetched result set without a query");
        let page = self.session.store().query_index(
            self.schema.bucket_name(),
            &query.index.store_name(),
            &query.value,
            &self.options,
        )?;
        *self.keys.borrow_mut() = Some(page.clone());
        Ok(page)
    }
}

impl std::fmt::Debug for ResultSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("type", &self.schema.type_name())
            .field("query", &self.query)
            .field("options", &self.options)
            .field("fetched", &self.keys.borrow().is_some())
            .finish()
    }
}
