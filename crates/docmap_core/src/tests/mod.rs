//! Cross-module tests driving the full mapper stack over an in-memory
//! store: persistence lifecycle, association resolution, and result-set
//! pagination.

mod lifecycle;

use crate::{AttributeSchema, Session};
use docmap_store::{
    IndexAssignment, IndexPage, MemoryStore, QueryOptions, RawDocument, StoreClient, StoreError,
    StoreResult,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn attrs(pairs: &[(&str, Value)]) -> RawDocument {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

fn session() -> Session {
    session_over(Arc::new(MemoryStore::new()))
}

/// A session with the shared test vocabulary registered: users writing
/// posts, posts embedding an author and a tag list, a profile per user.
fn session_over(store: Arc<dyn StoreClient>) -> Session {
    let mut session = Session::new(store);
    session.register(
        AttributeSchema::build("User")
            .attribute("name")
            .attribute("email")
            .attribute("nickname")
            .index("name")
            .unique("email")
            .referenced("profile", "Profile")
            .many("posts", "Post")
            .collection("favorites", "Post")
            .finish(),
    );
    session.register(
        AttributeSchema::build("Post")
            .attribute("title")
            .attribute("labels")
            .index("title")
            .index("labels")
            .reference("user", "User")
            .embed("author", "Author")
            .embed_collection("tags", "Tag")
            .finish(),
    );
    session.register(
        AttributeSchema::build("Profile")
            .attribute("bio")
            .reference("user", "User")
            .finish(),
    );
    session.register(
        AttributeSchema::build("Author")
            .attribute("name")
            .embeddable()
            .finish(),
    );
    session.register(
        AttributeSchema::build("Tag")
            .attribute("label")
            .embeddable()
            .finish(),
    );
    session.register(
        AttributeSchema::build("SpecialTag")
            .attribute("label")
            .attribute("weight")
            .embeddable()
            .finish(),
    );
    session
}

/// A store whose writes can be made to fail on demand.
struct FlakyStore {
    inner: MemoryStore,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    fn fail_puts(&self) {
        self.fail_puts.store(true, Ordering::SeqCst);
    }

    fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }
}

impl StoreClient for FlakyStore {
    fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        self.inner.exists(bucket, key)
    }

    fn get(&self, bucket: &str, key: &str) -> StoreResult<Option<RawDocument>> {
        self.inner.get(bucket, key)
    }

    fn put(
        &self,
        bucket: &str,
        key: Option<&str>,
        doc: RawDocument,
        indexes: &[IndexAssignment],
    ) -> StoreResult<String> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected put failure"));
        }
        self.inner.put(bucket, key, doc, indexes)
    }

    fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected delete failure"));
        }
        self.inner.delete(bucket, key)
    }

    fn query_index(
        &self,
        bucket: &str,
        index_name: &str,
        value: &str,
        options: &QueryOptions,
    ) -> StoreResult<IndexPage> {
        self.inner.query_index(bucket, index_name, value, options)
    }

    fn list_keys(&self, bucket: &str) -> StoreResult<Vec<String>> {
        self.inner.list_keys(bucket)
    }

    fn fetch_many(&self, bucket: &str, keys: &[String]) -> StoreResult<Vec<(String, RawDocument)>> {
        self.inner.fetch_many(bucket, keys)
    }
}
