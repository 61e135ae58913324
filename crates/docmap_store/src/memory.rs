//! In-memory store for testing.

use crate::client::{IndexAssignment, IndexPage, QueryOptions, RawDocument, StoreClient};
use crate::error::StoreResult;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

/// A stored document together with its current index assignments.
#[derive(Debug, Clone)]
struct StoredDoc {
    doc: RawDocument,
    indexes: HashMap<String, BTreeSet<String>>,
}

/// An in-memory document store.
///
/// Holds buckets of documents and maintains their secondary index
/// assignments, mirroring the remote store's contract closely enough for
/// unit and integration tests:
///
/// - keys are assigned as UUIDs when the caller does not supply one
/// - index queries return keys in sorted order
/// - pagination hands out an opaque continuation token (the last returned
///   key) whenever more matches remain
///
/// # Thread Safety
///
/// The store is thread-safe and can be shared behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, StoredDoc>>>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents in a bucket.
    ///
    /// Useful for test assertions.
    #[must_use]
    pub fn bucket_len(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .get(bucket)
            .map_or(0, BTreeMap::len)
    }

    /// Removes every document from every bucket.
    pub fn clear(&self) {
        self.buckets.write().clear();
    }

    fn matching_keys(
        bucket: &BTreeMap<String, StoredDoc>,
        index_name: &str,
        value: &str,
    ) -> Vec<String> {
        bucket
            .iter()
            .filter(|(_, stored)| {
                stored
                    .indexes
                    .get(index_name)
                    .is_some_and(|values| values.contains(value))
            })
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl StoreClient for MemoryStore {
    fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        Ok(self
            .buckets
            .read()
            .get(bucket)
            .is_some_and(|b| b.contains_key(key)))
    }

    fn get(&self, bucket: &str, key: &str) -> StoreResult<Option<RawDocument>> {
        Ok(self
            .buckets
            .read()
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|stored| stored.doc.clone()))
    }

    fn put(
        &self,
        bucket: &str,
        key: Option<&str>,
        doc: RawDocument,
        indexes: &[IndexAssignment],
    ) -> StoreResult<String> {
        let key = key.map_or_else(|| Uuid::new_v4().simple().to_string(), str::to_owned);

        let index_map = indexes
            .iter()
            .filter(|a| !a.values.is_empty())
            .map(|a| (a.index_name.clone(), a.values.clone()))
            .collect();

        tracing::trace!(bucket, key = %key, "put document");
        self.buckets.write().entry(bucket.to_owned()).or_default().insert(
            key.clone(),
            StoredDoc {
                doc,
                indexes: index_map,
            },
        );

        Ok(key)
    }

    fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        tracing::trace!(bucket, key, "delete document");
        if let Some(b) = self.buckets.write().get_mut(bucket) {
            b.remove(key);
        }
        Ok(())
    }

    fn query_index(
        &self,
        bucket: &str,
        index_name: &str,
        value: &str,
        options: &QueryOptions,
    ) -> StoreResult<IndexPage> {
        let buckets = self.buckets.read();
        let Some(b) = buckets.get(bucket) else {
            return Ok(IndexPage::complete(Vec::new()));
        };

        // BTreeMap iteration keeps the match set sorted, so "every key
        // after the token" positions the next page correctly even when
        // keys were deleted in between.
        let mut matches = Self::matching_keys(b, index_name, value);
        if let Some(token) = &options.continuation {
            matches.retain(|key| key.as_str() > token.as_str());
        }

        let page = match options.max_results {
            Some(max) if matches.len() > max => {
                matches.truncate(max);
                let continuation = matches.last().cloned();
                IndexPage {
                    keys: matches,
                    continuation,
                }
            }
            _ => IndexPage::complete(matches),
        };

        Ok(page)
    }

    fn list_keys(&self, bucket: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .buckets
            .read()
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn fetch_many(&self, bucket: &str, keys: &[String]) -> StoreResult<Vec<(String, RawDocument)>> {
        let buckets = self.buckets.read();
        let Some(b) = buckets.get(bucket) else {
            return Ok(Vec::new());
        };

        Ok(keys
            .iter()
            .filter_map(|key| b.get(key).map(|stored| (key.clone(), stored.doc.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(pairs: &[(&str, serde_json::Value)]) -> RawDocument {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn put_assigns_key_when_absent() {
        let store = MemoryStore::new();
        let key = store.put("events", None, doc(&[]), &[]).unwrap();
        assert!(!key.is_empty());
        assert!(store.exists("events", &key).unwrap());
    }

    #[test]
    fn put_and_get_round_trip() {
        let store = MemoryStore::new();
        let d = doc(&[("name", json!("Ada")), ("tags", json!(["a", "b"]))]);
        let key = store.put("events", Some("k1"), d.clone(), &[]).unwrap();

        assert_eq!(key, "k1");
        assert_eq!(store.get("events", "k1").unwrap(), Some(d));
    }

    #[test]
    fn get_absent_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("events", "nope").unwrap(), None);
    }

    #[test]
    fn delete_absent_is_ok() {
        let store = MemoryStore::new();
        store.delete("events", "nope").unwrap();
    }

    #[test]
    fn query_index_equality() {
        let store = MemoryStore::new();
        store
            .put(
                "events",
                Some("k1"),
                doc(&[]),
                &[IndexAssignment::single("location_bin", "berlin")],
            )
            .unwrap();
        store
            .put(
                "events",
                Some("k2"),
                doc(&[]),
                &[IndexAssignment::single("location_bin", "lima")],
            )
            .unwrap();

        let page = store
            .query_index("events", "location_bin", "berlin", &QueryOptions::default())
            .unwrap();
        assert_eq!(page.keys, vec!["k1"]);
        assert_eq!(page.continuation, None);
    }

    #[test]
    fn reput_replaces_index_assignments() {
        let store = MemoryStore::new();
        store
            .put(
                "events",
                Some("k1"),
                doc(&[]),
                &[IndexAssignment::single("location_bin", "berlin")],
            )
            .unwrap();
        store
            .put(
                "events",
                Some("k1"),
                doc(&[]),
                &[IndexAssignment::single("location_bin", "lima")],
            )
            .unwrap();

        let old = store
            .query_index("events", "location_bin", "berlin", &QueryOptions::default())
            .unwrap();
        assert!(old.keys.is_empty());

        let new = store
            .query_index("events", "location_bin", "lima", &QueryOptions::default())
            .unwrap();
        assert_eq!(new.keys, vec!["k1"]);
    }

    #[test]
    fn multi_valued_index_matches_each_element() {
        let store = MemoryStore::new();
        let values: BTreeSet<String> = ["rust", "db"].iter().map(|s| (*s).to_owned()).collect();
        store
            .put(
                "posts",
                Some("k1"),
                doc(&[]),
                &[IndexAssignment::new("tags_bin", values)],
            )
            .unwrap();

        for tag in ["rust", "db"] {
            let page = store
                .query_index("posts", "tags_bin", tag, &QueryOptions::default())
                .unwrap();
            assert_eq!(page.keys, vec!["k1"], "tag {tag}");
        }
    }

    #[test]
    fn pagination_walks_every_key_exactly_once() {
        let store = MemoryStore::new();
        for i in 0..7 {
            store
                .put(
                    "events",
                    Some(&format!("k{i}")),
                    doc(&[]),
                    &[IndexAssignment::single("location_bin", "berlin")],
                )
                .unwrap();
        }

        let mut options = QueryOptions::max_results(3);
        let mut seen = Vec::new();
        loop {
            let page = store
                .query_index("events", "location_bin", "berlin", &options)
                .unwrap();
            seen.extend(page.keys);
            match page.continuation {
                Some(token) => options = options.with_continuation(token),
                None => break,
            }
        }

        let expected: Vec<String> = (0..7).map(|i| format!("k{i}")).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn page_shorter_than_max_has_no_continuation() {
        let store = MemoryStore::new();
        store
            .put(
                "events",
                Some("k1"),
                doc(&[]),
                &[IndexAssignment::single("location_bin", "berlin")],
            )
            .unwrap();

        let page = store
            .query_index("events", "location_bin", "berlin", &QueryOptions::max_results(5))
            .unwrap();
        assert_eq!(page.keys.len(), 1);
        assert_eq!(page.continuation, None);
    }

    #[test]
    fn zero_page_size_yields_an_empty_complete_page() {
        let store = MemoryStore::new();
        store
            .put(
                "events",
                Some("k1"),
                doc(&[]),
                &[IndexAssignment::single("location_bin", "berlin")],
            )
            .unwrap();

        let page = store
            .query_index("events", "location_bin", "berlin", &QueryOptions::max_results(0))
            .unwrap();
        assert!(page.keys.is_empty());
        assert_eq!(page.continuation, None);
    }

    #[test]
    fn unknown_index_yields_empty_page() {
        let store = MemoryStore::new();
        store.put("events", Some("k1"), doc(&[]), &[]).unwrap();

        let page = store
            .query_index("events", "mystery_bin", "x", &QueryOptions::default())
            .unwrap();
        assert!(page.keys.is_empty());
    }

    #[test]
    fn list_keys_returns_all() {
        let store = MemoryStore::new();
        store.put("events", Some("b"), doc(&[]), &[]).unwrap();
        store.put("events", Some("a"), doc(&[]), &[]).unwrap();

        assert_eq!(store.list_keys("events").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn fetch_many_skips_missing_keys() {
        let store = MemoryStore::new();
        store.put("events", Some("a"), doc(&[("n", json!(1))]), &[]).unwrap();

        let keys = vec!["a".to_owned(), "gone".to_owned()];
        let fetched = store.fetch_many("events", &keys).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].0, "a");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Paginated walks must visit every matching key exactly once,
            // for any key population and page size.
            #[test]
            fn pagination_is_exhaustive_and_duplicate_free(
                count in 0usize..40,
                page_size in 1usize..10,
            ) {
                let store = MemoryStore::new();
                for i in 0..count {
                    store
                        .put(
                            "b",
                            Some(&format!("key-{i:03}")),
                            doc(&[]),
                            &[IndexAssignment::single("group_bin", "g")],
                        )
                        .unwrap();
                }

                let mut options = QueryOptions::max_results(page_size);
                let mut seen = Vec::new();
                loop {
                    let page = store.query_index("b", "group_bin", "g", &options).unwrap();
                    prop_assert!(page.keys.len() <= page_size);
                    seen.extend(page.keys);
                    match page.continuation {
                        Some(token) => options = options.with_continuation(token),
                        None => break,
                    }
                }

                let expected: Vec<String> = (0..count).map(|i| format!("key-{i:03}")).collect();
                prop_assert_eq!(seen, expected);
            }
        }
    }
}
