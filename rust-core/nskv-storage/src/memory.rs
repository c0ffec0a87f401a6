// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// In-memory storage backend for nskv.
//
// One `SharedMap` (a `BTreeMap` behind a tokio `RwLock`) hosts any number of
// namespaces. `MemoryStorage` is a cheap view bound to one namespace; clones
// and sibling views share the same physical map. Entries are keyed by the
// composite `InternalKey`, whose ordering keeps each namespace contiguous, so
// namespace-scoped operations walk a range instead of the whole map.

use std::collections::btree_map::Entry as MapEntry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::{EntryStream, NamespacedStorage, TransactionalStorage, UpsertItem};
use crate::batch;
use crate::clamp::{clamp_value, ClampSettings};
use crate::codec;
use crate::error::StorageResult;
use crate::key::InternalKey;
use crate::scan::{self, KeyPattern, Page};

/// Default number of entries a scan reads per lock acquisition.
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 64;

/// The physical map shared by every namespace view. Values are JSON text.
#[derive(Debug, Clone, Default)]
pub struct SharedMap {
    data: Arc<RwLock<BTreeMap<InternalKey, String>>>,
}

impl SharedMap {
    /// Create a new, empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage view bound to `namespace` over this map.
    pub fn namespace(&self, namespace: impl Into<String>) -> MemoryStorage {
        MemoryStorage::with_map(self.clone(), namespace)
    }

    /// Total number of entries across all namespaces.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Return true if no namespace holds any entry.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Distinct namespaces currently holding entries, in sorted order.
    pub async fn namespaces(&self) -> Vec<String> {
        let map = self.data.read().await;
        let mut out: Vec<String> = Vec::new();
        for key in map.keys() {
            if out.last().map(String::as_str) != Some(key.namespace()) {
                out.push(key.namespace().to_string());
            }
        }
        out
    }

    /// Read up to `limit` entries of `namespace` matching `pattern`, strictly
    /// after the logical key `after`.
    async fn page(
        &self,
        namespace: &str,
        pattern: &KeyPattern,
        after: Option<String>,
        limit: usize,
    ) -> StorageResult<Page> {
        let map = self.data.read().await;
        let start = match after {
            Some(key) => Bound::Excluded(InternalKey::new(namespace, key)),
            None => match pattern {
                KeyPattern::StartsWith(prefix) => {
                    Bound::Included(InternalKey::new(namespace, prefix.as_str()))
                }
                _ => Bound::Included(InternalKey::namespace_start(namespace)),
            },
        };

        let mut page = Page::default();
        for (internal, text) in map.range((start, Bound::Unbounded)) {
            if !internal.in_namespace(namespace) {
                break;
            }
            if !pattern.matches(internal.key()) {
                // Keys sharing a prefix are contiguous; past them nothing matches.
                if matches!(pattern, KeyPattern::StartsWith(_)) {
                    break;
                }
                continue;
            }
            if page.entries.len() == limit {
                page.more = true;
                break;
            }
            page.entries.push((internal.key().to_string(), codec::decode(text)?));
        }
        Ok(page)
    }
}

/// An in-memory storage backend bound to one namespace.
///
/// All data lives in process memory and is lost when the last view of the
/// `SharedMap` is dropped.
///
/// # Example
///
/// ```rust
/// use nskv_storage::backend::NamespacedStorage;
/// use nskv_storage::memory::SharedMap;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let map = SharedMap::new();
/// let users = map.namespace("users");
/// let inserted = users
///     .insert_if_not_exists_many(vec![("alice".to_string(), json!(30))], None)
///     .await
///     .unwrap();
/// assert!(inserted["alice"]);
///
/// // Another namespace over the same map does not see the entry.
/// let orders = map.namespace("orders");
/// assert_eq!(orders.size().await.unwrap(), 0);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    map: SharedMap,
    namespace: Arc<str>,
    page_size: usize,
}

impl MemoryStorage {
    /// Create a storage bound to `namespace` over a fresh private map.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::with_map(SharedMap::new(), namespace)
    }

    /// Create a storage bound to `namespace` over an existing map.
    pub fn with_map(map: SharedMap, namespace: impl Into<String>) -> Self {
        let namespace: String = namespace.into();
        Self {
            map,
            namespace: Arc::from(namespace),
            page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }

    /// Set how many entries a scan reads per lock acquisition (at least 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Another view over the same map, bound to a different namespace.
    pub fn sibling(&self, namespace: impl Into<String>) -> Self {
        Self::with_map(self.map.clone(), namespace).with_page_size(self.page_size)
    }

    /// The map this view reads and writes.
    pub fn shared_map(&self) -> &SharedMap {
        &self.map
    }

    fn internal_key(&self, key: &str) -> InternalKey {
        InternalKey::new(&*self.namespace, key)
    }

    fn scan(&self, pattern: KeyPattern) -> EntryStream<'_> {
        debug!(namespace = %self.namespace, pattern = pattern.label(), "memory scan");
        let map = self.map.clone();
        let namespace = Arc::clone(&self.namespace);
        let pattern = Arc::new(pattern);
        let page_size = self.page_size;
        scan::paged(move |after| {
            let map = map.clone();
            let namespace = Arc::clone(&namespace);
            let pattern = Arc::clone(&pattern);
            async move { map.page(&namespace, &pattern, after, page_size).await }
        })
    }

    /// Internal keys of this namespace, in order.
    fn namespace_keys(&self, map: &BTreeMap<InternalKey, String>) -> Vec<InternalKey> {
        map.range(InternalKey::namespace_start(&self.namespace)..)
            .take_while(|(internal, _)| internal.in_namespace(&self.namespace))
            .map(|(internal, _)| internal.clone())
            .collect()
    }
}

#[async_trait]
impl NamespacedStorage for MemoryStorage {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    fn iterate(&self) -> EntryStream<'_> {
        self.scan(KeyPattern::All)
    }

    async fn clear(&self) -> StorageResult<()> {
        let mut map = self.map.data.write().await;
        let keys = self.namespace_keys(&map);
        debug!(namespace = %self.namespace, count = keys.len(), "memory clear");
        for key in keys {
            map.remove(&key);
        }
        Ok(())
    }

    async fn size(&self) -> StorageResult<u64> {
        let map = self.map.data.read().await;
        let count = map
            .range(InternalKey::namespace_start(&self.namespace)..)
            .take_while(|(internal, _)| internal.in_namespace(&self.namespace))
            .count();
        Ok(count as u64)
    }

    async fn get_many(&self, keys: &[String]) -> StorageResult<HashMap<String, Option<Value>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let map = self.map.data.read().await;
        let mut results = HashMap::with_capacity(keys.len());
        for key in batch::distinct_keys(keys) {
            let value = match map.get(&self.internal_key(&key)) {
                Some(text) => Some(codec::decode(text)?),
                None => None,
            };
            results.insert(key, value);
        }
        Ok(results)
    }

    fn get_starts_with_many(&self, prefix: &str) -> EntryStream<'_> {
        self.scan(KeyPattern::StartsWith(prefix.to_string()))
    }

    fn get_ends_with_many(&self, suffix: &str) -> EntryStream<'_> {
        self.scan(KeyPattern::EndsWith(suffix.to_string()))
    }

    fn get_includes_many(&self, substring: &str) -> EntryStream<'_> {
        self.scan(KeyPattern::Includes(substring.to_string()))
    }

    async fn insert_if_not_exists_many(
        &self,
        items: Vec<(String, Value)>,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<HashMap<String, bool>> {
        if items.is_empty() {
            return Ok(HashMap::new());
        }
        let items = batch::first_wins_by(items, |(key, _)| key.as_str());
        debug!(
            namespace = %self.namespace,
            count = items.len(),
            "memory insert_if_not_exists_many"
        );

        let mut map = self.map.data.write().await;
        let mut results = HashMap::with_capacity(items.len());
        for (key, value) in items {
            let inserted = match map.entry(self.internal_key(&key)) {
                MapEntry::Occupied(_) => false,
                MapEntry::Vacant(slot) => {
                    slot.insert(codec::encode(&clamp_value(&value, clamp))?);
                    true
                }
            };
            results.insert(key, inserted);
        }
        Ok(results)
    }

    async fn update_if_exists_many(
        &self,
        items: Vec<(String, Value)>,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<HashMap<String, bool>> {
        if items.is_empty() {
            return Ok(HashMap::new());
        }
        let items = batch::last_wins_by(items, |(key, _)| key.as_str());
        debug!(namespace = %self.namespace, count = items.len(), "memory update_if_exists_many");

        let mut map = self.map.data.write().await;
        let mut results = HashMap::with_capacity(items.len());
        for (key, value) in items {
            let updated = match map.get_mut(&self.internal_key(&key)) {
                Some(slot) => {
                    *slot = codec::encode(&clamp_value(&value, clamp))?;
                    true
                }
                None => false,
            };
            results.insert(key, updated);
        }
        Ok(results)
    }

    async fn insert_or_update_many(
        &self,
        items: Vec<UpsertItem>,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let items = batch::last_wins_by(items, |item| item.key.as_str());
        debug!(namespace = %self.namespace, count = items.len(), "memory insert_or_update_many");

        let mut map = self.map.data.write().await;
        for item in items {
            match map.entry(self.internal_key(&item.key)) {
                MapEntry::Occupied(mut slot) => {
                    slot.insert(codec::encode(&clamp_value(&item.update, clamp))?);
                }
                MapEntry::Vacant(slot) => {
                    slot.insert(codec::encode(&clamp_value(&item.insert, clamp))?);
                }
            }
        }
        Ok(())
    }

    async fn remove_if_exists_many(&self, keys: &[String]) -> StorageResult<HashMap<String, bool>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let mut map = self.map.data.write().await;
        let removed: HashSet<String> = batch::distinct_keys(keys)
            .into_iter()
            .filter(|key| map.remove(&self.internal_key(key)).is_some())
            .collect();
        debug!(
            namespace = %self.namespace,
            removed = removed.len(),
            "memory remove_if_exists_many"
        );
        Ok(batch::flags(keys, &removed))
    }

    async fn has_many(&self, keys: &[String]) -> StorageResult<HashMap<String, bool>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let map = self.map.data.read().await;
        Ok(keys
            .iter()
            .map(|key| (key.clone(), map.contains_key(&self.internal_key(key))))
            .collect())
    }
}

#[async_trait]
impl TransactionalStorage for MemoryStorage {
    /// The in-memory backend has no transactions: `f` runs against `self`
    /// and its writes are applied as they happen.
    async fn transaction<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: for<'s> FnOnce(&'s dyn NamespacedStorage) -> BoxFuture<'s, StorageResult<T>>
            + Send
            + 'static,
    {
        let storage: &dyn NamespacedStorage = self;
        f(storage).await
    }
}
