// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// Core storage contract for nskv.
//
// `NamespacedStorage` is the interface every backend satisfies. An instance
// is bound to exactly one namespace; entries of other namespaces sharing the
// same physical map or table are invisible to it and never mutated. Batch
// operations report one result per key. Scans are lazy streams.
//
// `TransactionalStorage` adds `transaction`, which is generic and therefore
// kept out of the object-safe core trait.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::clamp::ClampSettings;
use crate::error::StorageResult;

/// A `(key, value)` pair of the bound namespace.
pub type Entry = (String, Value);

/// Lazy stream of entries produced by `iterate` and the pattern scans.
pub type EntryStream<'a> = BoxStream<'a, StorageResult<Entry>>;

/// One item of `insert_or_update_many`: the value written when the key is
/// absent and the value written when it is present.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertItem {
    pub key: String,
    pub insert: Value,
    pub update: Value,
}

impl UpsertItem {
    pub fn new(key: impl Into<String>, insert: Value, update: Value) -> Self {
        Self {
            key: key.into(),
            insert,
            update,
        }
    }
}

/// A key-value store scoped to a single namespace.
///
/// Implementations must be safe to share across threads and tokio tasks.
#[async_trait]
pub trait NamespacedStorage: Send + Sync {
    /// The namespace this instance is bound to.
    fn namespace(&self) -> &str;

    /// A human-readable backend name, used in logging and metrics.
    fn backend_name(&self) -> &'static str;

    /// Stream every entry of the namespace.
    ///
    /// Each call starts a fresh scan. The stream is finite; whether it
    /// reflects writes made while it is consumed is backend-dependent.
    fn iterate(&self) -> EntryStream<'_>;

    /// Remove every entry of the namespace. A no-op for an empty namespace.
    async fn clear(&self) -> StorageResult<()>;

    /// Number of entries in the namespace.
    async fn size(&self) -> StorageResult<u64>;

    /// Fetch many keys at once.
    ///
    /// The result holds one entry per distinct requested key, `None` for
    /// keys that are not stored. Empty input never touches storage.
    async fn get_many(&self, keys: &[String]) -> StorageResult<HashMap<String, Option<Value>>>;

    /// Stream entries whose key starts with `prefix`.
    fn get_starts_with_many(&self, prefix: &str) -> EntryStream<'_>;

    /// Stream entries whose key ends with `suffix`.
    fn get_ends_with_many(&self, suffix: &str) -> EntryStream<'_>;

    /// Stream entries whose key contains `substring`.
    fn get_includes_many(&self, substring: &str) -> EntryStream<'_>;

    /// Insert each item whose key is absent, clamping numeric values.
    ///
    /// Returns `true` per inserted key and `false` per key that already
    /// existed; existing values are left untouched. When a key appears more
    /// than once the first occurrence is used.
    async fn insert_if_not_exists_many(
        &self,
        items: Vec<(String, Value)>,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<HashMap<String, bool>>;

    /// Overwrite each item whose key is present, clamping numeric values.
    ///
    /// Returns `true` per updated key and `false` per absent key; absent keys
    /// are never created. When a key appears more than once the last
    /// occurrence is used.
    async fn update_if_exists_many(
        &self,
        items: Vec<(String, Value)>,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<HashMap<String, bool>>;

    /// Write exactly one of each item's two candidate values: `insert` when
    /// the key is absent, `update` when it is present. Both are clamped the
    /// same way. When a key appears more than once the last occurrence is
    /// used.
    async fn insert_or_update_many(
        &self,
        items: Vec<UpsertItem>,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<()>;

    /// Remove each key that is present. Returns `true` per removed key.
    async fn remove_if_exists_many(&self, keys: &[String]) -> StorageResult<HashMap<String, bool>>;

    /// Report which keys are present.
    ///
    /// Derived from `get_many`; backends with a cheaper existence check may
    /// override it.
    async fn has_many(&self, keys: &[String]) -> StorageResult<HashMap<String, bool>> {
        let values = self.get_many(keys).await?;
        Ok(values
            .into_iter()
            .map(|(key, value)| (key, value.is_some()))
            .collect())
    }
}

/// Storage that can run a unit of work as one transaction.
#[async_trait]
pub trait TransactionalStorage: NamespacedStorage {
    /// Run `f` against a storage handle bound to a transaction.
    ///
    /// Backends with real transactions commit every write made through the
    /// handle when `f` returns `Ok` and roll all of them back when it returns
    /// `Err`. Backends without transactions call `f` with `self`.
    async fn transaction<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: for<'s> FnOnce(&'s dyn NamespacedStorage) -> BoxFuture<'s, StorageResult<T>>
            + Send
            + 'static;
}

#[async_trait]
impl<S: NamespacedStorage + ?Sized> NamespacedStorage for &S {
    fn namespace(&self) -> &str {
        (**self).namespace()
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    fn iterate(&self) -> EntryStream<'_> {
        (**self).iterate()
    }

    async fn clear(&self) -> StorageResult<()> {
        (**self).clear().await
    }

    async fn size(&self) -> StorageResult<u64> {
        (**self).size().await
    }

    async fn get_many(&self, keys: &[String]) -> StorageResult<HashMap<String, Option<Value>>> {
        (**self).get_many(keys).await
    }

    fn get_starts_with_many(&self, prefix: &str) -> EntryStream<'_> {
        (**self).get_starts_with_many(prefix)
    }

    fn get_ends_with_many(&self, suffix: &str) -> EntryStream<'_> {
        (**self).get_ends_with_many(suffix)
    }

    fn get_includes_many(&self, substring: &str) -> EntryStream<'_> {
        (**self).get_includes_many(substring)
    }

    async fn insert_if_not_exists_many(
        &self,
        items: Vec<(String, Value)>,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<HashMap<String, bool>> {
        (**self).insert_if_not_exists_many(items, clamp).await
    }

    async fn update_if_exists_many(
        &self,
        items: Vec<(String, Value)>,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<HashMap<String, bool>> {
        (**self).update_if_exists_many(items, clamp).await
    }

    async fn insert_or_update_many(
        &self,
        items: Vec<UpsertItem>,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<()> {
        (**self).insert_or_update_many(items, clamp).await
    }

    async fn remove_if_exists_many(&self, keys: &[String]) -> StorageResult<HashMap<String, bool>> {
        (**self).remove_if_exists_many(keys).await
    }

    async fn has_many(&self, keys: &[String]) -> StorageResult<HashMap<String, bool>> {
        (**self).has_many(keys).await
    }
}
