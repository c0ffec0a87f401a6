// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// Typed facade over a namespaced storage.
//
// `TypedStore` maps a single Rust type onto the JSON values of one
// namespace, and turns the per-key flags of the batch operations into
// strict single-key calls that fail with `KeysNotFound` or
// `KeysAlreadyExist`.

use std::marker::PhantomData;

use futures::stream::{BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::backend::{NamespacedStorage, UpsertItem};
use crate::clamp::{clamp_value, ClampSettings};
use crate::codec;
use crate::error::{StorageError, StorageResult};

/// Attempts `increment` makes when a concurrent writer keeps changing
/// whether the key exists.
const INCREMENT_ATTEMPTS: usize = 3;

/// A stored value that does not deserialize into the store's type.
///
/// Surfaces as the source of `StorageError::Unexpected`.
#[derive(Debug, Error)]
#[error("failed to decode value for key '{key}'")]
pub struct DecodeError {
    pub key: String,
    #[source]
    pub source: serde_json::Error,
}

/// A typed view of one namespace.
///
/// Values are converted with serde on every call; nothing is cached.
///
/// # Example
///
/// ```rust
/// use nskv_storage::memory::MemoryStorage;
/// use nskv_storage::typed::TypedStore;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Serialize, Deserialize, PartialEq)]
/// struct User { name: String, age: u32 }
///
/// # tokio_test::block_on(async {
/// let store: TypedStore<_, User> = TypedStore::new(MemoryStorage::new("users"));
///
/// let alice = User { name: "Alice".into(), age: 30 };
/// store.insert("alice", &alice).await.unwrap();
///
/// let retrieved = store.get("alice").await.unwrap().unwrap();
/// assert_eq!(retrieved, alice);
/// # });
/// ```
pub struct TypedStore<S, T> {
    storage: S,
    _value: PhantomData<fn() -> T>,
}

impl<S, T> TypedStore<S, T>
where
    S: NamespacedStorage,
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            _value: PhantomData,
        }
    }

    /// The wrapped storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_inner(self) -> S {
        self.storage
    }

    pub fn namespace(&self) -> &str {
        self.storage.namespace()
    }

    fn to_json(value: &T) -> StorageResult<Value> {
        Ok(serde_json::to_value(value)?)
    }

    fn from_json(key: &str, value: Value) -> StorageResult<T> {
        serde_json::from_value(value).map_err(|source| {
            StorageError::unexpected(DecodeError {
                key: key.to_string(),
                source,
            })
        })
    }

    /// Fetch and decode `key`. `Ok(None)` when it is absent.
    pub async fn get(&self, key: &str) -> StorageResult<Option<T>> {
        let keys = [key.to_string()];
        match self.storage.get_many(&keys).await?.remove(key).flatten() {
            Some(value) => Ok(Some(Self::from_json(key, value)?)),
            None => Ok(None),
        }
    }

    /// Fetch `key`, falling back to `default` when it is absent.
    pub async fn get_or(&self, key: &str, default: T) -> StorageResult<T> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Whether `key` is present.
    pub async fn contains(&self, key: &str) -> StorageResult<bool> {
        let keys = [key.to_string()];
        Ok(self.storage.has_many(&keys).await?.remove(key).unwrap_or(false))
    }

    /// Insert `key`. Fails with `KeysAlreadyExist` if it is present.
    pub async fn insert(&self, key: &str, value: &T) -> StorageResult<()> {
        let items = vec![(key.to_string(), Self::to_json(value)?)];
        let inserted = self.storage.insert_if_not_exists_many(items, None).await?;
        if inserted.get(key).copied().unwrap_or(false) {
            Ok(())
        } else {
            Err(StorageError::KeysAlreadyExist(vec![key.to_string()]))
        }
    }

    /// Overwrite `key`. Fails with `KeysNotFound` if it is absent.
    pub async fn update(&self, key: &str, value: &T) -> StorageResult<()> {
        let items = vec![(key.to_string(), Self::to_json(value)?)];
        let updated = self.storage.update_if_exists_many(items, None).await?;
        if updated.get(key).copied().unwrap_or(false) {
            Ok(())
        } else {
            Err(StorageError::KeysNotFound(vec![key.to_string()]))
        }
    }

    /// Write `key` whether or not it exists.
    pub async fn upsert(&self, key: &str, value: &T) -> StorageResult<()> {
        let json = Self::to_json(value)?;
        let item = UpsertItem::new(key, json.clone(), json);
        self.storage.insert_or_update_many(vec![item], None).await
    }

    /// Remove `key`. Fails with `KeysNotFound` if it is absent.
    pub async fn remove(&self, key: &str) -> StorageResult<()> {
        let keys = [key.to_string()];
        let removed = self.storage.remove_if_exists_many(&keys).await?;
        if removed.get(key).copied().unwrap_or(false) {
            Ok(())
        } else {
            Err(StorageError::KeysNotFound(keys.to_vec()))
        }
    }

    /// Add `delta` to the number stored at `key` and return the stored
    /// result.
    ///
    /// An absent key starts from `delta`. The written value is clamped.
    /// Fails with `Type` when the stored value is not a number.
    pub async fn increment(
        &self,
        key: &str,
        delta: f64,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<T> {
        let keys = [key.to_string()];
        for _ in 0..INCREMENT_ATTEMPTS {
            let current = self.storage.get_many(&keys).await?.remove(key).flatten();
            let next = match &current {
                Some(Value::Number(n)) => codec::add(n, delta),
                Some(stored) => {
                    return Err(StorageError::Type {
                        key: key.to_string(),
                        found: codec::type_name(stored),
                    })
                }
                None => codec::number_from_f64(delta),
            };
            let next = next.ok_or_else(|| {
                StorageError::message(format!("increment of key '{key}' is not a finite number"))
            })?;

            let items = vec![(key.to_string(), next.clone())];
            let written = match current {
                Some(_) => self.storage.update_if_exists_many(items, clamp).await?,
                None => self.storage.insert_if_not_exists_many(items, clamp).await?,
            };
            if written.get(key).copied().unwrap_or(false) {
                return Self::from_json(key, clamp_value(&next, clamp));
            }
            debug!(namespace = self.namespace(), key, "increment raced, retrying");
        }
        Err(StorageError::message(format!(
            "key '{key}' kept changing during increment"
        )))
    }

    /// Subtract `delta`; see [`TypedStore::increment`].
    pub async fn decrement(
        &self,
        key: &str,
        delta: f64,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<T> {
        self.increment(key, -delta, clamp).await
    }

    /// Stream every decoded entry of the namespace.
    pub fn entries(&self) -> BoxStream<'_, StorageResult<(String, T)>> {
        self.storage
            .iterate()
            .map(|entry| {
                let (key, value) = entry?;
                let decoded = Self::from_json(&key, value)?;
                Ok((key, decoded))
            })
            .boxed()
    }
}
