// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// Metrics-collecting wrapper for namespaced storage.
//
// Wraps any `NamespacedStorage` and transparently collects operation counts,
// rows touched and latency sums. Writes made inside a transaction are
// counted as well: the transaction handle is wrapped with the same stats.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::StreamExt;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::backend::{EntryStream, NamespacedStorage, TransactionalStorage, UpsertItem};
use crate::clamp::ClampSettings;
use crate::error::StorageResult;

/// Accumulated statistics of an [`InstrumentedStorage`].
///
/// Counters only grow until [`InstrumentedStorage::reset_stats`] is called.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageStats {
    /// `get_many`, `has_many` and `size` calls.
    pub read_count: u64,
    /// Insert, update and upsert batch calls.
    pub write_count: u64,
    /// `remove_if_exists_many` and `clear` calls.
    pub remove_count: u64,
    /// Scans started (`iterate` and the pattern scans).
    pub scan_count: u64,
    /// Transactions run.
    pub transaction_count: u64,
    /// Calls that returned an error, scan items included.
    pub error_count: u64,
    /// Values returned by reads and scans.
    pub rows_read: u64,
    /// Keys inserted or updated.
    pub rows_written: u64,
    /// Keys removed by `remove_if_exists_many`.
    pub rows_removed: u64,
    /// Cumulative wall-clock latency of reads, in milliseconds.
    pub read_latency_sum_ms: f64,
    /// Cumulative wall-clock latency of writes, in milliseconds.
    pub write_latency_sum_ms: f64,
    /// Cumulative wall-clock latency of removals, in milliseconds.
    pub remove_latency_sum_ms: f64,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Read,
    Write,
    Remove,
}

fn true_count(flags: &HashMap<String, bool>) -> u64 {
    flags.values().filter(|hit| **hit).count() as u64
}

/// A storage wrapper that collects operation metrics.
///
/// # Example
///
/// ```rust
/// use nskv_storage::backend::NamespacedStorage;
/// use nskv_storage::memory::MemoryStorage;
/// use nskv_storage::metrics::InstrumentedStorage;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let metered = InstrumentedStorage::new(MemoryStorage::new("ns"));
///
/// metered.insert_if_not_exists_many(vec![("k".into(), json!(1))], None).await.unwrap();
/// metered.get_many(&["k".to_string()]).await.unwrap();
///
/// let stats = metered.stats().await;
/// assert_eq!(stats.write_count, 1);
/// assert_eq!(stats.rows_read, 1);
/// # });
/// ```
pub struct InstrumentedStorage<S> {
    inner: S,
    stats: Arc<RwLock<StorageStats>>,
}

impl<S: NamespacedStorage> InstrumentedStorage<S> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: S) -> Self {
        Self::with_stats(inner, Arc::new(RwLock::new(StorageStats::default())))
    }

    fn with_stats(inner: S, stats: Arc<RwLock<StorageStats>>) -> Self {
        Self { inner, stats }
    }

    /// Snapshot of the current statistics.
    pub async fn stats(&self) -> StorageStats {
        self.stats.read().await.clone()
    }

    /// Reset all statistics to zero.
    pub async fn reset_stats(&self) {
        let mut s = self.stats.write().await;
        *s = StorageStats::default();
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn record(&self, op: Op, started: Instant, rows: u64, failed: bool) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let mut s = self.stats.write().await;
        match op {
            Op::Read => {
                s.read_count += 1;
                s.rows_read += rows;
                s.read_latency_sum_ms += elapsed_ms;
            }
            Op::Write => {
                s.write_count += 1;
                s.rows_written += rows;
                s.write_latency_sum_ms += elapsed_ms;
            }
            Op::Remove => {
                s.remove_count += 1;
                s.rows_removed += rows;
                s.remove_latency_sum_ms += elapsed_ms;
            }
        }
        if failed {
            s.error_count += 1;
        }
    }

    fn metered_scan<'a>(&'a self, stream: EntryStream<'a>) -> EntryStream<'a> {
        let counter = Arc::clone(&self.stats);
        let stats = Arc::clone(&self.stats);
        futures::stream::once(async move {
            counter.write().await.scan_count += 1;
            stream
        })
        .flatten()
        .then(move |item| {
            let stats = Arc::clone(&stats);
            async move {
                let mut s = stats.write().await;
                match item {
                    Ok(_) => s.rows_read += 1,
                    Err(_) => s.error_count += 1,
                }
                drop(s);
                item
            }
        })
        .boxed()
    }
}

#[async_trait]
impl<S: NamespacedStorage> NamespacedStorage for InstrumentedStorage<S> {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    fn iterate(&self) -> EntryStream<'_> {
        self.metered_scan(self.inner.iterate())
    }

    async fn clear(&self) -> StorageResult<()> {
        let started = Instant::now();
        let result = self.inner.clear().await;
        self.record(Op::Remove, started, 0, result.is_err()).await;
        result
    }

    async fn size(&self) -> StorageResult<u64> {
        let started = Instant::now();
        let result = self.inner.size().await;
        self.record(Op::Read, started, 0, result.is_err()).await;
        result
    }

    async fn get_many(&self, keys: &[String]) -> StorageResult<HashMap<String, Option<Value>>> {
        let started = Instant::now();
        let result = self.inner.get_many(keys).await;
        let rows = match &result {
            Ok(values) => values.values().filter(|v| v.is_some()).count() as u64,
            Err(_) => 0,
        };
        self.record(Op::Read, started, rows, result.is_err()).await;
        result
    }

    fn get_starts_with_many(&self, prefix: &str) -> EntryStream<'_> {
        self.metered_scan(self.inner.get_starts_with_many(prefix))
    }

    fn get_ends_with_many(&self, suffix: &str) -> EntryStream<'_> {
        self.metered_scan(self.inner.get_ends_with_many(suffix))
    }

    fn get_includes_many(&self, substring: &str) -> EntryStream<'_> {
        self.metered_scan(self.inner.get_includes_many(substring))
    }

    async fn insert_if_not_exists_many(
        &self,
        items: Vec<(String, Value)>,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<HashMap<String, bool>> {
        let started = Instant::now();
        let result = self.inner.insert_if_not_exists_many(items, clamp).await;
        let rows = result.as_ref().map(true_count).unwrap_or(0);
        self.record(Op::Write, started, rows, result.is_err()).await;
        result
    }

    async fn update_if_exists_many(
        &self,
        items: Vec<(String, Value)>,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<HashMap<String, bool>> {
        let started = Instant::now();
        let result = self.inner.update_if_exists_many(items, clamp).await;
        let rows = result.as_ref().map(true_count).unwrap_or(0);
        self.record(Op::Write, started, rows, result.is_err()).await;
        result
    }

    async fn insert_or_update_many(
        &self,
        items: Vec<UpsertItem>,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<()> {
        let started = Instant::now();
        let count = items.len() as u64;
        let result = self.inner.insert_or_update_many(items, clamp).await;
        let rows = if result.is_ok() { count } else { 0 };
        self.record(Op::Write, started, rows, result.is_err()).await;
        result
    }

    async fn remove_if_exists_many(&self, keys: &[String]) -> StorageResult<HashMap<String, bool>> {
        let started = Instant::now();
        let result = self.inner.remove_if_exists_many(keys).await;
        let rows = result.as_ref().map(true_count).unwrap_or(0);
        self.record(Op::Remove, started, rows, result.is_err()).await;
        result
    }

    async fn has_many(&self, keys: &[String]) -> StorageResult<HashMap<String, bool>> {
        let started = Instant::now();
        let result = self.inner.has_many(keys).await;
        self.record(Op::Read, started, 0, result.is_err()).await;
        result
    }
}

#[async_trait]
impl<S: TransactionalStorage> TransactionalStorage for InstrumentedStorage<S> {
    async fn transaction<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: for<'s> FnOnce(&'s dyn NamespacedStorage) -> BoxFuture<'s, StorageResult<T>>
            + Send
            + 'static,
    {
        let stats = Arc::clone(&self.stats);
        let result = self
            .inner
            .transaction(move |tx| {
                Box::pin(async move {
                    let metered = InstrumentedStorage::with_stats(tx, stats);
                    let storage: &dyn NamespacedStorage = &metered;
                    f(storage).await
                })
            })
            .await;

        let mut s = self.stats.write().await;
        s.transaction_count += 1;
        if result.is_err() {
            s.error_count += 1;
        }
        drop(s);
        result
    }
}
