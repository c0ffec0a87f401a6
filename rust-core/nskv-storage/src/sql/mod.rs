// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// SQL backends for the namespaced storage contract.
//
// All namespaces live in one `key_value` table keyed by `(key, namespace)`;
// values are JSON text. `SqlStorage` holds every operation once, rendered
// through `statement` for the engine's `Dialect`, and delegates binding and
// execution to the engine's `SqlEngine` implementation.
//
// A storage runs either on a pool or inside a transaction. Pool-bound scans
// stream rows straight from a driver cursor; transaction-bound scans page by
// key so that the transaction connection is not held between pulls.

pub mod dialect;
pub mod statement;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use sqlx::{Database, Pool, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{Entry, EntryStream, NamespacedStorage, TransactionalStorage, UpsertItem};
use crate::batch;
use crate::clamp::ClampSettings;
use crate::codec;
use crate::config::SqlOptions;
use crate::error::{StorageError, StorageResult};
use crate::scan::{self, KeyPattern, Page};

pub use dialect::{Dialect, CREATE_TABLE, TABLE_NAME};
pub use statement::{SqlParam, Statement};

#[cfg(feature = "postgres")]
pub use self::postgres::PostgresStorage;
#[cfg(feature = "sqlite")]
pub use self::sqlite::SqliteStorage;

/// Shared transaction of a transaction-bound storage.
pub type SharedTransaction<DB> = Arc<Mutex<Transaction<'static, DB>>>;

/// The connection source a SQL storage runs its statements on.
pub enum Handle<DB: Database> {
    /// Each statement checks a connection out of the pool.
    Pool(Pool<DB>),
    /// Every statement runs on one open transaction.
    Transaction(SharedTransaction<DB>),
}

impl<DB: Database> Clone for Handle<DB> {
    fn clone(&self) -> Self {
        match self {
            Handle::Pool(pool) => Handle::Pool(pool.clone()),
            Handle::Transaction(tx) => Handle::Transaction(Arc::clone(tx)),
        }
    }
}

impl<DB: Database> fmt::Debug for Handle<DB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Pool(_) => f.write_str("Handle::Pool"),
            Handle::Transaction(_) => f.write_str("Handle::Transaction"),
        }
    }
}

/// Binding and execution of rendered statements for one sqlx driver.
///
/// Implemented for `sqlx::Sqlite` and `sqlx::Postgres`.
#[async_trait]
pub trait SqlEngine: Database {
    /// SQL flavour statements are rendered in.
    const DIALECT: Dialect;

    /// Human-readable backend name.
    const BACKEND_NAME: &'static str;

    /// Run a statement whose first column is a key, collecting the keys.
    async fn fetch_keys(handle: &Handle<Self>, stmt: Statement) -> sqlx::Result<Vec<String>>;

    /// Run a statement returning `(key, value)` text pairs.
    async fn fetch_entries(
        handle: &Handle<Self>,
        stmt: Statement,
    ) -> sqlx::Result<Vec<(String, String)>>;

    /// Run a statement returning a single integer.
    async fn fetch_count(handle: &Handle<Self>, stmt: Statement) -> sqlx::Result<i64>;

    /// Run a statement for its effect, returning the affected row count.
    async fn execute(handle: &Handle<Self>, stmt: Statement) -> sqlx::Result<u64>;

    /// Stream `(key, value)` pairs of a static query through a pool cursor.
    fn stream_entries<'a>(
        pool: &'a Pool<Self>,
        sql: &'static str,
        params: Vec<SqlParam>,
    ) -> BoxStream<'a, sqlx::Result<(String, String)>>;
}

/// Create the `key_value` table if it does not exist.
pub async fn ensure_table<DB: SqlEngine>(pool: &Pool<DB>) -> StorageResult<()> {
    DB::execute(&Handle::Pool(pool.clone()), Statement::raw(CREATE_TABLE)).await?;
    info!(backend = DB::BACKEND_NAME, table = TABLE_NAME, "key_value table ready");
    Ok(())
}

/// Commit or roll back `tx` according to `result`.
///
/// Every clone of the shared transaction must have been dropped.
async fn finish<DB: Database, T>(
    tx: SharedTransaction<DB>,
    result: StorageResult<T>,
) -> StorageResult<T> {
    let tx = match Arc::try_unwrap(tx) {
        Ok(tx) => tx.into_inner(),
        // Dropping the last clone rolls the transaction back.
        Err(_) => {
            return result.and(Err(StorageError::message(
                "transaction handle outlived its transaction scope",
            )))
        }
    };
    match result {
        Ok(value) => {
            tx.commit().await?;
            debug!("transaction committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "transaction rollback failed");
            } else {
                debug!(error = %err, "transaction rolled back");
            }
            Err(err)
        }
    }
}

/// Namespaced storage over a SQL database.
pub struct SqlStorage<DB: SqlEngine> {
    namespace: Arc<str>,
    handle: Handle<DB>,
    options: Arc<SqlOptions>,
}

impl<DB: SqlEngine> Clone for SqlStorage<DB> {
    fn clone(&self) -> Self {
        Self {
            namespace: Arc::clone(&self.namespace),
            handle: self.handle.clone(),
            options: Arc::clone(&self.options),
        }
    }
}

impl<DB: SqlEngine> fmt::Debug for SqlStorage<DB> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlStorage")
            .field("backend", &DB::BACKEND_NAME)
            .field("namespace", &self.namespace)
            .field("handle", &self.handle)
            .field("options", &self.options)
            .finish()
    }
}

impl<DB: SqlEngine> SqlStorage<DB> {
    /// Bind `namespace` on `pool` with default options, creating the table
    /// if needed.
    pub async fn connect(pool: Pool<DB>, namespace: impl Into<String>) -> StorageResult<Self> {
        Self::with_options(pool, namespace, SqlOptions::default()).await
    }

    /// Bind `namespace` on `pool` with explicit options.
    pub async fn with_options(
        pool: Pool<DB>,
        namespace: impl Into<String>,
        options: SqlOptions,
    ) -> StorageResult<Self> {
        options.validate()?;
        if options.create_table {
            ensure_table(&pool).await?;
        }
        let namespace: String = namespace.into();
        info!(backend = DB::BACKEND_NAME, namespace = %namespace, "sql storage bound");
        Ok(Self {
            namespace: Arc::from(namespace),
            handle: Handle::Pool(pool),
            options: Arc::new(options),
        })
    }

    /// Another storage on the same connection source, bound to a different
    /// namespace.
    pub fn sibling(&self, namespace: impl Into<String>) -> Self {
        let namespace: String = namespace.into();
        Self {
            namespace: Arc::from(namespace),
            handle: self.handle.clone(),
            options: Arc::clone(&self.options),
        }
    }

    /// The pool, unless this storage is bound to a transaction.
    pub fn pool(&self) -> Option<&Pool<DB>> {
        match &self.handle {
            Handle::Pool(pool) => Some(pool),
            Handle::Transaction(_) => None,
        }
    }

    pub fn options(&self) -> &SqlOptions {
        &self.options
    }

    /// Whether statements run inside an open transaction.
    pub fn in_transaction(&self) -> bool {
        matches!(self.handle, Handle::Transaction(_))
    }

    fn bound_to(&self, handle: Handle<DB>) -> Self {
        Self {
            namespace: Arc::clone(&self.namespace),
            handle,
            options: Arc::clone(&self.options),
        }
    }

    fn scan(&self, pattern: KeyPattern) -> EntryStream<'_> {
        debug!(
            backend = DB::BACKEND_NAME,
            namespace = %self.namespace,
            pattern = pattern.label(),
            "sql scan"
        );
        let (sql, params) = DB::DIALECT.scan(&self.namespace, &pattern);
        match &self.handle {
            Handle::Pool(pool) => DB::stream_entries(pool, sql, params)
                .map(|row| -> StorageResult<Entry> {
                    let (key, text) = row?;
                    Ok((key, codec::decode(&text)?))
                })
                .boxed(),
            Handle::Transaction(_) => {
                let page_size = self.options.scan_page_size;
                scan::paged(move |after: Option<String>| {
                    let stmt = statement::scan_page(
                        DB::DIALECT,
                        sql,
                        params.clone(),
                        after.as_deref(),
                        page_size,
                    );
                    async move {
                        let rows = DB::fetch_entries(&self.handle, stmt).await?;
                        let more = rows.len() >= page_size;
                        let entries = rows
                            .into_iter()
                            .map(|(key, text)| Ok((key, codec::decode(&text)?)))
                            .collect::<StorageResult<Vec<Entry>>>()?;
                        Ok(Page { entries, more })
                    }
                })
            }
        }
    }

    /// Run batch statements, returning every key they report.
    ///
    /// Several statements on a pool run in a transaction of their own so
    /// that a split batch still applies atomically.
    async fn run_batch(&self, statements: Vec<Statement>) -> StorageResult<Vec<String>> {
        match &self.handle {
            Handle::Pool(pool) if statements.len() > 1 => {
                debug!(backend = DB::BACKEND_NAME, statements = statements.len(), "split batch");
                let tx: SharedTransaction<DB> = Arc::new(Mutex::new(pool.begin().await?));
                let handle = Handle::Transaction(Arc::clone(&tx));
                let result = Self::fetch_all_keys(&handle, statements).await;
                drop(handle);
                finish(tx, result).await
            }
            handle => Self::fetch_all_keys(handle, statements).await,
        }
    }

    async fn fetch_all_keys(
        handle: &Handle<DB>,
        statements: Vec<Statement>,
    ) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for stmt in statements {
            keys.extend(DB::fetch_keys(handle, stmt).await?);
        }
        Ok(keys)
    }

    fn chunk_size(&self) -> usize {
        self.options.max_batch_rows.max(1)
    }
}

fn encode_pairs(items: Vec<(String, Value)>) -> StorageResult<Vec<(String, String)>> {
    items
        .into_iter()
        .map(|(key, value)| Ok((key, codec::encode(&value)?)))
        .collect()
}

#[async_trait]
impl<DB: SqlEngine> NamespacedStorage for SqlStorage<DB> {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn backend_name(&self) -> &'static str {
        DB::BACKEND_NAME
    }

    fn iterate(&self) -> EntryStream<'_> {
        self.scan(KeyPattern::All)
    }

    async fn clear(&self) -> StorageResult<()> {
        let stmt = statement::clear(DB::DIALECT, &self.namespace);
        let removed = DB::execute(&self.handle, stmt).await?;
        debug!(backend = DB::BACKEND_NAME, namespace = %self.namespace, removed, "sql clear");
        Ok(())
    }

    async fn size(&self) -> StorageResult<u64> {
        let stmt = statement::count(DB::DIALECT, &self.namespace);
        let count = DB::fetch_count(&self.handle, stmt).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn get_many(&self, keys: &[String]) -> StorageResult<HashMap<String, Option<Value>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let keys = batch::distinct_keys(keys);
        let mut results: HashMap<String, Option<Value>> = HashMap::with_capacity(keys.len());
        for chunk in keys.chunks(self.chunk_size()) {
            let stmt = statement::select_keys(DB::DIALECT, &self.namespace, chunk);
            for (key, text) in DB::fetch_entries(&self.handle, stmt).await? {
                results.insert(key, Some(codec::decode(&text)?));
            }
        }
        for key in keys {
            results.entry(key).or_insert(None);
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
        let rows = encode_pairs(batch::first_wins_by(items, |(key, _)| key.as_str()))?;
        debug!(
            backend = DB::BACKEND_NAME,
            namespace = %self.namespace,
            count = rows.len(),
            "sql insert_if_not_exists_many"
        );

        let statements = rows
            .chunks(self.chunk_size())
            .map(|chunk| statement::insert_if_absent(DB::DIALECT, &self.namespace, chunk, clamp))
            .collect();
        let inserted: HashSet<String> = self.run_batch(statements).await?.into_iter().collect();
        Ok(batch::flags(rows.iter().map(|(key, _)| key), &inserted))
    }

    async fn update_if_exists_many(
        &self,
        items: Vec<(String, Value)>,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<HashMap<String, bool>> {
        if items.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = encode_pairs(batch::last_wins_by(items, |(key, _)| key.as_str()))?;
        debug!(
            backend = DB::BACKEND_NAME,
            namespace = %self.namespace,
            count = rows.len(),
            "sql update_if_exists_many"
        );

        let statements = rows
            .chunks(self.chunk_size())
            .map(|chunk| statement::update_if_present(DB::DIALECT, &self.namespace, chunk, clamp))
            .collect();
        let updated: HashSet<String> = self.run_batch(statements).await?.into_iter().collect();
        Ok(batch::flags(rows.iter().map(|(key, _)| key), &updated))
    }

    async fn insert_or_update_many(
        &self,
        items: Vec<UpsertItem>,
        clamp: Option<&ClampSettings>,
    ) -> StorageResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let rows = batch::last_wins_by(items, |item| item.key.as_str())
            .into_iter()
            .map(|item| Ok((item.key, codec::encode(&item.insert)?, codec::encode(&item.update)?)))
            .collect::<StorageResult<Vec<(String, String, String)>>>()?;
        debug!(
            backend = DB::BACKEND_NAME,
            namespace = %self.namespace,
            count = rows.len(),
            "sql insert_or_update_many"
        );

        let statements = rows
            .chunks(self.chunk_size())
            .map(|chunk| statement::upsert(DB::DIALECT, &self.namespace, chunk, clamp))
            .collect();
        self.run_batch(statements).await?;
        Ok(())
    }

    async fn remove_if_exists_many(&self, keys: &[String]) -> StorageResult<HashMap<String, bool>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let distinct = batch::distinct_keys(keys);
        let statements = distinct
            .chunks(self.chunk_size())
            .map(|chunk| statement::remove_keys(DB::DIALECT, &self.namespace, chunk))
            .collect();
        let removed: HashSet<String> = self.run_batch(statements).await?.into_iter().collect();
        debug!(
            backend = DB::BACKEND_NAME,
            namespace = %self.namespace,
            removed = removed.len(),
            "sql remove_if_exists_many"
        );
        Ok(batch::flags(&distinct, &removed))
    }
}

#[async_trait]
impl<DB: SqlEngine> TransactionalStorage for SqlStorage<DB> {
    /// Run `f` inside a database transaction.
    ///
    /// Writes made through the handle given to `f` are committed when it
    /// returns `Ok` and rolled back when it returns `Err`. Called on a
    /// storage that is already transaction-bound, `f` joins the enclosing
    /// transaction.
    async fn transaction<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: for<'s> FnOnce(&'s dyn NamespacedStorage) -> BoxFuture<'s, StorageResult<T>>
            + Send
            + 'static,
    {
        let pool = match &self.handle {
            Handle::Pool(pool) => pool,
            Handle::Transaction(_) => {
                let storage: &dyn NamespacedStorage = self;
                return f(storage).await;
            }
        };

        let tx: SharedTransaction<DB> = Arc::new(Mutex::new(pool.begin().await?));
        debug!(backend = DB::BACKEND_NAME, namespace = %self.namespace, "transaction started");
        let scoped = self.bound_to(Handle::Transaction(Arc::clone(&tx)));
        let result = {
            let storage: &dyn NamespacedStorage = &scoped;
            f(storage).await
        };
        drop(scoped);
        finish(tx, result).await
    }
}
