// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// nskv Namespaced Key-Value Storage
//
// This crate provides one storage contract, `NamespacedStorage`, and three
// interchangeable backends for it. Every storage instance is bound to a single
// namespace: many namespaces share one physical map or table, and none can
// see or change another's entries. Values are JSON documents.
//
// # Modules
//
// - [`backend`] -- The `NamespacedStorage` and `TransactionalStorage` traits.
// - [`error`] -- The `StorageError` enum shared by all backends.
// - [`clamp`] -- Numeric clamp settings applied by the write operations.
// - [`memory`] -- An in-memory `BTreeMap` backend with shared namespace views.
// - [`sql`] -- SQLite and Postgres backends over sqlx (feature-gated).
// - [`config`] -- Options of the SQL backends.
// - [`typed`] -- A serde-based typed facade with strict single-key calls.
// - [`metrics`] -- A transparent wrapper that collects operation statistics.
//
// # Example
//
// ```rust
// use nskv_storage::backend::NamespacedStorage;
// use nskv_storage::clamp::ClampSettings;
// use nskv_storage::memory::SharedMap;
// use serde_json::json;
//
// # tokio_test::block_on(async {
// let map = SharedMap::new();
// let scores = map.namespace("scores");
// let other = map.namespace("other");
//
// let clamp = ClampSettings::at_most(100.0);
// scores
//     .insert_if_not_exists_many(vec![("alice".into(), json!(250))], Some(&clamp))
//     .await
//     .unwrap();
//
// let got = scores.get_many(&["alice".to_string()]).await.unwrap();
// assert_eq!(got["alice"], Some(json!(100)));
// assert_eq!(other.size().await.unwrap(), 0);
// # });
// ```

pub mod backend;
pub mod clamp;
pub mod codec;
pub mod config;
pub mod error;
pub mod key;
pub mod memory;
pub mod metrics;
pub mod scan;
pub mod typed;

mod batch;

// SQL backends are feature-gated so that a memory-only build pulls no driver.
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

// Re-export the most commonly used types at the crate root for convenience.
pub use backend::{Entry, EntryStream, NamespacedStorage, TransactionalStorage, UpsertItem};
pub use clamp::ClampSettings;
pub use config::SqlOptions;
pub use error::{ErrorKind, StorageError, StorageResult};
pub use memory::{MemoryStorage, SharedMap};
pub use metrics::{InstrumentedStorage, StorageStats};
pub use scan::KeyPattern;
pub use typed::{DecodeError, TypedStore};

#[cfg(feature = "postgres")]
pub use sql::PostgresStorage;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use sql::SqlStorage;
#[cfg(feature = "sqlite")]
pub use sql::SqliteStorage;
