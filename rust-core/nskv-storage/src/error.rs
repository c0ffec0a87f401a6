// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// Storage error types for the nskv storage contract.
//
// Every backend reports failures through `StorageError`. Driver and codec
// failures that are not already one of the recognised kinds are wrapped as
// `StorageError::Unexpected` with the original error kept as the source, so
// callers can match on the kind and still walk the cause chain.

use std::error::Error as StdError;

use thiserror::Error;

/// Boxed, thread-safe error used as the cause of `StorageError::Unexpected`.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Convenience alias used by every storage operation.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur when interacting with a namespaced storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A lower-level failure (driver, connectivity, codec) that is not one of
    /// the recognised kinds below.
    #[error("unexpected storage error: {0}")]
    Unexpected(#[source] BoxError),

    /// A strict operation required keys that are not present.
    #[error("keys not found: {}", .0.join(", "))]
    KeysNotFound(Vec<String>),

    /// A strict insert hit keys that already exist.
    #[error("keys already exist: {}", .0.join(", "))]
    KeysAlreadyExist(Vec<String>),

    /// A numeric operation was applied to a non-numeric stored value.
    #[error("value for key '{key}' is not a number (found {found})")]
    Type {
        /// Key holding the offending value.
        key: String,
        /// JSON type name of the stored value.
        found: &'static str,
    },
}

/// Fieldless discriminant of [`StorageError`], convenient for assertions and
/// metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unexpected,
    KeysNotFound,
    KeysAlreadyExist,
    Type,
}

impl StorageError {
    /// Wrap an arbitrary error.
    ///
    /// If `err` already is a `StorageError` (possibly boxed) it is returned
    /// unchanged, otherwise it becomes `StorageError::Unexpected` with `err`
    /// as its source.
    pub fn unexpected<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        match err.into().downcast::<StorageError>() {
            Ok(storage) => *storage,
            Err(other) => StorageError::Unexpected(other),
        }
    }

    /// Build an `Unexpected` error from a plain message.
    pub fn message(msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        StorageError::Unexpected(msg.into())
    }

    /// Return the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Unexpected(_) => ErrorKind::Unexpected,
            StorageError::KeysNotFound(_) => ErrorKind::KeysNotFound,
            StorageError::KeysAlreadyExist(_) => ErrorKind::KeysAlreadyExist,
            StorageError::Type { .. } => ErrorKind::Type,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::unexpected(err)
    }
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::unexpected(err)
    }
}
