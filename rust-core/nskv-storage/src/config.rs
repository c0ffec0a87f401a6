// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// Tunables for the SQL backends.

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Largest accepted `max_batch_rows`. Keeps the widest statement (an upsert
/// with both clamp bounds binds 23 parameters per row) under SQLite's
/// default limit of 32766 bound parameters.
pub const MAX_BATCH_ROWS_LIMIT: usize = 1000;

/// Options of a SQL storage instance.
///
/// Deserializable from any serde format; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlOptions {
    /// Run `CREATE TABLE IF NOT EXISTS key_value` on construction.
    pub create_table: bool,
    /// Rows fetched per page when scanning inside a transaction.
    pub scan_page_size: usize,
    /// Rows per statement for batch writes. Larger batches are split and run
    /// in one transaction.
    pub max_batch_rows: usize,
}

impl Default for SqlOptions {
    fn default() -> Self {
        Self {
            create_table: true,
            scan_page_size: 256,
            max_batch_rows: 500,
        }
    }
}

impl SqlOptions {
    /// Reject option values that would produce unusable statements.
    pub fn validate(&self) -> StorageResult<()> {
        if self.scan_page_size == 0 {
            return Err(StorageError::message("scan_page_size must be at least 1"));
        }
        if self.max_batch_rows == 0 || self.max_batch_rows > MAX_BATCH_ROWS_LIMIT {
            return Err(StorageError::message(format!(
                "max_batch_rows must be between 1 and {MAX_BATCH_ROWS_LIMIT}, got {}",
                self.max_batch_rows
            )));
        }
        Ok(())
    }
}
