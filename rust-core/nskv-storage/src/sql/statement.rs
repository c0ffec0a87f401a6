// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// Engine-agnostic SQL statement construction.
//
// Every operation of the SQL backends is rendered here as a `Statement`: SQL
// text plus an ordered list of owned parameters. Engines only bind and run
// them. Keys and values are always bound, never spliced into the text.

use crate::clamp::ClampSettings;
use crate::codec;

use super::dialect::Dialect;

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Real(f64),
}

impl SqlParam {
    /// Parameter for a clamp bound.
    ///
    /// Integral bounds are bound as integers so that a clamped integer stays
    /// an integer in the stored JSON.
    pub fn bound(n: f64) -> Self {
        match codec::whole(n) {
            Some(i) => SqlParam::Int(i),
            None => SqlParam::Real(n),
        }
    }
}

/// Rendered SQL with its parameters, ready to bind.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    /// A statement without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// Where a JSON value comes from inside a statement.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ValueSource<'a> {
    /// Encoded JSON bound as a parameter.
    Bind(&'a str),
    /// A column reference such as `batch.value`.
    Column(&'static str),
}

/// Incremental builder that numbers placeholders for the target dialect.
pub(crate) struct StatementBuilder {
    dialect: Dialect,
    sql: String,
    params: Vec<SqlParam>,
}

impl StatementBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn push_bind(&mut self, param: SqlParam) -> &mut Self {
        self.params.push(param);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    pub fn push_text(&mut self, text: &str) -> &mut Self {
        self.push_bind(SqlParam::Text(text.to_string()))
    }

    pub fn push_value(&mut self, value: ValueSource<'_>) -> &mut Self {
        match value {
            ValueSource::Bind(json) => self.push_text(json),
            ValueSource::Column(column) => self.push(column),
        }
    }

    pub fn push_clamped(
        &mut self,
        value: ValueSource<'_>,
        clamp: Option<&ClampSettings>,
    ) -> &mut Self {
        let dialect = self.dialect;
        dialect.push_clamped(self, value, clamp);
        self
    }

    /// Push `(p1, p2, ...)` binding every key.
    pub fn push_key_list<'k>(&mut self, keys: impl IntoIterator<Item = &'k String>) -> &mut Self {
        self.push("(");
        for (i, key) in keys.into_iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push_text(key);
        }
        self.push(")")
    }

    pub fn build(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// `SELECT COUNT(*)` of one namespace.
pub(crate) fn count(dialect: Dialect, namespace: &str) -> Statement {
    let mut b = StatementBuilder::new(dialect);
    b.push("SELECT COUNT(*) FROM key_value WHERE namespace = ")
        .push_text(namespace);
    b.build()
}

/// Delete every row of one namespace.
pub(crate) fn clear(dialect: Dialect, namespace: &str) -> Statement {
    let mut b = StatementBuilder::new(dialect);
    b.push("DELETE FROM key_value WHERE namespace = ").push_text(namespace);
    b.build()
}

/// Fetch the listed keys of one namespace.
pub(crate) fn select_keys(dialect: Dialect, namespace: &str, keys: &[String]) -> Statement {
    let mut b = StatementBuilder::new(dialect);
    b.push("SELECT key, value FROM key_value WHERE namespace = ")
        .push_text(namespace)
        .push(" AND key IN ")
        .push_key_list(keys);
    b.build()
}

/// One page of a keyset-paginated scan.
///
/// `scan_sql` and `scan_params` come from `Dialect::scan`; the page adds a
/// lower key bound when resuming and a row limit.
pub(crate) fn scan_page(
    dialect: Dialect,
    scan_sql: &str,
    scan_params: Vec<SqlParam>,
    after: Option<&str>,
    limit: usize,
) -> Statement {
    let mut b = StatementBuilder {
        dialect,
        sql: scan_sql.to_string(),
        params: scan_params,
    };
    if let Some(after) = after {
        b.push(" AND key > ").push_text(after);
    }
    b.push(" ORDER BY key LIMIT ")
        .push_bind(SqlParam::Int(i64::try_from(limit).unwrap_or(i64::MAX)));
    b.build()
}

/// Insert rows whose key is absent, returning the inserted keys.
pub(crate) fn insert_if_absent(
    dialect: Dialect,
    namespace: &str,
    rows: &[(String, String)],
    clamp: Option<&ClampSettings>,
) -> Statement {
    let mut b = StatementBuilder::new(dialect);
    b.push("INSERT INTO key_value (namespace, key, value) VALUES ");
    for (i, (key, value)) in rows.iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.push("(")
            .push_text(namespace)
            .push(", ")
            .push_text(key)
            .push(", ")
            .push_clamped(ValueSource::Bind(value), clamp)
            .push(")");
    }
    b.push(" ON CONFLICT (key, namespace) DO NOTHING RETURNING key");
    b.build()
}

/// Overwrite rows whose key is present, returning the updated keys.
pub(crate) fn update_if_present(
    dialect: Dialect,
    namespace: &str,
    rows: &[(String, String)],
    clamp: Option<&ClampSettings>,
) -> Statement {
    let mut b = StatementBuilder::new(dialect);
    b.push("WITH batch (key, value) AS (VALUES ");
    for (i, (key, value)) in rows.iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.push("(").push_text(key).push(", ").push_text(value).push(")");
    }
    b.push(") UPDATE key_value SET value = ")
        .push_clamped(ValueSource::Column("batch.value"), clamp)
        .push(" FROM batch WHERE key_value.namespace = ")
        .push_text(namespace)
        .push(" AND key_value.key = batch.key RETURNING ")
        .push(dialect.returning_updated_key());
    b.build()
}

/// Insert-or-update rows of `(key, insert_json, update_json)`.
///
/// The update branch picks the row's update value by key, so one statement
/// carries distinct update values for every row.
pub(crate) fn upsert(
    dialect: Dialect,
    namespace: &str,
    rows: &[(String, String, String)],
    clamp: Option<&ClampSettings>,
) -> Statement {
    let mut b = StatementBuilder::new(dialect);
    b.push("INSERT INTO key_value (namespace, key, value) VALUES ");
    for (i, (key, insert, _)) in rows.iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.push("(")
            .push_text(namespace)
            .push(", ")
            .push_text(key)
            .push(", ")
            .push_clamped(ValueSource::Bind(insert), clamp)
            .push(")");
    }
    b.push(" ON CONFLICT (key, namespace) DO UPDATE SET value = CASE excluded.key");
    for (key, _, update) in rows {
        b.push(" WHEN ")
            .push_text(key)
            .push(" THEN ")
            .push_clamped(ValueSource::Bind(update), clamp);
    }
    b.push(" ELSE key_value.value END RETURNING key");
    b.build()
}

/// Delete the listed keys, returning the removed ones.
pub(crate) fn remove_keys(dialect: Dialect, namespace: &str, keys: &[String]) -> Statement {
    let mut b = StatementBuilder::new(dialect);
    b.push("DELETE FROM key_value WHERE namespace = ")
        .push_text(namespace)
        .push(" AND key IN ")
        .push_key_list(keys)
        .push(" RETURNING key");
    b.build()
}
