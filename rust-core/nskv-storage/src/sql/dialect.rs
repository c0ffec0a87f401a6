// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// SQL dialect differences between SQLite and Postgres.
//
// Both engines share the schema and the shape of every statement. They
// differ in placeholder syntax, in the string functions used for key
// matching, and in how the clamp rule is expressed. SQLite introspects JSON
// with `json_type` and bounds with scalar `MIN`/`MAX`. Postgres uses
// `jsonb_typeof` and `LEAST`/`GREATEST` over `numeric`.

use crate::clamp::ClampSettings;
use crate::scan::KeyPattern;

use super::statement::{SqlParam, StatementBuilder, ValueSource};

/// Name of the table shared by every namespace.
pub const TABLE_NAME: &str = "key_value";

/// Idempotent schema creation, identical for both engines.
pub const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS key_value (
  namespace TEXT NOT NULL,
  key       TEXT NOT NULL,
  value     TEXT NOT NULL,
  PRIMARY KEY (key, namespace)
)";

/// The SQL flavour a statement is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Placeholder for the `index`-th (1-based) bound parameter.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${index}"),
        }
    }

    /// Scan statement for `pattern` in `namespace`.
    ///
    /// The SQL text is static so that a streaming cursor can borrow it for as
    /// long as the consumer keeps pulling. SQLite placeholders are positional,
    /// so the pattern is bound once per occurrence; Postgres reuses `$2`.
    pub fn scan(self, namespace: &str, pattern: &KeyPattern) -> (&'static str, Vec<SqlParam>) {
        let sql = match (self, pattern) {
            (Dialect::Sqlite, KeyPattern::All) => {
                "SELECT key, value FROM key_value WHERE namespace = ?"
            }
            (Dialect::Sqlite, KeyPattern::StartsWith(_)) => {
                "SELECT key, value FROM key_value WHERE namespace = ? \
                 AND substr(key, 1, length(?)) = ?"
            }
            (Dialect::Sqlite, KeyPattern::EndsWith(_)) => {
                "SELECT key, value FROM key_value WHERE namespace = ? \
                 AND length(key) >= length(?) AND substr(key, length(key) - length(?) + 1) = ?"
            }
            (Dialect::Sqlite, KeyPattern::Includes(_)) => {
                "SELECT key, value FROM key_value WHERE namespace = ? AND instr(key, ?) > 0"
            }
            (Dialect::Postgres, KeyPattern::All) => {
                "SELECT key, value FROM key_value WHERE namespace = $1"
            }
            (Dialect::Postgres, KeyPattern::StartsWith(_)) => {
                "SELECT key, value FROM key_value WHERE namespace = $1 \
                 AND left(key, length($2)) = $2"
            }
            (Dialect::Postgres, KeyPattern::EndsWith(_)) => {
                "SELECT key, value FROM key_value WHERE namespace = $1 \
                 AND right(key, length($2)) = $2"
            }
            (Dialect::Postgres, KeyPattern::Includes(_)) => {
                "SELECT key, value FROM key_value WHERE namespace = $1 AND strpos(key, $2) > 0"
            }
        };

        let pattern_binds = match (self, pattern) {
            (_, KeyPattern::All) => 0,
            (Dialect::Postgres, _) => 1,
            (Dialect::Sqlite, KeyPattern::StartsWith(_)) => 2,
            (Dialect::Sqlite, KeyPattern::EndsWith(_)) => 3,
            (Dialect::Sqlite, KeyPattern::Includes(_)) => 1,
        };

        let mut params = vec![SqlParam::Text(namespace.to_string())];
        if let Some(text) = pattern.text() {
            params.extend((0..pattern_binds).map(|_| SqlParam::Text(text.to_string())));
        }
        (sql, params)
    }

    /// Column list of `RETURNING` for an `UPDATE ... FROM batch`.
    ///
    /// Postgres needs the qualified name because `batch` also has a `key`
    /// column; SQLite only lets `RETURNING` see the updated table.
    pub fn returning_updated_key(self) -> &'static str {
        match self {
            Dialect::Sqlite => "key",
            Dialect::Postgres => "key_value.key",
        }
    }

    /// Push `value` with the clamp rule applied inside SQL.
    ///
    /// The numeric check happens in the statement itself: non-numeric JSON
    /// takes the outer `ELSE` branch and is written back verbatim. Bounds are
    /// applied floor first, then ceiling. A number the bounds leave unchanged
    /// keeps its original text; only a moved number is re-quoted, so
    /// precision the engine would lose on re-printing is never touched.
    pub(crate) fn push_clamped(
        self,
        builder: &mut StatementBuilder,
        value: ValueSource<'_>,
        clamp: Option<&ClampSettings>,
    ) {
        let Some(settings) = clamp.filter(|c| !c.is_noop()) else {
            builder.push_value(value);
            return;
        };

        let (is_number, quote) = match self {
            Dialect::Sqlite => (
                ["json_type(", ") IN ('integer', 'real')"],
                ["json_quote(", ")"],
            ),
            Dialect::Postgres => (
                ["jsonb_typeof(CAST(", " AS jsonb)) = 'number'"],
                ["CAST(to_jsonb(", ") AS text)"],
            ),
        };

        builder.push("CASE WHEN ");
        builder.push(is_number[0]);
        builder.push_value(value);
        builder.push(is_number[1]);
        builder.push(" THEN CASE WHEN ");
        self.push_bounded(builder, value, settings);
        builder.push(" = ");
        self.push_number(builder, value);
        builder.push(" THEN ");
        builder.push_value(value);
        builder.push(" ELSE ");
        builder.push(quote[0]);
        self.push_bounded(builder, value, settings);
        builder.push(quote[1]);
        builder.push(" END ELSE ");
        builder.push_value(value);
        builder.push(" END");
    }

    /// The JSON number in `value` as an engine numeric.
    fn push_number(self, builder: &mut StatementBuilder, value: ValueSource<'_>) {
        let number = match self {
            Dialect::Sqlite => ["json_extract(", ", '$')"],
            Dialect::Postgres => ["CAST(CAST(", " AS jsonb) AS numeric)"],
        };
        builder.push(number[0]);
        builder.push_value(value);
        builder.push(number[1]);
    }

    /// `ceiling(floor(n))` over the numeric in `value`.
    fn push_bounded(
        self,
        builder: &mut StatementBuilder,
        value: ValueSource<'_>,
        settings: &ClampSettings,
    ) {
        let (floor, ceiling, bound_cast) = match self {
            Dialect::Sqlite => ("MAX(", "MIN(", ["", ""]),
            Dialect::Postgres => ("GREATEST(", "LEAST(", ["CAST(", " AS numeric)"]),
        };

        if settings.max.is_some() {
            builder.push(ceiling);
        }
        if settings.min.is_some() {
            builder.push(floor);
        }
        self.push_number(builder, value);
        for bound in [settings.min, settings.max].into_iter().flatten() {
            builder.push(", ");
            builder.push(bound_cast[0]);
            builder.push_bind(SqlParam::bound(bound));
            builder.push(bound_cast[1]);
            builder.push(")");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
    }

    #[test]
    fn test_scan_params_match_placeholders() {
        let patterns = [
            KeyPattern::All,
            KeyPattern::StartsWith("ab/".into()),
            KeyPattern::EndsWith("/ab".into()),
            KeyPattern::Includes("/ab/".into()),
        ];
        for pattern in &patterns {
            let (sql, params) = Dialect::Sqlite.scan("ns", pattern);
            assert_eq!(sql.matches('?').count(), params.len(), "{sql}");

            let (sql, params) = Dialect::Postgres.scan("ns", pattern);
            let highest = if pattern.text().is_some() { 2 } else { 1 };
            assert!(sql.contains(&format!("${highest}")));
            assert_eq!(params.len(), highest);
        }
    }

    #[test]
    fn test_scan_does_not_use_like() {
        let (sql, _) = Dialect::Sqlite.scan("ns", &KeyPattern::StartsWith("a%".into()));
        assert!(!sql.to_uppercase().contains("LIKE"));
        let (sql, _) = Dialect::Postgres.scan("ns", &KeyPattern::Includes("_".into()));
        assert!(!sql.to_uppercase().contains("LIKE"));
    }

    #[test]
    fn test_sqlite_clamp_expression() {
        let mut builder = StatementBuilder::new(Dialect::Sqlite);
        Dialect::Sqlite.push_clamped(
            &mut builder,
            ValueSource::Bind("20"),
            Some(&ClampSettings::between(1.0, 10.0)),
        );
        let stmt = builder.build();
        assert_eq!(
            stmt.sql,
            "CASE WHEN json_type(?) IN ('integer', 'real') THEN \
             CASE WHEN MIN(MAX(json_extract(?, '$'), ?), ?) = json_extract(?, '$') THEN ? \
             ELSE json_quote(MIN(MAX(json_extract(?, '$'), ?), ?)) END ELSE ? END"
        );
        let v = || SqlParam::Text("20".into());
        assert_eq!(
            stmt.params,
            vec![
                v(),
                v(),
                SqlParam::Int(1),
                SqlParam::Int(10),
                v(),
                v(),
                v(),
                SqlParam::Int(1),
                SqlParam::Int(10),
                v(),
            ]
        );
    }

    #[test]
    fn test_postgres_clamp_expression_on_column() {
        let mut builder = StatementBuilder::new(Dialect::Postgres);
        Dialect::Postgres.push_clamped(
            &mut builder,
            ValueSource::Column("batch.value"),
            Some(&ClampSettings::at_most(2.5)),
        );
        let stmt = builder.build();
        assert_eq!(
            stmt.sql,
            "CASE WHEN jsonb_typeof(CAST(batch.value AS jsonb)) = 'number' THEN \
             CASE WHEN LEAST(CAST(CAST(batch.value AS jsonb) AS numeric), CAST($1 AS numeric)) \
             = CAST(CAST(batch.value AS jsonb) AS numeric) THEN batch.value \
             ELSE CAST(to_jsonb(LEAST(CAST(CAST(batch.value AS jsonb) AS numeric), \
             CAST($2 AS numeric))) AS text) END ELSE batch.value END"
        );
        assert_eq!(stmt.params, vec![SqlParam::Real(2.5), SqlParam::Real(2.5)]);
    }

    #[test]
    fn test_clamp_bounds_nest_floor_inside_ceiling() {
        let mut builder = StatementBuilder::new(Dialect::Postgres);
        Dialect::Postgres.push_clamped(
            &mut builder,
            ValueSource::Column("v"),
            Some(&ClampSettings::between(10.0, 5.0)),
        );
        let stmt = builder.build();
        assert!(stmt.sql.contains(
            "LEAST(GREATEST(CAST(CAST(v AS jsonb) AS numeric), \
             CAST($1 AS numeric)), CAST($2 AS numeric))"
        ));
        assert_eq!(&stmt.params[..2], &[SqlParam::Int(10), SqlParam::Int(5)]);
    }

    #[test]
    fn test_noop_clamp_binds_value_once() {
        let mut builder = StatementBuilder::new(Dialect::Postgres);
        Dialect::Postgres.push_clamped(
            &mut builder,
            ValueSource::Bind("1"),
            Some(&ClampSettings::default()),
        );
        let stmt = builder.build();
        assert_eq!(stmt.sql, "$1");
        assert_eq!(stmt.params.len(), 1);
    }
}
