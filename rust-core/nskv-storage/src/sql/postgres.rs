// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// Postgres engine for `SqlStorage`.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::query::Query;
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{Database, Pool, Row};

use super::{Dialect, Handle, SqlEngine, SqlParam, SqlStorage, Statement};

/// Namespaced storage over Postgres.
pub type PostgresStorage = SqlStorage<Postgres>;

type PgQuery<'q> = Query<'q, Postgres, <Postgres as Database>::Arguments<'q>>;

fn bind_params(mut query: PgQuery<'_>, params: Vec<SqlParam>) -> PgQuery<'_> {
    for param in params {
        query = match param {
            SqlParam::Text(text) => query.bind(text),
            SqlParam::Int(n) => query.bind(n),
            SqlParam::Real(n) => query.bind(n),
        };
    }
    query
}

async fn fetch_rows(handle: &Handle<Postgres>, stmt: Statement) -> sqlx::Result<Vec<PgRow>> {
    let Statement { sql, params } = stmt;
    let query = bind_params(sqlx::query(&sql), params);
    match handle {
        Handle::Pool(pool) => query.fetch_all(pool).await,
        Handle::Transaction(tx) => {
            let mut tx = tx.lock().await;
            query.fetch_all(&mut **tx).await
        }
    }
}

#[async_trait]
impl SqlEngine for Postgres {
    const DIALECT: Dialect = Dialect::Postgres;
    const BACKEND_NAME: &'static str = "postgres";

    async fn fetch_keys(handle: &Handle<Self>, stmt: Statement) -> sqlx::Result<Vec<String>> {
        fetch_rows(handle, stmt)
            .await?
            .iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect()
    }

    async fn fetch_entries(
        handle: &Handle<Self>,
        stmt: Statement,
    ) -> sqlx::Result<Vec<(String, String)>> {
        fetch_rows(handle, stmt)
            .await?
            .iter()
            .map(|row| Ok((row.try_get::<String, _>(0)?, row.try_get::<String, _>(1)?)))
            .collect()
    }

    async fn fetch_count(handle: &Handle<Self>, stmt: Statement) -> sqlx::Result<i64> {
        match fetch_rows(handle, stmt).await?.first() {
            Some(row) => row.try_get::<i64, _>(0),
            None => Ok(0),
        }
    }

    async fn execute(handle: &Handle<Self>, stmt: Statement) -> sqlx::Result<u64> {
        let Statement { sql, params } = stmt;
        let query = bind_params(sqlx::query(&sql), params);
        let done = match handle {
            Handle::Pool(pool) => query.execute(pool).await?,
            Handle::Transaction(tx) => {
                let mut tx = tx.lock().await;
                query.execute(&mut **tx).await?
            }
        };
        Ok(done.rows_affected())
    }

    fn stream_entries<'a>(
        pool: &'a Pool<Self>,
        sql: &'static str,
        params: Vec<SqlParam>,
    ) -> BoxStream<'a, sqlx::Result<(String, String)>> {
        bind_params(sqlx::query(sql), params)
            .fetch(pool)
            .map(|row| {
                let row = row?;
                Ok((row.try_get::<String, _>(0)?, row.try_get::<String, _>(1)?))
            })
            .boxed()
    }
}
