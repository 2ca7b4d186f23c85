//! SQLite database executor
//!
//! Owns the single in-memory store. Every operation holds the same lock, so
//! a reset never interleaves with a running query or a table load.

use async_trait::async_trait;
use log::{debug, info};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row};
use tokio::sync::Mutex;

use crate::kql::emitter::dialect::{SqlDialect, SqliteDialect};
use crate::kql::errors::ExecutionError;
use crate::kql::executor::{DatabaseExecutor, QueryResult};

const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Default)]
pub struct SqliteExecutor {
    pool: Mutex<Option<SqlitePool>>,
}

impl SqliteExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    // An in-memory database lives as long as its connection, so the pool
    // keeps exactly one and never recycles it.
    async fn open_pool() -> Result<SqlitePool, ExecutionError> {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(MEMORY_URL)
            .await
            .map_err(|e| db_error(MEMORY_URL, e))
    }

    /// Drops every loaded table by reopening an empty store.
    pub async fn reset(&self) -> Result<(), ExecutionError> {
        let mut guard = self.pool.lock().await;
        if let Some(old) = guard.take() {
            old.close().await;
        }
        *guard = Some(Self::open_pool().await?);
        info!("in-memory store reset");
        Ok(())
    }

    /// Creates `table` with TEXT columns and inserts `rows` in one transaction.
    pub async fn load_table(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<String>],
    ) -> Result<(), ExecutionError> {
        let dialect = SqliteDialect;
        let mut guard = self.pool.lock().await;
        if guard.is_none() {
            *guard = Some(Self::open_pool().await?);
        }
        let Some(pool) = guard.as_ref() else {
            return Err(ExecutionError::NoData);
        };

        let quoted: Vec<String> = columns.iter().map(|c| dialect.quote_ident(c)).collect();
        let create = format!(
            "CREATE TABLE {} ({})",
            dialect.quote_ident(table),
            quoted.iter().map(|c| format!("{} TEXT", c)).collect::<Vec<_>>().join(", ")
        );
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.quote_ident(table),
            quoted.join(", "),
            vec!["?"; columns.len()].join(", ")
        );
        debug!("{}", create);

        let mut tx = pool.begin().await.map_err(|e| db_error(&create, e))?;
        sqlx::query(&create).execute(&mut *tx).await.map_err(|e| db_error(&create, e))?;
        for row in rows {
            let mut query = sqlx::query(&insert);
            for value in row {
                query = query.bind(value.as_str());
            }
            query.execute(&mut *tx).await.map_err(|e| db_error(&insert, e))?;
        }
        tx.commit().await.map_err(|e| db_error(&insert, e))?;
        info!("loaded {} rows into \"{}\"", rows.len(), table);
        Ok(())
    }
}

#[async_trait]
impl DatabaseExecutor for SqliteExecutor {
    fn dialect(&self) -> &dyn SqlDialect {
        &SqliteDialect
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult, ExecutionError> {
        self.validate_query(sql)?;
        let guard = self.pool.lock().await;
        let pool = guard.as_ref().ok_or(ExecutionError::NoData)?;
        debug!("SQL: {}", sql);

        let rows = sqlx::query(sql).fetch_all(pool).await.map_err(|e| db_error(sql, e))?;

        let headers: Vec<String> = match rows.first() {
            Some(first_row) => first_row.columns().iter().map(|col| col.name().to_string()).collect(),
            // no rows to read names from; ask the statement instead
            None => pool
                .describe(sql)
                .await
                .map(|d| d.columns().iter().map(|col| col.name().to_string()).collect())
                .unwrap_or_default(),
        };

        let data: Vec<Vec<String>> = rows.iter().map(row_values).collect();
        debug!("SqliteExecutor: query returned {} rows, {} columns", data.len(), headers.len());
        Ok(QueryResult::new(headers, data))
    }
}

fn row_values(row: &SqliteRow) -> Vec<String> {
    (0..row.columns().len())
        .map(|i| {
            if let Ok(v) = row.try_get::<Option<String>, _>(i) {
                v.unwrap_or_default()
            } else if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
                v.map(|n| n.to_string()).unwrap_or_default()
            } else if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
                v.map(|n| n.to_string()).unwrap_or_default()
            } else if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(i) {
                v.map(|b| String::from_utf8_lossy(&b).into_owned()).unwrap_or_default()
            } else {
                String::new()
            }
        })
        .collect()
}

fn db_error(query: &str, err: sqlx::Error) -> ExecutionError {
    ExecutionError::Database { query: query.to_string(), reason: err.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> (Vec<String>, Vec<Vec<String>>) {
        (
            vec!["name".into(), "city".into()],
            vec![vec!["ann".into(), "Oslo".into()], vec!["bob".into(), "Rome".into()]],
        )
    }

    #[tokio::test]
    async fn query_before_load_is_no_data() {
        let exec = SqliteExecutor::new();
        assert!(matches!(exec.execute_query("SELECT 1").await, Err(ExecutionError::NoData)));
    }

    #[tokio::test]
    async fn load_then_select() {
        let exec = SqliteExecutor::new();
        let (cols, rows) = people();
        exec.load_table("people", &cols, &rows).await.unwrap();
        let result = exec.execute_query("SELECT name FROM \"people\" WHERE city = 'Rome'").await.unwrap();
        assert_eq!(result.headers, vec!["name"]);
        assert_eq!(result.rows, vec![vec!["bob".to_string()]]);

        let counted = exec.execute_query("SELECT count(*) AS n FROM \"people\"").await.unwrap();
        assert_eq!(counted.rows, vec![vec!["2".to_string()]]);
    }

    #[tokio::test]
    async fn empty_result_still_has_headers() {
        let exec = SqliteExecutor::new();
        let (cols, rows) = people();
        exec.load_table("people", &cols, &rows).await.unwrap();
        let result = exec.execute_query("SELECT name, city FROM \"people\" WHERE 1 = 0").await.unwrap();
        assert!(result.is_empty());
        assert_eq!(result.headers, vec!["name", "city"]);
    }

    #[tokio::test]
    async fn reset_drops_tables() {
        let exec = SqliteExecutor::new();
        let (cols, rows) = people();
        exec.load_table("people", &cols, &rows).await.unwrap();
        exec.reset().await.unwrap();
        let err = exec.execute_query("SELECT * FROM \"people\"").await.unwrap_err();
        assert!(matches!(err, ExecutionError::Database { .. }));
    }

    #[tokio::test]
    async fn drop_is_rejected() {
        let exec = SqliteExecutor::new();
        let err = exec.execute_query("drop table people").await.unwrap_err();
        assert!(matches!(err, ExecutionError::Rejected(_)));
    }
}
