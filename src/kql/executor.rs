//! Database-agnostic query executor trait
//!
//! Compiled SQL is handed to an executor; its failures are reported as
//! [`ExecutionError`] and never mixed with translation errors.

use serde::Serialize;

use super::emitter::dialect::SqlDialect;
use super::errors::ExecutionError;

/// Statements that are never run, even when typed as plain SQL.
const BLOCKED_PREFIXES: &[&str] = &["DROP ", "ATTACH ", "DETACH "];

/// Result of query execution: ordered headers and rows of text values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl QueryResult {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Each row as ordered `(column, value)` pairs.
    pub fn records(&self) -> impl Iterator<Item = Vec<(&str, &str)>> + '_ {
        self.rows.iter().map(|row| {
            self.headers
                .iter()
                .map(String::as_str)
                .zip(row.iter().map(String::as_str))
                .collect()
        })
    }
}

#[async_trait::async_trait]
pub trait DatabaseExecutor: Send + Sync {
    /// Dialect the compiler should emit for this store.
    fn dialect(&self) -> &dyn SqlDialect;

    /// Execute a query and return results
    async fn execute_query(&self, sql: &str) -> Result<QueryResult, ExecutionError>;

    /// Validate query before execution
    fn validate_query(&self, sql: &str) -> Result<(), ExecutionError> {
        let trimmed = sql.trim_start().to_uppercase();
        match BLOCKED_PREFIXES.iter().find(|p| trimmed.starts_with(*p)) {
            Some(prefix) => Err(ExecutionError::Rejected(format!(
                "{}statements are not allowed",
                prefix
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_pair_headers_with_values() {
        let result = QueryResult::new(
            vec!["name".into(), "age".into()],
            vec![vec!["ann".into(), "31".into()], vec!["bob".into(), "".into()]],
        );
        let records: Vec<_> = result.records().collect();
        assert_eq!(records[0], vec![("name", "ann"), ("age", "31")]);
        assert_eq!(records[1], vec![("name", "bob"), ("age", "")]);
        assert_eq!(result.row_count(), 2);
    }
}
