//! CSV files loaded into the in-memory store, one table per file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::kql::errors::ExecutionError;
use crate::kql::executors::SqliteExecutor;
use crate::models::structs::TableSchema;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("cannot read {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("malformed CSV in {path}: {source}")]
    Csv { path: String, source: csv::Error },
    #[error("{0} has no header row")]
    EmptyFile(String),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// File stem with every whitespace run replaced by `_`.
pub fn table_name_for(path: &Path) -> String {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    WHITESPACE_RUN.replace_all(stem.trim(), "_").into_owned()
}

pub async fn ingest_csv_file(executor: &SqliteExecutor, path: &Path) -> Result<TableSchema, IngestError> {
    let file = File::open(path).map_err(|source| IngestError::Io { path: path.display().to_string(), source })?;
    let table = table_name_for(path);
    debug!("ingesting {} as \"{}\"", path.display(), table);
    ingest_reader(executor, &table, file, &path.display().to_string()).await
}

/// Reads CSV from `reader` into `table`; `origin` only labels errors.
pub async fn ingest_reader<R: Read>(
    executor: &SqliteExecutor,
    table: &str,
    reader: R,
    origin: &str,
) -> Result<TableSchema, IngestError> {
    let (columns, rows) = read_csv(reader).map_err(|source| IngestError::Csv { path: origin.to_string(), source })?;
    if columns.is_empty() {
        return Err(IngestError::EmptyFile(origin.to_string()));
    }
    executor.load_table(table, &columns, &rows).await?;
    info!("table \"{}\": {} columns, {} rows", table, columns.len(), rows.len());
    Ok(TableSchema { table_name: table.to_string(), columns, row_count: rows.len() })
}

/// Header row plus records; short records are padded and long ones cut to the header width.
fn read_csv<R: Read>(reader: R) -> Result<(Vec<String>, Vec<Vec<String>>), csv::Error> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let width = columns.len();
    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record?;
        if record.len() != width {
            warn!("record {} has {} fields, expected {}", idx + 1, record.len(), width);
        }
        let mut row: Vec<String> = record.iter().take(width).map(str::to_string).collect();
        row.resize(width, String::new());
        rows.push(row);
    }
    Ok((columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kql::executor::DatabaseExecutor;

    #[test]
    fn table_names_normalize_whitespace() {
        assert_eq!(table_name_for(Path::new("/data/sales 2024.csv")), "sales_2024");
        assert_eq!(table_name_for(Path::new("my  \t file.csv")), "my_file");
        assert_eq!(table_name_for(Path::new("plain")), "plain");
    }

    #[test]
    fn ragged_rows_fit_header() {
        let (cols, rows) = read_csv("a,b,c\n1,2\n4,5,6,7\n".as_bytes()).unwrap();
        assert_eq!(cols, vec!["a", "b", "c"]);
        assert_eq!(rows[0], vec!["1", "2", ""]);
        assert_eq!(rows[1], vec!["4", "5", "6"]);
    }

    #[tokio::test]
    async fn ingest_and_query() {
        let exec = SqliteExecutor::new();
        let schema = ingest_reader(&exec, "people", "name,age\nann,31\nbob,27\n".as_bytes(), "people.csv")
            .await
            .unwrap();
        assert_eq!(schema.columns, vec!["name", "age"]);
        assert_eq!(schema.row_count, 2);
        let result = exec.execute_query("SELECT age FROM \"people\" WHERE name = 'bob'").await.unwrap();
        assert_eq!(result.rows, vec![vec!["27".to_string()]]);
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let exec = SqliteExecutor::new();
        let err = ingest_reader(&exec, "t", "".as_bytes(), "t.csv").await.unwrap_err();
        assert!(matches!(err, IngestError::EmptyFile(_)));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let exec = SqliteExecutor::new();
        let err = ingest_csv_file(&exec, Path::new("/definitely/not/here.csv")).await.unwrap_err();
        assert!(matches!(err, IngestError::Io { .. }));
    }
}
