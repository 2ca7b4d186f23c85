//! Ties ingestion, translation and execution together for one user session.

use std::path::Path;

use log::{debug, info};

use crate::ingest::{self, IngestError};
use crate::kql::emitter::dialect::SqlDialect;
use crate::kql::errors::{CompileError, ExecutionError};
use crate::kql::executor::{DatabaseExecutor, QueryResult};
use crate::kql::executors::SqliteExecutor;
use crate::kql::{self, CompileOptions};
use crate::models::structs::{ColumnRegistry, TableSchema};

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("query error: {0}")]
    Compile(#[from] CompileError),
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),
    #[error("import error: {0}")]
    Ingest(#[from] IngestError),
}

#[derive(Default)]
pub struct QuerySession {
    executor: SqliteExecutor,
    registry: ColumnRegistry,
    default_row_limit: Option<u64>,
    validate_names: bool,
}

impl QuerySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row cap applied to queries that set none; `None` or `0` disables it.
    pub fn with_row_limit(mut self, limit: Option<u64>) -> Self {
        self.default_row_limit = limit;
        self
    }

    /// Check table and column names against loaded files before running.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_names = enabled;
        self
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    /// Replaces everything loaded so far with the given files.
    pub async fn load_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<Vec<TableSchema>, SessionError> {
        self.reset().await?;
        let mut schemas = Vec::with_capacity(paths.len());
        for path in paths {
            schemas.push(self.load_csv(path.as_ref()).await?);
        }
        Ok(schemas)
    }

    /// Adds one file as a table next to the ones already loaded.
    pub async fn load_csv(&mut self, path: &Path) -> Result<TableSchema, SessionError> {
        let schema = ingest::ingest_csv_file(&self.executor, path).await?;
        self.registry.register_schema(&schema);
        Ok(schema)
    }

    pub async fn reset(&mut self) -> Result<(), SessionError> {
        self.executor.reset().await?;
        self.registry.clear();
        Ok(())
    }

    pub fn compile(&self, text: &str) -> Result<String, CompileError> {
        self.compile_for(text, self.executor.dialect())
    }

    /// Same checks and row cap as [`Self::compile`], emitted for another dialect.
    pub fn compile_for(&self, text: &str, dialect: &dyn SqlDialect) -> Result<String, CompileError> {
        let options = CompileOptions {
            registry: self.validate_names.then_some(&self.registry),
            default_row_limit: self.default_row_limit,
            dialect: Some(dialect),
        };
        kql::compile_with(text, &options)
    }

    /// Compiles and executes; nothing reaches the store if translation fails.
    pub async fn run(&self, text: &str) -> Result<QueryResult, SessionError> {
        let sql = self.compile(text)?;
        debug!("running: {}", sql);
        let result = self.executor.execute_query(&sql).await?;
        info!("{} rows", result.row_count());
        Ok(result)
    }
}
