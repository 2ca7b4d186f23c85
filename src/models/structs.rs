use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One imported CSV file: every column is stored as TEXT.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<String>,
    pub row_count: usize,
}

/// Table name -> ordered column names, filled by ingestion.
#[derive(Clone, Debug, Default)]
pub struct ColumnRegistry {
    tables: HashMap<String, Vec<String>>,
}

impl ColumnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, table: impl Into<String>, columns: Vec<String>) {
        self.tables.insert(table.into(), columns);
    }

    pub fn register_schema(&mut self, schema: &TableSchema) {
        self.register(schema.table_name.clone(), schema.columns.clone());
    }

    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).map(|c| c.as_slice())
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}
