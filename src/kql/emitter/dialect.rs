//! Database dialect trait for SQL emission.
//!
//! The translator targets the embedded SQLite store; other dialects only
//! change quoting, literals and the names of JSON aggregate functions.

use crate::kql::ast::JoinKind;

pub trait SqlDialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Quote an identifier (table/column name)
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Quote a string literal
    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    fn emit_boolean(&self, value: bool) -> String {
        if value { "TRUE" } else { "FALSE" }.to_string()
    }

    fn emit_limit(&self, limit: u64) -> String {
        format!(" LIMIT {}", limit)
    }

    fn emit_join_kind(&self, kind: JoinKind) -> &'static str {
        match kind {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }

    /// Aggregate building a JSON object from key/value pairs (`make_bag`).
    fn json_object_aggregate(&self) -> &'static str;

    /// Aggregate building a JSON array (`make_list`, `make_set`).
    fn json_array_aggregate(&self) -> &'static str;

    fn cast_type(&self, kusto_type: CastType) -> &'static str {
        match kusto_type {
            CastType::Integer => "INTEGER",
            CastType::Real => "REAL",
            CastType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastType {
    Integer,
    Real,
    Text,
}

/// SQLite dialect
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn json_object_aggregate(&self) -> &'static str {
        "json_group_object"
    }

    fn json_array_aggregate(&self) -> &'static str {
        "json_group_array"
    }
}

/// PostgreSQL dialect
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn json_object_aggregate(&self) -> &'static str {
        "json_object_agg"
    }

    fn json_array_aggregate(&self) -> &'static str {
        "json_agg"
    }

    fn cast_type(&self, kusto_type: CastType) -> &'static str {
        match kusto_type {
            CastType::Integer => "BIGINT",
            CastType::Real => "DOUBLE PRECISION",
            CastType::Text => "TEXT",
        }
    }
}

/// Get dialect by name; unknown names fall back to SQLite.
pub fn get_dialect(name: &str) -> Box<dyn SqlDialect> {
    match name.to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" => Box::new(PostgresDialect),
        _ => Box::new(SqliteDialect),
    }
}
