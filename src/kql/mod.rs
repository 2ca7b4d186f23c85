//! Kusto-style pipeline queries translated into a single SQL SELECT.
//!
//! Flow: splitter -> stage parser -> plan builder -> emitter.
//! Text that already reads as SQL is passed through untouched.

pub mod ast;
pub mod emitter;
pub mod errors;
pub mod executor;
pub mod executors;
pub mod expr;
pub mod lexer;
pub mod logical;
pub mod parser;
pub mod rewrite;
pub mod splitter;
pub mod validate;

pub use errors::*;
pub use logical::{PlanBuilder, QueryPlan};

use log::debug;

use crate::models::structs::ColumnRegistry;
use emitter::dialect::{SqlDialect, SqliteDialect};
use splitter::SplitQuery;

/// Knobs for [`compile_with`]. The default compiles exactly like [`compile`].
#[derive(Default, Clone, Copy)]
pub struct CompileOptions<'a> {
    /// When set, tables and columns are checked before any SQL is produced.
    pub registry: Option<&'a ColumnRegistry>,
    /// Row cap for queries without `limit`/`take`/`top`.
    pub default_row_limit: Option<u64>,
    /// SQLite when unset.
    pub dialect: Option<&'a dyn SqlDialect>,
}

/// Translates one query into SQL for the embedded SQLite store.
pub fn compile(text: &str) -> Result<String, CompileError> {
    compile_with(text, &CompileOptions::default())
}

pub fn compile_with(text: &str, options: &CompileOptions<'_>) -> Result<String, CompileError> {
    let plan = match plan_query(text, options)? {
        Planned::Passthrough(sql) => return Ok(sql),
        Planned::Plan(plan) => plan,
    };
    let dialect = options.dialect.unwrap_or(&SqliteDialect);
    let sql = emitter::emit_sql(&plan, dialect)?;
    debug!("compiled [{}] {:?} -> {}", dialect.name(), text, sql);
    Ok(sql)
}

/// Pretty `Debug` dump of the plan (or the passthrough text) for troubleshooting.
pub fn debug_plan(text: &str) -> Result<String, CompileError> {
    Ok(match plan_query(text, &CompileOptions::default())? {
        Planned::Passthrough(sql) => format!("Passthrough({:?})", sql),
        Planned::Plan(plan) => format!("{:#?}", plan),
    })
}

enum Planned {
    Passthrough(String),
    Plan(QueryPlan),
}

fn plan_query(text: &str, options: &CompileOptions<'_>) -> Result<Planned, CompileError> {
    let stages = match splitter::split_query(text)? {
        SplitQuery::Passthrough(sql) => return Ok(Planned::Passthrough(sql)),
        SplitQuery::Pipeline(stages) => stages,
    };
    let stages = parser::parse_pipeline(&stages)?;
    let builder = match options.registry {
        Some(registry) => {
            validate::validate_stages(&stages, registry)?;
            PlanBuilder::with_registry(registry)
        }
        None => PlanBuilder::new(),
    };
    let mut plan = builder.build(&stages)?;
    if let Some(limit) = options.default_row_limit {
        rewrite::apply_row_limit(&mut plan, limit);
    }
    Ok(Planned::Plan(plan))
}
