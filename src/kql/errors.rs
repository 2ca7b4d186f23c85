#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("query is empty")]
    EmptyQuery,
    #[error("unknown stage: {stage}")]
    UnknownStage { stage: String },
    #[error("syntax error at position {position}: {fragment}")]
    ExpressionSyntax { fragment: String, position: usize },
    #[error("unterminated string literal starting at position {position}")]
    UnterminatedString { position: usize },
    #[error("invalid aggregate: {fragment}")]
    AggregateSyntax { fragment: String },
    #[error("invalid row count: {fragment}")]
    InvalidLimit { fragment: String },
    #[error("first stage must name a table, got: {fragment}")]
    InvalidSource { fragment: String },
    #[error("unknown table: {table}")]
    UnknownTable { table: String },
    #[error("unknown column: {column}")]
    UnknownColumn { column: String },
    #[error("ambiguous column: {column} (qualify it with a table name)")]
    AmbiguousColumn { column: String },
}

impl CompileError {
    pub(crate) fn syntax(fragment: impl Into<String>, position: usize) -> Self {
        CompileError::ExpressionSyntax { fragment: fragment.into(), position }
    }
}

/// Failures raised by the relational store, never by the translator.
#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    #[error("no data loaded, import a CSV file first")]
    NoData,
    #[error("database error: {reason} (query: {query})")]
    Database { query: String, reason: String },
    #[error("query rejected: {0}")]
    Rejected(String),
}
