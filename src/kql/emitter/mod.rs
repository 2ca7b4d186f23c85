use super::{
    ast::{CmpOp, ColumnRef, Expr, Literal, LogicalOp, SortDirection},
    errors::CompileError,
    logical::{QueryPlan, SelectItem, SelectList},
};

pub mod dialect;
use dialect::{CastType, SqlDialect};

/// Words that must be quoted when used as column names.
const RESERVED: &[&str] = &[
    "all", "and", "as", "asc", "between", "by", "case", "cast", "check", "collate", "create", "cross",
    "default", "delete", "desc", "distinct", "drop", "else", "end", "escape", "exists", "from", "full",
    "glob", "group", "having", "in", "index", "inner", "insert", "into", "is", "join", "key", "left",
    "like", "limit", "match", "natural", "not", "null", "offset", "on", "or", "order", "outer",
    "primary", "references", "regexp", "right", "select", "set", "table", "then", "to", "union",
    "unique", "update", "using", "values", "when", "where", "with",
];

/// Renders a plan as one SELECT with clauses in fixed order:
/// SELECT, FROM, JOIN, WHERE, GROUP BY, ORDER BY, LIMIT.
pub fn emit_sql(plan: &QueryPlan, dialect: &dyn SqlDialect) -> Result<String, CompileError> {
    SqlEmitter { dialect }.emit(plan)
}

// Binding strength used to decide where parentheses are required.
const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_CMP: u8 = 3;
const PREC_ADD: u8 = 4;
const PREC_MUL: u8 = 5;
const PREC_ATOM: u8 = 6;

struct SqlEmitter<'d> {
    dialect: &'d dyn SqlDialect,
}

impl SqlEmitter<'_> {
    fn emit(&self, plan: &QueryPlan) -> Result<String, CompileError> {
        let proj_sql = match &plan.select_list {
            SelectList::Wildcard => "*".to_string(),
            SelectList::Items(items) if items.is_empty() => {
                return Err(CompileError::syntax("empty select list", 0));
            }
            SelectList::Items(items) => items
                .iter()
                .map(|item| self.emit_select_item(item))
                .collect::<Result<Vec<_>, _>>()?
                .join(", "),
        };
        let mut sql = format!("SELECT {} FROM {}", proj_sql, self.dialect.quote_ident(&plan.table));

        for join in &plan.joins {
            sql.push_str(&format!(
                " {} {} ON {}",
                self.dialect.emit_join_kind(join.kind),
                self.dialect.quote_ident(&join.table),
                self.emit_expr(&join.on)?
            ));
        }

        if !plan.filters.is_empty() {
            // a lone OR filter needs no parentheses; several are ANDed together
            let min_prec = if plan.filters.len() > 1 { PREC_AND + 1 } else { 0 };
            let where_clause = plan
                .filters
                .iter()
                .map(|f| self.emit_expr_prec(f, min_prec))
                .collect::<Result<Vec<_>, _>>()?
                .join(" AND ");
            sql.push_str(&format!(" WHERE {}", where_clause));
        }

        if !plan.group_by.is_empty() {
            let grp = plan.group_by.iter().map(|g| self.emit_expr(g)).collect::<Result<Vec<_>, _>>()?;
            sql.push_str(&format!(" GROUP BY {}", grp.join(", ")));
        }

        if !plan.order_by.is_empty() {
            let order = plan
                .order_by
                .iter()
                .map(|key| {
                    format!(
                        "{} {}",
                        self.emit_column(&key.column),
                        match key.direction {
                            SortDirection::Asc => "ASC",
                            SortDirection::Desc => "DESC",
                        }
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" ORDER BY {}", order));
        }

        if let Some(limit) = plan.limit {
            sql.push_str(&self.dialect.emit_limit(limit));
        }
        Ok(sql)
    }

    fn emit_select_item(&self, item: &SelectItem) -> Result<String, CompileError> {
        Ok(match item {
            SelectItem::AllColumns => "*".to_string(),
            SelectItem::Expr { expr, alias: None } => self.emit_expr(expr)?,
            SelectItem::Expr { expr: Expr::Column(c), alias: Some(alias) }
                if c.qualifier.is_none() && &c.name == alias =>
            {
                self.emit_column_name(alias)
            }
            SelectItem::Expr { expr, alias: Some(alias) } => {
                format!("{} AS {}", self.emit_expr(expr)?, self.emit_column_name(alias))
            }
            SelectItem::Aggregate(agg) => format!(
                "{} AS {}",
                self.emit_aggregate(&agg.function, &agg.args)?,
                self.emit_column_name(&agg.alias)
            ),
        })
    }

    fn emit_aggregate(&self, function: &str, args: &[Expr]) -> Result<String, CompileError> {
        let args = self.emit_args(args)?;
        let joined = args.join(", ");
        Ok(match (function.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("count", []) => "count(*)".to_string(),
            ("dcount", [arg]) => format!("count(DISTINCT {})", arg),
            ("countif", [pred]) => format!("sum(CASE WHEN {} THEN 1 ELSE 0 END)", pred),
            ("make_bag", _) => format!("{}({})", self.dialect.json_object_aggregate(), joined),
            ("make_list", _) => format!("{}({})", self.dialect.json_array_aggregate(), joined),
            ("make_set", [arg]) => format!("{}(DISTINCT {})", self.dialect.json_array_aggregate(), arg),
            _ => format!("{}({})", function, joined),
        })
    }

    fn emit_args(&self, args: &[Expr]) -> Result<Vec<String>, CompileError> {
        args.iter().map(|a| self.emit_expr(a)).collect()
    }

    fn emit_expr(&self, expr: &Expr) -> Result<String, CompileError> {
        self.emit_expr_prec(expr, 0)
    }

    /// Renders `expr`, parenthesized when it binds looser than `min_prec`.
    fn emit_expr_prec(&self, expr: &Expr, min_prec: u8) -> Result<String, CompileError> {
        let (sql, prec) = match expr {
            Expr::Column(c) => (self.emit_column(c), PREC_ATOM),
            Expr::Literal(Literal::Str(s)) => (self.dialect.quote_string(s), PREC_ATOM),
            Expr::Literal(Literal::Number(n)) => (n.clone(), PREC_ATOM),
            Expr::Literal(Literal::Bool(b)) => (self.dialect.emit_boolean(*b), PREC_ATOM),
            Expr::Comparison { op, left, right } => {
                let mut sql = format!(
                    "{} {} {}",
                    self.emit_expr_prec(left, PREC_CMP + 1)?,
                    op.as_sql(),
                    self.emit_expr_prec(right, PREC_CMP + 1)?
                );
                // lowered `contains` patterns escape their wildcards with a backslash
                if matches!(op, CmpOp::Like | CmpOp::NotLike)
                    && matches!(right.as_ref(), Expr::Literal(Literal::Str(p)) if p.contains('\\'))
                {
                    sql.push_str(" ESCAPE '\\'");
                }
                (sql, PREC_CMP)
            }
            Expr::Logical { op, left, right } => {
                let (kw, prec) = match op {
                    LogicalOp::And => ("AND", PREC_AND),
                    LogicalOp::Or => ("OR", PREC_OR),
                };
                (
                    format!("{} {} {}", self.emit_expr_prec(left, prec)?, kw, self.emit_expr_prec(right, prec + 1)?),
                    prec,
                )
            }
            Expr::Arithmetic { op, left, right } => {
                let prec = if op.binds_tighter() { PREC_MUL } else { PREC_ADD };
                (
                    format!(
                        "{} {} {}",
                        self.emit_expr_prec(left, prec)?,
                        op.as_sql(),
                        self.emit_expr_prec(right, prec + 1)?
                    ),
                    prec,
                )
            }
            Expr::FunctionCall { name, args } => (self.emit_function(name, args)?, PREC_ATOM),
            Expr::AggregateCall { function, args } => (self.emit_aggregate(function, args)?, PREC_ATOM),
        };
        Ok(if prec < min_prec { format!("({})", sql) } else { sql })
    }

    /// Kusto scalar functions with a different SQL spelling; the rest pass through.
    fn emit_function(&self, name: &str, args: &[Expr]) -> Result<String, CompileError> {
        let rendered = self.emit_args(args)?;
        let arity = |n: usize| {
            if rendered.len() == n {
                Ok(())
            } else {
                Err(CompileError::syntax(
                    format!("{}() expects {} argument(s), got {}", name, n, rendered.len()),
                    0,
                ))
            }
        };
        let cast = |ty: CastType| -> Result<String, CompileError> {
            arity(1)?;
            Ok(format!("CAST({} AS {})", rendered[0], self.dialect.cast_type(ty)))
        };
        Ok(match name.to_ascii_lowercase().as_str() {
            "strlen" => {
                arity(1)?;
                format!("length({})", rendered[0])
            }
            "tolower" => {
                arity(1)?;
                format!("lower({})", rendered[0])
            }
            "toupper" => {
                arity(1)?;
                format!("upper({})", rendered[0])
            }
            "toint" | "tolong" => cast(CastType::Integer)?,
            "todouble" | "toreal" => cast(CastType::Real)?,
            "tostring" => cast(CastType::Text)?,
            "isempty" => {
                arity(1)?;
                format!("({0} IS NULL OR {0} = '')", rendered[0])
            }
            "isnotempty" => {
                arity(1)?;
                format!("({0} IS NOT NULL AND {0} <> '')", rendered[0])
            }
            "strcat" if !rendered.is_empty() => format!("({})", rendered.join(" || ")),
            // Kusto offsets are zero-based
            "substring" if rendered.len() == 2 => format!("substr({}, {} + 1)", rendered[0], rendered[1]),
            "substring" => {
                arity(3)?;
                format!("substr({}, {} + 1, {})", rendered[0], rendered[1], rendered[2])
            }
            "iff" | "iif" => {
                arity(3)?;
                format!("CASE WHEN {} THEN {} ELSE {} END", rendered[0], rendered[1], rendered[2])
            }
            "not" => {
                arity(1)?;
                format!("NOT ({})", rendered[0])
            }
            _ => format!("{}({})", name, rendered.join(", ")),
        })
    }

    fn emit_column(&self, col: &ColumnRef) -> String {
        match &col.qualifier {
            Some(table) => {
                format!("{}.{}", self.dialect.quote_ident(table), self.emit_column_name(&col.name))
            }
            None => self.emit_column_name(&col.name),
        }
    }

    /// Plain identifiers stay bare; anything with spaces, symbols or a keyword name is quoted.
    fn emit_column_name(&self, name: &str) -> String {
        if is_plain_identifier(name) && !RESERVED.contains(&name.to_ascii_lowercase().as_str()) {
            name.to_string()
        } else {
            self.dialect.quote_ident(name)
        }
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
