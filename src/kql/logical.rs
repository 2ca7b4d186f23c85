//! Query plan folded from pipeline stages, consumed by the emitter.

use log::debug;

use super::ast::{
    Aggregate, CmpOp, ColumnRef, Expr, JoinCondition, JoinKind, Literal, LogicalOp, ProjectItem, SortKey, Stage,
};
use super::errors::CompileError;
use crate::models::structs::ColumnRegistry;

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*` kept in front of columns added by `extend`.
    AllColumns,
    Expr { expr: Expr, alias: Option<String> },
    Aggregate(Aggregate),
}

impl SelectItem {
    pub fn output_name(&self) -> Option<&str> {
        match self {
            SelectItem::AllColumns => None,
            SelectItem::Expr { alias: Some(alias), .. } => Some(alias),
            SelectItem::Expr { expr, alias: None } => expr.output_name(),
            SelectItem::Aggregate(agg) => Some(&agg.alias),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectList {
    Wildcard,
    Items(Vec<SelectItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: String,
    pub on: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub table: String,
    pub joins: Vec<JoinClause>,
    pub select_list: SelectList,
    /// Conjoined in the WHERE clause.
    pub filters: Vec<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<SortKey>,
    pub limit: Option<u64>,
}

impl QueryPlan {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            joins: Vec::new(),
            select_list: SelectList::Wildcard,
            filters: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Columns equated by a join condition (`on id`, `$left.id == $right.id`).
    /// A bare reference to one of them resolves to the left-hand table.
    fn join_keys(&self) -> Vec<ColumnRef> {
        let mut keys = Vec::new();
        for join in &self.joins {
            collect_join_keys(&join.on, &self.table, &mut keys);
        }
        keys
    }
}

fn collect_join_keys(on: &Expr, table: &str, keys: &mut Vec<ColumnRef>) {
    match on {
        Expr::Logical { op: LogicalOp::And, left, right } => {
            collect_join_keys(left, table, keys);
            collect_join_keys(right, table, keys);
        }
        Expr::Comparison { op: CmpOp::Eq, left, right } => {
            if let (Expr::Column(l), Expr::Column(r)) = (left.as_ref(), right.as_ref())
                && l.qualifier.is_some()
                && r.qualifier.is_some()
                && l.name == r.name
                && !keys.iter().any(|k| k.name == l.name)
            {
                let key = if r.qualifier.as_deref() == Some(table) { r } else { l };
                keys.push(key.clone());
            }
        }
        _ => {}
    }
}

/// Folds stages left to right; later `project`/`order by`/`limit` writers win.
#[derive(Default)]
pub struct PlanBuilder<'r> {
    registry: Option<&'r ColumnRegistry>,
}

impl<'r> PlanBuilder<'r> {
    pub fn new() -> Self {
        Self { registry: None }
    }

    /// Lets `project-away` expand `*` into the source table's known columns.
    pub fn with_registry(registry: &'r ColumnRegistry) -> Self {
        Self { registry: Some(registry) }
    }

    pub fn build(&self, stages: &[Stage]) -> Result<QueryPlan, CompileError> {
        let (table, rest) = match stages.split_first() {
            Some((Stage::Source(table), rest)) => (table, rest),
            Some((other, _)) => {
                return Err(CompileError::InvalidSource { fragment: other.name().to_string() });
            }
            None => return Err(CompileError::EmptyQuery),
        };
        if let Some(Stage::Source(extra)) = rest.iter().find(|s| matches!(s, Stage::Source(_))) {
            return Err(CompileError::InvalidSource { fragment: extra.clone() });
        }
        let plan = rest
            .iter()
            .try_fold(QueryPlan::new(table.clone()), |plan, stage| self.apply(plan, stage))?;
        debug!("built plan: {:?}", plan);
        Ok(plan)
    }

    pub fn apply(&self, mut plan: QueryPlan, stage: &Stage) -> Result<QueryPlan, CompileError> {
        let defined = match &plan.select_list {
            SelectList::Wildcard => Vec::new(),
            SelectList::Items(items) => items.clone(),
        };
        let join_keys = plan.join_keys();
        let scope = Scope { defined: &defined, join_keys: &join_keys };
        match stage {
            Stage::Source(table) => plan.table = table.clone(),
            Stage::Where(expr) => plan.filters.push(scope.resolve(expr, false)),
            Stage::Project(items) => {
                let items = items.iter().map(|item| project_item(item, &scope)).collect();
                plan.select_list = SelectList::Items(items);
            }
            Stage::ProjectAway(names) => self.project_away(&mut plan, names)?,
            Stage::Extend(columns) => {
                let mut items = match std::mem::replace(&mut plan.select_list, SelectList::Wildcard) {
                    SelectList::Wildcard => vec![SelectItem::AllColumns],
                    SelectList::Items(items) => items,
                };
                for (name, expr) in columns {
                    let expr = Scope { defined: &items, join_keys: &join_keys }.resolve(expr, true);
                    let item = SelectItem::Expr { expr, alias: Some(name.clone()) };
                    // extending an existing name overwrites it in place
                    match items.iter().position(|i| i.output_name() == Some(name.as_str())) {
                        Some(idx) => items[idx] = item,
                        None => items.push(item),
                    }
                }
                plan.select_list = SelectList::Items(items);
            }
            Stage::Summarize { aggregates, group_by } => {
                let mut items: Vec<SelectItem> = aggregates
                    .iter()
                    .map(|agg| {
                        SelectItem::Aggregate(Aggregate {
                            args: agg.args.iter().map(|a| scope.resolve(a, false)).collect(),
                            ..agg.clone()
                        })
                    })
                    .collect();
                let mut grouping = Vec::with_capacity(group_by.len());
                for column in group_by {
                    let expr = scope.resolve_column(column, false);
                    let alias = match &expr {
                        Expr::Column(c) if c.name == column.name => None,
                        _ => Some(column.name.clone()),
                    };
                    items.push(SelectItem::Expr { expr: expr.clone(), alias });
                    grouping.push(expr);
                }
                plan.select_list = SelectList::Items(items);
                plan.group_by = grouping;
            }
            Stage::OrderBy(keys) => {
                plan.order_by = keys
                    .iter()
                    .map(|key| SortKey { column: scope.resolve_key(&key.column), ..key.clone() })
                    .collect();
            }
            Stage::Limit(n) | Stage::Take(n) => plan.limit = Some(*n),
            Stage::Join(join) => {
                let on = match &join.on {
                    JoinCondition::Keys(keys) => key_equality(&plan.table, &join.table, keys),
                    JoinCondition::Expr(expr) => resolve_sides(expr, &plan.table, &join.table),
                };
                plan.joins.push(JoinClause { kind: join.kind, table: join.table.clone(), on });
            }
            Stage::Top { count, by } => {
                plan.order_by =
                    vec![SortKey { column: scope.resolve_key(&by.column), direction: by.direction }];
                plan.limit = Some(*count);
            }
        }
        Ok(plan)
    }

    fn project_away(&self, plan: &mut QueryPlan, names: &[String]) -> Result<(), CompileError> {
        let known = match self.registry {
            Some(reg) if plan.joins.is_empty() => reg.columns(&plan.table),
            _ => None,
        };
        let items = match (&mut plan.select_list, known) {
            (SelectList::Wildcard, None) => {
                debug!("project-away {:?} on unknown columns of {} is a no-op", names, plan.table);
                return Ok(());
            }
            (SelectList::Wildcard, Some(cols)) => cols.iter().map(|c| column_item(c)).collect(),
            (SelectList::Items(items), known) => {
                let mut expanded = Vec::with_capacity(items.len());
                for item in items.drain(..) {
                    match (item, known) {
                        (SelectItem::AllColumns, Some(cols)) => {
                            expanded.extend(cols.iter().map(|c| column_item(c)))
                        }
                        (item, _) => expanded.push(item),
                    }
                }
                expanded
            }
        };
        let kept: Vec<SelectItem> = items
            .into_iter()
            .filter(|item| item.output_name().is_none_or(|n| !names.iter().any(|r| r == n)))
            .collect();
        if kept.is_empty() {
            return Err(CompileError::syntax(
                format!("project-away {} leaves no columns", names.join(", ")),
                0,
            ));
        }
        plan.select_list = SelectList::Items(kept);
        Ok(())
    }
}

fn column_item(name: &str) -> SelectItem {
    SelectItem::Expr { expr: Expr::column(name), alias: None }
}

/// `on a, b` -> `left.a = right.a AND left.b = right.b`
fn key_equality(left: &str, right: &str, keys: &[String]) -> Expr {
    let qualified = |table: &str, key: &str| Box::new(Expr::Column(ColumnRef::qualified(table, key)));
    keys.iter()
        .map(|key| Expr::Comparison {
            op: CmpOp::Eq,
            left: qualified(left, key),
            right: qualified(right, key),
        })
        .reduce(|acc, next| Expr::Logical {
            op: LogicalOp::And,
            left: Box::new(acc),
            right: Box::new(next),
        })
        .unwrap_or_else(|| Expr::Literal(Literal::Bool(true)))
}

/// Rewrites `$left`/`$right` qualifiers to the joined table names.
fn resolve_sides(expr: &Expr, left: &str, right: &str) -> Expr {
    expr.map_columns(&|c| {
        let qualifier = match c.qualifier.as_deref() {
            Some(q) if q.eq_ignore_ascii_case("$left") => Some(left.to_string()),
            Some(q) if q.eq_ignore_ascii_case("$right") => Some(right.to_string()),
            other => other.map(str::to_string),
        };
        Expr::Column(ColumnRef { qualifier, name: c.name.clone() })
    })
}

/// What a bare column name means to the stage being folded.
///
/// SQLite cannot read a select alias from the same select list, so names computed by
/// earlier stages are replaced with their expressions. Bare join keys take the left table.
struct Scope<'a> {
    defined: &'a [SelectItem],
    join_keys: &'a [ColumnRef],
}

impl<'a> Scope<'a> {
    /// Aggregates are inlined only when the result lands in a select list.
    fn resolve(&self, expr: &Expr, in_select: bool) -> Expr {
        expr.map_columns(&|c| self.resolve_column(c, in_select))
    }

    fn resolve_column(&self, c: &ColumnRef, in_select: bool) -> Expr {
        if c.qualifier.is_some() {
            return Expr::Column(c.clone());
        }
        match self.output(&c.name) {
            Some(SelectItem::Expr { expr, .. }) => expr.clone(),
            Some(SelectItem::Aggregate(agg)) if in_select => Expr::AggregateCall {
                function: agg.function.clone(),
                args: agg.args.clone(),
            },
            Some(_) => Expr::Column(c.clone()),
            None => Expr::Column(self.qualify(c)),
        }
    }

    /// Sort keys may name a select alias directly.
    fn resolve_key(&self, c: &ColumnRef) -> ColumnRef {
        if c.qualifier.is_some() {
            return c.clone();
        }
        match self.output(&c.name) {
            Some(SelectItem::Expr { expr: Expr::Column(col), alias: None }) => col.clone(),
            Some(_) => c.clone(),
            None => self.qualify(c),
        }
    }

    fn output(&self, name: &str) -> Option<&'a SelectItem> {
        self.defined.iter().find(|item| item.output_name() == Some(name))
    }

    fn qualify(&self, c: &ColumnRef) -> ColumnRef {
        match self.join_keys.iter().find(|k| k.name == c.name) {
            Some(key) => key.clone(),
            None => c.clone(),
        }
    }
}

/// `project` output for one item; a bare name of an earlier output keeps that output.
fn project_item(item: &ProjectItem, scope: &Scope<'_>) -> SelectItem {
    if let Expr::Column(c) = &item.expr
        && c.qualifier.is_none()
        && let Some(prev) = scope.output(&c.name)
    {
        let alias = item.alias.clone().unwrap_or_else(|| c.name.clone());
        return match prev.clone() {
            SelectItem::Aggregate(agg) => SelectItem::Aggregate(Aggregate { alias, ..agg }),
            SelectItem::Expr { expr, .. } => SelectItem::Expr { expr, alias: Some(alias) },
            other => other,
        };
    }
    SelectItem::Expr { expr: scope.resolve(&item.expr, true), alias: item.alias.clone() }
}
