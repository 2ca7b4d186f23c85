//! Identifier checks against the tables known from ingestion.
//!
//! Tracks which column names are visible after each stage, so names created
//! by `extend`, `project ... as` or `summarize` are accepted downstream.

use std::collections::HashSet;

use super::ast::{CmpOp, ColumnRef, Expr, JoinCondition, Stage};
use super::errors::CompileError;
use crate::models::structs::ColumnRegistry;

pub fn validate_stages(stages: &[Stage], registry: &ColumnRegistry) -> Result<(), CompileError> {
    let mut scope = Visible {
        registry,
        tables: Vec::new(),
        columns: HashSet::new(),
        ambiguous: HashSet::new(),
    };

    for stage in stages {
        match stage {
            Stage::Source(table) => {
                scope.columns.extend(scope.table_columns(table)?);
                scope.tables.push(table.clone());
            }
            Stage::Where(expr) => scope.check_expr(expr)?,
            Stage::Project(items) => {
                let mut next = HashSet::new();
                for item in items {
                    scope.check_expr(&item.expr)?;
                    if let Some(name) = item.alias.as_deref().or(item.expr.output_name()) {
                        next.insert(name.to_string());
                    }
                }
                scope.replace_columns(next);
            }
            Stage::ProjectAway(_) => {}
            Stage::Extend(columns) => {
                for (name, expr) in columns {
                    scope.check_expr(expr)?;
                    scope.ambiguous.remove(name);
                    scope.columns.insert(name.clone());
                }
            }
            Stage::Summarize { aggregates, group_by } => {
                for agg in aggregates {
                    for arg in &agg.args {
                        scope.check_expr(arg)?;
                    }
                }
                for column in group_by {
                    scope.check_column(column)?;
                }
                let next = aggregates
                    .iter()
                    .map(|a| a.alias.clone())
                    .chain(group_by.iter().map(|c| c.name.clone()))
                    .collect();
                scope.replace_columns(next);
            }
            Stage::OrderBy(keys) => {
                for key in keys {
                    scope.check_column(&key.column)?;
                }
            }
            Stage::Top { by, .. } => scope.check_column(&by.column)?,
            Stage::Limit(_) | Stage::Take(_) => {}
            Stage::Join(join) => {
                let right = scope.table_columns(&join.table)?;
                let keys = match &join.on {
                    JoinCondition::Keys(keys) => {
                        for key in keys {
                            scope.check_name(key)?;
                            if !right.iter().any(|c| c == key) {
                                return Err(CompileError::UnknownColumn {
                                    column: format!("{}.{}", join.table, key),
                                });
                            }
                        }
                        keys.clone()
                    }
                    JoinCondition::Expr(_) => Vec::new(),
                };
                // a bare name present on both sides cannot be resolved, join keys aside
                let shared: Vec<String> = right
                    .iter()
                    .filter(|c| scope.columns.contains(*c) && !keys.contains(*c))
                    .cloned()
                    .collect();
                scope.columns.extend(right);
                scope.tables.push(join.table.clone());
                if let JoinCondition::Expr(expr) = &join.on {
                    scope.check_expr(expr)?;
                    let equated = equated_names(expr);
                    scope.ambiguous.extend(shared.into_iter().filter(|c| !equated.contains(c)));
                } else {
                    scope.ambiguous.extend(shared);
                }
            }
        }
    }
    Ok(())
}

/// Names compared with themselves across the join, as in `$left.id == $right.id`.
fn equated_names(expr: &Expr) -> Vec<String> {
    match expr {
        Expr::Logical { left, right, .. } => {
            let mut names = equated_names(left);
            names.extend(equated_names(right));
            names
        }
        Expr::Comparison { op: CmpOp::Eq, left, right } => match (left.as_ref(), right.as_ref()) {
            (Expr::Column(l), Expr::Column(r)) if l.name == r.name && l.qualifier != r.qualifier => {
                vec![l.name.clone()]
            }
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Column names in reach of the stage being checked.
struct Visible<'r> {
    registry: &'r ColumnRegistry,
    tables: Vec<String>,
    columns: HashSet<String>,
    /// Bare names that more than one joined table provides.
    ambiguous: HashSet<String>,
}

impl Visible<'_> {
    fn table_columns(&self, table: &str) -> Result<Vec<String>, CompileError> {
        self.registry
            .columns(table)
            .map(|cols| cols.to_vec())
            .ok_or_else(|| CompileError::UnknownTable { table: table.to_string() })
    }

    fn replace_columns(&mut self, columns: HashSet<String>) {
        self.columns = columns;
        self.ambiguous.clear();
    }

    fn check_name(&self, name: &str) -> Result<(), CompileError> {
        if self.columns.contains(name) {
            Ok(())
        } else {
            Err(CompileError::UnknownColumn { column: name.to_string() })
        }
    }

    fn check_column(&self, col: &ColumnRef) -> Result<(), CompileError> {
        match col.qualifier.as_deref() {
            Some(q) if self.tables.iter().any(|t| t == q) => match self.registry.columns(q) {
                Some(cols) if cols.iter().any(|c| c == &col.name) => Ok(()),
                _ => Err(CompileError::UnknownColumn { column: format!("{}.{}", q, col.name) }),
            },
            Some(q) if !q.starts_with('$') => Err(CompileError::UnknownTable { table: q.to_string() }),
            Some(_) => self.check_name(&col.name),
            None if self.ambiguous.contains(&col.name) => {
                Err(CompileError::AmbiguousColumn { column: col.name.clone() })
            }
            None => self.check_name(&col.name),
        }
    }

    fn check_expr(&self, expr: &Expr) -> Result<(), CompileError> {
        let mut result = Ok(());
        expr.walk_columns(&mut |col| {
            if result.is_ok() {
                result = self.check_column(col);
            }
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kql::parser::parse_pipeline;

    fn registry() -> ColumnRegistry {
        let mut reg = ColumnRegistry::new();
        reg.register("people", vec!["name".into(), "city".into(), "age".into()]);
        reg.register("cities", vec!["city".into(), "country".into(), "name".into()]);
        reg
    }

    fn validate(query: &str) -> Result<(), CompileError> {
        let stages: Vec<String> = query.split(" | ").map(str::to_string).collect();
        validate_stages(&parse_pipeline(&stages)?, &registry())
    }

    #[test]
    fn known_names_pass() {
        assert_eq!(validate("people | where age > 3 | extend n = strlen(name) | order by n"), Ok(()));
        assert_eq!(validate("people | summarize total = count() by city | order by total"), Ok(()));
        assert_eq!(validate("people | join cities on city | project people.name, country"), Ok(()));
    }

    #[test]
    fn qualified_sort_and_group_keys() {
        assert_eq!(validate("people | join cities on city | order by cities.country desc"), Ok(()));
        assert_eq!(validate("people | summarize count() by people.city"), Ok(()));
        assert_eq!(
            validate("people | order by cities.country"),
            Err(CompileError::UnknownTable { table: "cities".into() })
        );
        assert_eq!(
            validate("people | join cities on city | top 3 by cities.age"),
            Err(CompileError::UnknownColumn { column: "cities.age".into() })
        );
    }

    #[test]
    fn shared_names_after_join() {
        // join keys stay usable bare
        assert_eq!(validate("people | join cities on city | where city == 'Oslo'"), Ok(()));
        assert_eq!(
            validate("people | join cities on city | where name == 'ann'"),
            Err(CompileError::AmbiguousColumn { column: "name".into() })
        );
        assert_eq!(
            validate("people | join cities on $left.city == $right.city | order by name"),
            Err(CompileError::AmbiguousColumn { column: "name".into() })
        );
        assert_eq!(
            validate("people | join cities on city | project who = people.name | where who == 'ann'"),
            Ok(())
        );
    }

    #[test]
    fn unknown_table() {
        assert_eq!(validate("nobody"), Err(CompileError::UnknownTable { table: "nobody".into() }));
        assert_eq!(
            validate("people | join planets on city"),
            Err(CompileError::UnknownTable { table: "planets".into() })
        );
    }

    #[test]
    fn unknown_columns() {
        assert_eq!(
            validate("people | where height > 3"),
            Err(CompileError::UnknownColumn { column: "height".into() })
        );
        // `age` is gone after the projection
        assert_eq!(
            validate("people | project name | order by age"),
            Err(CompileError::UnknownColumn { column: "age".into() })
        );
        assert_eq!(
            validate("people | join kind=leftouter cities on $left.city == cities.planet"),
            Err(CompileError::UnknownColumn { column: "cities.planet".into() })
        );
    }
}
