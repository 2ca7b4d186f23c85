use log::debug;

use super::ast::{
    Aggregate, ColumnRef, Expr, JoinCondition, JoinKind, JoinStage, ProjectItem, SortDirection,
    SortKey, Stage,
};
use super::errors::CompileError;
use super::expr::{column_ref, parse_tokens, slice_text, split_commas};
use super::lexer::{Token, TokenKind, tokenize};

/// Parses trimmed stage strings; the first one names the source table.
pub fn parse_pipeline(stages: &[String]) -> Result<Vec<Stage>, CompileError> {
    let Some((first, rest)) = stages.split_first() else {
        return Err(CompileError::EmptyQuery);
    };
    let mut out = Vec::with_capacity(stages.len());
    out.push(parse_source(first)?);
    for text in rest {
        let stage = parse_stage(text)?;
        debug!("parsed {} stage from {:?}", stage.name(), text);
        out.push(stage);
    }
    Ok(out)
}

pub fn parse_source(text: &str) -> Result<Stage, CompileError> {
    parse_table_name(text)
        .map(Stage::Source)
        .ok_or_else(|| CompileError::InvalidSource { fragment: text.to_string() })
}

pub fn parse_stage(text: &str) -> Result<Stage, CompileError> {
    let keyword_len = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(text.len());
    let keyword = text[..keyword_len].to_ascii_lowercase();
    let args = &text[keyword_len..];
    match keyword.as_str() {
        "where" | "filter" => parse_where(args),
        "project" => parse_project(args),
        "project-away" => parse_project_away(args),
        "extend" => parse_extend(args),
        "summarize" => parse_summarize(args),
        "order" | "sort" => parse_order_by(args),
        "limit" => parse_row_count(text, args).map(Stage::Limit),
        "take" => parse_row_count(text, args).map(Stage::Take),
        "join" => parse_join(args),
        "top" => parse_top(text, args),
        _ => Err(CompileError::UnknownStage { stage: text.to_string() }),
    }
}

/// Table names: `[A-Za-z0-9_.-]+` or a bracket-quoted `['any name']`.
fn parse_table_name(text: &str) -> Option<String> {
    let text = text.trim();
    if text.starts_with('[') {
        let tokens = tokenize(text).ok()?;
        return match tokens.as_slice() {
            [Token { kind: TokenKind::QuotedIdent(name), .. }] if !name.is_empty() => Some(name.clone()),
            _ => None,
        };
    }
    let valid = !text.is_empty()
        && text.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    valid.then(|| text.to_string())
}

fn expect_tokens(args: &str) -> Result<Vec<Token>, CompileError> {
    let tokens = tokenize(args)?;
    if tokens.is_empty() {
        return Err(CompileError::syntax(
            format!("missing arguments: {}", args.trim()),
            args.len(),
        ));
    }
    Ok(tokens)
}

/// Top-level comma list; empty items (`a,,b`, trailing commas) are rejected.
fn comma_list<'t>(args: &str, tokens: &'t [Token]) -> Result<Vec<&'t [Token]>, CompileError> {
    let parts = split_commas(tokens);
    for (idx, part) in parts.iter().enumerate() {
        if part.is_empty() {
            // point at the comma that opened (or closed) the empty slot
            let comma = tokens
                .iter()
                .filter(|t| t.kind == TokenKind::Comma)
                .nth(idx.saturating_sub(1))
                .map(|t| t.pos)
                .unwrap_or(0);
            return Err(CompileError::syntax(args.trim(), comma));
        }
    }
    Ok(parts)
}

/// A single identifier token, e.g. a column name in `project-away`.
fn single_name(part: &[Token]) -> Option<String> {
    match part {
        [tok] => tok.ident().map(str::to_string),
        _ => None,
    }
}

/// A column named by one token; `T.col` keeps its table.
fn single_column(part: &[Token]) -> Option<ColumnRef> {
    match part {
        [Token { kind: TokenKind::Ident(name), .. }] => Some(column_ref(name)),
        [Token { kind: TokenKind::QuotedIdent(name), .. }] => Some(ColumnRef::bare(name.clone())),
        _ => None,
    }
}

fn parse_where(args: &str) -> Result<Stage, CompileError> {
    let tokens = expect_tokens(args)?;
    Ok(Stage::Where(parse_tokens(args, &tokens)?))
}

fn parse_project(args: &str) -> Result<Stage, CompileError> {
    let tokens = expect_tokens(args)?;
    let items = comma_list(args, &tokens)?
        .into_iter()
        .map(|part| parse_project_item(args, part))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage::Project(items))
}

fn parse_project_item(args: &str, part: &[Token]) -> Result<ProjectItem, CompileError> {
    if let Some((alias, rhs)) = split_assignment(part) {
        return Ok(ProjectItem { expr: parse_tokens(args, rhs)?, alias: Some(alias) });
    }
    if let [head @ .., as_kw, alias_tok] = part
        && as_kw.is_keyword("as")
        && let Some(alias) = alias_tok.ident()
    {
        return Ok(ProjectItem { expr: parse_tokens(args, head)?, alias: Some(alias.to_string()) });
    }
    Ok(ProjectItem { expr: parse_tokens(args, part)?, alias: None })
}

/// `name = rest`
fn split_assignment(part: &[Token]) -> Option<(String, &[Token])> {
    match part {
        [name, eq, rest @ ..] if eq.kind == TokenKind::Assign && !rest.is_empty() => {
            name.ident().map(|n| (n.to_string(), rest))
        }
        _ => None,
    }
}

fn parse_project_away(args: &str) -> Result<Stage, CompileError> {
    let tokens = expect_tokens(args)?;
    let names = comma_list(args, &tokens)?
        .into_iter()
        .map(|part| {
            single_name(part).ok_or_else(|| CompileError::syntax(slice_text(args, part), part[0].pos))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage::ProjectAway(names))
}

fn parse_extend(args: &str) -> Result<Stage, CompileError> {
    let tokens = expect_tokens(args)?;
    let columns = comma_list(args, &tokens)?
        .into_iter()
        .map(|part| {
            let (name, rhs) = split_assignment(part)
                .ok_or_else(|| CompileError::syntax(slice_text(args, part), part[0].pos))?;
            Ok((name, parse_tokens(args, rhs)?))
        })
        .collect::<Result<Vec<_>, CompileError>>()?;
    Ok(Stage::Extend(columns))
}

fn parse_summarize(args: &str) -> Result<Stage, CompileError> {
    let tokens = tokenize(args)?;
    let whole = || CompileError::AggregateSyntax { fragment: format!("summarize{}", args) };
    let mut depth = 0usize;
    let by_idx = tokens.iter().position(|t| {
        match t.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            _ => {}
        }
        depth == 0 && t.is_keyword("by")
    });
    let (agg_tokens, group_tokens) = match by_idx {
        Some(idx) => (&tokens[..idx], Some(&tokens[idx + 1..])),
        None => (&tokens[..], None),
    };

    let mut aggregates = Vec::new();
    if !agg_tokens.is_empty() {
        for part in split_commas(agg_tokens) {
            aggregates.push(parse_aggregate(args, part)?);
        }
    }

    let mut group_by = Vec::new();
    if let Some(group_tokens) = group_tokens {
        if group_tokens.is_empty() {
            return Err(whole());
        }
        for part in split_commas(group_tokens) {
            let column = single_column(part).ok_or_else(|| CompileError::AggregateSyntax {
                fragment: slice_text(args, part).to_string(),
            })?;
            group_by.push(column);
        }
    }

    if aggregates.is_empty() && group_by.is_empty() {
        return Err(whole());
    }
    Ok(Stage::Summarize { aggregates, group_by })
}

/// `[alias =] func(args)`; anything else is rejected, never skipped.
fn parse_aggregate(args: &str, part: &[Token]) -> Result<Aggregate, CompileError> {
    let fragment = || CompileError::AggregateSyntax { fragment: slice_text(args, part).to_string() };
    if part.is_empty() {
        return Err(CompileError::AggregateSyntax { fragment: args.trim().to_string() });
    }
    let (alias, call) = match split_assignment(part) {
        Some((alias, rhs)) => (Some(alias), rhs),
        None => (None, part),
    };
    let expr = match parse_tokens(args, call) {
        Ok(expr) => expr,
        Err(CompileError::UnterminatedString { position }) => {
            return Err(CompileError::UnterminatedString { position });
        }
        Err(_) => return Err(fragment()),
    };
    let Expr::FunctionCall { name, args: call_args } = expr else {
        return Err(fragment());
    };
    let alias = alias.unwrap_or_else(|| default_aggregate_alias(&name, &call_args));
    Ok(Aggregate { alias, function: name, args: call_args })
}

/// Kusto naming for unnamed aggregates: `count_`, `sum_price`, `dcount_`.
fn default_aggregate_alias(function: &str, args: &[Expr]) -> String {
    match args {
        [Expr::Column(c)] => format!("{}_{}", function, c.name),
        _ => format!("{}_", function),
    }
}

fn parse_order_by(args: &str) -> Result<Stage, CompileError> {
    let tokens = tokenize(args)?;
    match tokens.split_first() {
        Some((by, rest)) if by.is_keyword("by") && !rest.is_empty() => {
            let keys = comma_list(args, rest)?
                .into_iter()
                .map(|part| parse_sort_key(args, part, SortDirection::Asc))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Stage::OrderBy(keys))
        }
        Some((tok, _)) => Err(CompileError::syntax(args.trim(), tok.pos)),
        None => Err(CompileError::syntax("expected 'by'", args.len())),
    }
}

fn parse_sort_key(
    args: &str,
    part: &[Token],
    default: SortDirection,
) -> Result<SortKey, CompileError> {
    let bad = || {
        CompileError::syntax(slice_text(args, part), part.first().map(|t| t.pos).unwrap_or(0))
    };
    let (col, direction) = match part {
        [col] => (col, default),
        [col, dir] if dir.is_keyword("asc") => (col, SortDirection::Asc),
        [col, dir] if dir.is_keyword("desc") => (col, SortDirection::Desc),
        _ => return Err(bad()),
    };
    let column = single_column(std::slice::from_ref(col)).ok_or_else(bad)?;
    Ok(SortKey { column, direction })
}

fn parse_row_count(stage: &str, args: &str) -> Result<u64, CompileError> {
    match args.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CompileError::InvalidLimit { fragment: stage.to_string() }),
    }
}

fn parse_top(stage: &str, args: &str) -> Result<Stage, CompileError> {
    let tokens = tokenize(args)?;
    let Some((count_tok, rest)) = tokens.split_first() else {
        return Err(CompileError::InvalidLimit { fragment: stage.to_string() });
    };
    let count = match &count_tok.kind {
        TokenKind::Number(n) => n.parse::<u64>().ok().filter(|n| *n > 0),
        _ => None,
    }
    .ok_or_else(|| CompileError::InvalidLimit { fragment: stage.to_string() })?;
    match rest.split_first() {
        Some((by, key)) if by.is_keyword("by") && !key.is_empty() => {
            let by = parse_sort_key(args, key, SortDirection::Desc)?;
            Ok(Stage::Top { count, by })
        }
        Some((tok, _)) => Err(CompileError::syntax(&args[tok.pos..], tok.pos)),
        None => Err(CompileError::syntax(format!("expected 'by' in: {}", stage), args.len())),
    }
}

fn parse_join(args: &str) -> Result<Stage, CompileError> {
    let tokens = expect_tokens(args)?;
    let (kind, rest) = match tokens.as_slice() {
        [kw, eq, value, rest @ ..] if kw.is_keyword("kind") && eq.kind == TokenKind::Assign => {
            let kind = match value.ident().map(str::to_ascii_lowercase).as_deref() {
                Some("inner") | Some("innerunique") => JoinKind::Inner,
                Some("leftouter") | Some("left") => JoinKind::Left,
                _ => return Err(CompileError::syntax(&args[value.pos..value.end], value.pos)),
            };
            (kind, rest)
        }
        all => (JoinKind::Inner, all),
    };

    let on_idx = rest
        .iter()
        .position(|t| t.is_keyword("on"))
        .ok_or_else(|| CompileError::syntax(format!("expected 'on': {}", args.trim()), args.len()))?;
    let (table_tokens, cond_tokens) = (&rest[..on_idx], &rest[on_idx + 1..]);
    let table_text = slice_text(args, table_tokens);
    let table_text = table_text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(table_text);
    let table = parse_table_name(table_text).ok_or_else(|| {
        CompileError::syntax(table_text, table_tokens.first().map(|t| t.pos).unwrap_or(0))
    })?;
    if cond_tokens.is_empty() {
        return Err(CompileError::syntax(format!("missing join condition: {}", args.trim()), args.len()));
    }

    let keys: Option<Vec<String>> = split_commas(cond_tokens)
        .into_iter()
        .map(|part| match part {
            [Token { kind: TokenKind::Ident(name), .. }] if !name.contains('.') => Some(name.clone()),
            [Token { kind: TokenKind::QuotedIdent(name), .. }] => Some(name.clone()),
            _ => None,
        })
        .collect();
    let on = match keys {
        Some(keys) => JoinCondition::Keys(keys),
        None => JoinCondition::Expr(parse_tokens(args, cond_tokens)?),
    };
    Ok(Stage::Join(JoinStage { kind, table, on }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kql::ast::{CmpOp, Literal};

    #[test]
    fn first_stage_is_source() {
        assert_eq!(parse_source("Sales_2024").expect("source"), Stage::Source("Sales_2024".into()));
        assert_eq!(parse_source("['my table']").expect("source"), Stage::Source("my table".into()));
        assert!(matches!(parse_source("where a == 1"), Err(CompileError::InvalidSource { .. })));
    }

    #[test]
    fn unknown_stage_keeps_text() {
        assert_eq!(
            parse_stage("frobnicate x"),
            Err(CompileError::UnknownStage { stage: "frobnicate x".into() })
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert!(matches!(parse_stage("WHERE a == 1"), Ok(Stage::Where(_))));
        assert!(matches!(parse_stage("Order By a"), Ok(Stage::OrderBy(_))));
        assert!(matches!(parse_stage("Project-Away a"), Ok(Stage::ProjectAway(_))));
    }

    #[test]
    fn project_items() {
        let Stage::Project(items) = parse_stage("project a, b * 2 as doubled, c2 = c").expect("project") else {
            panic!("expected project")
        };
        assert_eq!(items[0], ProjectItem { expr: Expr::column("a"), alias: None });
        assert_eq!(items[1].alias.as_deref(), Some("doubled"));
        assert_eq!(items[2], ProjectItem { expr: Expr::column("c"), alias: Some("c2".into()) });
    }

    #[test]
    fn extend_requires_names() {
        assert!(matches!(parse_stage("extend total = a + b"), Ok(Stage::Extend(cols)) if cols[0].0 == "total"));
        assert!(matches!(parse_stage("extend a + b"), Err(CompileError::ExpressionSyntax { .. })));
    }

    #[test]
    fn summarize_with_and_without_aliases() {
        let Stage::Summarize { aggregates, group_by } =
            parse_stage("summarize n = count(), sum(price) by region, city").expect("summarize")
        else {
            panic!("expected summarize")
        };
        assert_eq!(aggregates[0].alias, "n");
        assert_eq!(aggregates[1].alias, "sum_price");
        assert_eq!(group_by, vec![ColumnRef::bare("region"), ColumnRef::bare("city")]);
    }

    #[test]
    fn dotted_keys_keep_their_table() {
        let Stage::Summarize { group_by, .. } =
            parse_stage("summarize count() by T.a, ['odd.name']").expect("summarize")
        else {
            panic!("expected summarize")
        };
        assert_eq!(group_by, vec![ColumnRef::qualified("T", "a"), ColumnRef::bare("odd.name")]);
        assert_eq!(
            parse_stage("order by U.name desc").expect("order"),
            Stage::OrderBy(vec![SortKey {
                column: ColumnRef::qualified("U", "name"),
                direction: SortDirection::Desc,
            }])
        );
    }

    #[test]
    fn malformed_aggregates_are_errors() {
        assert!(matches!(parse_stage("summarize total = price"), Err(CompileError::AggregateSyntax { .. })));
        assert!(matches!(parse_stage("summarize sum(price"), Err(CompileError::AggregateSyntax { .. })));
        assert!(matches!(parse_stage("summarize count() by"), Err(CompileError::AggregateSyntax { .. })));
        assert!(matches!(parse_stage("summarize"), Err(CompileError::AggregateSyntax { .. })));
        assert_eq!(
            parse_stage("summarize count(), oops by a"),
            Err(CompileError::AggregateSyntax { fragment: "oops".into() })
        );
    }

    #[test]
    fn order_by_directions() {
        assert_eq!(
            parse_stage("order by a desc, b").expect("order"),
            Stage::OrderBy(vec![
                SortKey { column: ColumnRef::bare("a"), direction: SortDirection::Desc },
                SortKey { column: ColumnRef::bare("b"), direction: SortDirection::Asc },
            ])
        );
        assert!(matches!(parse_stage("order a"), Err(CompileError::ExpressionSyntax { .. })));
    }

    #[test]
    fn row_counts_must_be_positive_integers() {
        assert_eq!(parse_stage("limit 10"), Ok(Stage::Limit(10)));
        assert_eq!(parse_stage("take 3"), Ok(Stage::Take(3)));
        for bad in ["limit 0", "limit -1", "take ten", "limit", "limit 1.5"] {
            assert!(matches!(parse_stage(bad), Err(CompileError::InvalidLimit { .. })), "{}", bad);
        }
    }

    #[test]
    fn top_defaults_to_descending() {
        assert_eq!(
            parse_stage("top 5 by score").expect("top"),
            Stage::Top { count: 5, by: SortKey::desc("score") }
        );
        assert!(matches!(parse_stage("top x by score"), Err(CompileError::InvalidLimit { .. })));
        assert!(matches!(parse_stage("top 5 score"), Err(CompileError::ExpressionSyntax { .. })));
    }

    #[test]
    fn join_forms() {
        assert_eq!(
            parse_stage("join Orders on id").expect("join"),
            Stage::Join(JoinStage {
                kind: JoinKind::Inner,
                table: "Orders".into(),
                on: JoinCondition::Keys(vec!["id".into()]),
            })
        );
        let Stage::Join(join) =
            parse_stage("join kind=leftouter (Orders) on $left.id == $right.user_id").expect("join")
        else {
            panic!("expected join")
        };
        assert_eq!(join.kind, JoinKind::Left);
        assert_eq!(join.table, "Orders");
        assert!(matches!(join.on, JoinCondition::Expr(Expr::Comparison { op: CmpOp::Eq, .. })));
        assert!(matches!(parse_stage("join Orders"), Err(CompileError::ExpressionSyntax { .. })));
    }

    #[test]
    fn where_with_embedded_pipe() {
        assert_eq!(
            parse_stage(r#"where name == "a|b""#).expect("where"),
            Stage::Where(Expr::Comparison {
                op: CmpOp::Eq,
                left: Box::new(Expr::column("name")),
                right: Box::new(Expr::Literal(Literal::Str("a|b".into()))),
            })
        );
    }
}
