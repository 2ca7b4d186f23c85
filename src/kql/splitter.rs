//! Cleans raw query text and cuts it into pipeline stages.

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use super::errors::CompileError;

/// Marker line inserted by the editor template; never part of a query.
pub const PLACEHOLDER_MARKER: &str = "Write your KQL query here";

static PLACEHOLDER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?m)^.*{}.*(\r?\n|$)", regex::escape(PLACEHOLDER_MARKER)))
        .expect("placeholder pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitQuery {
    /// Text that already is SQL, returned as-is.
    Passthrough(String),
    Pipeline(Vec<String>),
}

pub fn split_query(raw: &str) -> Result<SplitQuery, CompileError> {
    let cleaned = clean_query(raw);
    if cleaned.is_empty() {
        return Err(CompileError::EmptyQuery);
    }
    if looks_like_sql(&cleaned) {
        debug!("passthrough SQL: {}", cleaned);
        return Ok(SplitQuery::Passthrough(cleaned));
    }
    let stages: Vec<String> = split_stages(&cleaned)
        .into_iter()
        .enumerate()
        .filter_map(|(idx, stage)| {
            let stage = stage.trim();
            if stage.is_empty() {
                warn!("dropping empty stage #{}", idx);
                None
            } else {
                Some(stage.to_string())
            }
        })
        .collect();
    if stages.is_empty() {
        return Err(CompileError::EmptyQuery);
    }
    debug!("split into {} stages: {:?}", stages.len(), stages);
    Ok(SplitQuery::Pipeline(stages))
}

/// Removes the placeholder line and comments, then trims.
pub fn clean_query(raw: &str) -> String {
    let without_placeholder = PLACEHOLDER_LINE.replace_all(raw, "");
    strip_comments(&without_placeholder).trim().to_string()
}

/// Drops `--`, `//` and `/* */` comments that are not inside a string literal.
/// `--` only opens a comment at the start of the text or after whitespace, so `a--1` stays
/// arithmetic.
pub fn strip_comments(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(n) = next {
                    out.push(n);
                    i += 1;
                }
            } else if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match (c, next) {
            ('"', _) | ('\'', _) => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            ('-', Some('-')) if i > 0 && !chars[i - 1].is_whitespace() => {
                out.push(c);
                i += 1;
            }
            ('-', Some('-')) | ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                // keep tokens on either side apart
                out.push(' ');
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn looks_like_sql(text: &str) -> bool {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(6).collect();
    if !head.eq_ignore_ascii_case("select") {
        return false;
    }
    match chars.next() {
        None => true,
        Some(c) => c.is_whitespace() || c == '*' || c == '(',
    }
}

/// Splits on `|` outside string literals and parentheses. `||` is an operator, not a boundary.
fn split_stages(text: &str) -> Vec<String> {
    let mut stages = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' {
                if let Some(n) = chars.next() {
                    current.push(n);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '|' if chars.peek() == Some(&'|') => {
                chars.next();
                current.push_str("||");
            }
            '|' if depth == 0 => stages.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    stages.push(current);
    stages
}
