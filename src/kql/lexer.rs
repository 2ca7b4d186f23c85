//! Scanner for stage arguments and expressions.

use super::errors::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Plain or bracket-quoted identifier; dotted paths stay one token.
    Ident(String),
    /// Bracket-quoted identifiers (`['first name']`) are never keywords.
    QuotedIdent(String),
    Str(String),
    Number(String),
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    AndAnd,
    OrOr,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset in the scanned text.
    pub pos: usize,
    pub end: usize,
}

impl Token {
    /// Case-insensitive keyword check; quoted identifiers never match.
    pub fn is_keyword(&self, kw: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(s) | TokenKind::QuotedIdent(s) => Some(s),
            _ => None,
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub fn tokenize(text: &str) -> Result<Vec<Token>, CompileError> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let offset_at = |i: usize| chars.get(i).map(|(o, _)| *o).unwrap_or(text.len());
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (pos, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let next = chars.get(i + 1).map(|(_, c)| *c);
        let (kind, len) = match (c, next) {
            ('"', _) | ('\'', _) => {
                let (value, consumed) = scan_string(&chars, i, pos)?;
                (TokenKind::Str(value), consumed)
            }
            ('[', _) => scan_bracket_ident(&chars, i, text)?,
            (c, _) if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let mut j = i;
                while j < chars.len() && (chars[j].1.is_ascii_alphanumeric() || chars[j].1 == '.') {
                    j += 1;
                }
                let lexeme = &text[pos..offset_at(j)];
                if lexeme.parse::<f64>().is_err() {
                    return Err(CompileError::syntax(lexeme, pos));
                }
                (TokenKind::Number(lexeme.to_string()), j - i)
            }
            (c, _) if is_ident_start(c) => {
                let mut j = i;
                loop {
                    while j < chars.len() && is_ident_char(chars[j].1) {
                        j += 1;
                    }
                    // `T.col` / `$left.col`
                    let dotted = chars.get(j).is_some_and(|(_, c)| *c == '.')
                        && chars.get(j + 1).is_some_and(|(_, c)| is_ident_start(*c));
                    if !dotted {
                        break;
                    }
                    j += 1;
                }
                (TokenKind::Ident(text[pos..offset_at(j)].to_string()), j - i)
            }
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('<', Some('=')) => (TokenKind::LtEq, 2),
            ('>', Some('=')) => (TokenKind::GtEq, 2),
            ('<', Some('>')) => (TokenKind::NotEq, 2),
            ('&', Some('&')) => (TokenKind::AndAnd, 2),
            ('|', Some('|')) => (TokenKind::OrOr, 2),
            ('=', _) => (TokenKind::Assign, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('!', _) => (TokenKind::Bang, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            (',', _) => (TokenKind::Comma, 1),
            _ => return Err(CompileError::syntax(c.to_string(), pos)),
        };
        tokens.push(Token { kind, pos, end: offset_at(i + len) });
        i += len;
    }
    Ok(tokens)
}

fn scan_string(chars: &[(usize, char)], start: usize, pos: usize) -> Result<(String, usize), CompileError> {
    let quote = chars[start].1;
    let mut value = String::new();
    let mut j = start + 1;
    while j < chars.len() {
        let c = chars[j].1;
        if c == '\\' {
            match chars.get(j + 1) {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, other)) => value.push(*other),
                None => break,
            }
            j += 2;
            continue;
        }
        if c == quote {
            return Ok((value, j + 1 - start));
        }
        value.push(c);
        j += 1;
    }
    Err(CompileError::UnterminatedString { position: pos })
}

/// `['name']` or `["name"]`.
fn scan_bracket_ident(chars: &[(usize, char)], start: usize, text: &str) -> Result<(TokenKind, usize), CompileError> {
    let pos = chars[start].0;
    match chars.get(start + 1) {
        Some((qpos, q)) if *q == '\'' || *q == '"' => {
            let (name, consumed) = scan_string(chars, start + 1, *qpos)?;
            let close = start + 1 + consumed;
            match chars.get(close) {
                Some((_, ']')) => Ok((TokenKind::QuotedIdent(name), consumed + 2)),
                _ => Err(CompileError::syntax(&text[pos..], pos)),
            }
        }
        _ => Err(CompileError::syntax(&text[pos..], pos)),
    }
}
