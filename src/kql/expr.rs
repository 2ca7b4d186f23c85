//! Recursive-descent expression parser.
//!
//! Precedence, loosest first: `or`/`||`, `and`/`&&`, comparisons
//! (`== != < > <= >= contains !contains startswith endswith`), `+ -`, `* / %`,
//! unary minus, then literals, columns, calls and parenthesized groups.

use super::ast::{ArithOp, CmpOp, ColumnRef, Expr, Literal, LogicalOp};
use super::errors::CompileError;
use super::lexer::{Token, TokenKind, tokenize};

/// Parses a complete expression; trailing tokens are an error.
pub fn parse_expression(text: &str) -> Result<Expr, CompileError> {
    let tokens = tokenize(text)?;
    parse_tokens(text, &tokens)
}

/// Parses `tokens` (scanned from `text`) as one expression.
pub fn parse_tokens(text: &str, tokens: &[Token]) -> Result<Expr, CompileError> {
    let mut parser = ExprParser { text, tokens, pos: 0 };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(parser.unexpected(tok)),
    }
}

/// Splits a token slice on top-level commas.
pub fn split_commas(tokens: &[Token]) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Comma if depth == 0 => {
                parts.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&tokens[start..]);
    parts
}

/// Source text covered by a token slice.
pub fn slice_text<'a>(text: &'a str, tokens: &[Token]) -> &'a str {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => &text[first.pos..last.end],
        _ => "",
    }
}

struct ExprParser<'a> {
    text: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn unexpected(&self, tok: &Token) -> CompileError {
        CompileError::syntax(&self.text[tok.pos..tok.end], tok.pos)
    }

    fn unexpected_end(&self) -> CompileError {
        let position = self.tokens.last().map(|t| t.end).unwrap_or(self.text.len());
        CompileError::syntax(format!("unexpected end of expression: {}", self.text.trim()), position)
    }

    fn expect_next(&mut self) -> Result<&'a Token, CompileError> {
        self.advance().ok_or_else(|| self.unexpected_end())
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_and()?;
        while let Some(tok) = self.peek() {
            if !(tok.kind == TokenKind::OrOr || tok.is_keyword("or")) {
                break;
            }
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Logical { op: LogicalOp::Or, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_comparison()?;
        while let Some(tok) = self.peek() {
            if !(tok.kind == TokenKind::AndAnd || tok.is_keyword("and")) {
                break;
            }
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Expr::Logical { op: LogicalOp::And, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        let left = self.parse_additive()?;
        let Some(tok) = self.peek() else { return Ok(left) };
        let simple = match tok.kind {
            TokenKind::EqEq | TokenKind::Assign => Some(CmpOp::Eq),
            TokenKind::NotEq => Some(CmpOp::NotEq),
            TokenKind::Lt => Some(CmpOp::Lt),
            TokenKind::Gt => Some(CmpOp::Gt),
            TokenKind::LtEq => Some(CmpOp::LtEq),
            TokenKind::GtEq => Some(CmpOp::GtEq),
            _ => None,
        };
        if let Some(op) = simple {
            self.pos += 1;
            let right = self.parse_additive()?;
            return Ok(Expr::Comparison { op, left: Box::new(left), right: Box::new(right) });
        }

        // `!contains` arrives as Bang + Ident
        let negated = tok.kind == TokenKind::Bang;
        let word_tok = if negated { self.tokens.get(self.pos + 1) } else { Some(tok) };
        let Some(word_tok) = word_tok else { return Err(self.unexpected_end()) };
        // (prefix, suffix) wrapped around the literal
        let wildcards = if word_tok.is_keyword("contains") {
            Some(("%", "%"))
        } else if word_tok.is_keyword("startswith") {
            Some(("", "%"))
        } else if word_tok.is_keyword("endswith") {
            Some(("%", ""))
        } else {
            None
        };
        let Some((prefix, suffix)) = wildcards else {
            return if negated { Err(self.unexpected(tok)) } else { Ok(left) };
        };
        self.pos += if negated { 2 } else { 1 };
        let rhs_tok = self.expect_next()?;
        let value = match &rhs_tok.kind {
            TokenKind::Str(s) | TokenKind::Number(s) => s.clone(),
            _ => return Err(self.unexpected(rhs_tok)),
        };
        let op = if negated { CmpOp::NotLike } else { CmpOp::Like };
        let pattern = format!("{}{}{}", prefix, escape_like(&value), suffix);
        Ok(Expr::Comparison {
            op,
            left: Box::new(left),
            right: Box::new(Expr::Literal(Literal::Str(pattern))),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_term()?;
        while let Some(tok) = self.peek() {
            let op = match tok.kind {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_term()?;
            left = Expr::Arithmetic { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_unary()?;
        while let Some(tok) = self.peek() {
            let op = match tok.kind {
                TokenKind::Star => ArithOp::Mul,
                TokenKind::Slash => ArithOp::Div,
                TokenKind::Percent => ArithOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Arithmetic { op, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        if self.peek().is_some_and(|t| t.kind == TokenKind::Minus) {
            self.pos += 1;
            return Ok(match self.parse_unary()? {
                Expr::Literal(Literal::Number(n)) => match n.strip_prefix('-') {
                    Some(positive) => Expr::Literal(Literal::Number(positive.to_string())),
                    None => Expr::Literal(Literal::Number(format!("-{}", n))),
                },
                other => Expr::Arithmetic {
                    op: ArithOp::Mul,
                    left: Box::new(Expr::Literal(Literal::Number("-1".into()))),
                    right: Box::new(other),
                },
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let tok = self.expect_next()?;
        match &tok.kind {
            TokenKind::Number(n) => Ok(Expr::Literal(Literal::Number(n.clone()))),
            TokenKind::Str(s) => Ok(Expr::Literal(Literal::Str(s.clone()))),
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(t) if t.kind == TokenKind::RParen => Ok(inner),
                    Some(t) => Err(self.unexpected(t)),
                    None => Err(self.unexpected_end()),
                }
            }
            TokenKind::QuotedIdent(name) => Ok(Expr::Column(ColumnRef::bare(name.clone()))),
            TokenKind::Ident(name) => {
                if self.peek().is_some_and(|t| t.kind == TokenKind::LParen) {
                    self.pos += 1;
                    let args = self.parse_args()?;
                    return Ok(Expr::FunctionCall { name: name.clone(), args });
                }
                if name.eq_ignore_ascii_case("true") {
                    return Ok(Expr::Literal(Literal::Bool(true)));
                }
                if name.eq_ignore_ascii_case("false") {
                    return Ok(Expr::Literal(Literal::Bool(false)));
                }
                Ok(Expr::Column(column_ref(name)))
            }
            _ => Err(self.unexpected(tok)),
        }
    }

    /// Arguments after the opening paren, consuming the closing one.
    fn parse_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        if self.peek().is_some_and(|t| t.kind == TokenKind::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            let tok = self.expect_next()?;
            match tok.kind {
                TokenKind::Comma => continue,
                TokenKind::RParen => return Ok(args),
                _ => return Err(self.unexpected(tok)),
            }
        }
    }
}

/// Escapes LIKE wildcards with `\`; the emitter adds the matching `ESCAPE` clause.
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `a.b.c` keeps the last segment as the column name.
pub(crate) fn column_ref(path: &str) -> ColumnRef {
    match path.rsplit_once('.') {
        Some((qualifier, name)) => ColumnRef { qualifier: Some(qualifier.to_string()), name: name.to_string() },
        None => ColumnRef::bare(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Box<Expr> {
        Box::new(Expr::column(name))
    }

    fn num(n: &str) -> Box<Expr> {
        Box::new(Expr::Literal(Literal::Number(n.into())))
    }

    #[test]
    fn comparison_binds_tighter_than_and_or() {
        let expr = parse_expression("a == 1 or b > 2 and c != 3").expect("parse");
        let Expr::Logical { op: LogicalOp::Or, left, right } = expr else { panic!("expected or") };
        assert_eq!(*left, Expr::Comparison { op: CmpOp::Eq, left: col("a"), right: num("1") });
        assert!(matches!(*right, Expr::Logical { op: LogicalOp::And, .. }));
    }

    #[test]
    fn parentheses_group() {
        let expr = parse_expression("(a == 1 || b == 2) && c == 3").expect("parse");
        let Expr::Logical { op: LogicalOp::And, left, .. } = expr else { panic!("expected and") };
        assert!(matches!(*left, Expr::Logical { op: LogicalOp::Or, .. }));
    }

    #[test]
    fn contains_lowers_to_like() {
        assert_eq!(
            parse_expression("name contains \"ali\"").expect("parse"),
            Expr::Comparison {
                op: CmpOp::Like,
                left: col("name"),
                right: Box::new(Expr::Literal(Literal::Str("%ali%".into())))
            }
        );
        assert!(matches!(
            parse_expression("name !contains 'x'").expect("parse"),
            Expr::Comparison { op: CmpOp::NotLike, .. }
        ));
    }

    #[test]
    fn like_wildcards_in_literals_are_escaped() {
        assert_eq!(
            parse_expression("code contains 'a_n'").expect("parse"),
            Expr::Comparison {
                op: CmpOp::Like,
                left: col("code"),
                right: Box::new(Expr::Literal(Literal::Str(r"%a\_n%".into())))
            }
        );
        assert_eq!(
            parse_expression(r#"rate startswith "50%""#).expect("parse"),
            Expr::Comparison {
                op: CmpOp::Like,
                left: col("rate"),
                right: Box::new(Expr::Literal(Literal::Str(r"50\%%".into())))
            }
        );
    }

    #[test]
    fn contains_needs_literal() {
        assert!(matches!(
            parse_expression("name contains other"),
            Err(CompileError::ExpressionSyntax { position: 14, .. })
        ));
    }

    #[test]
    fn function_calls_take_zero_or_more_args() {
        assert_eq!(
            parse_expression("count()").expect("parse"),
            Expr::FunctionCall { name: "count".into(), args: vec![] }
        );
        let Expr::FunctionCall { args, .. } = parse_expression("iff(a > 1, 'hi', b)").expect("parse") else {
            panic!("expected call")
        };
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn arithmetic_precedence() {
        let expr = parse_expression("a + b * 2").expect("parse");
        let Expr::Arithmetic { op: ArithOp::Add, right, .. } = expr else { panic!("expected add") };
        assert!(matches!(*right, Expr::Arithmetic { op: ArithOp::Mul, .. }));
    }

    #[test]
    fn negative_numbers() {
        assert_eq!(parse_expression("-5").expect("parse"), Expr::Literal(Literal::Number("-5".into())));
    }

    #[test]
    fn qualified_columns() {
        assert_eq!(
            parse_expression("$left.id").expect("parse"),
            Expr::Column(ColumnRef { qualifier: Some("$left".into()), name: "id".into() })
        );
    }

    #[test]
    fn errors_carry_fragment_and_position() {
        assert_eq!(
            parse_expression("a == 1 )"),
            Err(CompileError::ExpressionSyntax { fragment: ")".into(), position: 7 })
        );
        assert!(matches!(parse_expression("a =="), Err(CompileError::ExpressionSyntax { position: 4, .. })));
        assert!(matches!(parse_expression("(a == 1"), Err(CompileError::ExpressionSyntax { .. })));
    }

    #[test]
    fn unterminated_string() {
        assert!(matches!(parse_expression("a == 'oops"), Err(CompileError::UnterminatedString { .. })));
    }

    #[test]
    fn split_commas_respects_parens() {
        let text = "a, f(b, c), d";
        let tokens = tokenize(text).expect("tokenize");
        let parts: Vec<&str> = split_commas(&tokens).into_iter().map(|p| slice_text(text, p)).collect();
        assert_eq!(parts, vec!["a", "f(b, c)", "d"]);
    }
}
