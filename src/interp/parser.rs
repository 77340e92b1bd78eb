//! Recursive-descent parser producing the filter AST.
//!
//! Precedence, loosest first:
//!
//! ```text
//! pipe   a | b
//! comma  a , b
//! alt    a // b          (right associative)
//! or     a or b
//! and    a and b
//! cmp    a == b  a < b ...  (non associative)
//! add    a + b  a - b
//! mul    a * b  a / b  a % b
//! postfix  term .x [i] [] [a:b] ?
//! ```

use super::lexer::{Token, tokenize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Key of an object construction entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjKey {
    Name(String),
    Computed(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identity,
    RecurseAll,
    Literal(Value),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Slice(Box<Expr>, Option<Box<Expr>>, Option<Box<Expr>>),
    Iterate(Box<Expr>),
    Try(Box<Expr>),
    Array(Option<Box<Expr>>),
    /// `None` value means the `{name}` shorthand
    Object(Vec<(ObjKey, Option<Expr>)>),
    Neg(Box<Expr>),
    Pipe(Box<Expr>, Box<Expr>),
    Comma(Box<Expr>, Box<Expr>),
    Alt(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    If(Vec<(Expr, Expr)>, Option<Box<Expr>>),
    Call(String, Vec<Expr>),
}

/// Compile error: what was found and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

const KEYWORDS: &[&str] = &["and", "or", "if", "then", "elif", "else", "end"];

/// Deepest AST the parser builds. Nested groups, right-associative chains and
/// left-deep operator chains each count one level per step.
pub const MAX_PARSE_DEPTH: usize = 256;

pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src).map_err(|err| ParseError {
        message: err.message,
        offset: err.offset,
    })?;

    let mut parser = Parser {
        tokens,
        pos: 0,
        len: src.len(),
        depth: 0,
    };

    if parser.tokens.is_empty() {
        // an empty program is the identity filter
        return Ok(Expr::Identity);
    }

    let expr = parser.parse_pipe()?;
    match parser.peek() {
        None => Ok(expr),
        Some(_) => Err(parser.unexpected()),
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    len: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Enter one more level of nesting.
    fn deepen(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_PARSE_DEPTH {
            let offset = self.tokens.get(self.pos).map_or(self.len, |(_, offset)| *offset);
            return Err(ParseError {
                message: "Exceeds depth limit for parsing".into(),
                offset,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn unexpected(&self) -> ParseError {
        match self.tokens.get(self.pos) {
            Some((token, offset)) => ParseError {
                message: format!("syntax error, unexpected {token}"),
                offset: *offset,
            },
            None => ParseError {
                message: "syntax error, unexpected end of file".into(),
                offset: self.len,
            },
        }
    }

    // ------------------------------------------------------------------------
    // Binary levels
    // ------------------------------------------------------------------------

    fn parse_pipe(&mut self) -> Result<Expr, ParseError> {
        self.deepen()?;
        let mut expr = self.parse_comma()?;
        if self.eat(&Token::Pipe) {
            let rhs = self.parse_pipe()?;
            expr = Expr::Pipe(Box::new(expr), Box::new(rhs));
        }
        self.depth -= 1;
        Ok(expr)
    }

    /// Pipe without comma, used for object values.
    fn parse_pipe_no_comma(&mut self) -> Result<Expr, ParseError> {
        self.deepen()?;
        let mut expr = self.parse_alt()?;
        if self.eat(&Token::Pipe) {
            let rhs = self.parse_pipe_no_comma()?;
            expr = Expr::Pipe(Box::new(expr), Box::new(rhs));
        }
        self.depth -= 1;
        Ok(expr)
    }

    fn parse_comma(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.parse_alt()?;
        while self.eat(&Token::Comma) {
            self.deepen()?;
            let rhs = self.parse_alt()?;
            lhs = Expr::Comma(Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn parse_alt(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_or()?;
        if self.eat(&Token::Alt) {
            self.deepen()?;
            let rhs = self.parse_alt()?;
            self.depth -= 1;
            return Ok(Expr::Alt(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            self.deepen()?;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.parse_cmp()?;
        while self.eat_keyword("and") {
            self.deepen()?;
            let rhs = self.parse_cmp()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => {
                    self.depth = base;
                    return Ok(lhs);
                }
            };
            self.pos += 1;
            self.deepen()?;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                _ => {
                    self.depth = base;
                    return Ok(lhs);
                }
            };
            self.pos += 1;
            self.deepen()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_postfix()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_postfix()
    }

    // ------------------------------------------------------------------------
    // Terms
    // ------------------------------------------------------------------------

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut expr = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Field(_)) => {
                    self.deepen()?;
                    let Some(Token::Field(name)) = self.next() else {
                        unreachable!()
                    };
                    expr = Expr::Field(Box::new(expr), name);
                }
                Some(Token::Dot) if matches!(self.peek_at(1), Some(Token::Str(_))) => {
                    self.deepen()?;
                    self.pos += 1;
                    let Some(Token::Str(name)) = self.next() else {
                        unreachable!()
                    };
                    expr = Expr::Field(Box::new(expr), name);
                }
                Some(Token::Dot) if matches!(self.peek_at(1), Some(Token::LBracket)) => {
                    self.pos += 1;
                }
                Some(Token::LBracket) => {
                    self.deepen()?;
                    self.pos += 1;
                    expr = self.parse_bracket_suffix(expr)?;
                }
                Some(Token::Question) => {
                    self.deepen()?;
                    self.pos += 1;
                    expr = Expr::Try(Box::new(expr));
                }
                _ => {
                    self.depth = base;
                    return Ok(expr);
                }
            }
        }
    }

    /// After `[`: iterate, index or slice.
    fn parse_bracket_suffix(&mut self, target: Expr) -> Result<Expr, ParseError> {
        let target = Box::new(target);
        if self.eat(&Token::RBracket) {
            return Ok(Expr::Iterate(target));
        }
        if self.eat(&Token::Colon) {
            let to = self.parse_pipe()?;
            self.expect(&Token::RBracket)?;
            return Ok(Expr::Slice(target, None, Some(Box::new(to))));
        }

        let index = self.parse_pipe()?;
        if self.eat(&Token::Colon) {
            let to = if self.peek() == Some(&Token::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_pipe()?))
            };
            self.expect(&Token::RBracket)?;
            return Ok(Expr::Slice(target, Some(Box::new(index)), to));
        }
        self.expect(&Token::RBracket)?;
        Ok(Expr::Index(target, Box::new(index)))
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.unexpected());
        };

        match token {
            Token::Dot => {
                self.pos += 1;
                if let Some(Token::Str(name)) = self.peek().cloned() {
                    self.pos += 1;
                    return Ok(Expr::Field(Box::new(Expr::Identity), name));
                }
                Ok(Expr::Identity)
            }
            Token::DotDot => {
                self.pos += 1;
                Ok(Expr::RecurseAll)
            }
            Token::Field(name) => {
                self.pos += 1;
                Ok(Expr::Field(Box::new(Expr::Identity), name))
            }
            Token::Num(n) => {
                self.pos += 1;
                Ok(Expr::Literal(super::eval::number(n)))
            }
            Token::Str(s) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::String(s)))
            }
            Token::LParen => {
                self.pos += 1;
                let inner = self.parse_pipe()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                self.pos += 1;
                if self.eat(&Token::RBracket) {
                    return Ok(Expr::Array(None));
                }
                let inner = self.parse_pipe()?;
                self.expect(&Token::RBracket)?;
                Ok(Expr::Array(Some(Box::new(inner))))
            }
            Token::LBrace => {
                self.pos += 1;
                self.parse_object()
            }
            Token::Ident(name) => match name.as_str() {
                "true" => {
                    self.pos += 1;
                    Ok(Expr::Literal(Value::Bool(true)))
                }
                "false" => {
                    self.pos += 1;
                    Ok(Expr::Literal(Value::Bool(false)))
                }
                "null" => {
                    self.pos += 1;
                    Ok(Expr::Literal(Value::Null))
                }
                "if" => {
                    self.pos += 1;
                    self.parse_if()
                }
                _ if KEYWORDS.contains(&name.as_str()) => Err(self.unexpected()),
                _ => {
                    self.pos += 1;
                    self.parse_call(name)
                }
            },
            _ => Err(self.unexpected()),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, ParseError> {
        let mut args = Vec::new();
        if self.eat(&Token::LParen) {
            loop {
                args.push(self.parse_pipe()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Semicolon)?;
            }
        }
        Ok(Expr::Call(name, args))
    }

    /// After `if`.
    fn parse_if(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut branches = Vec::new();
        loop {
            let cond = self.parse_pipe()?;
            self.expect_keyword("then")?;
            let body = self.parse_pipe()?;
            branches.push((cond, body));
            if !self.eat_keyword("elif") {
                break;
            }
            // each elif nests one level deeper when evaluated
            self.deepen()?;
        }
        self.depth = base;

        let otherwise = if self.eat_keyword("else") {
            Some(Box::new(self.parse_pipe()?))
        } else {
            None
        };
        self.expect_keyword("end")?;
        Ok(Expr::If(branches, otherwise))
    }

    /// After `{`.
    fn parse_object(&mut self) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(Expr::Object(entries));
        }

        loop {
            let key = match self.next() {
                Some(Token::Ident(name)) => ObjKey::Name(name),
                Some(Token::Str(name)) => ObjKey::Name(name),
                Some(Token::LParen) => {
                    let key = self.parse_pipe()?;
                    self.expect(&Token::RParen)?;
                    ObjKey::Computed(key)
                }
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.unexpected());
                }
            };

            let value = if self.eat(&Token::Colon) {
                Some(self.parse_pipe_no_comma()?)
            } else {
                None
            };
            if value.is_none() && matches!(key, ObjKey::Computed(_)) {
                return Err(self.unexpected());
            }
            entries.push((key, value));

            if self.eat(&Token::RBrace) {
                return Ok(Expr::Object(entries));
            }
            self.expect(&Token::Comma)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(target: Expr, name: &str) -> Expr {
        Expr::Field(Box::new(target), name.into())
    }

    #[test]
    fn test_depth_limit() {
        let nested = format!("{}1{}", "[".repeat(100), "]".repeat(100));
        assert!(parse(&nested).is_ok());

        let chain = ".a".repeat(MAX_PARSE_DEPTH + 1);
        let err = parse(&chain).unwrap_err();
        assert_eq!(err.message, "Exceeds depth limit for parsing");

        let pipes = vec!["."; MAX_PARSE_DEPTH + 1].join(" | ");
        assert_eq!(
            parse(&pipes).unwrap_err().message,
            "Exceeds depth limit for parsing"
        );

        let list = vec!["1"; MAX_PARSE_DEPTH + 1].join(", ");
        assert!(parse(&list).is_err());
        assert!(parse(&vec!["1"; 100].join(", ")).is_ok());
    }

    #[test]
    fn test_empty_is_identity() {
        assert_eq!(parse("").unwrap(), Expr::Identity);
        assert_eq!(parse("  ").unwrap(), Expr::Identity);
    }

    #[test]
    fn test_field_chain() {
        assert_eq!(
            parse(".missing.path").unwrap(),
            field(field(Expr::Identity, "missing"), "path")
        );
        assert_eq!(parse(".\"a b\"").unwrap(), field(Expr::Identity, "a b"));
    }

    #[test]
    fn test_index_iterate_slice() {
        assert_eq!(
            parse(".[1]").unwrap(),
            Expr::Index(
                Box::new(Expr::Identity),
                Box::new(Expr::Literal(Value::from(1)))
            )
        );
        assert_eq!(parse(".[]").unwrap(), Expr::Iterate(Box::new(Expr::Identity)));
        assert!(matches!(parse(".[1:]").unwrap(), Expr::Slice(_, Some(_), None)));
        assert!(matches!(parse(".[:2]").unwrap(), Expr::Slice(_, None, Some(_))));
        assert!(matches!(
            parse(".a.[0]").unwrap(),
            Expr::Index(inner, _) if *inner == field(Expr::Identity, "a")
        ));
    }

    #[test]
    fn test_precedence() {
        // pipe binds loosest, comma tighter
        let expr = parse(".a, .b | .c").unwrap();
        assert!(matches!(expr, Expr::Pipe(lhs, _) if matches!(*lhs, Expr::Comma(..))));

        // multiplication before addition
        let expr = parse("1 + 2 * 3").unwrap();
        assert!(matches!(
            expr,
            Expr::Binary(BinOp::Add, _, rhs) if matches!(*rhs, Expr::Binary(BinOp::Mul, ..))
        ));
    }

    #[test]
    fn test_object_construction() {
        let expr = parse("{a, \"b\": .x | length, (.k): 1}").unwrap();
        let Expr::Object(entries) = expr else {
            panic!("expected object");
        };
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], (ObjKey::Name("a".into()), None));
        assert!(matches!(entries[1].1, Some(Expr::Pipe(..))));
        assert!(matches!(entries[2].0, ObjKey::Computed(_)));
    }

    #[test]
    fn test_if_elif_else() {
        let expr = parse("if . then 1 elif .a then 2 else 3 end").unwrap();
        assert!(matches!(expr, Expr::If(branches, Some(_)) if branches.len() == 2));
    }

    #[test]
    fn test_call_with_args() {
        assert_eq!(
            parse("map(.a)").unwrap(),
            Expr::Call("map".into(), vec![field(Expr::Identity, "a")])
        );
        assert_eq!(parse("length").unwrap(), Expr::Call("length".into(), vec![]));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse(".[").is_err());
        assert!(parse(".missing.path[").is_err());
        assert!(parse("if . then 1").is_err());
        assert!(parse("{(.a)}").is_err());
        assert!(parse(". .").is_err());

        let err = parse(".a |").unwrap_err();
        assert!(err.message.contains("end of file"));
        assert_eq!(err.offset, 4);
    }
}
