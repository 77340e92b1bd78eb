//! Tokenizer for filter source text.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Dot,
    DotDot,
    /// `.name`
    Field(String),
    Ident(String),
    Str(String),
    Num(f64),
    Pipe,
    Comma,
    Alt,
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Semicolon,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dot => f.write_str("'.'"),
            Self::DotDot => f.write_str("'..'"),
            Self::Field(name) => write!(f, "FIELD .{name}"),
            Self::Ident(name) => write!(f, "IDENT {name}"),
            Self::Str(s) => write!(f, "QQSTRING \"{s}\""),
            Self::Num(n) => write!(f, "LITERAL {n}"),
            Self::Pipe => f.write_str("'|'"),
            Self::Comma => f.write_str("','"),
            Self::Alt => f.write_str("\"//\""),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::LBrace => f.write_str("'{'"),
            Self::RBrace => f.write_str("'}'"),
            Self::Colon => f.write_str("':'"),
            Self::Semicolon => f.write_str("';'"),
            Self::Question => f.write_str("'?'"),
            Self::Plus => f.write_str("'+'"),
            Self::Minus => f.write_str("'-'"),
            Self::Star => f.write_str("'*'"),
            Self::Slash => f.write_str("'/'"),
            Self::Percent => f.write_str("'%'"),
            Self::Eq => f.write_str("\"==\""),
            Self::Ne => f.write_str("\"!=\""),
            Self::Lt => f.write_str("'<'"),
            Self::Le => f.write_str("\"<=\""),
            Self::Gt => f.write_str("'>'"),
            Self::Ge => f.write_str("\">=\""),
        }
    }
}

/// Lexing failure with the byte offset where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub offset: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, LexError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let peek = |i: usize| chars.get(i).map(|&(_, c)| c);

    while let Some(&(offset, c)) = chars.get(i) {
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        // comments run to end of line
        if c == '#' {
            while peek(i).is_some_and(|c| c != '\n') {
                i += 1;
            }
            continue;
        }

        let (token, width) = match c {
            '.' if peek(i + 1) == Some('.') => (Token::DotDot, 2),
            '.' if peek(i + 1).is_some_and(is_ident_start) => {
                let mut end = i + 1;
                while peek(end).is_some_and(is_ident_char) {
                    end += 1;
                }
                let name: String = chars[i + 1..end].iter().map(|&(_, c)| c).collect();
                (Token::Field(name), end - i)
            }
            '.' if peek(i + 1).is_some_and(|c| c.is_ascii_digit()) => {
                let (num, width) = lex_number(&chars, i)?;
                (Token::Num(num), width)
            }
            '.' => (Token::Dot, 1),
            '"' => {
                let (s, width) = lex_string(&chars, i)?;
                (Token::Str(s), width)
            }
            c if c.is_ascii_digit() => {
                let (num, width) = lex_number(&chars, i)?;
                (Token::Num(num), width)
            }
            c if is_ident_start(c) => {
                let mut end = i;
                while peek(end).is_some_and(is_ident_char) {
                    end += 1;
                }
                let name: String = chars[i..end].iter().map(|&(_, c)| c).collect();
                (Token::Ident(name), end - i)
            }
            '|' => (Token::Pipe, 1),
            ',' => (Token::Comma, 1),
            '/' if peek(i + 1) == Some('/') => (Token::Alt, 2),
            '/' => (Token::Slash, 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '{' => (Token::LBrace, 1),
            '}' => (Token::RBrace, 1),
            ':' => (Token::Colon, 1),
            ';' => (Token::Semicolon, 1),
            '?' => (Token::Question, 1),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Star, 1),
            '%' => (Token::Percent, 1),
            '=' if peek(i + 1) == Some('=') => (Token::Eq, 2),
            '!' if peek(i + 1) == Some('=') => (Token::Ne, 2),
            '<' if peek(i + 1) == Some('=') => (Token::Le, 2),
            '<' => (Token::Lt, 1),
            '>' if peek(i + 1) == Some('=') => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            other => {
                return Err(LexError {
                    message: format!("unexpected character '{other}'"),
                    offset,
                });
            }
        };

        tokens.push((token, offset));
        i += width;
    }

    Ok(tokens)
}

fn lex_number(chars: &[(usize, char)], start: usize) -> Result<(f64, usize), LexError> {
    let mut end = start;
    let mut text = String::new();
    let push_digits = |end: &mut usize, text: &mut String| {
        while let Some(&(_, c)) = chars.get(*end) {
            if !c.is_ascii_digit() {
                break;
            }
            text.push(c);
            *end += 1;
        }
    };

    push_digits(&mut end, &mut text);
    if chars.get(end).is_some_and(|&(_, c)| c == '.') {
        text.push('.');
        end += 1;
        push_digits(&mut end, &mut text);
    }
    if chars.get(end).is_some_and(|&(_, c)| c == 'e' || c == 'E') {
        text.push('e');
        end += 1;
        if let Some(&(_, sign @ ('+' | '-'))) = chars.get(end) {
            text.push(sign);
            end += 1;
        }
        push_digits(&mut end, &mut text);
    }

    text.parse::<f64>()
        .map(|n| (n, end - start))
        .map_err(|_| LexError {
            message: format!("invalid numeric literal {text}"),
            offset: chars[start].0,
        })
}

fn lex_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), LexError> {
    let mut out = String::new();
    let mut i = start + 1;
    let unterminated = || LexError {
        message: "unterminated string literal".into(),
        offset: chars[start].0,
    };

    loop {
        let &(offset, c) = chars.get(i).ok_or_else(unterminated)?;
        match c {
            '"' => return Ok((out, i + 1 - start)),
            '\\' => {
                let &(_, esc) = chars.get(i + 1).ok_or_else(unterminated)?;
                i += 2;
                match esc {
                    '"' => out.push('"'),
                    '\\' => out.push('\\'),
                    '/' => out.push('/'),
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    'u' => {
                        let hex: String = chars
                            .get(i..i + 4)
                            .ok_or_else(unterminated)?
                            .iter()
                            .map(|&(_, c)| c)
                            .collect();
                        let code = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32);
                        out.push(code.ok_or(LexError {
                            message: format!("invalid escape \\u{hex}"),
                            offset,
                        })?);
                        i += 4;
                    }
                    other => {
                        return Err(LexError {
                            message: format!("invalid escape \\{other}"),
                            offset,
                        });
                    }
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_path_tokens() {
        assert_eq!(
            kinds(".a.b[0]"),
            vec![
                Token::Field("a".into()),
                Token::Field("b".into()),
                Token::LBracket,
                Token::Num(0.0),
                Token::RBracket,
            ]
        );
        assert_eq!(kinds(".[]"), vec![Token::Dot, Token::LBracket, Token::RBracket]);
        assert_eq!(kinds(".."), vec![Token::DotDot]);
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a // b | c != d <= e"),
            vec![
                Token::Ident("a".into()),
                Token::Alt,
                Token::Ident("b".into()),
                Token::Pipe,
                Token::Ident("c".into()),
                Token::Ne,
                Token::Ident("d".into()),
                Token::Le,
                Token::Ident("e".into()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("1.5 2e3 .5"), vec![
            Token::Num(1.5),
            Token::Num(2000.0),
            Token::Num(0.5)
        ]);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\nA""#),
            vec![Token::Str("a\"b\nA".into())]
        );
    }

    #[test]
    fn test_comment_skipped() {
        assert_eq!(kinds(". # identity"), vec![Token::Dot]);
    }

    #[test]
    fn test_errors() {
        let err = tokenize("\"open").unwrap_err();
        assert!(err.message.contains("unterminated"));

        let err = tokenize(". & .").unwrap_err();
        assert_eq!(err.offset, 2);
    }
}
