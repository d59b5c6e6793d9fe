//! Tokenization with a cached one-token lookahead.
//!
//! The lexer produces identifiers, string/character literals (raw bytes from
//! between the delimiters; escape expansion happens later, in the
//! elaborator), integer and decimal literals, a fixed keyword set, and a fixed
//! operator/punctuation set. Line comments begin with `//`. [`Lexer::peek`]
//! caches the next token without consuming it; [`Lexer::next`] returns and
//! discards the cache. End of input yields [`TokenKind::Eof`].

use strum::{Display, IntoStaticStr};

use crate::{
    ast::SourceLoc,
    error::{CompileError, CompileResult, ErrorKind},
};

/// The closed token set.
///
/// Display renders the spelling used in `Unexpected token` diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub(crate) enum TokenKind {
    #[strum(serialize = "Character")]
    Character,
    #[strum(serialize = "Decimal")]
    Decimal,
    #[strum(serialize = "Identifier")]
    Identifier,
    #[strum(serialize = "String")]
    String,
    #[strum(serialize = "Integer")]
    Integer,

    #[strum(serialize = "and")]
    KwAnd,
    #[strum(serialize = "break")]
    KwBreak,
    #[strum(serialize = "case")]
    KwCase,
    #[strum(serialize = "cast")]
    KwCast,
    #[strum(serialize = "catch")]
    KwCatch,
    #[strum(serialize = "def")]
    KwDef,
    #[strum(serialize = "defer")]
    KwDefer,
    #[strum(serialize = "else")]
    KwElse,
    #[strum(serialize = "enum")]
    KwEnum,
    #[strum(serialize = "extern")]
    KwExtern,
    #[strum(serialize = "false")]
    KwFalse,
    #[strum(serialize = "fn")]
    KwFn,
    #[strum(serialize = "for")]
    KwFor,
    #[strum(serialize = "global")]
    KwGlobal,
    #[strum(serialize = "if")]
    KwIf,
    #[strum(serialize = "is")]
    KwIs,
    #[strum(serialize = "mod")]
    KwMod,
    #[strum(serialize = "null")]
    KwNull,
    #[strum(serialize = "op")]
    KwOp,
    #[strum(serialize = "or")]
    KwOr,
    #[strum(serialize = "return")]
    KwReturn,
    #[strum(serialize = "run")]
    KwRun,
    #[strum(serialize = "static")]
    KwStatic,
    #[strum(serialize = "struct")]
    KwStruct,
    #[strum(serialize = "switch")]
    KwSwitch,
    #[strum(serialize = "tagged_union")]
    KwTaggedUnion,
    #[strum(serialize = "true")]
    KwTrue,
    #[strum(serialize = "union")]
    KwUnion,
    #[strum(serialize = "var")]
    KwVar,
    #[strum(serialize = "while")]
    KwWhile,

    #[strum(serialize = "&")]
    Ampersand,
    #[strum(serialize = "*")]
    Asterisk,
    #[strum(serialize = "@")]
    At,
    #[strum(serialize = "]")]
    BracketClose,
    #[strum(serialize = "[")]
    BracketOpen,
    #[strum(serialize = "^")]
    Caret,
    #[strum(serialize = ":")]
    Colon,
    #[strum(serialize = "::")]
    ColonColon,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = "}}")]
    CurlyClose,
    #[strum(serialize = "{{")]
    CurlyOpen,
    #[strum(serialize = "=")]
    Equals,
    #[strum(serialize = "==")]
    EqualsEquals,
    #[strum(serialize = "=>")]
    EqualsGreater,
    #[strum(serialize = "!")]
    Exclamation,
    #[strum(serialize = "!=")]
    ExclamationEquals,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterEquals,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessEquals,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "->")]
    MinusGreater,
    #[strum(serialize = ")")]
    ParenClose,
    #[strum(serialize = "(")]
    ParenOpen,
    #[strum(serialize = "%")]
    Percent,
    #[strum(serialize = ".")]
    Period,
    #[strum(serialize = "..")]
    PeriodPeriod,
    #[strum(serialize = ".{{")]
    PeriodCurlyOpen,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "?")]
    Question,
    #[strum(serialize = "??")]
    QuestionQuestion,
    #[strum(serialize = ";")]
    Semicolon,
    #[strum(serialize = "/")]
    Slash,
    #[strum(serialize = "|")]
    VerticalBar,

    #[strum(serialize = "Eof")]
    Eof,
}

/// Literal payload carried by identifier, string, character, and number
/// tokens. Text payloads borrow directly from the source buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TokenPayload<'src> {
    None,
    Text(&'src str),
    Integer(i64),
    Decimal(f64),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Token<'src> {
    pub kind: TokenKind,
    pub loc: SourceLoc,
    pub payload: TokenPayload<'src>,
}

impl<'src> Token<'src> {
    /// The text payload of an identifier/string/character token.
    ///
    /// Panics on other kinds; callers match on `kind` first.
    pub fn text(&self) -> &'src str {
        match self.payload {
            TokenPayload::Text(text) => text,
            _ => unreachable!("token {:?} has no text payload", self.kind),
        }
    }
}

fn keyword_kind(identifier: &str) -> Option<TokenKind> {
    // Dispatch on the first byte before comparing.
    let kind = match identifier.as_bytes().first()? {
        b'a' => match identifier {
            "and" => TokenKind::KwAnd,
            _ => return None,
        },
        b'b' => match identifier {
            "break" => TokenKind::KwBreak,
            _ => return None,
        },
        b'c' => match identifier {
            "case" => TokenKind::KwCase,
            "cast" => TokenKind::KwCast,
            "catch" => TokenKind::KwCatch,
            _ => return None,
        },
        b'd' => match identifier {
            "def" => TokenKind::KwDef,
            "defer" => TokenKind::KwDefer,
            _ => return None,
        },
        b'e' => match identifier {
            "else" => TokenKind::KwElse,
            "enum" => TokenKind::KwEnum,
            "extern" => TokenKind::KwExtern,
            _ => return None,
        },
        b'f' => match identifier {
            "false" => TokenKind::KwFalse,
            "fn" => TokenKind::KwFn,
            "for" => TokenKind::KwFor,
            _ => return None,
        },
        b'g' => match identifier {
            "global" => TokenKind::KwGlobal,
            _ => return None,
        },
        b'i' => match identifier {
            "if" => TokenKind::KwIf,
            "is" => TokenKind::KwIs,
            _ => return None,
        },
        b'm' => match identifier {
            "mod" => TokenKind::KwMod,
            _ => return None,
        },
        b'n' => match identifier {
            "null" => TokenKind::KwNull,
            _ => return None,
        },
        b'o' => match identifier {
            "op" => TokenKind::KwOp,
            "or" => TokenKind::KwOr,
            _ => return None,
        },
        b'r' => match identifier {
            "return" => TokenKind::KwReturn,
            "run" => TokenKind::KwRun,
            _ => return None,
        },
        b's' => match identifier {
            "static" => TokenKind::KwStatic,
            "struct" => TokenKind::KwStruct,
            "switch" => TokenKind::KwSwitch,
            _ => return None,
        },
        b't' => match identifier {
            "tagged_union" => TokenKind::KwTaggedUnion,
            "true" => TokenKind::KwTrue,
            _ => return None,
        },
        b'u' => match identifier {
            "union" => TokenKind::KwUnion,
            _ => return None,
        },
        b'v' => match identifier {
            "var" => TokenKind::KwVar,
            _ => return None,
        },
        b'w' => match identifier {
            "while" => TokenKind::KwWhile,
            _ => return None,
        },
        _ => return None,
    };
    Some(kind)
}

fn is_identifier_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_identifier_continue(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Tokenizer over one source buffer.
///
/// Cheap to clone: the parser snapshots it for its single point of one-token
/// backtracking (named vs. positional structure-literal entries).
#[derive(Clone)]
pub(crate) struct Lexer<'src> {
    source: &'src str,
    position: usize,
    path: &'src str,
    path_ref: u32,
    row: u32,
    column: u32,
    cached: Option<Token<'src>>,
}

impl<'src> Lexer<'src> {
    pub fn new(path: &'src str, path_ref: u32, source: &'src str) -> Self {
        Self {
            source,
            position: 0,
            path,
            path_ref,
            row: 1,
            column: 1,
            cached: None,
        }
    }

    pub fn path(&self) -> &'src str {
        self.path
    }

    /// Returns the next token without consuming it.
    pub fn peek(&mut self) -> CompileResult<Token<'src>> {
        if let Some(token) = self.cached {
            return Ok(token);
        }
        let token = self.scan()?;
        self.cached = Some(token);
        Ok(token)
    }

    /// Returns the next token and advances past it.
    pub fn next(&mut self) -> CompileResult<Token<'src>> {
        if let Some(token) = self.cached.take() {
            return Ok(token);
        }
        self.scan()
    }

    fn loc(&self) -> SourceLoc {
        SourceLoc {
            path_ref: self.path_ref,
            row: self.row,
            column: self.column,
        }
    }

    fn byte(&self, offset: usize) -> Option<u8> {
        self.source.as_bytes().get(self.position + offset).copied()
    }

    fn bump(&mut self) {
        if self.byte(0) == Some(b'\n') {
            self.row += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.position += 1;
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.byte(0) {
                Some(b' ' | b'\t' | b'\r' | b'\n') => self.bump(),
                Some(b'/') if self.byte(1) == Some(b'/') => {
                    while let Some(byte) = self.byte(0) {
                        if byte == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn error(&self, loc: SourceLoc, message: String) -> CompileError {
        CompileError::new(self.path, loc, ErrorKind::Lex, message)
    }

    fn token(&self, kind: TokenKind, loc: SourceLoc) -> Token<'src> {
        Token {
            kind,
            loc,
            payload: TokenPayload::None,
        }
    }

    /// Scans a quoted literal, returning the raw text between the delimiters.
    fn scan_quoted(&mut self, delimiter: u8, kind: TokenKind, loc: SourceLoc) -> CompileResult<Token<'src>> {
        self.bump(); // opening delimiter
        let start = self.position;
        loop {
            match self.byte(0) {
                None => {
                    return Err(self.error(loc, format!("Unterminated {} literal", kind.to_string().to_lowercase())));
                }
                Some(byte) if byte == delimiter => break,
                // A backslash escapes the next byte; expansion happens later.
                Some(b'\\') => {
                    self.bump();
                    if self.byte(0).is_some() {
                        self.bump();
                    }
                }
                Some(_) => self.bump(),
            }
        }
        let text = &self.source[start..self.position];
        self.bump(); // closing delimiter
        Ok(Token {
            kind,
            loc,
            payload: TokenPayload::Text(text),
        })
    }

    fn scan(&mut self) -> CompileResult<Token<'src>> {
        self.skip_trivia();
        let loc = self.loc();
        let Some(byte) = self.byte(0) else {
            return Ok(self.token(TokenKind::Eof, loc));
        };

        // Multi-byte operators are matched eagerly before their prefixes.
        let two = |second: u8, this: &Self| this.byte(1) == Some(second);
        let kind = match byte {
            b':' if two(b':', self) => Some((TokenKind::ColonColon, 2)),
            b':' => Some((TokenKind::Colon, 1)),
            b';' => Some((TokenKind::Semicolon, 1)),
            b',' => Some((TokenKind::Comma, 1)),
            b'=' if two(b'=', self) => Some((TokenKind::EqualsEquals, 2)),
            b'=' if two(b'>', self) => Some((TokenKind::EqualsGreater, 2)),
            b'=' => Some((TokenKind::Equals, 1)),
            b'!' if two(b'=', self) => Some((TokenKind::ExclamationEquals, 2)),
            b'!' => Some((TokenKind::Exclamation, 1)),
            b'*' => Some((TokenKind::Asterisk, 1)),
            b'^' => Some((TokenKind::Caret, 1)),
            b'?' if two(b'?', self) => Some((TokenKind::QuestionQuestion, 2)),
            b'?' => Some((TokenKind::Question, 1)),
            b'+' => Some((TokenKind::Plus, 1)),
            b'/' => Some((TokenKind::Slash, 1)),
            b'&' => Some((TokenKind::Ampersand, 1)),
            b'@' => Some((TokenKind::At, 1)),
            b'|' => Some((TokenKind::VerticalBar, 1)),
            b'(' => Some((TokenKind::ParenOpen, 1)),
            b')' => Some((TokenKind::ParenClose, 1)),
            b'{' => Some((TokenKind::CurlyOpen, 1)),
            b'}' => Some((TokenKind::CurlyClose, 1)),
            b'[' => Some((TokenKind::BracketOpen, 1)),
            b']' => Some((TokenKind::BracketClose, 1)),
            b'<' if two(b'=', self) => Some((TokenKind::LessEquals, 2)),
            b'<' => Some((TokenKind::Less, 1)),
            b'>' if two(b'=', self) => Some((TokenKind::GreaterEquals, 2)),
            b'>' => Some((TokenKind::Greater, 1)),
            b'%' => Some((TokenKind::Percent, 1)),
            b'.' if two(b'.', self) => Some((TokenKind::PeriodPeriod, 2)),
            b'.' if two(b'{', self) => Some((TokenKind::PeriodCurlyOpen, 2)),
            b'.' => Some((TokenKind::Period, 1)),
            b'-' if two(b'>', self) => Some((TokenKind::MinusGreater, 2)),
            b'-' => Some((TokenKind::Minus, 1)),
            _ => None,
        };
        if let Some((kind, width)) = kind {
            for _ in 0..width {
                self.bump();
            }
            return Ok(self.token(kind, loc));
        }

        match byte {
            b'"' => self.scan_quoted(b'"', TokenKind::String, loc),
            b'\'' => self.scan_quoted(b'\'', TokenKind::Character, loc),
            _ if is_identifier_start(byte) => {
                let start = self.position;
                while self.byte(0).is_some_and(is_identifier_continue) {
                    self.bump();
                }
                let text = &self.source[start..self.position];
                match keyword_kind(text) {
                    Some(kind) => Ok(self.token(kind, loc)),
                    None => Ok(Token {
                        kind: TokenKind::Identifier,
                        loc,
                        payload: TokenPayload::Text(text),
                    }),
                }
            }
            _ if byte.is_ascii_digit() => self.scan_number(loc),
            _ => Err(self.error(loc, format!("Unexpected byte '{}'", byte.escape_ascii()))),
        }
    }

    fn scan_number(&mut self, loc: SourceLoc) -> CompileResult<Token<'src>> {
        let start = self.position;
        while self.byte(0).is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
        }
        // A single period continues a decimal literal; `..` starts a range.
        if self.byte(0) == Some(b'.') && self.byte(1) != Some(b'.') {
            self.bump();
            while self.byte(0).is_some_and(|b| b.is_ascii_digit()) {
                self.bump();
            }
            let text = &self.source[start..self.position];
            let value: f64 = text
                .parse()
                .map_err(|_| self.error(loc, format!("Invalid decimal literal '{text}'")))?;
            return Ok(Token {
                kind: TokenKind::Decimal,
                loc,
                payload: TokenPayload::Decimal(value),
            });
        }
        let text = &self.source[start..self.position];
        let value: i64 = text
            .parse()
            .map_err(|_| self.error(loc, format!("Integer literal '{text}' out of range")))?;
        Ok(Token {
            kind: TokenKind::Integer,
            loc,
            payload: TokenPayload::Integer(value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new("test.lang", 0, source);
        let mut out = Vec::new();
        loop {
            let token = lexer.next().expect("lex failure");
            if token.kind == TokenKind::Eof {
                return out;
            }
            out.push(token.kind);
        }
    }

    #[test]
    fn multi_char_operators_win_over_prefixes() {
        assert_eq!(
            kinds(":: == != <= >= -> => ?? .. .{"),
            vec![
                TokenKind::ColonColon,
                TokenKind::EqualsEquals,
                TokenKind::ExclamationEquals,
                TokenKind::LessEquals,
                TokenKind::GreaterEquals,
                TokenKind::MinusGreater,
                TokenKind::EqualsGreater,
                TokenKind::QuestionQuestion,
                TokenKind::PeriodPeriod,
                TokenKind::PeriodCurlyOpen,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("def deferred fn fnx while tagged_union"),
            vec![
                TokenKind::KwDef,
                TokenKind::Identifier,
                TokenKind::KwFn,
                TokenKind::Identifier,
                TokenKind::KwWhile,
                TokenKind::KwTaggedUnion,
            ]
        );
    }

    #[test]
    fn integer_then_range_is_not_a_decimal() {
        // `0..3` must lex as Integer PeriodPeriod Integer, not a decimal.
        assert_eq!(
            kinds("0..3"),
            vec![TokenKind::Integer, TokenKind::PeriodPeriod, TokenKind::Integer]
        );
        assert_eq!(kinds("3.14"), vec![TokenKind::Decimal]);
    }

    #[test]
    fn peek_caches_one_token() {
        let mut lexer = Lexer::new("test.lang", 0, "a b");
        let peeked = lexer.peek().unwrap();
        let taken = lexer.next().unwrap();
        assert_eq!(peeked.kind, taken.kind);
        assert_eq!(peeked.loc, taken.loc);
        assert_eq!(lexer.next().unwrap().text(), "b");
    }

    #[test]
    fn comments_and_rows() {
        let mut lexer = Lexer::new("test.lang", 0, "a // rest of line\nb");
        assert_eq!(lexer.next().unwrap().loc.row, 1);
        let b = lexer.next().unwrap();
        assert_eq!(b.loc.row, 2);
        assert_eq!(b.loc.column, 1);
    }

    #[test]
    fn string_keeps_raw_escapes() {
        let mut lexer = Lexer::new("test.lang", 0, r#""a\nb""#);
        let token = lexer.next().unwrap();
        assert_eq!(token.kind, TokenKind::String);
        assert_eq!(token.text(), "a\\nb", "escapes expand later, in the elaborator");
    }

    #[test]
    fn unexpected_byte_reports_location() {
        let mut lexer = Lexer::new("test.lang", 0, "a\n  $");
        lexer.next().unwrap();
        let err = lexer.next().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lex);
        assert_eq!((err.row, err.column), (2, 3));
    }
}
