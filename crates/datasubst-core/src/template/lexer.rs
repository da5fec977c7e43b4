//! Tokenizer for template text.
//!
//! Splits the source into literal text and action tokens. Trim markers
//! (`{{- ` and ` -}}`) are applied here, and comments are dropped, so the
//! parser only ever sees text that is written verbatim.

use std::fmt;

use super::Delimiters;

/// Byte offset into the template source.
pub(crate) type Pos = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    Block,
    Break,
    Continue,
    Define,
    Else,
    End,
    If,
    Range,
    Template,
    With,
}

impl Keyword {
    fn lookup(word: &str) -> Option<Self> {
        Some(match word {
            "block" => Self::Block,
            "break" => Self::Break,
            "continue" => Self::Continue,
            "define" => Self::Define,
            "else" => Self::Else,
            "end" => Self::End,
            "if" => Self::If,
            "range" => Self::Range,
            "template" => Self::Template,
            "with" => Self::With,
            _ => return None,
        })
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Define => "define",
            Self::Else => "else",
            Self::End => "end",
            Self::If => "if",
            Self::Range => "range",
            Self::Template => "template",
            Self::With => "with",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Text,
    LeftDelim,
    RightDelim,
    Space,
    /// `.name`; the token text keeps the leading dot.
    Field,
    Dot,
    /// `$` or `$name`.
    Variable,
    Identifier,
    Keyword(Keyword),
    Bool,
    Nil,
    String,
    RawString,
    Char,
    Number,
    LeftParen,
    RightParen,
    Pipe,
    Declare,
    Assign,
    Comma,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
    pub text: String,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => f.write_str("EOF"),
            TokenKind::Keyword(kw) => write!(f, "<{}>", kw.as_str()),
            TokenKind::Space => f.write_str("space"),
            _ => write!(f, "{:?}", self.text),
        }
    }
}

/// A lexical or syntactic failure at a source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SyntaxError {
    pub pos: Pos,
    pub message: String,
}

impl SyntaxError {
    pub(crate) fn new(pos: Pos, message: impl Into<String>) -> Self {
        Self {
            pos,
            message: message.into(),
        }
    }
}

const COMMENT_OPEN: &str = "/*";
const COMMENT_CLOSE: &str = "*/";

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_alphanumeric(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// `-` followed by a space, right after a left delimiter.
fn has_left_trim_marker(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('-') && chars.next().is_some_and(is_space)
}

/// A space followed by `-`, right before a right delimiter.
fn has_right_trim_marker(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(is_space) && chars.next() == Some('-')
}

pub(crate) fn tokenize(src: &str, delims: &Delimiters) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer {
        src,
        left: delims.left(),
        right: delims.right(),
        pos: 0,
        paren_depth: 0,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

struct Lexer<'a> {
    src: &'a str,
    left: &'a str,
    right: &'a str,
    pos: Pos,
    paren_depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn emit(&mut self, kind: TokenKind, start: Pos) {
        self.tokens.push(Token {
            kind,
            pos: start,
            text: self.src[start..self.pos].to_string(),
        });
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        loop {
            let Some(offset) = self.rest().find(self.left) else {
                self.emit_text(self.pos, self.src.len(), false);
                break;
            };
            let delim_start = self.pos + offset;
            let after_delim = delim_start + self.left.len();
            let trim_left = has_left_trim_marker(&self.src[after_delim..]);
            self.emit_text(self.pos, delim_start, trim_left);

            self.pos = after_delim;
            if trim_left {
                self.pos += 2;
            }
            if self.rest().starts_with(COMMENT_OPEN) {
                self.lex_comment(delim_start)?;
                continue;
            }

            self.tokens.push(Token {
                kind: TokenKind::LeftDelim,
                pos: delim_start,
                text: self.left.to_string(),
            });
            self.paren_depth = 0;
            self.lex_action()?;
        }
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            pos: self.src.len(),
            text: String::new(),
        });
        Ok(())
    }

    fn emit_text(&mut self, start: Pos, end: Pos, trim_trailing: bool) {
        let mut text = &self.src[start..end];
        if trim_trailing {
            text = text.trim_end_matches(is_space);
        }
        if !text.is_empty() {
            self.tokens.push(Token {
                kind: TokenKind::Text,
                pos: start,
                text: text.to_string(),
            });
        }
    }

    /// Skip leading whitespace of the text that follows a ` -}}`.
    fn skip_trimmed_space(&mut self) {
        let trimmed = self.rest().trim_start_matches(is_space);
        self.pos = self.src.len() - trimmed.len();
    }

    /// Returns `Some(trim)` if a right delimiter (optionally trim-marked) starts here.
    fn at_right_delim(&self) -> Option<bool> {
        let rest = self.rest();
        if has_right_trim_marker(rest) && rest[2..].starts_with(self.right) {
            return Some(true);
        }
        if rest.starts_with(self.right) {
            return Some(false);
        }
        None
    }

    fn consume_right_delim(&mut self, trim: bool) {
        if trim {
            self.pos += 2;
        }
        let start = self.pos;
        self.pos += self.right.len();
        self.emit(TokenKind::RightDelim, start);
        if trim {
            self.skip_trimmed_space();
        }
    }

    fn lex_comment(&mut self, delim_start: Pos) -> Result<(), SyntaxError> {
        let body = self.pos + COMMENT_OPEN.len();
        let Some(close) = self.src[body..].find(COMMENT_CLOSE) else {
            return Err(SyntaxError::new(delim_start, "unclosed comment"));
        };
        self.pos = body + close + COMMENT_CLOSE.len();
        match self.at_right_delim() {
            Some(trim) => {
                if trim {
                    self.pos += 2;
                }
                self.pos += self.right.len();
                if trim {
                    self.skip_trimmed_space();
                }
                Ok(())
            }
            None => Err(SyntaxError::new(
                delim_start,
                "comment ends before closing delimiter",
            )),
        }
    }

    fn lex_action(&mut self) -> Result<(), SyntaxError> {
        loop {
            if let Some(trim) = self.at_right_delim() {
                if self.paren_depth > 0 {
                    return Err(SyntaxError::new(self.pos, "unclosed left paren"));
                }
                self.consume_right_delim(trim);
                return Ok(());
            }

            let start = self.pos;
            let Some(c) = self.bump() else {
                return Err(SyntaxError::new(start, "unclosed action"));
            };
            match c {
                c if is_space(c) => {
                    while self.peek().is_some_and(is_space) && self.at_right_delim().is_none() {
                        self.bump();
                    }
                    self.emit(TokenKind::Space, start);
                }
                '=' => self.emit(TokenKind::Assign, start),
                ':' => {
                    if self.peek() != Some('=') {
                        return Err(SyntaxError::new(start, "expected :="));
                    }
                    self.bump();
                    self.emit(TokenKind::Declare, start);
                }
                '|' => self.emit(TokenKind::Pipe, start),
                ',' => self.emit(TokenKind::Comma, start),
                '"' => self.lex_quote(start)?,
                '`' => self.lex_raw_quote(start)?,
                '\'' => self.lex_char(start)?,
                '$' => {
                    self.eat_alphanumeric();
                    self.emit(TokenKind::Variable, start);
                }
                '.' => {
                    if self.peek().is_some_and(|n| n.is_ascii_digit()) {
                        self.lex_number(start)?;
                    } else if self.peek().is_some_and(is_alphanumeric) {
                        self.eat_alphanumeric();
                        self.emit(TokenKind::Field, start);
                    } else {
                        self.emit(TokenKind::Dot, start);
                    }
                }
                '+' | '-' | '0'..='9' => self.lex_number(start)?,
                c if is_alphanumeric(c) => {
                    self.eat_alphanumeric();
                    let word = &self.src[start..self.pos];
                    let kind = match word {
                        "true" | "false" => TokenKind::Bool,
                        "nil" => TokenKind::Nil,
                        _ => Keyword::lookup(word)
                            .map(TokenKind::Keyword)
                            .unwrap_or(TokenKind::Identifier),
                    };
                    self.emit(kind, start);
                }
                '(' => {
                    self.paren_depth += 1;
                    self.emit(TokenKind::LeftParen, start);
                }
                ')' => {
                    if self.paren_depth == 0 {
                        return Err(SyntaxError::new(start, "unexpected right paren"));
                    }
                    self.paren_depth -= 1;
                    self.emit(TokenKind::RightParen, start);
                }
                other => {
                    return Err(SyntaxError::new(
                        start,
                        format!(
                            "unrecognized character in action: U+{:04X} {other:?}",
                            other as u32
                        ),
                    ))
                }
            }
        }
    }

    fn eat_alphanumeric(&mut self) {
        while self.peek().is_some_and(is_alphanumeric) {
            self.bump();
        }
    }

    fn lex_quote(&mut self, start: Pos) -> Result<(), SyntaxError> {
        loop {
            match self.bump() {
                Some('\\') => {
                    if matches!(self.bump(), None | Some('\n')) {
                        return Err(SyntaxError::new(start, "unterminated quoted string"));
                    }
                }
                Some('"') => break,
                None | Some('\n') => {
                    return Err(SyntaxError::new(start, "unterminated quoted string"))
                }
                Some(_) => {}
            }
        }
        self.emit(TokenKind::String, start);
        Ok(())
    }

    fn lex_raw_quote(&mut self, start: Pos) -> Result<(), SyntaxError> {
        loop {
            match self.bump() {
                Some('`') => break,
                None => return Err(SyntaxError::new(start, "unterminated raw quoted string")),
                Some(_) => {}
            }
        }
        self.emit(TokenKind::RawString, start);
        Ok(())
    }

    fn lex_char(&mut self, start: Pos) -> Result<(), SyntaxError> {
        loop {
            match self.bump() {
                Some('\\') => {
                    if matches!(self.bump(), None | Some('\n')) {
                        return Err(SyntaxError::new(start, "unterminated character constant"));
                    }
                }
                Some('\'') => break,
                None | Some('\n') => {
                    return Err(SyntaxError::new(start, "unterminated character constant"))
                }
                Some(_) => {}
            }
        }
        self.emit(TokenKind::Char, start);
        Ok(())
    }

    /// Scan a number loosely; the parser validates the text.
    fn lex_number(&mut self, start: Pos) -> Result<(), SyntaxError> {
        let mut prev = self.src[start..self.pos].chars().last().unwrap_or('0');
        while let Some(c) = self.peek() {
            let exponent_sign =
                matches!(c, '+' | '-') && matches!(prev, 'e' | 'E' | 'p' | 'P');
            if !(is_alphanumeric(c) || c == '.' || exponent_sign) {
                break;
            }
            self.bump();
            prev = c;
        }
        let text = &self.src[start..self.pos];
        if !text.chars().any(|c| c.is_ascii_digit()) {
            return Err(SyntaxError::new(start, format!("bad number syntax: {text:?}")));
        }
        self.emit(TokenKind::Number, start);
        Ok(())
    }
}
