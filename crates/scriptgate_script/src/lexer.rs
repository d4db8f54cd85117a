//! Tokenizer for the script language.
//!
//! Produces Python-style logical lines: `Newline` ends a statement, and
//! changes of indentation at the start of a line become `Indent`/`Dedent`.
//! Line breaks inside brackets, and after a trailing backslash, are joined.

use crate::ast::Pos;
use scriptgate_core::{GateResult, ScriptError};

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier
    Name(String),
    /// Reserved word
    Keyword(&'static str),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal (escapes already applied)
    Str(String),
    /// Parameter slot `$<n>` written by the placeholder renderer
    Slot(usize),
    /// Operator or punctuation
    Op(&'static str),
    /// End of logical line
    Newline,
    /// Indentation increase
    Indent,
    /// Indentation decrease
    Dedent,
    /// End of input
    Eof,
}

/// A token with its source position
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Kind
    pub kind: TokenKind,
    /// Position of the first character
    pub pos: Pos,
}

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

// Longest first so that `**=` wins over `**` and `*`.
const OPERATORS: &[&str] = &[
    "**=", "//=", "...", "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "->",
    "+", "-", "*", "/", "%", "<", ">", "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
    "@",
];

/// Script tokenizer
pub struct Lexer<'a> {
    src: &'a str,
    offset: usize,
    line: usize,
    column: usize,
    depth: usize,
    indents: Vec<usize>,
    at_line_start: bool,
    tokens: Vec<Token>,
    slot_offsets: Option<&'a [usize]>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over source text
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            offset: 0,
            line: 1,
            column: 1,
            depth: 0,
            indents: vec![0],
            at_line_start: true,
            tokens: Vec::new(),
            slot_offsets: None,
        }
    }

    /// Accept `$<n>` only at the given byte offsets (ascending)
    #[must_use]
    pub fn with_slot_offsets(mut self, offsets: &'a [usize]) -> Self {
        self.slot_offsets = Some(offsets);
        self
    }

    /// Tokenize the whole input
    ///
    /// # Errors
    ///
    /// Returns a `CompileError` for malformed literals, stray characters, or
    /// inconsistent indentation
    pub fn tokenize(mut self) -> GateResult<Vec<Token>> {
        while self.offset < self.src.len() {
            if self.at_line_start && self.depth == 0 {
                if self.handle_indentation()? {
                    continue;
                }
            }
            self.at_line_start = false;

            let Some(c) = self.peek() else { break };
            match c {
                ' ' | '\t' | '\x0c' => {
                    self.bump();
                }
                '#' => self.skip_comment(),
                '\r' => {
                    self.bump();
                }
                '\n' => {
                    let pos = self.pos();
                    self.bump();
                    if self.depth == 0 {
                        self.push_newline(pos);
                        self.at_line_start = true;
                    }
                }
                '\\' => {
                    let pos = self.pos();
                    self.bump();
                    if self.peek() == Some('\r') {
                        self.bump();
                    }
                    if self.peek() != Some('\n') {
                        return Err(self.error_at("unexpected character after line continuation", pos));
                    }
                    self.bump();
                }
                '$' => self.lex_slot()?,
                c if c.is_ascii_digit() => self.lex_number()?,
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.lex_number()?,
                '\'' | '"' => self.lex_string(false)?,
                c if c.is_alphabetic() || c == '_' => self.lex_name_or_prefixed_string()?,
                _ => self.lex_operator()?,
            }
        }

        let pos = self.pos();
        self.push_newline(pos);
        while self.indents.len() > 1 {
            self.indents.pop();
            self.tokens.push(Token { kind: TokenKind::Dedent, pos });
        }
        self.tokens.push(Token { kind: TokenKind::Eof, pos });
        Ok(self.tokens)
    }

    fn pos(&self) -> Pos {
        Pos::new(self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.offset..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.offset..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error_at(&self, message: &str, pos: Pos) -> ScriptError {
        ScriptError::compile(message, pos.line, pos.column)
    }

    fn push_newline(&mut self, pos: Pos) {
        let needs_newline = self
            .tokens
            .last()
            .is_some_and(|t| !matches!(t.kind, TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent));
        if needs_newline {
            self.tokens.push(Token { kind: TokenKind::Newline, pos });
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// Measure indentation of a new line. Returns true when the line was
    /// blank or comment-only and has been consumed.
    fn handle_indentation(&mut self) -> GateResult<bool> {
        let mut width = 0usize;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' => width = 0,
                _ => break,
            }
            self.bump();
        }

        match self.peek() {
            None => return Ok(true),
            Some('\n') => {
                self.bump();
                return Ok(true);
            }
            Some('\r') => {
                self.bump();
                if self.peek() == Some('\n') {
                    self.bump();
                }
                return Ok(true);
            }
            Some('#') => {
                self.skip_comment();
                if self.peek() == Some('\n') {
                    self.bump();
                }
                return Ok(true);
            }
            _ => {}
        }

        let pos = self.pos();
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.tokens.push(Token { kind: TokenKind::Indent, pos });
        } else if width < current {
            while self.indents.last().is_some_and(|&w| w > width) {
                self.indents.pop();
                self.tokens.push(Token { kind: TokenKind::Dedent, pos });
            }
            if self.indents.last().copied() != Some(width) {
                return Err(self.error_at("unindent does not match any outer indentation level", pos));
            }
        }
        self.at_line_start = false;
        Ok(false)
    }

    fn lex_slot(&mut self) -> GateResult<()> {
        let pos = self.pos();
        if self
            .slot_offsets
            .is_some_and(|offsets| offsets.binary_search(&self.offset).is_err())
        {
            return Err(self.error_at("parameter slots can only come from placeholders", pos));
        }
        self.bump();
        let start = self.offset;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let digits = &self.src[start..self.offset];
        let index = digits
            .parse::<usize>()
            .map_err(|_| self.error_at("'$' is only valid as a parameter placeholder", pos))?;
        self.tokens.push(Token { kind: TokenKind::Slot(index), pos });
        Ok(())
    }

    fn lex_number(&mut self) -> GateResult<()> {
        let pos = self.pos();
        let start = self.offset;

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.bump();
            self.bump();
            let digits_start = self.offset;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit() || c == '_') {
                self.bump();
            }
            let digits = self.src[digits_start..self.offset].replace('_', "");
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|_| self.error_at("invalid hexadecimal literal", pos))?;
            self.tokens.push(Token { kind: TokenKind::Int(value), pos });
            return Ok(());
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.bump();
            } else if c == '.' && !is_float && self.peek_at(1) != Some('.') {
                is_float = true;
                self.bump();
            } else if c == 'e' || c == 'E' {
                is_float = true;
                self.bump();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.bump();
                }
            } else {
                break;
            }
        }

        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(self.error_at("invalid numeric literal", pos));
        }

        let text = self.src[start..self.offset].replace('_', "");
        let kind = if is_float {
            TokenKind::Float(
                text.parse::<f64>()
                    .map_err(|_| self.error_at("invalid float literal", pos))?,
            )
        } else {
            TokenKind::Int(
                text.parse::<i64>()
                    .map_err(|_| self.error_at("integer literal out of range", pos))?,
            )
        };
        self.tokens.push(Token { kind, pos });
        Ok(())
    }

    fn lex_name_or_prefixed_string(&mut self) -> GateResult<()> {
        let pos = self.pos();
        let start = self.offset;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        let word = &self.src[start..self.offset];

        if matches!(self.peek(), Some('\'' | '"')) {
            let lowered = word.to_ascii_lowercase();
            match lowered.as_str() {
                "r" => return self.lex_string(true),
                "u" | "b" => return self.lex_string(false),
                "br" | "rb" => return self.lex_string(true),
                "f" | "rf" | "fr" => {
                    return Err(self.error_at("formatted string literals are not supported", pos));
                }
                _ => {}
            }
        }

        let kind = match KEYWORDS.iter().find(|k| **k == word) {
            Some(k) => TokenKind::Keyword(k),
            None => TokenKind::Name(word.to_string()),
        };
        self.tokens.push(Token { kind, pos });
        Ok(())
    }

    fn lex_string(&mut self, raw: bool) -> GateResult<()> {
        let pos = self.pos();
        let Some(quote) = self.bump() else {
            return Err(self.error_at("unterminated string literal", pos));
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error_at("unterminated string literal", pos));
            };
            if c == quote {
                if !triple {
                    break;
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    self.bump();
                    self.bump();
                    break;
                }
                value.push(c);
                continue;
            }
            if c == '\n' && !triple {
                return Err(self.error_at("unterminated string literal", pos));
            }
            if c == '\\' {
                let Some(next) = self.bump() else {
                    return Err(self.error_at("unterminated string literal", pos));
                };
                if raw {
                    value.push('\\');
                    value.push(next);
                    continue;
                }
                match next {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '0' => value.push('\0'),
                    '\\' => value.push('\\'),
                    '\'' => value.push('\''),
                    '"' => value.push('"'),
                    '\n' => {}
                    'x' => value.push(self.lex_code_point(2, pos)?),
                    'u' => value.push(self.lex_code_point(4, pos)?),
                    other => {
                        value.push('\\');
                        value.push(other);
                    }
                }
                continue;
            }
            value.push(c);
        }

        // Adjacent literals concatenate, as in `"a" "b"`.
        if let Some(Token { kind: TokenKind::Str(prev), .. }) = self.tokens.last_mut() {
            prev.push_str(&value);
            return Ok(());
        }
        self.tokens.push(Token { kind: TokenKind::Str(value), pos });
        Ok(())
    }

    fn lex_code_point(&mut self, len: usize, pos: Pos) -> GateResult<char> {
        let mut digits = String::with_capacity(len);
        for _ in 0..len {
            match self.bump() {
                Some(c) if c.is_ascii_hexdigit() => digits.push(c),
                _ => return Err(self.error_at("truncated escape sequence", pos)),
            }
        }
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error_at("invalid escape sequence", pos))
    }

    fn lex_operator(&mut self) -> GateResult<()> {
        let pos = self.pos();
        let rest = &self.src[self.offset..];
        let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
            let c = self.peek().unwrap_or('?');
            return Err(self.error_at(&format!("unexpected character '{c}'"), pos));
        };
        for _ in 0..op.chars().count() {
            self.bump();
        }
        match *op {
            "(" | "[" | "{" => self.depth += 1,
            ")" | "]" | "}" => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.tokens.push(Token { kind: TokenKind::Op(op), pos });
        Ok(())
    }
}
