// src/tools/literal.rs
//! Best-effort typing of argument text produced by a model.
//!
//! Model output is inconsistently quoted: sometimes strict JSON, sometimes a
//! Python-style literal (`True`, `'single quoted'`, `(1, 2)`), sometimes plain
//! prose. [`coerce_value`] tries JSON first, then a literal-only parser, and
//! falls back to the text itself.
//!
//! The literal parser accepts constants and containers of constants only.
//! Identifiers other than `True`/`False`/`None`, operators other than a
//! unary sign on a number, and any call syntax are rejected.

use serde_json::{Map, Number, Value};
use std::collections::HashSet;

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LiteralError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("unexpected character {found:?} at byte {pos}")]
    Unexpected { found: char, pos: usize },

    #[error("name `{0}` is not a literal")]
    Identifier(String),

    #[error("invalid number literal `{0}`")]
    InvalidNumber(String),

    #[error("integer literal `{0}` is out of range")]
    IntegerOverflow(String),

    #[error("invalid escape sequence at byte {0}")]
    InvalidEscape(usize),

    #[error("unterminated string starting at byte {0}")]
    UnterminatedString(usize),

    #[error("container used as a mapping key at byte {0}")]
    UnhashableKey(usize),

    #[error("set starting at byte {0} holds an unhashable element")]
    UnhashableElement(usize),

    #[error("literal nested deeper than {} levels", MAX_DEPTH)]
    TooDeep,

    #[error("trailing input at byte {0}")]
    TrailingInput(usize),
}

/// Convert argument text into the most specific value it represents.
///
/// Never fails: text that is neither JSON nor a literal comes back as a
/// string, unchanged.
pub fn coerce_value(text: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return value;
    }
    match parse_literal(text) {
        Ok(value) => value,
        Err(e) => {
            crate::log_debug!("Keeping argument as text ({e}): {:?}", text);
            Value::String(text.to_string())
        }
    }
}

/// Parse `text` as a single literal expression.
///
/// Tuples and sets become arrays. Dict keys must be strings, numbers,
/// booleans or `None`; non-string keys are rendered the way a JSON encoder
/// renders them.
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    let mut parser = LiteralParser::new(text);
    parser.skip_trivia();
    let value = parser.parse_value()?;
    parser.skip_trivia();
    if parser.pos < parser.src.len() {
        return Err(LiteralError::TrailingInput(parser.pos));
    }
    Ok(value)
}

struct LiteralParser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
    /// Whether the value returned by the last `parse_value` could be a set element
    hashable: bool,
}

impl<'a> LiteralParser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            depth: 0,
            hashable: true,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn unexpected(&self) -> LiteralError {
        match self.peek() {
            Some(found) => LiteralError::Unexpected {
                found,
                pos: self.pos,
            },
            None => LiteralError::UnexpectedEnd,
        }
    }

    fn expect(&mut self, want: char) -> Result<(), LiteralError> {
        if self.peek() == Some(want) {
            self.pos += want.len_utf8();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Skip whitespace, comments and explicit line continuations
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('\\') if matches!(self.peek_nth(1), Some('\n')) => {
                    self.pos += 2;
                }
                _ => break,
            }
        }
    }

    fn enter(&mut self) -> Result<(), LiteralError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(LiteralError::TooDeep);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn parse_value(&mut self) -> Result<Value, LiteralError> {
        self.hashable = true;
        match self.peek() {
            None => Err(LiteralError::UnexpectedEnd),
            Some('[') => {
                let list = self.parse_list()?;
                self.hashable = false;
                Ok(list)
            }
            // a tuple is hashable when its items are; parse_tuple settles it
            Some('(') => self.parse_tuple(),
            Some('{') => {
                let mapping_or_set = self.parse_brace()?;
                self.hashable = false;
                Ok(mapping_or_set)
            }
            Some('\'') | Some('"') => self.parse_strings(),
            Some('+') | Some('-') => self.parse_signed(),
            Some(c) if c.is_ascii_digit() => self.parse_number(false),
            Some('.') if matches!(self.peek_nth(1), Some(d) if d.is_ascii_digit()) => {
                self.parse_number(false)
            }
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_name(),
            Some(_) => Err(self.unexpected()),
        }
    }

    fn parse_signed(&mut self) -> Result<Value, LiteralError> {
        let negative = self.bump() == Some('-');
        self.skip_trivia();
        match self.peek() {
            Some(c) if c.is_ascii_digit() || c == '.' => self.parse_number(negative),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_name(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        let name = &self.src[start..self.pos];
        if matches!(self.peek(), Some('\'') | Some('"')) && is_text_prefix(name) {
            self.pos = start;
            return self.parse_strings();
        }
        match name {
            "True" => Ok(Value::Bool(true)),
            "False" => Ok(Value::Bool(false)),
            "None" => Ok(Value::Null),
            _ => Err(LiteralError::Identifier(name.to_string())),
        }
    }

    fn parse_number(&mut self, negative: bool) -> Result<Value, LiteralError> {
        let start = self.pos;
        let radix = match (self.peek(), self.peek_nth(1)) {
            (Some('0'), Some('x' | 'X')) => 16,
            (Some('0'), Some('o' | 'O')) => 8,
            (Some('0'), Some('b' | 'B')) => 2,
            _ => 10,
        };

        if radix != 10 {
            self.pos += 2;
            while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
                self.bump();
            }
            let literal = &self.src[start..self.pos];
            let digits = strip_separators(&literal[2..])
                .ok_or_else(|| LiteralError::InvalidNumber(literal.to_string()))?;
            let magnitude = u128::from_str_radix(&digits, radix).map_err(|e| {
                if matches!(e.kind(), std::num::IntErrorKind::PosOverflow) {
                    LiteralError::IntegerOverflow(literal.to_string())
                } else {
                    LiteralError::InvalidNumber(literal.to_string())
                }
            })?;
            return integer_value(magnitude, negative, literal);
        }

        let mut is_float = false;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
            self.bump();
        }
        if self.peek() == Some('.') {
            is_float = true;
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let exp_start = self.pos;
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                is_float = true;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '_') {
                    self.bump();
                }
            } else {
                self.pos = exp_start;
            }
        }
        let literal = &self.src[start..self.pos];
        // `1j`, `1abc`, `1.2.3`
        if matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_' || c == '.') {
            return Err(LiteralError::InvalidNumber(literal.to_string()));
        }

        if is_float {
            let cleaned = strip_float_separators(literal)
                .ok_or_else(|| LiteralError::InvalidNumber(literal.to_string()))?;
            let parsed: f64 = cleaned
                .parse()
                .map_err(|_| LiteralError::InvalidNumber(literal.to_string()))?;
            let signed = if negative { -parsed } else { parsed };
            return Number::from_f64(signed)
                .map(Value::Number)
                .ok_or_else(|| LiteralError::InvalidNumber(literal.to_string()));
        }

        let digits = strip_separators(literal)
            .ok_or_else(|| LiteralError::InvalidNumber(literal.to_string()))?;
        if digits.len() > 1 && digits.starts_with('0') && digits.bytes().any(|b| b != b'0') {
            return Err(LiteralError::InvalidNumber(literal.to_string()));
        }
        let magnitude: u128 = digits
            .parse()
            .map_err(|_| LiteralError::IntegerOverflow(literal.to_string()))?;
        integer_value(magnitude, negative, literal)
    }

    /// One or more adjacent string literals, concatenated
    fn parse_strings(&mut self) -> Result<Value, LiteralError> {
        let mut out = String::new();
        loop {
            self.parse_string_into(&mut out)?;
            let checkpoint = self.pos;
            self.skip_trivia();
            if !self.at_string_start() {
                self.pos = checkpoint;
                break;
            }
        }
        Ok(Value::String(out))
    }

    fn at_string_start(&self) -> bool {
        let rest = self.rest();
        let prefix_len = rest
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .count();
        if prefix_len > 0 && !is_text_prefix(&rest[..prefix_len]) {
            return false;
        }
        matches!(rest[prefix_len..].chars().next(), Some('\'') | Some('"'))
    }

    fn parse_string_into(&mut self, out: &mut String) -> Result<(), LiteralError> {
        let start = self.pos;
        let mut raw = false;
        while let Some(c) = self.peek() {
            match c {
                'r' | 'R' => raw = true,
                'u' | 'U' => {}
                _ => break,
            }
            self.bump();
        }
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => {
                self.bump();
                q
            }
            _ => return Err(self.unexpected()),
        };
        let triple = self.peek() == Some(quote) && self.peek_nth(1) == Some(quote);
        if triple {
            self.pos += 2 * quote.len_utf8();
        }

        loop {
            let c = self.bump().ok_or(LiteralError::UnterminatedString(start))?;
            if c == quote {
                if !triple {
                    return Ok(());
                }
                if self.peek() == Some(quote) && self.peek_nth(1) == Some(quote) {
                    self.pos += 2 * quote.len_utf8();
                    return Ok(());
                }
                out.push(c);
                continue;
            }
            match c {
                '\n' if !triple => return Err(LiteralError::UnterminatedString(start)),
                '\\' if raw => {
                    out.push('\\');
                    if let Some(next) = self.bump() {
                        out.push(next);
                    }
                }
                '\\' => self.parse_escape(out)?,
                _ => out.push(c),
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<(), LiteralError> {
        let at = self.pos;
        let c = self.bump().ok_or(LiteralError::UnterminatedString(at))?;
        match c {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            '0'..='7' => {
                let mut code = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            self.bump();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(code).ok_or(LiteralError::InvalidEscape(at))?);
            }
            'x' => out.push(self.parse_hex_escape(2, at)?),
            'u' => out.push(self.parse_hex_escape(4, at)?),
            'U' => out.push(self.parse_hex_escape(8, at)?),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn parse_hex_escape(&mut self, len: usize, at: usize) -> Result<char, LiteralError> {
        let digits = self
            .rest()
            .get(..len)
            .filter(|d| d.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or(LiteralError::InvalidEscape(at))?;
        let code = u32::from_str_radix(digits, 16).map_err(|_| LiteralError::InvalidEscape(at))?;
        self.pos += len;
        char::from_u32(code).ok_or(LiteralError::InvalidEscape(at))
    }

    /// Comma separated values up to `close`, trailing comma allowed.
    ///
    /// Returns whether every parsed item is hashable.
    fn parse_items(&mut self, close: char, items: &mut Vec<Value>) -> Result<bool, LiteralError> {
        let mut all_hashable = true;
        loop {
            self.skip_trivia();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(all_hashable);
            }
            items.push(self.parse_value()?);
            all_hashable &= self.hashable;
            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(c) if c == close => {
                    self.bump();
                    return Ok(all_hashable);
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_list(&mut self) -> Result<Value, LiteralError> {
        self.enter()?;
        self.expect('[')?;
        let mut items = Vec::new();
        self.parse_items(']', &mut items)?;
        self.leave();
        Ok(Value::Array(items))
    }

    fn parse_tuple(&mut self) -> Result<Value, LiteralError> {
        self.enter()?;
        self.expect('(')?;
        self.skip_trivia();
        if self.peek() == Some(')') {
            self.bump();
            self.leave();
            self.hashable = true;
            return Ok(Value::Array(Vec::new()));
        }
        let first = self.parse_value()?;
        self.skip_trivia();
        let value = match self.peek() {
            // parenthesised expression, not a tuple
            Some(')') => {
                self.bump();
                first
            }
            Some(',') => {
                self.bump();
                let first_hashable = self.hashable;
                let mut items = vec![first];
                let rest_hashable = self.parse_items(')', &mut items)?;
                self.hashable = first_hashable && rest_hashable;
                Value::Array(items)
            }
            _ => return Err(self.unexpected()),
        };
        self.leave();
        Ok(value)
    }

    fn parse_brace(&mut self) -> Result<Value, LiteralError> {
        let open_pos = self.pos;
        self.enter()?;
        self.expect('{')?;
        self.skip_trivia();
        if self.peek() == Some('}') {
            self.bump();
            self.leave();
            return Ok(Value::Object(Map::new()));
        }

        let key_pos = self.pos;
        let first = self.parse_value()?;
        self.skip_trivia();
        let value = if self.peek() == Some(':') {
            self.bump();
            let mut map = Map::new();
            self.skip_trivia();
            let value = self.parse_value()?;
            map.insert(mapping_key(first, key_pos)?, value);
            self.parse_dict_rest(&mut map)?;
            Value::Object(map)
        } else {
            let first_hashable = self.hashable;
            let mut items = vec![first];
            let rest_hashable = match self.peek() {
                Some(',') => {
                    self.bump();
                    self.parse_items('}', &mut items)?
                }
                Some('}') => {
                    self.bump();
                    true
                }
                _ => return Err(self.unexpected()),
            };
            if !(first_hashable && rest_hashable) {
                return Err(LiteralError::UnhashableElement(open_pos));
            }
            // elements are scalars or tuples of them, so their JSON text identifies them
            let mut seen = HashSet::with_capacity(items.len());
            items.retain(|item| seen.insert(item.to_string()));
            Value::Array(items)
        };
        self.leave();
        Ok(value)
    }

    fn parse_dict_rest(&mut self, map: &mut Map<String, Value>) -> Result<(), LiteralError> {
        loop {
            self.skip_trivia();
            match self.peek() {
                Some('}') => {
                    self.bump();
                    return Ok(());
                }
                Some(',') => {
                    self.bump();
                }
                _ => return Err(self.unexpected()),
            }
            self.skip_trivia();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(());
            }
            let key_pos = self.pos;
            let key = self.parse_value()?;
            self.skip_trivia();
            self.expect(':')?;
            self.skip_trivia();
            let value = self.parse_value()?;
            map.insert(mapping_key(key, key_pos)?, value);
        }
    }
}

fn is_text_prefix(name: &str) -> bool {
    matches!(name, "r" | "R" | "u" | "U")
}

fn mapping_key(key: Value, pos: usize) -> Result<String, LiteralError> {
    match key {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Array(_) | Value::Object(_) => Err(LiteralError::UnhashableKey(pos)),
    }
}

/// Remove `_` digit separators; `None` when a separator is misplaced
fn strip_separators(digits: &str) -> Option<String> {
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return None;
    }
    Some(digits.replace('_', ""))
}

fn strip_float_separators(literal: &str) -> Option<String> {
    let mut cleaned = String::with_capacity(literal.len());
    let mut prev: Option<char> = None;
    let mut chars = literal.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '_' {
            let next = chars.peek().copied();
            let between_digits = matches!(prev, Some(p) if p.is_ascii_digit())
                && matches!(next, Some(n) if n.is_ascii_digit());
            if !between_digits {
                return None;
            }
        } else {
            cleaned.push(c);
        }
        prev = Some(c);
    }
    Some(cleaned)
}

fn integer_value(magnitude: u128, negative: bool, literal: &str) -> Result<Value, LiteralError> {
    let overflow = || LiteralError::IntegerOverflow(literal.to_string());
    if negative {
        if magnitude == i64::MAX as u128 + 1 {
            return Ok(Value::Number(i64::MIN.into()));
        }
        let n = i64::try_from(magnitude).map_err(|_| overflow())?;
        Ok(Value::Number((-n).into()))
    } else if let Ok(n) = i64::try_from(magnitude) {
        Ok(Value::Number(n.into()))
    } else {
        let n = u64::try_from(magnitude).map_err(|_| overflow())?;
        Ok(Value::Number(n.into()))
    }
}
