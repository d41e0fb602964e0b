//! Literal-only parser for the loosely structured text models produce.
//!
//! Accepts JSON as well as Python literal syntax (single quotes, tuples,
//! `True`/`None`, trailing commas, comments, adjacent string concatenation).
//! Nothing is ever evaluated: any bare name other than the boolean and null
//! keywords is rejected.

use serde_json::{Map, Number, Value};
use std::fmt;
use thiserror::Error;

/// Nesting limit for containers.
const MAX_DEPTH: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at offset {offset}")]
pub struct LiteralError {
    pub message: String,
    pub offset: usize,
}

/// A parsed literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(String),
    /// Imaginary number, kept as written (e.g. `2j`).
    Complex(String),
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    Set(Vec<Literal>),
    Map(Vec<(Literal, Literal)>),
}

impl Literal {
    /// Convert into a JSON value.
    ///
    /// Mappings, sequences and primitives map directly (tuples become arrays,
    /// non-string keys use their textual form). Sets, bytes and complex
    /// numbers have no JSON counterpart and become their textual form.
    pub fn into_json(self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(b),
            Literal::Int(i) => Value::Number(i.into()),
            Literal::Float(f) => match Number::from_f64(f) {
                Some(n) => Value::Number(n),
                None => Value::String(Literal::Float(f).to_string()),
            },
            Literal::Str(s) => Value::String(s),
            Literal::List(items) | Literal::Tuple(items) => {
                Value::Array(items.into_iter().map(Literal::into_json).collect())
            }
            Literal::Map(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    let key = match key {
                        Literal::Str(s) => s,
                        other => other.to_string(),
                    };
                    map.insert(key, value.into_json());
                }
                Value::Object(map)
            }
            other @ (Literal::Set(_) | Literal::Bytes(_) | Literal::Complex(_)) => {
                Value::String(other.to_string())
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Literal]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "'")?;
    for c in s.chars() {
        match c {
            '\\' => write!(f, "\\\\")?,
            '\'' => write!(f, "\\'")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "'")
}

/// Python-style textual representation.
impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "None"),
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) if x.is_infinite() => {
                write!(f, "{}", if *x > 0.0 { "inf" } else { "-inf" })
            }
            Literal::Float(x) => write!(f, "{:?}", x),
            Literal::Str(s) => write_quoted(f, s),
            Literal::Bytes(s) => {
                write!(f, "b")?;
                write_quoted(f, s)
            }
            Literal::Complex(s) => write!(f, "{}", s),
            Literal::List(items) => {
                write!(f, "[")?;
                write_joined(f, items)?;
                write!(f, "]")
            }
            Literal::Tuple(items) => {
                write!(f, "(")?;
                write_joined(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Literal::Set(items) if items.is_empty() => write!(f, "set()"),
            Literal::Set(items) => {
                write!(f, "{{")?;
                write_joined(f, items)?;
                write!(f, "}}")
            }
            Literal::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Parse a complete literal. Trailing non-whitespace input is an error.
pub fn parse_literal(input: &str) -> Result<Literal, LiteralError> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.parse_value()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            message: message.into(),
            offset: self.pos,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), LiteralError> {
        if self.eat(c) {
            Ok(())
        } else {
            match self.peek() {
                Some(found) => Err(self.error(format!("expected '{}', found '{}'", c, found))),
                None => Err(self.error(format!("expected '{}', found end of input", c))),
            }
        }
    }

    /// Skip whitespace, `#` comments and line continuations.
    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else if c == '\\' && self.peek_at(1) == Some('\n') {
                self.pos += 2;
            } else {
                break;
            }
        }
    }

    fn parse_value(&mut self) -> Result<Literal, LiteralError> {
        self.skip_ws();
        let Some(c) = self.peek() else {
            return Err(self.error("unexpected end of input"));
        };

        if self.string_prefix_len().is_some() {
            return self.parse_strings();
        }

        match c {
            '{' | '[' | '(' => {
                if self.depth >= MAX_DEPTH {
                    return Err(self.error("nesting too deep"));
                }
                self.depth += 1;
                let result = match c {
                    '{' => self.parse_braced(),
                    '[' => self.parse_list(),
                    _ => self.parse_parenthesized(),
                };
                self.depth -= 1;
                result
            }
            '-' | '+' | '.' | '0'..='9' => self.parse_number(),
            c if c.is_alphabetic() || c == '_' => self.parse_name(),
            c => Err(self.error(format!("unexpected character '{}'", c))),
        }
    }

    fn parse_braced(&mut self) -> Result<Literal, LiteralError> {
        self.expect('{')?;
        self.skip_ws();
        if self.eat('}') {
            return Ok(Literal::Map(Vec::new()));
        }

        let first = self.parse_value()?;
        self.skip_ws();
        if !self.eat(':') {
            return Ok(Literal::Set(self.parse_sequence_tail(first, '}')?));
        }

        let value = self.parse_value()?;
        let mut entries = vec![(first, value)];
        loop {
            self.skip_ws();
            if self.eat('}') {
                break;
            }
            self.expect(',')?;
            self.skip_ws();
            if self.eat('}') {
                break;
            }
            let key = self.parse_value()?;
            self.skip_ws();
            self.expect(':')?;
            let value = self.parse_value()?;
            entries.push((key, value));
        }
        Ok(Literal::Map(entries))
    }

    fn parse_list(&mut self) -> Result<Literal, LiteralError> {
        self.expect('[')?;
        self.skip_ws();
        if self.eat(']') {
            return Ok(Literal::List(Vec::new()));
        }
        let first = self.parse_value()?;
        Ok(Literal::List(self.parse_sequence_tail(first, ']')?))
    }

    /// `()` is an empty tuple, `(x)` is just `x`, `(x,)` is a tuple.
    fn parse_parenthesized(&mut self) -> Result<Literal, LiteralError> {
        self.expect('(')?;
        self.skip_ws();
        if self.eat(')') {
            return Ok(Literal::Tuple(Vec::new()));
        }
        let first = self.parse_value()?;
        self.skip_ws();
        if self.eat(')') {
            return Ok(first);
        }
        self.expect(',')?;
        self.skip_ws();
        if self.eat(')') {
            return Ok(Literal::Tuple(vec![first]));
        }
        let second = self.parse_value()?;
        let mut items = self.parse_sequence_tail(second, ')')?;
        items.insert(0, first);
        Ok(Literal::Tuple(items))
    }

    fn parse_sequence_tail(
        &mut self,
        first: Literal,
        close: char,
    ) -> Result<Vec<Literal>, LiteralError> {
        let mut items = vec![first];
        loop {
            self.skip_ws();
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(',')?;
            self.skip_ws();
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.parse_value()?);
        }
    }

    fn parse_name(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        match name.as_str() {
            "True" | "true" => Ok(Literal::Bool(true)),
            "False" | "false" => Ok(Literal::Bool(false)),
            "None" | "null" => Ok(Literal::Null),
            _ => {
                self.pos = start;
                Err(self.error(format!("'{}' is not a literal", name)))
            }
        }
    }

    fn parse_number(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        let mut negative = false;
        while let Some(sign @ ('-' | '+')) = self.peek() {
            if sign == '-' {
                negative = !negative;
            }
            self.pos += 1;
            self.skip_ws();
        }

        if self.peek() == Some('0')
            && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'))
        {
            let radix = match self.peek_at(1) {
                Some('x' | 'X') => 16,
                Some('o' | 'O') => 8,
                _ => 2,
            };
            self.pos += 2;
            let digits_start = self.pos;
            while let Some(c) = self.peek() {
                if c.is_digit(radix) || c == '_' {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            let digits: String = self.chars[digits_start..self.pos]
                .iter()
                .filter(|c| **c != '_')
                .collect();
            let value = i64::from_str_radix(&digits, radix)
                .map_err(|_| self.error("invalid integer literal"))?;
            return Ok(Literal::Int(if negative { -value } else { value }));
        }

        let digits_start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => self.pos += 1,
                '.' => {
                    is_float = true;
                    self.pos += 1;
                }
                'e' | 'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(), Some('+' | '-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let digits: String = self.chars[digits_start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if !digits.chars().any(|c| c.is_ascii_digit()) {
            self.pos = start;
            return Err(self.error("invalid number"));
        }

        if matches!(self.peek(), Some('j' | 'J')) {
            self.pos += 1;
            let sign = if negative { "-" } else { "" };
            return Ok(Literal::Complex(format!("{}{}j", sign, digits)));
        }

        if !is_float {
            if let Ok(value) = digits.parse::<i64>() {
                return Ok(Literal::Int(if negative { -value } else { value }));
            }
        }
        let value: f64 = digits
            .parse()
            .map_err(|_| self.error(format!("invalid number '{}'", digits)))?;
        Ok(Literal::Float(if negative { -value } else { value }))
    }

    /// Length of a string prefix (`r`, `b`, `u`, `rb`, ...) if a string
    /// literal starts at the cursor.
    fn string_prefix_len(&self) -> Option<usize> {
        for len in 0..=2 {
            match self.peek_at(len) {
                Some('\'' | '"') => return Some(len),
                Some(c) if "rRbBuUfF".contains(c) => continue,
                _ => return None,
            }
        }
        None
    }

    /// Parse one or more adjacent string literals and concatenate them.
    fn parse_strings(&mut self) -> Result<Literal, LiteralError> {
        let (mut text, mut is_bytes) = self.parse_string()?;
        loop {
            self.skip_ws();
            if self.string_prefix_len().is_none() {
                break;
            }
            let (next, next_bytes) = self.parse_string()?;
            if next_bytes != is_bytes {
                return Err(self.error("cannot concatenate bytes and str"));
            }
            text.push_str(&next);
            is_bytes = next_bytes;
        }
        Ok(if is_bytes {
            Literal::Bytes(text)
        } else {
            Literal::Str(text)
        })
    }

    fn parse_string(&mut self) -> Result<(String, bool), LiteralError> {
        let prefix_len = self.string_prefix_len().unwrap_or(0);
        let prefix: String = self.chars[self.pos..self.pos + prefix_len]
            .iter()
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if prefix.contains('f') {
            return Err(self.error("formatted strings are not literals"));
        }
        let raw = prefix.contains('r');
        let is_bytes = prefix.contains('b');
        self.pos += prefix_len;

        let Some(quote) = self.peek() else {
            return Err(self.error("unexpected end of input"));
        };
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error("unterminated string"));
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    return Ok((out, is_bytes));
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    return Ok((out, is_bytes));
                }
                out.push(c);
                self.pos += 1;
                continue;
            }
            if c == '\n' && !triple {
                return Err(self.error("unterminated string"));
            }
            if c == '\\' {
                self.pos += 1;
                let Some(escaped) = self.peek() else {
                    return Err(self.error("unterminated string"));
                };
                self.pos += 1;
                if raw {
                    out.push('\\');
                    out.push(escaped);
                } else {
                    self.push_escape(escaped, &mut out)?;
                }
                continue;
            }
            out.push(c);
            self.pos += 1;
        }
    }

    fn push_escape(&mut self, escaped: char, out: &mut String) -> Result<(), LiteralError> {
        match escaped {
            '\n' => {}
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'v' => out.push('\u{0B}'),
            '\\' | '\'' | '"' => out.push(escaped),
            '0'..='7' => {
                let mut value = escaped.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match self.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).unwrap_or('\u{FFFD}'));
            }
            'x' => out.push(self.read_hex_escape(2)?),
            'u' => out.push(self.read_hex_escape(4)?),
            'U' => out.push(self.read_hex_escape(8)?),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
        Ok(())
    }

    fn read_hex_escape(&mut self, len: usize) -> Result<char, LiteralError> {
        if self.pos + len > self.chars.len() {
            return Err(self.error("truncated escape sequence"));
        }
        let digits: String = self.chars[self.pos..self.pos + len].iter().collect();
        let value =
            u32::from_str_radix(&digits, 16).map_err(|_| self.error("invalid escape sequence"))?;
        self.pos += len;
        char::from_u32(value).ok_or_else(|| self.error("invalid code point"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_json(input: &str) -> Value {
        parse_literal(input).unwrap().into_json()
    }

    #[test]
    fn test_parse_json_document() {
        let value = to_json(r#"{"a": [1, 2.5, true, null], "b": {"c": "d"}}"#);
        assert_eq!(value, json!({"a": [1, 2.5, true, null], "b": {"c": "d"}}));
    }

    #[test]
    fn test_parse_python_dict() {
        let value = to_json("{'name': 'Ada', 'active': True, 'score': None, 'tags': ('x', 'y'),}");
        assert_eq!(
            value,
            json!({"name": "Ada", "active": true, "score": null, "tags": ["x", "y"]})
        );
    }

    #[test]
    fn test_comments_and_trailing_commas() {
        let value = to_json("{\n  'a': 1,  # first\n  'b': [1, 2,],\n}");
        assert_eq!(value, json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn test_adjacent_string_concatenation() {
        let value = to_json("{'text': 'Hello, ' \"world\"}");
        assert_eq!(value, json!({"text": "Hello, world"}));
    }

    #[test]
    fn test_triple_quoted_and_escapes() {
        let value = to_json("{'a': '''line one\nline 'two' ''', 'b': 'tab\\there \\u00e9'}");
        assert_eq!(value["a"], json!("line one\nline 'two' "));
        assert_eq!(value["b"], json!("tab\there é"));
    }

    #[test]
    fn test_raw_string_keeps_backslashes() {
        let value = to_json(r"{'path': r'C:\new'}");
        assert_eq!(value["path"], json!(r"C:\new"));
    }

    #[test]
    fn test_non_string_keys_use_text_form() {
        let value = to_json("{1: 'one', True: 'yes', None: 'nothing'}");
        assert_eq!(value, json!({"1": "one", "True": "yes", "None": "nothing"}));
    }

    #[test]
    fn test_non_json_values_become_text() {
        let value = to_json("{'ids': {1, 2}, 'raw': b'abc', 'z': 2j}");
        assert_eq!(value["ids"], json!("{1, 2}"));
        assert_eq!(value["raw"], json!("b'abc'"));
        assert_eq!(value["z"], json!("2j"));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_literal("-42").unwrap(), Literal::Int(-42));
        assert_eq!(parse_literal("1_000").unwrap(), Literal::Int(1000));
        assert_eq!(parse_literal("0x1F").unwrap(), Literal::Int(31));
        assert_eq!(parse_literal("1e3").unwrap(), Literal::Float(1000.0));
        assert_eq!(parse_literal("(-0.5)").unwrap(), Literal::Float(-0.5));
    }

    #[test]
    fn test_tuple_forms() {
        assert_eq!(parse_literal("()").unwrap(), Literal::Tuple(vec![]));
        assert_eq!(parse_literal("(1,)").unwrap(), Literal::Tuple(vec![Literal::Int(1)]));
        assert_eq!(parse_literal("(1)").unwrap(), Literal::Int(1));
    }

    #[test]
    fn test_rejects_names_and_calls() {
        assert!(parse_literal("{'a': foo}").is_err());
        assert!(parse_literal("__import__('os').system('ls')").is_err());
        assert!(parse_literal("{'a': f'{x}'}").is_err());
    }

    #[test]
    fn test_rejects_missing_comma_and_unquoted_keys() {
        assert!(parse_literal("{'a': 1 'b': 2}").is_err());
        assert!(parse_literal("{a: 1}").is_err());
    }

    #[test]
    fn test_rejects_trailing_input() {
        let err = parse_literal("{'a': 1} extra").unwrap_err();
        assert!(err.message.contains("trailing"));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = "[".repeat(MAX_DEPTH + 1) + &"]".repeat(MAX_DEPTH + 1);
        assert!(parse_literal(&deep).is_err());
    }

    #[test]
    fn test_display_round_trips_python_repr() {
        let literal = parse_literal("{'a': (1,), 'b': [None, 1.0, 'it\\'s']}").unwrap();
        assert_eq!(literal.to_string(), "{'a': (1,), 'b': [None, 1.0, 'it\\'s']}");
    }
}
