use std::sync::Arc;

use crate::ast::{Form, FormKind, MetaEntries, Span};
use crate::error::VncError;
use crate::number;
use crate::short_fn;

/// Recursive-descent reader over the source text. Produces forms with spans
/// and never evaluates anything.
pub struct Reader {
    chars: Vec<char>,
    index: usize,
    line: usize,
    col: usize,
    source_name: Option<String>,
    in_short_fn: bool,
}

impl Reader {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            index: 0,
            line: 1,
            col: 1,
            source_name: None,
            in_short_fn: false,
        }
    }

    pub fn with_source_name(mut self, name: Option<String>) -> Self {
        self.source_name = name;
        self
    }

    pub fn read_all(&mut self) -> Result<Vec<Form>, VncError> {
        let mut forms = Vec::new();
        self.skip_ws_and_comments()?;
        while !self.eof() {
            forms.push(self.read_form()?);
            self.skip_ws_and_comments()?;
        }
        Ok(forms)
    }

    /// First form of the source, `None` if there is nothing but whitespace.
    pub fn read_first(&mut self) -> Result<Option<Form>, VncError> {
        self.skip_ws_and_comments()?;
        if self.eof() {
            return Ok(None);
        }
        self.read_form().map(Some)
    }

    fn read_form(&mut self) -> Result<Form, VncError> {
        let start = self.current_span();
        let ch = self.current_char();
        match ch {
            '(' => {
                self.advance();
                let items = self.read_seq(')', "list", start)?;
                Ok(Form::new(FormKind::List(Arc::from(items)), start))
            }
            '[' => {
                self.advance();
                let items = self.read_seq(']', "vector", start)?;
                Ok(Form::new(FormKind::Vector(Arc::from(items)), start))
            }
            '{' => {
                self.advance();
                self.read_map(start)
            }
            ')' | ']' | '}' => Err(self.parse_err(format!("Unexpected '{}'", ch), start)),
            '\'' => {
                self.advance();
                self.read_wrapped("quote", start)
            }
            '`' => {
                self.advance();
                self.read_wrapped("quasiquote", start)
            }
            '@' => {
                self.advance();
                self.read_wrapped("deref", start)
            }
            '~' => {
                self.advance();
                match self.peek_char(0) {
                    Some('@') => {
                        self.advance();
                        self.read_wrapped("unquote-splicing", start)
                    }
                    Some('"') => {
                        self.advance();
                        self.read_string(start, true)
                    }
                    _ => self.read_wrapped("unquote", start),
                }
            }
            '^' => {
                self.advance();
                self.read_meta(start)
            }
            '"' => {
                self.advance();
                self.read_string(start, false)
            }
            ':' => {
                self.advance();
                self.read_keyword(start)
            }
            '#' => {
                self.advance();
                self.read_dispatch(start)
            }
            _ => self.read_atom(start),
        }
    }

    fn read_seq(&mut self, close: char, what: &str, start: Span) -> Result<Vec<Form>, VncError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws_and_comments()?;
            if self.eof() {
                return Err(self.parse_err(
                    format!(
                        "EOF while reading {} started at line {}, column {}",
                        what, start.line, start.col
                    ),
                    self.current_span(),
                ));
            }
            if self.current_char() == close {
                self.advance();
                return Ok(items);
            }
            items.push(self.read_form()?);
        }
    }

    fn read_map(&mut self, start: Span) -> Result<Form, VncError> {
        let items = self.read_seq('}', "map", start)?;
        if items.len() % 2 != 0 {
            return Err(self.parse_err(
                "Map literal must contain an even number of forms",
                start,
            ));
        }
        let mut entries = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
            entries.push((k, v));
        }
        Ok(Form::new(FormKind::Map(Arc::from(entries)), start))
    }

    fn read_wrapped(&mut self, name: &str, start: Span) -> Result<Form, VncError> {
        self.skip_ws_and_comments()?;
        if self.eof() {
            return Err(self.parse_err(
                format!("EOF after '{}' reader macro", name),
                self.current_span(),
            ));
        }
        let inner = self.read_form()?;
        Ok(Form::list(vec![Form::symbol(name, start), inner], start))
    }

    fn read_meta(&mut self, start: Span) -> Result<Form, VncError> {
        self.skip_ws_and_comments()?;
        if self.eof() {
            return Err(self.parse_err("EOF while reading metadata", start));
        }
        let meta = self.read_form()?;
        let mut entries: Vec<(Form, Form)> = match &meta.kind {
            FormKind::Keyword(_) => vec![(meta.clone(), Form::new(FormKind::Bool(true), start))],
            FormKind::Map(map) => map.iter().cloned().collect(),
            FormKind::Symbol(_) | FormKind::Str(_) => vec![(
                Form::new(FormKind::Keyword(Arc::from("tag")), start),
                meta.clone(),
            )],
            _ => {
                return Err(self.parse_err(
                    "Metadata must be a keyword, map, symbol or string",
                    start,
                ))
            }
        };
        self.skip_ws_and_comments()?;
        if self.eof() {
            return Err(self.parse_err("EOF while reading metadata target", start));
        }
        let target = self.read_form()?;
        if let Some(existing) = &target.meta {
            entries.extend(existing.iter().cloned());
        }
        let meta: MetaEntries = Arc::new(entries);
        Ok(target.with_meta(Some(meta)))
    }

    fn read_dispatch(&mut self, start: Span) -> Result<Form, VncError> {
        match self.peek_char(0) {
            Some('{') => {
                self.advance();
                let items = self.read_seq('}', "set", start)?;
                Ok(Form::new(FormKind::Set(Arc::from(items)), start))
            }
            Some('(') => {
                if self.in_short_fn {
                    return Err(self.parse_err("Nested #() literals are not allowed", start));
                }
                self.advance();
                self.in_short_fn = true;
                let items = self.read_seq(')', "anonymous function", start);
                self.in_short_fn = false;
                let body = Form::list(items?, start);
                Ok(short_fn::lower_short_fn(body, start))
            }
            Some('\\') => {
                self.advance();
                self.read_char_literal(start)
            }
            Some(other) => Err(self.parse_err(format!("Invalid dispatch '#{}'", other), start)),
            None => Err(self.parse_err("EOF after '#'", start)),
        }
    }

    fn read_char_literal(&mut self, start: Span) -> Result<Form, VncError> {
        if self.eof() {
            return Err(self.parse_err("EOF while reading character", start));
        }
        let mut token = String::new();
        token.push(self.current_char());
        self.advance();
        while !self.eof() && !is_delimiter(self.current_char()) {
            token.push(self.current_char());
            self.advance();
        }
        let ch = match token.as_str() {
            "space" => ' ',
            "newline" => '\n',
            "tab" => '\t',
            "return" => '\r',
            "formfeed" => '\u{c}',
            "backspace" => '\u{8}',
            t if t.chars().count() == 1 => t.chars().next().unwrap_or(' '),
            t if t.starts_with('u') && t.len() == 5 => u32::from_str_radix(&t[1..], 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| {
                    self.parse_err(format!("Invalid unicode character literal #\\{}", t), start)
                })?,
            t => {
                return Err(self.parse_err(format!("Invalid character literal #\\{}", t), start))
            }
        };
        Ok(Form::new(FormKind::Char(ch), start))
    }

    fn read_string(&mut self, start: Span, interpolate: bool) -> Result<Form, VncError> {
        let triple = self.peek_char(0) == Some('"') && self.peek_char(1) == Some('"');
        if triple {
            self.advance();
            self.advance();
        }
        let mut parts: Vec<Form> = Vec::new();
        let mut buf = String::new();
        loop {
            if self.eof() {
                return Err(self.parse_err("EOF while reading string", start));
            }
            let ch = self.current_char();
            if ch == '"' {
                if !triple {
                    self.advance();
                    break;
                }
                if self.peek_char(1) == Some('"') && self.peek_char(2) == Some('"') {
                    self.advance();
                    self.advance();
                    self.advance();
                    break;
                }
                buf.push(ch);
                self.advance();
                continue;
            }
            if ch == '\\' && !triple {
                self.advance();
                buf.push(self.read_escape(start)?);
                continue;
            }
            if interpolate && ch == '~' {
                match self.peek_char(1) {
                    Some('{') => {
                        let span = self.current_span();
                        self.advance();
                        self.advance();
                        flush_literal(&mut parts, &mut buf, span);
                        self.skip_ws_and_comments()?;
                        if self.eof() {
                            return Err(self.parse_err("EOF inside string interpolation", span));
                        }
                        parts.push(self.read_form()?);
                        self.skip_ws_and_comments()?;
                        if self.eof() || self.current_char() != '}' {
                            return Err(self.parse_err("Expected '}' to close ~{", span));
                        }
                        self.advance();
                        continue;
                    }
                    Some('(') => {
                        let span = self.current_span();
                        self.advance();
                        flush_literal(&mut parts, &mut buf, span);
                        parts.push(self.read_form()?);
                        continue;
                    }
                    _ => {}
                }
            }
            buf.push(ch);
            self.advance();
        }
        if parts.is_empty() {
            return Ok(Form::new(FormKind::Str(Arc::from(buf.as_str())), start));
        }
        flush_literal(&mut parts, &mut buf, start);
        let mut items = vec![Form::symbol("str", start)];
        items.extend(parts);
        Ok(Form::list(items, start))
    }

    fn read_escape(&mut self, start: Span) -> Result<char, VncError> {
        if self.eof() {
            return Err(self.parse_err("EOF while reading string escape", start));
        }
        let esc = self.current_char();
        self.advance();
        Ok(match esc {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '"' => '"',
            '\\' => '\\',
            '0' => '\0',
            'u' => {
                let mut hex = String::new();
                for _ in 0..4 {
                    if self.eof() {
                        break;
                    }
                    hex.push(self.current_char());
                    self.advance();
                }
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        self.parse_err(format!("Invalid unicode escape \\u{}", hex), start)
                    })?
            }
            other => {
                return Err(self.parse_err(format!("Invalid string escape '\\{}'", other), start))
            }
        })
    }

    fn read_keyword(&mut self, start: Span) -> Result<Form, VncError> {
        let token = self.read_token();
        if token.is_empty() {
            return Err(self.parse_err("Invalid keyword ':'", start));
        }
        Ok(Form::new(FormKind::Keyword(Arc::from(token.as_str())), start))
    }

    fn read_atom(&mut self, start: Span) -> Result<Form, VncError> {
        let token = self.read_token();
        if token.is_empty() {
            let ch = self.current_char();
            return Err(self.parse_err(format!("Unexpected character '{}'", ch), start));
        }
        let kind = match token.as_str() {
            "nil" => FormKind::Nil,
            "true" => FormKind::Bool(true),
            "false" => FormKind::Bool(false),
            t if looks_numeric(t) => match number::parse_literal(t) {
                Some(value) => value_to_literal(value),
                None => {
                    return Err(self.parse_err(format!("Invalid number literal '{}'", t), start))
                }
            },
            t => FormKind::Symbol(Arc::from(t)),
        };
        Ok(Form::new(kind, start))
    }

    fn read_token(&mut self) -> String {
        let mut token = String::new();
        while !self.eof() && !is_delimiter(self.current_char()) {
            token.push(self.current_char());
            self.advance();
        }
        token
    }

    fn skip_ws(&mut self) {
        while !self.eof() {
            let ch = self.current_char();
            if ch.is_whitespace() || ch == ',' {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Whitespace, commas, `;` comments and `#_` discarded forms.
    pub fn skip_ws_and_comments(&mut self) -> Result<(), VncError> {
        loop {
            self.skip_ws();
            if self.eof() {
                return Ok(());
            }
            match self.current_char() {
                ';' => {
                    while !self.eof() && self.current_char() != '\n' {
                        self.advance();
                    }
                }
                '#' if self.peek_char(1) == Some('_') => {
                    let start = self.current_span();
                    self.advance();
                    self.advance();
                    self.skip_ws_and_comments()?;
                    if self.eof() {
                        return Err(self.parse_err("EOF after '#_'", start));
                    }
                    self.read_form()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn eof(&self) -> bool {
        self.index >= self.chars.len()
    }

    fn current_char(&self) -> char {
        self.chars.get(self.index).copied().unwrap_or('\0')
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(&ch) = self.chars.get(self.index) {
            self.index += 1;
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    fn current_span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
            index: self.index,
        }
    }

    fn parse_err(&self, message: impl Into<String>, span: Span) -> VncError {
        VncError::parse(message, span.line, span.col)
            .with_span(span)
            .with_file(self.source_name.clone())
    }
}

fn flush_literal(parts: &mut Vec<Form>, buf: &mut String, span: Span) {
    if !buf.is_empty() {
        parts.push(Form::new(FormKind::Str(Arc::from(buf.as_str())), span));
        buf.clear();
    }
}

fn is_delimiter(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, ',' | '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';')
}

fn looks_numeric(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('+') | Some('-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

fn value_to_literal(value: crate::ast::Value) -> FormKind {
    use crate::ast::Value;
    match value {
        Value::Long(n) => FormKind::Long(n),
        Value::Double(d) => FormKind::Double(d),
        Value::Decimal(d) => FormKind::Decimal(d),
        Value::BigInt(n) => FormKind::BigInt(n),
        other => FormKind::Value(other),
    }
}

/// Reads every top-level form of `source`.
pub fn read_all(source: &str, name: Option<&str>) -> Result<Vec<Form>, VncError> {
    Reader::new(source)
        .with_source_name(name.map(str::to_string))
        .read_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(src: &str) -> Vec<Form> {
        read_all(src, None).unwrap()
    }

    fn read_err(src: &str) -> VncError {
        read_all(src, None).unwrap_err()
    }

    #[test]
    fn reads_collections_and_atoms() {
        let forms = read("(+ 1 2.5 \"s\" :k sym) [1 2] {:a 1} #{1} nil true");
        assert_eq!(forms.len(), 6);
        assert_eq!(forms[0].as_list().map(|l| l.len()), Some(6));
        assert!(matches!(forms[1].kind, FormKind::Vector(_)));
        assert!(matches!(forms[2].kind, FormKind::Map(_)));
        assert!(matches!(forms[3].kind, FormKind::Set(_)));
        assert!(matches!(forms[4].kind, FormKind::Nil));
    }

    #[test]
    fn reader_macros_wrap_forms() {
        let forms = read("'a `(b ~c ~@d) @e");
        assert_eq!(forms[0].head_symbol(), Some("quote"));
        assert_eq!(forms[1].head_symbol(), Some("quasiquote"));
        let inner = forms[1].as_list().unwrap()[1].as_list().unwrap().to_vec();
        assert_eq!(inner[1].head_symbol(), Some("unquote"));
        assert_eq!(inner[2].head_symbol(), Some("unquote-splicing"));
        assert_eq!(forms[2].head_symbol(), Some("deref"));
    }

    #[test]
    fn comments_and_discard_are_skipped() {
        let forms = read("; comment\n1 #_ (ignored form) 2 ,, 3");
        assert_eq!(forms.len(), 3);
    }

    #[test]
    fn characters_and_strings() {
        let forms = read(r#"#\a #\space #\π "a\nb" """raw \n text""""#);
        assert!(matches!(forms[0].kind, FormKind::Char('a')));
        assert!(matches!(forms[1].kind, FormKind::Char(' ')));
        assert!(matches!(forms[2].kind, FormKind::Char('π')));
        match &forms[3].kind {
            FormKind::Str(s) => assert_eq!(s.as_ref(), "a\nb"),
            other => panic!("unexpected {:?}", other),
        }
        match &forms[4].kind {
            FormKind::Str(s) => assert_eq!(s.as_ref(), "raw \\n text"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn interpolated_strings_lower_to_str() {
        let forms = read(r#"~"x=~{x}, y=~(inc y)""#);
        let items = forms[0].as_list().unwrap();
        assert_eq!(items[0].as_symbol(), Some("str"));
        assert_eq!(items.len(), 5);
        assert_eq!(items[2].as_symbol(), Some("x"));
        assert_eq!(items[4].head_symbol(), Some("inc"));
    }

    #[test]
    fn anonymous_fn_literal() {
        let forms = read("#(+ % %2)");
        let items = forms[0].as_list().unwrap();
        assert_eq!(items[0].as_symbol(), Some("fn"));
        let params = items[1].as_vector().unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].as_symbol(), Some("%1"));
    }

    #[test]
    fn metadata_attaches_to_next_form() {
        let forms = read("(def ^:dynamic *x* 1)");
        let items = forms[0].as_list().unwrap();
        assert!(items[1].meta_flag("dynamic"));
        assert_eq!(items[1].as_symbol(), Some("*x*"));
    }

    #[test]
    fn errors_carry_line_and_column() {
        match read_err("(+ 1") {
            VncError::Parse(data) => {
                assert_eq!(data.line, 1);
                assert!(data.message.contains("EOF while reading list"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match read_err("(foo)\n  )") {
            VncError::Parse(data) => {
                assert_eq!((data.line, data.col), (2, 3));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(read_err("12abc"), VncError::Parse(_)));
        assert!(matches!(read_err("\"open"), VncError::Parse(_)));
        assert!(matches!(read_err("#\\bogus"), VncError::Parse(_)));
        assert!(matches!(read_err("{:a}"), VncError::Parse(_)));
    }
}
