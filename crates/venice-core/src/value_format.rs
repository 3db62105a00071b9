use std::fmt::{self, Write};

use crate::ast::Value;

fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        format!("{:?}", d)
    }
}

fn char_name(c: char) -> Option<&'static str> {
    match c {
        ' ' => Some("space"),
        '\n' => Some("newline"),
        '\t' => Some("tab"),
        '\r' => Some("return"),
        '\u{c}' => Some("formfeed"),
        '\u{8}' => Some("backspace"),
        _ => None,
    }
}

fn write_escaped(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_items<'a>(
    out: &mut String,
    open: &str,
    close: &str,
    items: impl Iterator<Item = &'a Value>,
) {
    out.push_str(open);
    for (idx, item) in items.enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        write_value(out, item, true);
    }
    out.push_str(close);
}

fn write_entries<'a>(out: &mut String, entries: impl Iterator<Item = (&'a Value, &'a Value)>) {
    out.push('{');
    for (idx, (k, v)) in entries.enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        write_value(out, k, true);
        out.push(' ');
        write_value(out, v, true);
    }
    out.push('}');
}

/// `readable` selects `pr-str` output (quoted strings, `#\c` chars) over
/// `str` output. Nested elements are always printed readably.
pub fn write_value(out: &mut String, value: &Value, readable: bool) {
    match value {
        Value::Nil => out.push_str("nil"),
        Value::Bool(b) => {
            let _ = write!(out, "{}", b);
        }
        Value::Long(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::Double(d) => out.push_str(&format_double(*d)),
        Value::Decimal(d) => {
            let _ = write!(out, "{}M", d);
        }
        Value::BigInt(n) => {
            let _ = write!(out, "{}N", n);
        }
        Value::String(s) => {
            if readable {
                write_escaped(out, s);
            } else {
                out.push_str(s);
            }
        }
        Value::Char(c) => {
            if readable {
                out.push_str("#\\");
                match char_name(*c) {
                    Some(name) => out.push_str(name),
                    None => out.push(*c),
                }
            } else {
                out.push(*c);
            }
        }
        Value::Keyword(k) => {
            out.push(':');
            out.push_str(k);
        }
        Value::Symbol(s, _) => out.push_str(s),
        Value::List(items) => write_items(out, "(", ")", items.iter()),
        Value::Vector(items) => write_items(out, "[", "]", items.iter()),
        Value::Map(m) => write_entries(out, m.iter()),
        Value::OrderedMap(m) => write_entries(out, m.iter()),
        Value::SortedMap(m) => write_entries(out, m.iter()),
        Value::Set(s) => write_items(out, "#{", "}", s.iter()),
        Value::SortedSet(s) => write_items(out, "#{", "}", s.iter()),
        Value::Fn(lambda) => {
            let _ = write!(out, "function {}", lambda.display_name());
        }
        Value::Macro(lambda) => {
            let _ = write!(out, "macro {}", lambda.display_name());
        }
        Value::Native(native) => {
            let _ = write!(out, "function core/{}", native.name());
        }
        Value::Atom(atom) => {
            out.push_str("(atom ");
            write_value(out, &atom.deref(), true);
            out.push(')');
        }
        Value::Exception(ex) => {
            let _ = write!(out, "{}", ex);
        }
        Value::Host(obj) => out.push_str(&obj.display()),
    }
}

impl Value {
    pub fn pr_str(&self) -> String {
        let mut out = String::new();
        write_value(&mut out, self, true);
        out
    }

    /// Text produced by `str`: nil becomes the empty string.
    pub fn to_str_text(&self) -> String {
        match self {
            Value::Nil => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_value(&mut out, self, false);
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readable_and_plain_output() {
        let v = Value::vector(vec![
            Value::string("a\"b"),
            Value::Char('x'),
            Value::Double(1.0),
            Value::keyword("k"),
        ]);
        assert_eq!(v.pr_str(), r#"["a\"b" #\x 1.0 :k]"#);
        assert_eq!(Value::string("plain").to_string(), "plain");
        assert_eq!(Value::string("plain").pr_str(), "\"plain\"");
        assert_eq!(Value::Char(' ').pr_str(), "#\\space");
        assert_eq!(Value::Nil.to_str_text(), "");
    }
}
