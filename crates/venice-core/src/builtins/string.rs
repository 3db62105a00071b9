use std::any::Any;

use regex::Regex;

use crate::ast::{FnArity, Value};
use crate::builtins::{arity, def_builtin, expect_long, expect_str};
use crate::collections::seq_items;
use crate::env::Env;
use crate::error::VncError;
use crate::interop::{HostData, HostObject};

const PATTERN_CLASS: &str = "java.util.regex.Pattern";

/// Compiled regular expression as produced by `re-pattern`.
struct PatternData {
    regex: Regex,
}

impl HostData for PatternData {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn display(&self) -> Option<String> {
        Some(self.regex.as_str().to_string())
    }
}

fn compile(source: &str) -> Result<Regex, VncError> {
    Regex::new(source).map_err(|e| {
        VncError::illegal_argument(format!("Invalid regex pattern '{}': {}", source, e))
    })
}

/// A pattern object or a string to compile.
fn regex_arg(value: &Value, op: &str) -> Result<Regex, VncError> {
    match value {
        Value::Host(obj) => match obj.downcast::<PatternData>() {
            Some(pattern) => Ok(pattern.regex.clone()),
            None => Err(VncError::type_mismatch(
                format!("regex pattern for '{}'", op),
                obj.class_name().to_string(),
            )),
        },
        Value::String(s) => compile(s),
        other => Err(VncError::type_mismatch(
            format!("regex pattern for '{}'", op),
            other.type_name(),
        )),
    }
}

fn match_value(caps: &regex::Captures<'_>) -> Value {
    if caps.len() == 1 {
        return Value::string(&caps[0]);
    }
    Value::vector(caps.iter().map(|group| match group {
        Some(m) => Value::string(m.as_str()),
        None => Value::Nil,
    }))
}

/// Substring by code point positions; `end` defaults to the length.
fn char_slice<'a>(s: &'a str, start: i64, end: Option<i64>) -> Result<&'a str, VncError> {
    let len = s.chars().count() as i64;
    let end = end.unwrap_or(len);
    if start < 0 || end > len || start > end {
        return Err(VncError::index_out_of_bounds(format!(
            "begin {}, end {}, length {}",
            start, end, len
        )));
    }
    let byte_at = |pos: i64| {
        s.char_indices()
            .nth(pos as usize)
            .map(|(idx, _)| idx)
            .unwrap_or(s.len())
    };
    Ok(&s[byte_at(start)..byte_at(end)])
}

fn char_index_of(s: &str, byte_idx: usize) -> i64 {
    s[..byte_idx].chars().count() as i64
}

fn subs(args: &[Value], op: &str) -> Result<Value, VncError> {
    let s = expect_str(&args[0], op)?;
    let start = expect_long(&args[1], op)?;
    let end = match args.get(2) {
        Some(v) => Some(expect_long(v, op)?),
        None => None,
    };
    Ok(Value::string(char_slice(s, start, end)?))
}

fn str_list<I: IntoIterator<Item = S>, S: AsRef<str>>(items: I) -> Value {
    Value::list(items.into_iter().map(|s| Value::string(s.as_ref())))
}

pub(crate) fn install(env: &mut Env) {
    def_builtin!(env, "str/join", arity(1, 2), |args| {
        let (sep, coll) = match args {
            [coll] => ("", coll),
            [sep, coll] => (expect_str(sep, "str/join")?, coll),
            _ => return Err(VncError::arity("str/join expects 1 or 2 arguments")),
        };
        let parts: Vec<String> = seq_items(coll)?.iter().map(Value::to_str_text).collect();
        Ok(Value::string(parts.join(sep)))
    });
    def_builtin!(env, "str/split", FnArity::exact(2), |args| {
        let s = expect_str(&args[0], "str/split")?;
        let re = regex_arg(&args[1], "str/split")?;
        Ok(str_list(re.split(s)))
    });
    def_builtin!(env, "str/split-lines", FnArity::exact(1), |args| {
        Ok(str_list(expect_str(&args[0], "str/split-lines")?.lines()))
    });
    def_builtin!(env, "str/upper-case", FnArity::exact(1), |args| {
        Ok(Value::string(expect_str(&args[0], "str/upper-case")?.to_uppercase()))
    });
    def_builtin!(env, "str/lower-case", FnArity::exact(1), |args| {
        Ok(Value::string(expect_str(&args[0], "str/lower-case")?.to_lowercase()))
    });
    def_builtin!(env, "str/trim", FnArity::exact(1), |args| {
        Ok(Value::string(expect_str(&args[0], "str/trim")?.trim()))
    });
    def_builtin!(env, "str/trim-to-nil", FnArity::exact(1), |args| {
        match &args[0] {
            Value::Nil => Ok(Value::Nil),
            other => {
                let trimmed = expect_str(other, "str/trim-to-nil")?.trim();
                Ok(if trimmed.is_empty() { Value::Nil } else { Value::string(trimmed) })
            }
        }
    });
    def_builtin!(env, "str/blank?", FnArity::exact(1), |args| {
        match &args[0] {
            Value::Nil => Ok(Value::Bool(true)),
            other => Ok(Value::Bool(expect_str(other, "str/blank?")?.trim().is_empty())),
        }
    });
    def_builtin!(env, "str/starts-with?", FnArity::exact(2), |args| {
        let s = expect_str(&args[0], "str/starts-with?")?;
        Ok(Value::Bool(s.starts_with(expect_str(&args[1], "str/starts-with?")?)))
    });
    def_builtin!(env, "str/ends-with?", FnArity::exact(2), |args| {
        let s = expect_str(&args[0], "str/ends-with?")?;
        Ok(Value::Bool(s.ends_with(expect_str(&args[1], "str/ends-with?")?)))
    });
    def_builtin!(env, "str/contains?", FnArity::exact(2), |args| {
        let s = expect_str(&args[0], "str/contains?")?;
        Ok(Value::Bool(s.contains(expect_str(&args[1], "str/contains?")?)))
    });
    def_builtin!(env, "str/replace-all", FnArity::exact(3), |args| {
        let s = expect_str(&args[0], "str/replace-all")?;
        let replacement = expect_str(&args[2], "str/replace-all")?;
        match &args[1] {
            Value::String(search) => Ok(Value::string(s.replace(&**search, replacement))),
            pattern => {
                let re = regex_arg(pattern, "str/replace-all")?;
                Ok(Value::string(re.replace_all(s, replacement)))
            }
        }
    });
    def_builtin!(env, "str/replace-first", FnArity::exact(3), |args| {
        let s = expect_str(&args[0], "str/replace-first")?;
        let replacement = expect_str(&args[2], "str/replace-first")?;
        match &args[1] {
            Value::String(search) => Ok(Value::string(s.replacen(&**search, replacement, 1))),
            pattern => {
                let re = regex_arg(pattern, "str/replace-first")?;
                Ok(Value::string(re.replace(s, replacement)))
            }
        }
    });
    def_builtin!(env, "str/index-of", arity(2, 3), |args| {
        let s = expect_str(&args[0], "str/index-of")?;
        let needle = match &args[1] {
            Value::Char(c) => c.to_string(),
            other => expect_str(other, "str/index-of")?.to_string(),
        };
        let from = match args.get(2) {
            Some(v) => expect_long(v, "str/index-of")?.max(0),
            None => 0,
        };
        let offset = char_slice(s, 0, Some(from.min(s.chars().count() as i64)))?.len();
        Ok(match s[offset..].find(&needle) {
            Some(idx) => Value::Long(char_index_of(s, offset + idx)),
            None => Value::Nil,
        })
    });
    def_builtin!(env, "str/last-index-of", FnArity::exact(2), |args| {
        let s = expect_str(&args[0], "str/last-index-of")?;
        let needle = expect_str(&args[1], "str/last-index-of")?;
        Ok(s.rfind(needle)
            .map(|idx| Value::Long(char_index_of(s, idx)))
            .unwrap_or(Value::Nil))
    });
    def_builtin!(env, "str/subs", arity(2, 3), |args| subs(args, "str/subs"));
    def_builtin!(env, "subs", arity(2, 3), |args| subs(args, "subs"));
    def_builtin!(env, "str/reverse", FnArity::exact(1), |args| {
        Ok(Value::string(
            expect_str(&args[0], "str/reverse")?.chars().rev().collect::<String>(),
        ))
    });
    def_builtin!(env, "str/repeat", arity(2, 3), |args| {
        let s = args[0].to_str_text();
        let n = expect_long(&args[1], "str/repeat")?.max(0) as usize;
        let sep = match args.get(2) {
            Some(v) => expect_str(v, "str/repeat")?.to_string(),
            None => String::new(),
        };
        Ok(Value::string(vec![s; n].join(&sep)))
    });
    def_builtin!(env, "str/char", FnArity::exact(1), |args| {
        match &args[0] {
            Value::Long(n) => u32::try_from(*n)
                .ok()
                .and_then(char::from_u32)
                .map(Value::Char)
                .ok_or_else(|| VncError::illegal_argument(format!("{} is not a code point", n))),
            Value::String(s) if s.chars().count() == 1 => {
                Ok(s.chars().next().map(Value::Char).unwrap_or(Value::Nil))
            }
            other => Err(VncError::type_mismatch("long or single-char string", other.type_name())),
        }
    });

    // --- Regular expressions ---
    def_builtin!(env, "re-pattern", FnArity::exact(1), |args| {
        let source = expect_str(&args[0], "re-pattern")?;
        Ok(Value::Host(HostObject::new(
            PATTERN_CLASS,
            PatternData {
                regex: compile(source)?,
            },
        )))
    });
    def_builtin!(env, "re-find", FnArity::exact(2), |args| {
        let re = regex_arg(&args[0], "re-find")?;
        let s = expect_str(&args[1], "re-find")?;
        Ok(re.captures(s).map(|caps| match_value(&caps)).unwrap_or(Value::Nil))
    });
    def_builtin!(env, "re-matches", FnArity::exact(2), |args| {
        let re = regex_arg(&args[0], "re-matches")?;
        let s = expect_str(&args[1], "re-matches")?;
        let anchored = compile(&format!("^(?:{})$", re.as_str()))?;
        Ok(anchored.captures(s).map(|caps| match_value(&caps)).unwrap_or(Value::Nil))
    });
    def_builtin!(env, "re-seq", FnArity::exact(2), |args| {
        let re = regex_arg(&args[0], "re-seq")?;
        let s = expect_str(&args[1], "re-seq")?;
        Ok(Value::list(re.captures_iter(s).map(|caps| match_value(&caps))))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_by_code_point() {
        assert_eq!(char_slice("héllo", 1, Some(3)).unwrap(), "él");
        assert_eq!(char_slice("héllo", 2, None).unwrap(), "llo");
        assert!(char_slice("abc", 2, Some(5)).is_err());
    }

    #[test]
    fn groups_become_vectors() {
        let re = compile(r"(\d+)-(\d+)").unwrap();
        let caps = re.captures("10-20").unwrap();
        assert_eq!(
            match_value(&caps),
            Value::vector(vec![
                Value::string("10-20"),
                Value::string("10"),
                Value::string("20")
            ])
        );
    }
}
