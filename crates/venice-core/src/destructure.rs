use crate::ast::{Form, FormKind, Value};
use crate::collections::{get, seq_items};
use crate::env::{self, EnvRef};
use crate::error::VncError;
use crate::form_value::form_to_value;

/// Binds `pattern` to `value` in `target`. Supports plain symbols, sequential
/// patterns (`[a b & more :as all]`) and associative patterns
/// (`{:keys [a b] :or {a 1} :as m}`, `{x :x}`). `eval_default` evaluates the
/// default expressions of `:or`.
pub fn bind_pattern(
    target: &EnvRef,
    pattern: &Form,
    value: Value,
    eval_default: &dyn Fn(&Form) -> Result<Value, VncError>,
) -> Result<(), VncError> {
    match &pattern.kind {
        FormKind::Symbol(name) => {
            env::write(target).set(name, value);
            Ok(())
        }
        FormKind::Vector(items) => bind_sequential(target, items, value, eval_default),
        FormKind::Map(entries) => bind_associative(target, entries, value, eval_default),
        _ => Err(VncError::runtime(format!(
            "Invalid binding form: {}",
            form_to_value(pattern).pr_str()
        ))
        .with_span(pattern.span)),
    }
}

fn bind_sequential(
    target: &EnvRef,
    items: &[Form],
    value: Value,
    eval_default: &dyn Fn(&Form) -> Result<Value, VncError>,
) -> Result<(), VncError> {
    let values = seq_items(&value)?;
    let mut idx = 0;
    let mut pos = 0;
    while pos < items.len() {
        let item = &items[pos];
        match (item.as_symbol(), item.as_keyword()) {
            (Some("&"), _) => {
                let rest_pattern = items.get(pos + 1).ok_or_else(|| {
                    VncError::runtime("Missing binding after '&'").with_span(item.span)
                })?;
                let rest: Vec<Value> = values.iter().skip(idx).cloned().collect();
                let rest_value = if rest.is_empty() {
                    Value::Nil
                } else {
                    Value::list(rest)
                };
                bind_pattern(target, rest_pattern, rest_value, eval_default)?;
                idx = values.len();
                pos += 2;
            }
            (_, Some("as")) => {
                let alias = items.get(pos + 1).ok_or_else(|| {
                    VncError::runtime("Missing binding after ':as'").with_span(item.span)
                })?;
                bind_pattern(target, alias, value.clone(), eval_default)?;
                pos += 2;
            }
            _ => {
                let element = values.get(idx).cloned().unwrap_or(Value::Nil);
                bind_pattern(target, item, element, eval_default)?;
                idx += 1;
                pos += 1;
            }
        }
    }
    Ok(())
}

fn defaults_of(entries: &[(Form, Form)]) -> Vec<(String, Form)> {
    entries
        .iter()
        .find(|(k, _)| k.as_keyword() == Some("or"))
        .and_then(|(_, v)| match &v.kind {
            FormKind::Map(defaults) => Some(
                defaults
                    .iter()
                    .filter_map(|(k, v)| k.as_symbol().map(|s| (s.to_string(), v.clone())))
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default()
}

fn bind_associative(
    target: &EnvRef,
    entries: &[(Form, Form)],
    value: Value,
    eval_default: &dyn Fn(&Form) -> Result<Value, VncError>,
) -> Result<(), VncError> {
    let defaults = defaults_of(entries);
    let lookup = |key: &Value, name: Option<&str>| -> Result<Value, VncError> {
        match get(&value, key) {
            Some(found) => Ok(found),
            None => match name.and_then(|n| defaults.iter().find(|(d, _)| d == n)) {
                Some((_, default)) => eval_default(default),
                None => Ok(Value::Nil),
            },
        }
    };
    for (key, val) in entries {
        match key.as_keyword() {
            Some(kind @ ("keys" | "strs" | "syms")) => {
                let names = val.as_vector().ok_or_else(|| {
                    VncError::runtime(format!(":{} expects a vector of symbols", kind))
                        .with_span(val.span)
                })?;
                for name_form in names {
                    let name = name_form.as_symbol().ok_or_else(|| {
                        VncError::runtime(format!(":{} expects symbols", kind))
                            .with_span(name_form.span)
                    })?;
                    let map_key = match kind {
                        "keys" => Value::keyword(name),
                        "strs" => Value::string(name),
                        _ => Value::symbol(name),
                    };
                    let found = lookup(&map_key, Some(name))?;
                    env::write(target).set(name, found);
                }
            }
            Some("as") => bind_pattern(target, val, value.clone(), eval_default)?,
            Some("or") => {}
            _ => {
                let map_key = form_to_value(val);
                let found = lookup(&map_key, key.as_symbol())?;
                bind_pattern(target, key, found, eval_default)?;
            }
        }
    }
    Ok(())
}
