use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::ast::{FnArity, Lambda, Span, Value};
use crate::builtins::{arity, def_builtin, err, expect_long, expect_name, expect_str, with_ctx};
use crate::collections::seq_items;
use crate::env::Env;
use crate::error::VncError;
use crate::eval::{call_callable, Evaluator};
use crate::exception::ExceptionData;
use crate::form_value::{form_to_value, value_to_form};
use crate::macros::{self, ExpandMode};
use crate::reader::Reader;

fn predicate(env: &mut Env, name: &str, test: fn(&Value) -> bool) {
    env.define_builtin(
        name,
        Value::native_fn_with_name(name, FnArity::exact(1), move |args| {
            Ok(Value::Bool(test(&args[0])))
        }),
    );
}

fn is_map(value: &Value) -> bool {
    matches!(
        value,
        Value::Map(_) | Value::OrderedMap(_) | Value::SortedMap(_)
    )
}

fn is_set(value: &Value) -> bool {
    matches!(value, Value::Set(_) | Value::SortedSet(_))
}

/// `name` of `:ns/kw` is `kw`; a lone `/` names itself.
fn name_part(full: &str) -> &str {
    match full.rfind('/') {
        Some(idx) if full.len() > 1 => &full[idx + 1..],
        _ => full,
    }
}

fn namespace_part(full: &str) -> Option<&str> {
    match full.rfind('/') {
        Some(idx) if idx > 0 && full.len() > 1 => Some(&full[..idx]),
        _ => None,
    }
}

pub(crate) fn install(env: &mut Env) {
    // --- Equality ---
    def_builtin!(env, "=", FnArity::at_least(1), |args| {
        Ok(Value::Bool(args.windows(2).all(|w| w[0] == w[1])))
    });
    def_builtin!(env, "not=", FnArity::at_least(1), |args| {
        Ok(Value::Bool(!args.windows(2).all(|w| w[0] == w[1])))
    });
    def_builtin!(env, "not", FnArity::exact(1), |args| {
        Ok(Value::Bool(!args[0].is_truthy()))
    });
    def_builtin!(env, "identical?", FnArity::exact(2), |args| {
        let same = match (&args[0], &args[1]) {
            (Value::Atom(a), Value::Atom(b)) => a.ptr_eq(b),
            (Value::Host(a), Value::Host(b)) => a.ptr_eq(b),
            (Value::Fn(a), Value::Fn(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(a, b),
            (a, b) => a == b,
        };
        Ok(Value::Bool(same))
    });

    // --- Type predicates ---
    predicate(env, "nil?", |v| v.is_nil());
    predicate(env, "some?", |v| !v.is_nil());
    predicate(env, "true?", |v| matches!(v, Value::Bool(true)));
    predicate(env, "false?", |v| matches!(v, Value::Bool(false)));
    predicate(env, "boolean?", |v| matches!(v, Value::Bool(_)));
    predicate(env, "number?", |v| v.is_number());
    predicate(env, "long?", |v| matches!(v, Value::Long(_)));
    predicate(env, "double?", |v| matches!(v, Value::Double(_)));
    predicate(env, "decimal?", |v| matches!(v, Value::Decimal(_)));
    predicate(env, "bigint?", |v| matches!(v, Value::BigInt(_)));
    predicate(env, "string?", |v| matches!(v, Value::String(_)));
    predicate(env, "char?", |v| matches!(v, Value::Char(_)));
    predicate(env, "keyword?", |v| matches!(v, Value::Keyword(_)));
    predicate(env, "symbol?", |v| matches!(v, Value::Symbol(..)));
    predicate(env, "fn?", |v| {
        matches!(v, Value::Fn(_) | Value::Native(_))
            || matches!(v, Value::Host(obj) if obj.is_functional())
    });
    predicate(env, "macro?", |v| matches!(v, Value::Macro(_)));
    predicate(env, "list?", |v| matches!(v, Value::List(_)));
    predicate(env, "vector?", |v| matches!(v, Value::Vector(_)));
    predicate(env, "map?", is_map);
    predicate(env, "hash-map?", |v| matches!(v, Value::Map(_)));
    predicate(env, "ordered-map?", |v| matches!(v, Value::OrderedMap(_)));
    predicate(env, "sorted-map?", |v| matches!(v, Value::SortedMap(_)));
    predicate(env, "set?", is_set);
    predicate(env, "sorted-set?", |v| matches!(v, Value::SortedSet(_)));
    predicate(env, "sequential?", |v| matches!(v, Value::List(_) | Value::Vector(_)));
    predicate(env, "coll?", |v| {
        matches!(v, Value::List(_) | Value::Vector(_)) || is_map(v) || is_set(v)
    });
    predicate(env, "atom?", |v| matches!(v, Value::Atom(_)));
    predicate(env, "ex?", |v| matches!(v, Value::Exception(_)));

    // --- Names and text ---
    def_builtin!(env, "type", FnArity::exact(1), |args| Ok(args[0].type_keyword()));
    def_builtin!(env, "identity", FnArity::exact(1), |args| Ok(args[0].clone()));
    def_builtin!(env, "str", FnArity::at_least(0), |args| {
        Ok(Value::string(
            args.iter().map(Value::to_str_text).collect::<String>(),
        ))
    });
    def_builtin!(env, "pr-str", FnArity::at_least(0), |args| {
        Ok(Value::string(
            args.iter().map(Value::pr_str).collect::<Vec<_>>().join(" "),
        ))
    });
    def_builtin!(env, "name", FnArity::exact(1), |args| {
        let full = expect_name(&args[0], "name")?;
        match &args[0] {
            Value::String(_) => Ok(args[0].clone()),
            _ => Ok(Value::string(name_part(full))),
        }
    });
    def_builtin!(env, "namespace", FnArity::exact(1), |args| {
        match &args[0] {
            Value::Keyword(s) | Value::Symbol(s, _) => {
                Ok(namespace_part(s).map(Value::string).unwrap_or(Value::Nil))
            }
            other => Err(VncError::type_mismatch("keyword or symbol", other.type_name())),
        }
    });
    def_builtin!(env, "keyword", arity(1, 2), |args| {
        match args {
            [Value::Keyword(_)] => Ok(args[0].clone()),
            [value] => Ok(Value::keyword(expect_name(value, "keyword")?)),
            [ns, name] => Ok(Value::keyword(format!(
                "{}/{}",
                expect_name(ns, "keyword")?,
                expect_name(name, "keyword")?
            ))),
            _ => err("keyword expects 1 or 2 arguments"),
        }
    });
    def_builtin!(env, "symbol", arity(1, 2), |args| {
        match args {
            [Value::Symbol(..)] => Ok(args[0].clone()),
            [value] => Ok(Value::symbol(expect_name(value, "symbol")?)),
            [ns, name] => Ok(Value::symbol(format!(
                "{}/{}",
                expect_name(ns, "symbol")?,
                expect_name(name, "symbol")?
            ))),
            _ => err("symbol expects 1 or 2 arguments"),
        }
    });
    def_builtin!(env, "gensym", arity(0, 1), |args| {
        let prefix = match args.first() {
            Some(value) => expect_name(value, "gensym")?.to_string(),
            None => "G".to_string(),
        };
        Ok(Value::symbol(macros::gensym(&prefix)))
    });
    def_builtin!(env, "compare", FnArity::exact(2), |args| {
        Ok(Value::Long(match args[0].cmp(&args[1]) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }))
    });

    // --- Code as data ---
    def_builtin!(env, "read-string", FnArity::exact(1), |args| {
        let src = expect_str(&args[0], "read-string")?;
        let form = Reader::new(src)
            .with_source_name(Some("read-string".to_string()))
            .read_first()?;
        Ok(form.as_ref().map(form_to_value).unwrap_or(Value::Nil))
    });
    def_builtin!(env, "eval", FnArity::exact(1), |args| {
        let form = value_to_form(&args[0], Span::default());
        with_ctx(|ctx| ctx.eval_form(&form))
    });
    def_builtin!(env, "macroexpand-1", FnArity::exact(1), |args| {
        with_ctx(|ctx| macros::expand_value(&ctx, &args[0], ExpandMode::Once))
    });
    def_builtin!(env, "macroexpand", FnArity::exact(1), |args| {
        with_ctx(|ctx| macros::expand_value(&ctx, &args[0], ExpandMode::Head))
    });
    def_builtin!(env, "macroexpand-all", FnArity::exact(1), |args| {
        with_ctx(|ctx| macros::expand_value(&ctx, &args[0], ExpandMode::All))
    });
    def_builtin!(env, "bound?", FnArity::exact(1), |args| {
        let name = match &args[0] {
            Value::Symbol(s, _) | Value::String(s) => s.clone(),
            other => return Err(VncError::type_mismatch("symbol", other.type_name())),
        };
        with_ctx(|ctx| {
            let env = ctx.current_env();
            Ok(Value::Bool(Evaluator::new(&ctx).resolve_symbol(&name, &env).is_ok()))
        })
    });
    def_builtin!(env, "doc", FnArity::exact(1), |args| {
        match &args[0] {
            Value::Symbol(name, _) => {
                let name = name.clone();
                let value = with_ctx(|ctx| {
                    let env = ctx.current_env();
                    Evaluator::new(&ctx).resolve_symbol(&name, &env)
                })?;
                Ok(docstring(&value))
            }
            other => Ok(docstring(other)),
        }
    });
    def_builtin!(env, "ns-alias", FnArity::exact(2), |args| {
        let alias = expect_name(&args[0], "ns-alias")?.to_string();
        let target = expect_name(&args[1], "ns-alias")?.to_string();
        with_ctx(|ctx| {
            ctx.add_alias(&alias, &target);
            Ok(Value::Nil)
        })
    });
    def_builtin!(env, "ns-list", FnArity::exact(0), |_args| {
        with_ctx(|ctx| {
            let mut names = ctx.namespace_names();
            names.sort();
            Ok(Value::list(names.into_iter().map(Value::symbol)))
        })
    });

    // --- Functions ---
    def_builtin!(env, "apply", FnArity::at_least(1), |args| {
        let (func, rest) = args.split_first().ok_or_else(|| VncError::arity("apply"))?;
        let mut call_args: Vec<Value> = Vec::new();
        if let Some((last, middle)) = rest.split_last() {
            call_args.extend(middle.iter().cloned());
            call_args.extend(seq_items(last)?);
        }
        call_callable(func, &call_args)
    });
    def_builtin!(env, "comp", FnArity::at_least(0), |args| {
        let funcs: Vec<Value> = args.to_vec();
        Ok(Value::native_fn_with_name("comp", FnArity::at_least(0), move |call_args| {
            let Some((last, before)) = funcs.split_last() else {
                return Ok(call_args.first().cloned().unwrap_or(Value::Nil));
            };
            let mut acc = call_callable(last, call_args)?;
            for func in before.iter().rev() {
                acc = call_callable(func, std::slice::from_ref(&acc))?;
            }
            Ok(acc)
        }))
    });
    def_builtin!(env, "partial", FnArity::at_least(1), |args| {
        let func = args[0].clone();
        let bound: Vec<Value> = args[1..].to_vec();
        Ok(Value::native_fn_with_name("partial", FnArity::at_least(0), move |call_args| {
            let mut all = bound.clone();
            all.extend(call_args.iter().cloned());
            call_callable(&func, &all)
        }))
    });
    def_builtin!(env, "complement", FnArity::exact(1), |args| {
        let func = args[0].clone();
        Ok(Value::native_fn_with_name("complement", FnArity::at_least(0), move |call_args| {
            Ok(Value::Bool(!call_callable(&func, call_args)?.is_truthy()))
        }))
    });
    def_builtin!(env, "constantly", FnArity::exact(1), |args| {
        let value = args[0].clone();
        Ok(Value::native_fn_with_name("constantly", FnArity::at_least(0), move |_| {
            Ok(value.clone())
        }))
    });

    // Used by `defn-`: the same closure, hidden from other namespaces.
    def_builtin!(env, "private-fn", FnArity::exact(1), |args| {
        match &args[0] {
            Value::Fn(lambda) => Ok(Value::Fn(Arc::new(Lambda {
                name: lambda.name.clone(),
                ns: lambda.ns.clone(),
                clauses: lambda.clauses.clone(),
                env: lambda.env.clone(),
                doc: lambda.doc.clone(),
                private: true,
            }))),
            other => Err(VncError::type_mismatch("function", other.type_name())),
        }
    });

    // --- Exceptions ---
    def_builtin!(env, "ex", FnArity::range(1, 3), |args| {
        let class = expect_name(&args[0], "ex")?;
        let message = match args.get(1) {
            None | Some(Value::Nil) => None,
            Some(Value::String(s)) => Some(s.to_string()),
            Some(other) => Some(other.to_str_text()),
        };
        let (value, cause) = match args.get(2) {
            Some(Value::Exception(cause)) => (None, Some(cause.clone())),
            Some(Value::Nil) | None => (None, None),
            Some(other) => (Some(other.clone()), None),
        };
        Ok(Value::Exception(Arc::new(ExceptionData::new(
            class, message, value, cause,
        ))))
    });
    def_builtin!(env, "ex-message", FnArity::exact(1), |args| {
        let ex = expect_exception(&args[0], "ex-message")?;
        Ok(ex.message.clone().map(Value::string).unwrap_or(Value::Nil))
    });
    def_builtin!(env, "ex-value", FnArity::exact(1), |args| {
        let ex = expect_exception(&args[0], "ex-value")?;
        Ok(ex.value.clone().unwrap_or(Value::Nil))
    });
    def_builtin!(env, "ex-cause", FnArity::exact(1), |args| {
        let ex = expect_exception(&args[0], "ex-cause")?;
        Ok(ex.cause.clone().map(Value::Exception).unwrap_or(Value::Nil))
    });
    def_builtin!(env, "ex-class", FnArity::exact(1), |args| {
        let ex = expect_exception(&args[0], "ex-class")?;
        Ok(Value::keyword(&ex.class))
    });

    // --- Time ---
    def_builtin!(env, "sleep", FnArity::exact(1), |args| {
        let millis = expect_long(&args[0], "sleep")?;
        if millis > 0 {
            std::thread::sleep(Duration::from_millis(millis as u64));
        }
        Ok(Value::Nil)
    });
    def_builtin!(env, "current-time-millis", FnArity::exact(0), |_args| {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Ok(Value::Long(millis))
    });
}

fn docstring(value: &Value) -> Value {
    let doc = match value {
        Value::Fn(lambda) | Value::Macro(lambda) => lambda.doc.clone(),
        Value::Native(native) => native.doc().map(str::to_string),
        _ => None,
    };
    doc.map(Value::string).unwrap_or(Value::Nil)
}

fn expect_exception<'a>(value: &'a Value, op: &str) -> Result<&'a ExceptionData, VncError> {
    match value {
        Value::Exception(ex) => Ok(ex.as_ref()),
        other => Err(VncError::type_mismatch(
            format!("exception for '{}'", op),
            other.type_name(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_qualified_names() {
        assert_eq!(name_part("ns/kw"), "kw");
        assert_eq!(name_part("/"), "/");
        assert_eq!(namespace_part("ns/kw"), Some("ns"));
        assert_eq!(namespace_part("kw"), None);
    }
}
