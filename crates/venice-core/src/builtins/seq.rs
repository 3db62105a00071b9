use std::cell::RefCell;
use std::cmp::Ordering;

use im::{HashMap, HashSet, OrdMap, OrdSet, Vector};

use crate::ast::{FnArity, Value};
use crate::builtins::{arity, def_builtin, err, expect_long};
use crate::collections::{self, count, empty_like, hash_map_from_pairs, index_arg, seq_items, OrderedMap};
use crate::env::Env;
use crate::error::VncError;
use crate::eval::call_callable;
use crate::number;

fn call1(func: &Value, arg: Value) -> Result<Value, VncError> {
    call_callable(func, &[arg])
}

fn list_of(items: Vec<Value>) -> Value {
    Value::List(items.into_iter().collect())
}

fn pairs_of(items: &[Value], op: &str) -> Result<Vec<(Value, Value)>, VncError> {
    if items.len() % 2 != 0 {
        return err(format!("{} expects an even number of key/value arguments", op));
    }
    Ok(items
        .chunks(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}

fn is_map(value: &Value) -> bool {
    matches!(
        value,
        Value::Map(_) | Value::OrderedMap(_) | Value::SortedMap(_)
    )
}

/// Turns a comparator result into an ordering. Boolean comparators are
/// treated as "less than" tests and probed in both directions.
fn comparator_order(func: &Value, a: &Value, b: &Value) -> Result<Ordering, VncError> {
    match call_callable(func, &[a.clone(), b.clone()])? {
        Value::Long(n) => Ok(n.cmp(&0)),
        Value::Bool(true) => Ok(Ordering::Less),
        Value::Bool(false) | Value::Nil => {
            if call_callable(func, &[b.clone(), a.clone()])?.is_truthy() {
                Ok(Ordering::Greater)
            } else {
                Ok(Ordering::Equal)
            }
        }
        other if other.is_number() => Ok(number::compare(&other, &Value::Long(0))?
            .unwrap_or(Ordering::Equal)),
        other => Err(VncError::type_mismatch("comparator result", other.type_name())),
    }
}

/// Stable sort with a fallible comparison; the first error wins.
fn sort_values<F>(items: &mut [Value], cmp: F) -> Result<(), VncError>
where
    F: Fn(&Value, &Value) -> Result<Ordering, VncError>,
{
    let failure: RefCell<Option<VncError>> = RefCell::new(None);
    items.sort_by(|a, b| {
        if failure.borrow().is_some() {
            return Ordering::Equal;
        }
        cmp(a, b).unwrap_or_else(|e| {
            *failure.borrow_mut() = Some(e);
            Ordering::Equal
        })
    });
    match failure.into_inner() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Columns of `map`/`mapv` over several collections, stopping at the
/// shortest one.
fn zip_columns(colls: &[Value]) -> Result<Vec<Vec<Value>>, VncError> {
    let seqs: Vec<Vec<Value>> = colls.iter().map(seq_items).collect::<Result<_, _>>()?;
    let shortest = seqs.iter().map(Vec::len).min().unwrap_or(0);
    Ok((0..shortest)
        .map(|i| seqs.iter().map(|s| s[i].clone()).collect())
        .collect())
}

fn map_values(func: &Value, colls: &[Value]) -> Result<Vec<Value>, VncError> {
    if let [coll] = colls {
        return seq_items(coll)?
            .into_iter()
            .map(|item| call1(func, item))
            .collect();
    }
    zip_columns(colls)?
        .into_iter()
        .map(|column| call_callable(func, &column))
        .collect()
}

fn nth(coll: &Value, idx: &Value, default: Option<&Value>) -> Result<Value, VncError> {
    let i = index_arg(idx, "nth")?;
    let found = match coll {
        Value::List(items) | Value::Vector(items) => items.get(i).cloned(),
        Value::String(s) => s.chars().nth(i).map(Value::Char),
        Value::Nil => None,
        other => return Err(VncError::type_mismatch("sequential collection", other.type_name())),
    };
    match (found, default) {
        (Some(v), _) => Ok(v),
        (None, Some(d)) => Ok(d.clone()),
        (None, None) => Err(VncError::index_out_of_bounds(format!(
            "nth: index {} out of range for {} of length {}",
            i,
            coll.type_name(),
            count(coll)?
        ))),
    }
}

fn get_in(coll: &Value, path: &[Value]) -> Value {
    let mut current = coll.clone();
    for key in path {
        match collections::get(&current, key) {
            Some(next) => current = next,
            None => return Value::Nil,
        }
    }
    current
}

fn assoc_in(coll: &Value, path: &[Value], value: Value) -> Result<Value, VncError> {
    match path {
        [] => Ok(value),
        [key] => collections::assoc(coll, key.clone(), value),
        [key, rest @ ..] => {
            let child = collections::get(coll, key).unwrap_or(Value::Nil);
            let updated = assoc_in(&child, rest, value)?;
            collections::assoc(coll, key.clone(), updated)
        }
    }
}

fn update_in(coll: &Value, path: &[Value], func: &Value, extra: &[Value]) -> Result<Value, VncError> {
    match path {
        [] => err("update-in expects a non-empty key path"),
        [key] => {
            let mut args = vec![collections::get(coll, key).unwrap_or(Value::Nil)];
            args.extend(extra.iter().cloned());
            collections::assoc(coll, key.clone(), call_callable(func, &args)?)
        }
        [key, rest @ ..] => {
            let child = collections::get(coll, key).unwrap_or(Value::Nil);
            let updated = update_in(&child, rest, func, extra)?;
            collections::assoc(coll, key.clone(), updated)
        }
    }
}

fn into(to: &Value, from: &Value) -> Result<Value, VncError> {
    let mut acc = to.clone();
    for item in seq_items(from)? {
        acc = collections::conj(&acc, item)?;
    }
    Ok(acc)
}

fn flatten_into(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::List(items) | Value::Vector(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => out.push(other.clone()),
    }
}

fn range(args: &[Value]) -> Result<Vec<Value>, VncError> {
    let (start, end, step) = match args {
        [end] => (Value::Long(0), end.clone(), Value::Long(1)),
        [start, end] => (start.clone(), end.clone(), Value::Long(1)),
        [start, end, step] => (start.clone(), end.clone(), step.clone()),
        _ => return err("range expects 1 to 3 arguments"),
    };
    if number::is_zero(&step)? {
        return err("range step must not be zero");
    }
    let ascending = !number::is_negative(&step)?;
    let mut out = Vec::new();
    let mut current = start;
    loop {
        let ord = number::compare(&current, &end)?;
        let inside = match ord {
            Some(Ordering::Less) => ascending,
            Some(Ordering::Greater) => !ascending,
            _ => false,
        };
        if !inside {
            return Ok(out);
        }
        out.push(current.clone());
        current = number::add(&current, &step)?;
    }
}

fn partition(n: usize, step: usize, pad: Option<Vec<Value>>, items: &[Value]) -> Vec<Value> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < items.len() {
        let end = (start + n).min(items.len());
        let mut chunk: Vec<Value> = items[start..end].to_vec();
        if chunk.len() < n {
            if let Some(fill) = &pad {
                chunk.extend(fill.iter().take(n - chunk.len()).cloned());
                out.push(list_of(chunk));
            }
            break;
        }
        out.push(list_of(chunk));
        start += step;
    }
    out
}

fn merge(maps: &[Value]) -> Result<Value, VncError> {
    let mut acc: Option<Value> = None;
    for m in maps {
        match m {
            Value::Nil => {}
            _ if is_map(m) => {
                acc = Some(match acc {
                    None => m.clone(),
                    Some(base) => into(&base, m)?,
                })
            }
            other => return Err(VncError::type_mismatch("map", other.type_name())),
        }
    }
    Ok(acc.unwrap_or(Value::Nil))
}

pub(crate) fn install(env: &mut Env) {
    // --- Constructors ---
    def_builtin!(env, "list", FnArity::at_least(0), |args| Ok(Value::list(args.iter().cloned())));
    def_builtin!(env, "vector", FnArity::at_least(0), |args| {
        Ok(Value::vector(args.iter().cloned()))
    });
    def_builtin!(env, "hash-map", FnArity::at_least(0), |args| hash_map_from_pairs(args));
    def_builtin!(env, "ordered-map", FnArity::at_least(0), |args| {
        Ok(Value::OrderedMap(
            pairs_of(args, "ordered-map")?.into_iter().collect::<OrderedMap>(),
        ))
    });
    def_builtin!(env, "sorted-map", FnArity::at_least(0), |args| {
        Ok(Value::SortedMap(
            pairs_of(args, "sorted-map")?.into_iter().collect::<OrdMap<_, _>>(),
        ))
    });
    def_builtin!(env, "hash-set", FnArity::at_least(0), |args| {
        Ok(Value::Set(args.iter().cloned().collect::<HashSet<_>>()))
    });
    def_builtin!(env, "sorted-set", FnArity::at_least(0), |args| {
        Ok(Value::SortedSet(args.iter().cloned().collect::<OrdSet<_>>()))
    });
    def_builtin!(env, "set", FnArity::exact(1), |args| {
        Ok(Value::Set(seq_items(&args[0])?.into_iter().collect::<HashSet<_>>()))
    });
    def_builtin!(env, "vec", FnArity::exact(1), |args| {
        Ok(Value::Vector(seq_items(&args[0])?.into_iter().collect::<Vector<_>>()))
    });

    // --- Access ---
    def_builtin!(env, "count", FnArity::exact(1), |args| Ok(Value::Long(count(&args[0])? as i64)));
    def_builtin!(env, "empty?", FnArity::exact(1), |args| Ok(Value::Bool(count(&args[0])? == 0)));
    def_builtin!(env, "not-empty?", FnArity::exact(1), |args| {
        Ok(Value::Bool(count(&args[0])? > 0))
    });
    def_builtin!(env, "first", FnArity::exact(1), |args| {
        match &args[0] {
            Value::List(items) | Value::Vector(items) => Ok(items.front().cloned().unwrap_or(Value::Nil)),
            other => Ok(seq_items(other)?.into_iter().next().unwrap_or(Value::Nil)),
        }
    });
    def_builtin!(env, "second", FnArity::exact(1), |args| {
        Ok(seq_items(&args[0])?.into_iter().nth(1).unwrap_or(Value::Nil))
    });
    def_builtin!(env, "last", FnArity::exact(1), |args| {
        match &args[0] {
            Value::List(items) | Value::Vector(items) => Ok(items.back().cloned().unwrap_or(Value::Nil)),
            other => Ok(seq_items(other)?.pop().unwrap_or(Value::Nil)),
        }
    });
    def_builtin!(env, "rest", FnArity::exact(1), |args| {
        match &args[0] {
            Value::List(items) | Value::Vector(items) => Ok(Value::List(items.skip(1.min(items.len())))),
            other => Ok(list_of(seq_items(other)?.into_iter().skip(1).collect())),
        }
    });
    def_builtin!(env, "next", FnArity::exact(1), |args| {
        let rest: Vec<Value> = seq_items(&args[0])?.into_iter().skip(1).collect();
        Ok(if rest.is_empty() { Value::Nil } else { list_of(rest) })
    });
    def_builtin!(env, "butlast", FnArity::exact(1), |args| {
        let mut items = seq_items(&args[0])?;
        items.pop();
        Ok(list_of(items))
    });
    def_builtin!(env, "nth", arity(2, 3), |args| nth(&args[0], &args[1], args.get(2)));
    def_builtin!(env, "get", arity(2, 3), |args| {
        Ok(collections::get(&args[0], &args[1])
            .unwrap_or_else(|| args.get(2).cloned().unwrap_or(Value::Nil)))
    });
    def_builtin!(env, "get-in", arity(2, 3), |args| {
        let path = seq_items(&args[1])?;
        match (get_in(&args[0], &path), args.get(2)) {
            (Value::Nil, Some(default)) => Ok(default.clone()),
            (found, _) => Ok(found),
        }
    });
    def_builtin!(env, "find", FnArity::exact(2), |args| {
        Ok(args[0]
            .map_lookup(&args[1])
            .map(|v| Value::vector(vec![args[1].clone(), v]))
            .unwrap_or(Value::Nil))
    });
    def_builtin!(env, "peek", FnArity::exact(1), |args| {
        match &args[0] {
            Value::List(items) => Ok(items.front().cloned().unwrap_or(Value::Nil)),
            Value::Vector(items) => Ok(items.back().cloned().unwrap_or(Value::Nil)),
            Value::Nil => Ok(Value::Nil),
            other => Err(VncError::type_mismatch("list or vector", other.type_name())),
        }
    });
    def_builtin!(env, "pop", FnArity::exact(1), |args| {
        match &args[0] {
            Value::List(items) if !items.is_empty() => Ok(Value::List(items.skip(1))),
            Value::Vector(items) if !items.is_empty() => Ok(Value::Vector(items.take(items.len() - 1))),
            Value::List(_) | Value::Vector(_) => Err(VncError::illegal_state("Can't pop empty collection")),
            Value::Nil => Ok(Value::Nil),
            other => Err(VncError::type_mismatch("list or vector", other.type_name())),
        }
    });
    def_builtin!(env, "contains?", FnArity::exact(2), |args| {
        let coll = &args[0];
        let found = match coll {
            Value::Vector(items) | Value::List(items) => {
                matches!(&args[1], Value::Long(i) if *i >= 0 && (*i as usize) < items.len())
            }
            Value::Set(_) | Value::SortedSet(_) => coll.set_contains(&args[1]),
            Value::Nil => false,
            _ if is_map(coll) => coll.map_lookup(&args[1]).is_some(),
            Value::String(s) => matches!(&args[1], Value::Long(i) if *i >= 0 && (*i as usize) < s.chars().count()),
            other => return Err(VncError::type_mismatch("collection", other.type_name())),
        };
        Ok(Value::Bool(found))
    });
    def_builtin!(env, "keys", FnArity::exact(1), |args| {
        match &args[0] {
            Value::Nil => Ok(Value::Nil),
            m => match m.map_entries() {
                Some(entries) => Ok(list_of(entries.into_iter().map(|(k, _)| k).collect())),
                None => Err(VncError::type_mismatch("map", m.type_name())),
            },
        }
    });
    def_builtin!(env, "vals", FnArity::exact(1), |args| {
        match &args[0] {
            Value::Nil => Ok(Value::Nil),
            m => match m.map_entries() {
                Some(entries) => Ok(list_of(entries.into_iter().map(|(_, v)| v).collect())),
                None => Err(VncError::type_mismatch("map", m.type_name())),
            },
        }
    });
    def_builtin!(env, "seq", FnArity::exact(1), |args| {
        let items = seq_items(&args[0])?;
        Ok(if items.is_empty() { Value::Nil } else { list_of(items) })
    });

    // --- Update ---
    def_builtin!(env, "assoc", FnArity::at_least(3), |args| {
        let mut acc = args[0].clone();
        for (k, v) in pairs_of(&args[1..], "assoc")? {
            acc = collections::assoc(&acc, k, v)?;
        }
        Ok(acc)
    });
    def_builtin!(env, "assoc-in", FnArity::exact(3), |args| {
        assoc_in(&args[0], &seq_items(&args[1])?, args[2].clone())
    });
    def_builtin!(env, "dissoc", FnArity::at_least(1), |args| {
        let mut acc = args[0].clone();
        for key in &args[1..] {
            acc = collections::dissoc(&acc, key)?;
        }
        Ok(acc)
    });
    def_builtin!(env, "update", FnArity::at_least(3), |args| {
        update_in(&args[0], std::slice::from_ref(&args[1]), &args[2], &args[3..])
    });
    def_builtin!(env, "update-in", FnArity::at_least(3), |args| {
        update_in(&args[0], &seq_items(&args[1])?, &args[2], &args[3..])
    });
    def_builtin!(env, "conj", FnArity::at_least(0), |args| {
        let Some((coll, items)) = args.split_first() else {
            return Ok(Value::Vector(Vector::new()));
        };
        let mut acc = coll.clone();
        for item in items {
            acc = collections::conj(&acc, item.clone())?;
        }
        Ok(acc)
    });
    def_builtin!(env, "cons", FnArity::exact(2), |args| {
        let mut items: Vector<Value> = seq_items(&args[1])?.into_iter().collect();
        items.push_front(args[0].clone());
        Ok(Value::List(items))
    });
    def_builtin!(env, "disj", FnArity::at_least(1), |args| {
        match &args[0] {
            Value::Set(s) => Ok(Value::Set(args[1..].iter().fold(s.clone(), |acc, k| acc.without(k)))),
            Value::SortedSet(s) => Ok(Value::SortedSet(args[1..].iter().fold(s.clone(), |acc, k| acc.without(k)))),
            Value::Nil => Ok(Value::Nil),
            other => Err(VncError::type_mismatch("set", other.type_name())),
        }
    });
    def_builtin!(env, "concat", FnArity::at_least(0), |args| {
        let mut out = Vec::new();
        for coll in args {
            out.extend(seq_items(coll)?);
        }
        Ok(list_of(out))
    });
    def_builtin!(env, "into", arity(1, 2), |args| {
        match args {
            [to] => Ok(to.clone()),
            [to, from] => into(to, from),
            _ => err("into expects 1 or 2 arguments"),
        }
    });
    def_builtin!(env, "empty", FnArity::exact(1), |args| Ok(empty_like(&args[0])));

    // --- Transform ---
    def_builtin!(env, "map", FnArity::at_least(2), |args| {
        Ok(list_of(map_values(&args[0], &args[1..])?))
    });
    def_builtin!(env, "mapv", FnArity::at_least(2), |args| {
        Ok(Value::vector(map_values(&args[0], &args[1..])?))
    });
    def_builtin!(env, "map-indexed", FnArity::exact(2), |args| {
        let out = seq_items(&args[1])?
            .into_iter()
            .enumerate()
            .map(|(i, item)| call_callable(&args[0], &[Value::Long(i as i64), item]))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(list_of(out))
    });
    def_builtin!(env, "filter", FnArity::exact(2), |args| {
        let mut out = Vec::new();
        for item in seq_items(&args[1])? {
            if call1(&args[0], item.clone())?.is_truthy() {
                out.push(item);
            }
        }
        Ok(list_of(out))
    });
    def_builtin!(env, "remove", FnArity::exact(2), |args| {
        let mut out = Vec::new();
        for item in seq_items(&args[1])? {
            if !call1(&args[0], item.clone())?.is_truthy() {
                out.push(item);
            }
        }
        Ok(list_of(out))
    });
    def_builtin!(env, "keep", FnArity::exact(2), |args| {
        let mut out = Vec::new();
        for item in seq_items(&args[1])? {
            let result = call1(&args[0], item)?;
            if !result.is_nil() {
                out.push(result);
            }
        }
        Ok(list_of(out))
    });
    def_builtin!(env, "mapcat", FnArity::at_least(2), |args| {
        let mut out = Vec::new();
        for chunk in map_values(&args[0], &args[1..])? {
            out.extend(seq_items(&chunk)?);
        }
        Ok(list_of(out))
    });
    def_builtin!(env, "reduce", arity(2, 3), |args| {
        let func = &args[0];
        let (init, items) = match args {
            [_, coll] => {
                let mut items = seq_items(coll)?.into_iter();
                match items.next() {
                    Some(first) => (first, items.collect::<Vec<_>>()),
                    None => return call_callable(func, &[]),
                }
            }
            [_, init, coll] => (init.clone(), seq_items(coll)?),
            _ => return err("reduce expects 2 or 3 arguments"),
        };
        items
            .into_iter()
            .try_fold(init, |acc, item| call_callable(func, &[acc, item]))
    });
    def_builtin!(env, "reduce-kv", FnArity::exact(3), |args| {
        let entries = match &args[2] {
            Value::Nil => Vec::new(),
            m => m
                .map_entries()
                .ok_or_else(|| VncError::type_mismatch("map", m.type_name()))?,
        };
        entries
            .into_iter()
            .try_fold(args[1].clone(), |acc, (k, v)| call_callable(&args[0], &[acc, k, v]))
    });

    // --- Slicing and ordering ---
    def_builtin!(env, "range", arity(1, 3), |args| Ok(list_of(range(args)?)));
    def_builtin!(env, "take", FnArity::exact(2), |args| {
        let n = expect_long(&args[0], "take")?.max(0) as usize;
        Ok(list_of(seq_items(&args[1])?.into_iter().take(n).collect()))
    });
    def_builtin!(env, "drop", FnArity::exact(2), |args| {
        let n = expect_long(&args[0], "drop")?.max(0) as usize;
        Ok(list_of(seq_items(&args[1])?.into_iter().skip(n).collect()))
    });
    def_builtin!(env, "take-while", FnArity::exact(2), |args| {
        let mut out = Vec::new();
        for item in seq_items(&args[1])? {
            if !call1(&args[0], item.clone())?.is_truthy() {
                break;
            }
            out.push(item);
        }
        Ok(list_of(out))
    });
    def_builtin!(env, "drop-while", FnArity::exact(2), |args| {
        let items = seq_items(&args[1])?;
        let mut idx = 0;
        while idx < items.len() && call1(&args[0], items[idx].clone())?.is_truthy() {
            idx += 1;
        }
        Ok(list_of(items[idx..].to_vec()))
    });
    def_builtin!(env, "reverse", FnArity::exact(1), |args| {
        let mut items = seq_items(&args[0])?;
        items.reverse();
        Ok(list_of(items))
    });
    def_builtin!(env, "sort", arity(1, 2), |args| {
        let (cmp, coll) = match args {
            [coll] => (None, coll),
            [cmp, coll] => (Some(cmp), coll),
            _ => return err("sort expects 1 or 2 arguments"),
        };
        let mut items = seq_items(coll)?;
        match cmp {
            None => items.sort(),
            Some(func) => sort_values(&mut items, |a, b| comparator_order(func, a, b))?,
        }
        Ok(list_of(items))
    });
    def_builtin!(env, "sort-by", arity(2, 3), |args| {
        let (keyfn, cmp, coll) = match args {
            [keyfn, coll] => (keyfn, None, coll),
            [keyfn, cmp, coll] => (keyfn, Some(cmp), coll),
            _ => return err("sort-by expects 2 or 3 arguments"),
        };
        let mut keyed: Vec<Value> = Vec::new();
        for item in seq_items(coll)? {
            let key = call1(keyfn, item.clone())?;
            keyed.push(Value::vector(vec![key, item]));
        }
        let key_of = |v: &Value| v.sequential_items().and_then(|p| p.front().cloned()).unwrap_or(Value::Nil);
        sort_values(&mut keyed, |a, b| match cmp {
            None => Ok(key_of(a).cmp(&key_of(b))),
            Some(func) => comparator_order(func, &key_of(a), &key_of(b)),
        })?;
        Ok(list_of(
            keyed
                .into_iter()
                .map(|pair| pair.sequential_items().and_then(|p| p.back().cloned()).unwrap_or(Value::Nil))
                .collect(),
        ))
    });

    // --- Grouping ---
    def_builtin!(env, "group-by", FnArity::exact(2), |args| {
        let mut groups = OrderedMap::new();
        for item in seq_items(&args[1])? {
            let key = call1(&args[0], item.clone())?;
            let bucket = match groups.get(&key) {
                Some(existing) => collections::conj(existing, item)?,
                None => Value::vector(vec![item]),
            };
            groups.insert(key, bucket);
        }
        Ok(Value::OrderedMap(groups))
    });
    def_builtin!(env, "frequencies", FnArity::exact(1), |args| {
        let mut freq = OrderedMap::new();
        for item in seq_items(&args[0])? {
            let n = match freq.get(&item) {
                Some(Value::Long(n)) => n + 1,
                _ => 1,
            };
            freq.insert(item, Value::Long(n));
        }
        Ok(Value::OrderedMap(freq))
    });
    def_builtin!(env, "distinct", FnArity::exact(1), |args| {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for item in seq_items(&args[0])? {
            if seen.insert(item.clone()).is_none() {
                out.push(item);
            }
        }
        Ok(list_of(out))
    });
    def_builtin!(env, "partition", arity(2, 4), |args| {
        let n = expect_long(&args[0], "partition")?;
        if n <= 0 {
            return err("partition size must be positive");
        }
        let (step, pad, coll) = match args {
            [_, coll] => (n, None, coll),
            [_, step, coll] => (expect_long(step, "partition")?, None, coll),
            [_, step, pad, coll] => (expect_long(step, "partition")?, Some(seq_items(pad)?), coll),
            _ => return err("partition expects 2 to 4 arguments"),
        };
        if step <= 0 {
            return err("partition step must be positive");
        }
        Ok(list_of(partition(n as usize, step as usize, pad, &seq_items(coll)?)))
    });
    def_builtin!(env, "flatten", FnArity::exact(1), |args| {
        let mut out = Vec::new();
        for item in seq_items(&args[0])? {
            flatten_into(&item, &mut out);
        }
        Ok(list_of(out))
    });
    def_builtin!(env, "interleave", FnArity::at_least(1), |args| {
        Ok(list_of(zip_columns(args)?.into_iter().flatten().collect()))
    });
    def_builtin!(env, "interpose", FnArity::exact(2), |args| {
        let mut out = Vec::new();
        for (i, item) in seq_items(&args[1])?.into_iter().enumerate() {
            if i > 0 {
                out.push(args[0].clone());
            }
            out.push(item);
        }
        Ok(list_of(out))
    });
    def_builtin!(env, "zipmap", FnArity::exact(2), |args| {
        let keys = seq_items(&args[0])?;
        let vals = seq_items(&args[1])?;
        Ok(Value::Map(keys.into_iter().zip(vals).collect::<HashMap<_, _>>()))
    });
    def_builtin!(env, "merge", FnArity::at_least(0), |args| merge(args));
    def_builtin!(env, "select-keys", FnArity::exact(2), |args| {
        let mut acc = empty_like(&args[0]);
        if acc.is_nil() {
            acc = Value::Map(HashMap::new());
        }
        for key in seq_items(&args[1])? {
            if let Some(v) = args[0].map_lookup(&key) {
                acc = collections::assoc(&acc, key, v)?;
            }
        }
        Ok(acc)
    });
    def_builtin!(env, "repeat", FnArity::exact(2), |args| {
        let n = expect_long(&args[0], "repeat")?.max(0) as usize;
        Ok(list_of(vec![args[1].clone(); n]))
    });

    // --- Tests ---
    def_builtin!(env, "some", FnArity::exact(2), |args| {
        for item in seq_items(&args[1])? {
            let result = call1(&args[0], item)?;
            if result.is_truthy() {
                return Ok(result);
            }
        }
        Ok(Value::Nil)
    });
    def_builtin!(env, "every?", FnArity::exact(2), |args| {
        for item in seq_items(&args[1])? {
            if !call1(&args[0], item)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
        }
        Ok(Value::Bool(true))
    });
    def_builtin!(env, "any?", FnArity::exact(2), |args| {
        for item in seq_items(&args[1])? {
            if call1(&args[0], item)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
        }
        Ok(Value::Bool(false))
    });
    def_builtin!(env, "not-any?", FnArity::exact(2), |args| {
        for item in seq_items(&args[1])? {
            if call1(&args[0], item)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
        }
        Ok(Value::Bool(true))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn longs(values: &[i64]) -> Vec<Value> {
        values.iter().map(|n| Value::Long(*n)).collect()
    }

    #[test]
    fn range_counts_in_both_directions() {
        assert_eq!(range(&[Value::Long(4)]).unwrap(), longs(&[0, 1, 2, 3]));
        assert_eq!(
            range(&[Value::Long(5), Value::Long(0), Value::Long(-2)]).unwrap(),
            longs(&[5, 3, 1])
        );
        assert!(range(&[Value::Long(0), Value::Long(5), Value::Long(0)]).is_err());
    }

    #[test]
    fn partition_drops_incomplete_tail_unless_padded() {
        let items = longs(&[1, 2, 3, 4, 5]);
        assert_eq!(partition(2, 2, None, &items).len(), 2);
        let padded = partition(2, 2, Some(longs(&[0])), &items);
        assert_eq!(padded.last(), Some(&Value::list(longs(&[5, 0]))));
    }

    #[test]
    fn nested_paths() {
        let inner = collections::assoc(&Value::Nil, Value::keyword("b"), Value::Long(1)).unwrap();
        let outer = collections::assoc(&Value::Nil, Value::keyword("a"), inner).unwrap();
        assert_eq!(get_in(&outer, &[Value::keyword("a"), Value::keyword("b")]), Value::Long(1));
        let grown = assoc_in(&outer, &[Value::keyword("a"), Value::keyword("c")], Value::Long(2)).unwrap();
        assert_eq!(get_in(&grown, &[Value::keyword("a"), Value::keyword("c")]), Value::Long(2));
        assert_eq!(get_in(&outer, &[Value::keyword("a"), Value::keyword("c")]), Value::Nil);
    }
}
