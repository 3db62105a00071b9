use std::collections::HashMap as StdHashMap;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

use crate::adapters::{adapt, FunctionalInterface, HostCallable};
use crate::ast::Value;
use crate::collections::OrderedMap;
use crate::interop::HostObject;
use crate::runtime::RuntimeCtx;

/// Values exchanged with the embedding program: script parameters and
/// `eval` results.
#[derive(Clone, Debug, PartialEq)]
pub enum HostValue {
    Nil,
    Bool(bool),
    Long(i64),
    Double(f64),
    Decimal(BigDecimal),
    BigInteger(BigInt),
    String(String),
    Char(char),
    List(Vec<HostValue>),
    Set(Vec<HostValue>),
    /// Entries in the map's iteration order.
    Map(Vec<(HostValue, HostValue)>),
    Object(HostObject),
    /// A script value without a host counterpart (atoms, macros, ...).
    Opaque(Value),
}

/// Named parameters bound as dynamic vars for one evaluation.
pub type Parameters = StdHashMap<String, HostValue>;

impl HostValue {
    /// Converts a script value for the host. Keywords and symbols become
    /// strings; functions become callable objects when an interpreter is
    /// bound to the current thread.
    pub fn from_value(value: &Value) -> HostValue {
        match value {
            Value::Nil => HostValue::Nil,
            Value::Bool(b) => HostValue::Bool(*b),
            Value::Long(n) => HostValue::Long(*n),
            Value::Double(d) => HostValue::Double(*d),
            Value::Decimal(d) => HostValue::Decimal(d.clone()),
            Value::BigInt(n) => HostValue::BigInteger(n.clone()),
            Value::String(s) | Value::Keyword(s) | Value::Symbol(s, _) => {
                HostValue::String(s.to_string())
            }
            Value::Char(c) => HostValue::Char(*c),
            Value::List(items) | Value::Vector(items) => {
                HostValue::List(items.iter().map(HostValue::from_value).collect())
            }
            Value::Set(_) | Value::SortedSet(_) => HostValue::Set(
                value
                    .set_items()
                    .unwrap_or_default()
                    .iter()
                    .map(HostValue::from_value)
                    .collect(),
            ),
            Value::Map(_) | Value::OrderedMap(_) | Value::SortedMap(_) => HostValue::Map(
                value
                    .map_entries()
                    .unwrap_or_default()
                    .iter()
                    .map(|(k, v)| (HostValue::from_value(k), HostValue::from_value(v)))
                    .collect(),
            ),
            Value::Host(obj) => HostValue::Object(obj.clone()),
            Value::Fn(_) | Value::Native(_) => match RuntimeCtx::current_handle() {
                Some(ctx) => match adapt(&ctx, FunctionalInterface::ScriptFunction, value.clone()) {
                    Ok(Value::Host(obj)) => HostValue::Object(obj),
                    _ => HostValue::Opaque(value.clone()),
                },
                None => HostValue::Opaque(value.clone()),
            },
            other => HostValue::Opaque(other.clone()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            HostValue::Nil => Value::Nil,
            HostValue::Bool(b) => Value::Bool(*b),
            HostValue::Long(n) => Value::Long(*n),
            HostValue::Double(d) => Value::Double(*d),
            HostValue::Decimal(d) => Value::Decimal(d.clone()),
            HostValue::BigInteger(n) => Value::BigInt(n.clone()),
            HostValue::String(s) => Value::string(s),
            HostValue::Char(c) => Value::Char(*c),
            HostValue::List(items) => Value::list(items.iter().map(HostValue::to_value)),
            HostValue::Set(items) => Value::Set(items.iter().map(HostValue::to_value).collect()),
            HostValue::Map(entries) => {
                let mut map = OrderedMap::new();
                for (k, v) in entries {
                    map.insert(k.to_value(), v.to_value());
                }
                Value::OrderedMap(map)
            }
            HostValue::Object(obj) => Value::Host(obj.clone()),
            HostValue::Opaque(value) => value.clone(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, HostValue::Nil)
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            HostValue::Long(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Callable view of an adapter or exported script function.
    pub fn as_callable(&self) -> Option<&dyn HostCallable> {
        match self {
            HostValue::Object(obj) => obj.functional().map(|a| a as &dyn HostCallable),
            _ => None,
        }
    }

    /// Entry lookup by string key for `Map` results.
    pub fn get(&self, key: &str) -> Option<&HostValue> {
        match self {
            HostValue::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        HostValue::Long(n)
    }
}

impl From<f64> for HostValue {
    fn from(d: f64) -> Self {
        HostValue::Double(d)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(items: Vec<T>) -> Self {
        HostValue::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_become_strings_and_maps_keep_order() {
        let mut map = OrderedMap::new();
        map.insert(Value::keyword("b"), Value::Long(2));
        map.insert(Value::keyword("a"), Value::Long(1));
        let host = HostValue::from_value(&Value::OrderedMap(map));
        assert_eq!(
            host,
            HostValue::Map(vec![
                (HostValue::from("b"), HostValue::Long(2)),
                (HostValue::from("a"), HostValue::Long(1)),
            ])
        );
        assert_eq!(host.get("a"), Some(&HostValue::Long(1)));
    }

    #[test]
    fn lists_round_trip_into_script_lists() {
        let host = HostValue::from(vec![1i64, 2, 3]);
        assert_eq!(host.to_value().pr_str(), "(1 2 3)");
    }
}
