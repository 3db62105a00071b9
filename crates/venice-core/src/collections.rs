use im::{HashMap, HashSet, OrdMap, OrdSet, Vector};

use crate::ast::Value;
use crate::error::VncError;

/// Persistent map that iterates in insertion order.
#[derive(Clone, Default)]
pub struct OrderedMap {
    keys: Vector<Value>,
    entries: HashMap<Value, Value>,
}

impl OrderedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.entries.contains_key(key)
    }

    /// Re-assigning an existing key keeps its original position.
    pub fn insert(&mut self, key: Value, value: Value) {
        if !self.entries.contains_key(&key) {
            self.keys.push_back(key.clone());
        }
        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, key: &Value) {
        if self.entries.remove(key).is_some() {
            if let Some(idx) = self.keys.index_of(key) {
                self.keys.remove(idx);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> + '_ {
        self.keys
            .iter()
            .filter_map(move |k| self.entries.get(k).map(|v| (k, v)))
    }
}

impl FromIterator<(Value, Value)> for OrderedMap {
    fn from_iter<T: IntoIterator<Item = (Value, Value)>>(iter: T) -> Self {
        let mut map = OrderedMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Elements of anything seqable: nil, lists, vectors, sets, maps (as
/// `[k v]` vectors) and strings (as chars).
pub fn seq_items(value: &Value) -> Result<Vec<Value>, VncError> {
    match value {
        Value::Nil => Ok(Vec::new()),
        Value::List(items) | Value::Vector(items) => Ok(items.iter().cloned().collect()),
        Value::Set(_) | Value::SortedSet(_) => Ok(value.set_items().unwrap_or_default()),
        Value::Map(_) | Value::OrderedMap(_) | Value::SortedMap(_) => Ok(value
            .map_entries()
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| Value::vector(vec![k, v]))
            .collect()),
        Value::String(s) => Ok(s.chars().map(Value::Char).collect()),
        other => Err(VncError::type_mismatch("sequence", other.type_name())),
    }
}

pub fn is_seqable(value: &Value) -> bool {
    matches!(
        value,
        Value::Nil
            | Value::List(_)
            | Value::Vector(_)
            | Value::Set(_)
            | Value::SortedSet(_)
            | Value::Map(_)
            | Value::OrderedMap(_)
            | Value::SortedMap(_)
            | Value::String(_)
    )
}

pub fn count(value: &Value) -> Result<usize, VncError> {
    Ok(match value {
        Value::Nil => 0,
        Value::List(items) | Value::Vector(items) => items.len(),
        Value::Map(m) => m.len(),
        Value::OrderedMap(m) => m.len(),
        Value::SortedMap(m) => m.len(),
        Value::Set(s) => s.len(),
        Value::SortedSet(s) => s.len(),
        Value::String(s) => s.chars().count(),
        other => return Err(VncError::type_mismatch("collection", other.type_name())),
    })
}

pub fn get(coll: &Value, key: &Value) -> Option<Value> {
    match coll {
        Value::Map(_) | Value::OrderedMap(_) | Value::SortedMap(_) => coll.map_lookup(key),
        Value::Set(_) | Value::SortedSet(_) => {
            if coll.set_contains(key) {
                Some(key.clone())
            } else {
                None
            }
        }
        Value::Vector(items) | Value::List(items) => match key {
            Value::Long(i) if *i >= 0 => items.get(*i as usize).cloned(),
            _ => None,
        },
        Value::String(s) => match key {
            Value::Long(i) if *i >= 0 => s.chars().nth(*i as usize).map(Value::Char),
            _ => None,
        },
        _ => None,
    }
}

pub fn assoc(coll: &Value, key: Value, value: Value) -> Result<Value, VncError> {
    match coll {
        Value::Nil => Ok(Value::Map(HashMap::unit(key, value))),
        Value::Map(m) => Ok(Value::Map(m.update(key, value))),
        Value::OrderedMap(m) => {
            let mut next = m.clone();
            next.insert(key, value);
            Ok(Value::OrderedMap(next))
        }
        Value::SortedMap(m) => Ok(Value::SortedMap(m.update(key, value))),
        Value::Vector(items) => {
            let idx = index_arg(&key, "assoc")?;
            if idx < items.len() {
                Ok(Value::Vector(items.update(idx, value)))
            } else if idx == items.len() {
                let mut next = items.clone();
                next.push_back(value);
                Ok(Value::Vector(next))
            } else {
                Err(VncError::index_out_of_bounds(format!(
                    "assoc: index {} out of bounds for vector of length {}",
                    idx,
                    items.len()
                )))
            }
        }
        other => Err(VncError::type_mismatch("map or vector", other.type_name())),
    }
}

pub fn dissoc(coll: &Value, key: &Value) -> Result<Value, VncError> {
    match coll {
        Value::Nil => Ok(Value::Nil),
        Value::Map(m) => Ok(Value::Map(m.without(key))),
        Value::OrderedMap(m) => {
            let mut next = m.clone();
            next.remove(key);
            Ok(Value::OrderedMap(next))
        }
        Value::SortedMap(m) => Ok(Value::SortedMap(m.without(key))),
        other => Err(VncError::type_mismatch("map", other.type_name())),
    }
}

/// `conj` semantics: lists grow at the front, vectors at the back, maps take
/// `[k v]` entries, sets take members.
pub fn conj(coll: &Value, item: Value) -> Result<Value, VncError> {
    match coll {
        Value::Nil => Ok(Value::List(Vector::unit(item))),
        Value::List(items) => {
            let mut next = items.clone();
            next.push_front(item);
            Ok(Value::List(next))
        }
        Value::Vector(items) => {
            let mut next = items.clone();
            next.push_back(item);
            Ok(Value::Vector(next))
        }
        Value::Set(s) => Ok(Value::Set(s.update(item))),
        Value::SortedSet(s) => Ok(Value::SortedSet(s.update(item))),
        Value::Map(_) | Value::OrderedMap(_) | Value::SortedMap(_) => match &item {
            Value::Vector(pair) if pair.len() == 2 => assoc(coll, pair[0].clone(), pair[1].clone()),
            Value::Map(_) | Value::OrderedMap(_) | Value::SortedMap(_) => {
                let mut acc = coll.clone();
                for (k, v) in item.map_entries().unwrap_or_default() {
                    acc = assoc(&acc, k, v)?;
                }
                Ok(acc)
            }
            other => Err(VncError::illegal_argument(format!(
                "conj: map entries must be [key value] vectors, got {}",
                other.type_name()
            ))),
        },
        other => Err(VncError::type_mismatch("collection", other.type_name())),
    }
}

/// Empty collection of the same kind.
pub fn empty_like(coll: &Value) -> Value {
    match coll {
        Value::List(_) => Value::List(Vector::new()),
        Value::Vector(_) => Value::Vector(Vector::new()),
        Value::Map(_) => Value::Map(HashMap::new()),
        Value::OrderedMap(_) => Value::OrderedMap(OrderedMap::new()),
        Value::SortedMap(_) => Value::SortedMap(OrdMap::new()),
        Value::Set(_) => Value::Set(HashSet::new()),
        Value::SortedSet(_) => Value::SortedSet(OrdSet::new()),
        Value::String(_) => Value::string(""),
        _ => Value::Nil,
    }
}

pub fn hash_map_from_pairs(items: &[Value]) -> Result<Value, VncError> {
    if items.len() % 2 != 0 {
        return Err(VncError::illegal_argument(
            "map constructor requires an even number of arguments",
        ));
    }
    let mut map = HashMap::new();
    for pair in items.chunks(2) {
        map.insert(pair[0].clone(), pair[1].clone());
    }
    Ok(Value::Map(map))
}

pub fn index_arg(value: &Value, op: &str) -> Result<usize, VncError> {
    match value {
        Value::Long(n) if *n >= 0 => Ok(*n as usize),
        Value::Long(n) => Err(VncError::index_out_of_bounds(format!(
            "{}: negative index {}",
            op, n
        ))),
        other => Err(VncError::type_mismatch("long", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_map_keeps_insertion_order() {
        let mut m = OrderedMap::new();
        m.insert(Value::keyword("z"), Value::Long(1));
        m.insert(Value::keyword("a"), Value::Long(2));
        m.insert(Value::keyword("z"), Value::Long(3));
        let keys: Vec<_> = m.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Value::keyword("z"), Value::keyword("a")]);
        assert_eq!(m.get(&Value::keyword("z")), Some(&Value::Long(3)));
        m.remove(&Value::keyword("z"));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn conj_does_not_touch_the_original() {
        let v = Value::vector(vec![Value::Long(1), Value::Long(2)]);
        let grown = conj(&v, Value::Long(3)).unwrap();
        assert_eq!(count(&v).unwrap(), 2);
        assert_eq!(count(&grown).unwrap(), 3);
        let l = Value::list(vec![Value::Long(1)]);
        assert_eq!(
            conj(&l, Value::Long(0)).unwrap(),
            Value::list(vec![Value::Long(0), Value::Long(1)])
        );
    }
}
