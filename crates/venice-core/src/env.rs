use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ast::Value;

pub type EnvRef = Arc<RwLock<Env>>;

/// One frame. Namespaces own a global root frame whose parent is the shared
/// core frame; `let`, `fn` and `loop` push lexical children.
#[derive(Clone, Debug, Default)]
pub struct Env {
    data: HashMap<String, Value>,
    outer: Option<EnvRef>,
    global: bool,
}

impl Env {
    pub fn new_child(outer: EnvRef) -> Self {
        Self {
            data: HashMap::new(),
            outer: Some(outer),
            global: false,
        }
    }

    /// The shared core frame.
    pub fn core() -> Self {
        Self {
            global: true,
            ..Self::default()
        }
    }

    /// Root frame of a namespace, chained to the core frame.
    pub fn namespace_root(core: EnvRef) -> Self {
        Self {
            data: HashMap::new(),
            outer: Some(core),
            global: true,
        }
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    pub fn define_builtin(&mut self, key: &str, value: Value) {
        self.set(key, value);
    }

    pub fn get_local(&self, key: &str) -> Option<Value> {
        self.data.get(key).cloned()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(v) = self.data.get(key) {
            return Some(v.clone());
        }
        self.outer.as_ref().and_then(|outer| read(outer).get(key))
    }

    /// Looks through `let`/`fn`/`loop` frames only, stopping at the first
    /// namespace or core frame.
    pub fn get_lexical(&self, key: &str) -> Option<Value> {
        if self.global {
            return None;
        }
        if let Some(v) = self.data.get(key) {
            return Some(v.clone());
        }
        self.outer.as_ref().and_then(|outer| read(outer).get_lexical(key))
    }

    /// Replaces an existing binding in the nearest frame that holds it.
    pub fn set_existing(&mut self, key: &str, value: Value) -> bool {
        if self.data.contains_key(key) {
            self.data.insert(key.to_string(), value);
            return true;
        }
        match &self.outer {
            Some(outer) => write(outer).set_existing(key, value),
            None => false,
        }
    }
}

pub fn new_ref(env: Env) -> EnvRef {
    Arc::new(RwLock::new(env))
}

pub fn child_of(env: &EnvRef) -> EnvRef {
    new_ref(Env::new_child(env.clone()))
}

/// A panicking writer never leaves a frame half-updated, so a poisoned lock
/// is still safe to read.
pub fn read(env: &EnvRef) -> RwLockReadGuard<'_, Env> {
    env.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn write(env: &EnvRef) -> RwLockWriteGuard<'_, Env> {
    env.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_outward_and_children_shadow() {
        let root = new_ref(Env::default());
        write(&root).set("x", Value::Long(1));
        let child = child_of(&root);
        assert_eq!(read(&child).get("x"), Some(Value::Long(1)));
        write(&child).set("x", Value::Long(2));
        assert_eq!(read(&child).get("x"), Some(Value::Long(2)));
        assert_eq!(read(&root).get("x"), Some(Value::Long(1)));
        assert!(read(&child).get("missing").is_none());
    }

    #[test]
    fn lexical_lookup_stops_at_namespace_root() {
        let core = new_ref(Env::core());
        let ns = new_ref(Env::namespace_root(core));
        write(&ns).set("g", Value::Long(1));
        let local = child_of(&ns);
        write(&local).set("x", Value::Long(2));
        assert_eq!(read(&local).get_lexical("x"), Some(Value::Long(2)));
        assert!(read(&local).get_lexical("g").is_none());
        assert_eq!(read(&local).get("g"), Some(Value::Long(1)));
        assert!(read(&ns).get_lexical("g").is_none());
    }
}
