use std::collections::HashMap;

use crate::ast::Value;
use crate::env::{self, new_ref, Env, EnvRef};

pub const CORE_NS: &str = "core";
pub const USER_NS: &str = "user";

pub struct NamespaceData {
    pub name: String,
    pub env: EnvRef,
    aliases: HashMap<String, String>,
    imports: HashMap<String, String>,
}

impl NamespaceData {
    fn new(name: &str, core_env: EnvRef) -> Self {
        Self {
            name: name.to_string(),
            env: new_ref(Env::namespace_root(core_env)),
            aliases: HashMap::new(),
            imports: HashMap::new(),
        }
    }

    pub fn add_alias(&mut self, alias: &str, target: &str) {
        self.aliases.insert(alias.to_string(), target.to_string());
    }

    pub fn alias_target(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    /// `(import :java.util.ArrayList)` makes `ArrayList` resolve to the full name.
    pub fn add_import(&mut self, class_name: &str) {
        let short = class_name.rsplit('.').next().unwrap_or(class_name);
        self.imports
            .insert(short.to_string(), class_name.to_string());
    }

    pub fn imported_class(&self, short: &str) -> Option<&str> {
        self.imports.get(short).map(String::as_str)
    }
}

/// Namespaces of one interpreter. Every namespace frame is a child of the
/// shared core frame, so core functions resolve unqualified everywhere.
pub struct NamespaceStore {
    core_env: EnvRef,
    namespaces: HashMap<String, NamespaceData>,
    current: String,
}

impl NamespaceStore {
    pub fn new(core_env: EnvRef) -> Self {
        let mut store = Self {
            core_env,
            namespaces: HashMap::new(),
            current: USER_NS.to_string(),
        };
        store.ensure(USER_NS);
        store
    }

    pub fn ensure(&mut self, name: &str) -> &mut NamespaceData {
        let core = self.core_env.clone();
        self.namespaces
            .entry(name.to_string())
            .or_insert_with(|| NamespaceData::new(name, core))
    }

    pub fn get(&self, name: &str) -> Option<&NamespaceData> {
        self.namespaces.get(name)
    }

    pub fn core_env(&self) -> EnvRef {
        self.core_env.clone()
    }

    pub fn current_name(&self) -> &str {
        &self.current
    }

    pub fn current(&self) -> Option<&NamespaceData> {
        self.namespaces.get(&self.current)
    }

    pub fn current_mut(&mut self) -> &mut NamespaceData {
        let name = self.current.clone();
        self.ensure(&name)
    }

    pub fn current_env(&self) -> EnvRef {
        if self.current == CORE_NS {
            return self.core_env.clone();
        }
        self.current()
            .map(|ns| ns.env.clone())
            .unwrap_or_else(|| self.core_env.clone())
    }

    /// Switches the current namespace, creating it on first reference.
    pub fn switch_to(&mut self, name: &str) -> EnvRef {
        if name == CORE_NS {
            self.current = CORE_NS.to_string();
            return self.core_env.clone();
        }
        let env = self.ensure(name).env.clone();
        self.current = name.to_string();
        env
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.keys().cloned().collect();
        names.push(CORE_NS.to_string());
        names.sort();
        names
    }

    /// Resolves an alias of the current namespace to the namespace it names.
    pub fn resolve_ns_name<'a>(&'a self, ns: &'a str) -> &'a str {
        self.current()
            .and_then(|data| data.alias_target(ns))
            .unwrap_or(ns)
    }

    /// Looks up `ns/name`, honouring aliases of the current namespace.
    pub fn lookup_qualified(&self, ns: &str, name: &str) -> Option<Value> {
        let target = self.resolve_ns_name(ns);
        if target == CORE_NS {
            return env::read(&self.core_env).get_local(name);
        }
        self.namespaces
            .get(target)
            .and_then(|data| env::read(&data.env).get_local(name))
    }

    pub fn resolve_class(&self, short: &str) -> Option<String> {
        self.current()
            .and_then(|data| data.imported_class(short))
            .map(str::to_string)
    }
}

/// Splits `ns/name`; a lone `/` is the division function.
pub fn split_qualified(symbol: &str) -> Option<(&str, &str)> {
    if symbol == "/" {
        return None;
    }
    match symbol.split_once('/') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() => Some((ns, name)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_qualified_symbols() {
        let core = new_ref(Env::core());
        let mut store = NamespaceStore::new(core);
        let lib_env = store.switch_to("lib");
        env::write(&lib_env).set("answer", Value::Long(42));
        store.switch_to(USER_NS);
        store.current_mut().add_alias("l", "lib");
        assert_eq!(store.lookup_qualified("l", "answer"), Some(Value::Long(42)));
        assert_eq!(store.lookup_qualified("lib", "answer"), Some(Value::Long(42)));
        assert!(store.lookup_qualified("user", "answer").is_none());
    }

    #[test]
    fn splits_qualified_names() {
        assert_eq!(split_qualified("str/join"), Some(("str", "join")));
        assert_eq!(split_qualified("/"), None);
        assert_eq!(split_qualified("plain"), None);
    }
}
