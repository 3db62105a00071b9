use std::cell::RefCell;
use std::collections::HashMap;

use crate::ast::Value;

/// Vars that are dynamic in every interpreter.
pub const BUILTIN_DYNAMIC_VARS: &[&str] = &["*out*", "*err*", "*in*", "*ARGV*"];

thread_local! {
    static DYNAMIC_STACK: RefCell<HashMap<String, Vec<Value>>> = RefCell::new(HashMap::new());
}

/// Innermost thread-local binding, if any. Root values live in the
/// interpreter's core namespace.
pub fn current_binding(name: &str) -> Option<Value> {
    DYNAMIC_STACK.with(|cell| {
        cell.borrow()
            .get(name)
            .and_then(|stack| stack.last())
            .cloned()
    })
}

pub fn has_dynamic_binding(name: &str) -> bool {
    DYNAMIC_STACK.with(|cell| {
        cell.borrow()
            .get(name)
            .map(|stack| !stack.is_empty())
            .unwrap_or(false)
    })
}

/// `set!` on a bound var replaces the innermost binding only.
pub fn set_innermost(name: &str, value: Value) -> bool {
    DYNAMIC_STACK.with(|cell| {
        let mut map = cell.borrow_mut();
        match map.get_mut(name).and_then(|stack| stack.last_mut()) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    })
}

pub fn push_bindings(bindings: &[(String, Value)]) -> DynamicGuard {
    DYNAMIC_STACK.with(|cell| {
        let mut map = cell.borrow_mut();
        for (name, val) in bindings {
            map.entry(name.clone()).or_default().push(val.clone());
        }
    });
    DynamicGuard {
        names: bindings.iter().map(|(name, _)| name.clone()).collect(),
    }
}

/// Pops the bindings it pushed when dropped, on every exit path.
pub struct DynamicGuard {
    names: Vec<String>,
}

impl Drop for DynamicGuard {
    fn drop(&mut self) {
        DYNAMIC_STACK.with(|cell| {
            let mut map = cell.borrow_mut();
            for name in &self.names {
                if let Some(stack) = map.get_mut(name) {
                    stack.pop();
                    if stack.is_empty() {
                        map.remove(name);
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_restores_previous_binding() {
        let outer = push_bindings(&[("*x*".into(), Value::Long(1))]);
        {
            let _inner = push_bindings(&[("*x*".into(), Value::Long(2))]);
            assert_eq!(current_binding("*x*"), Some(Value::Long(2)));
            assert!(set_innermost("*x*", Value::Long(3)));
            assert_eq!(current_binding("*x*"), Some(Value::Long(3)));
        }
        assert_eq!(current_binding("*x*"), Some(Value::Long(1)));
        drop(outer);
        assert!(!has_dynamic_binding("*x*"));
        assert!(!set_innermost("*x*", Value::Nil));
    }
}
