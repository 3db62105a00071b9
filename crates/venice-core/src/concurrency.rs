use std::collections::HashMap as StdHashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::ast::Value;
use crate::error::VncError;
use crate::eval::call_callable;

/// Shared mutable cell. Updates are compare-and-set commits against a
/// version counter, so concurrent `swap!` calls never lose an update.
#[derive(Clone)]
pub struct AtomHandle {
    inner: Arc<AtomInner>,
}

struct AtomInner {
    value: Mutex<AtomValue>,
    validator: Mutex<Option<Value>>,
    watches: Mutex<StdHashMap<Value, Value>>,
}

#[derive(Clone)]
struct AtomValue {
    value: Value,
    version: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AtomHandle {
    pub fn new(initial: Value) -> Self {
        Self {
            inner: Arc::new(AtomInner {
                value: Mutex::new(AtomValue {
                    value: initial,
                    version: 0,
                }),
                validator: Mutex::new(None),
                watches: Mutex::new(StdHashMap::new()),
            }),
        }
    }

    pub fn with_validator(initial: Value, validator: Option<Value>) -> Result<Self, VncError> {
        let handle = Self::new(initial);
        if validator.is_some() {
            handle.set_validator(validator)?;
        }
        Ok(handle)
    }

    pub fn deref(&self) -> Value {
        lock(&self.inner.value).value.clone()
    }

    /// `reset!`
    pub fn set(&self, value: Value) -> Result<Value, VncError> {
        self.replace_with(move |_| Ok(value.clone()))
    }

    /// `swap!`: applies `func` to the current value plus `extra_args`,
    /// retrying when another thread committed first.
    pub fn update_with_callable(
        &self,
        func: Value,
        extra_args: Vec<Value>,
    ) -> Result<Value, VncError> {
        self.replace_with(move |current| {
            let mut args = Vec::with_capacity(1 + extra_args.len());
            args.push(current);
            args.extend(extra_args.iter().cloned());
            call_callable(&func, &args)
        })
    }

    pub fn compare_and_set(&self, expected: &Value, new_value: Value) -> Result<bool, VncError> {
        loop {
            let snapshot = lock(&self.inner.value).clone();
            if &snapshot.value != expected {
                return Ok(false);
            }
            Self::enforce_validator(self.validator(), &new_value)?;
            if self.try_commit(snapshot.version, new_value.clone()) {
                self.fire_watches(snapshot.value, new_value)?;
                return Ok(true);
            }
        }
    }

    pub fn add_watch(&self, key: Value, func: Value) {
        lock(&self.inner.watches).insert(key, func);
    }

    pub fn remove_watch(&self, key: &Value) -> bool {
        lock(&self.inner.watches).remove(key).is_some()
    }

    pub fn validator(&self) -> Option<Value> {
        lock(&self.inner.validator).clone()
    }

    pub fn set_validator(&self, validator: Option<Value>) -> Result<(), VncError> {
        if let Some(func) = &validator {
            Self::enforce_validator(Some(func.clone()), &self.deref())?;
        }
        *lock(&self.inner.validator) = validator;
        Ok(())
    }

    pub fn ptr_eq(&self, other: &AtomHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    fn replace_with<F>(&self, func: F) -> Result<Value, VncError>
    where
        F: Fn(Value) -> Result<Value, VncError>,
    {
        loop {
            let snapshot = lock(&self.inner.value).clone();
            let candidate = func(snapshot.value.clone())?;
            Self::enforce_validator(self.validator(), &candidate)?;
            if self.try_commit(snapshot.version, candidate.clone()) {
                self.fire_watches(snapshot.value, candidate.clone())?;
                return Ok(candidate);
            }
        }
    }

    fn try_commit(&self, expected_version: usize, next: Value) -> bool {
        let mut guard = lock(&self.inner.value);
        if guard.version != expected_version {
            return false;
        }
        guard.value = next;
        guard.version = guard.version.wrapping_add(1);
        true
    }

    fn enforce_validator(validator: Option<Value>, candidate: &Value) -> Result<(), VncError> {
        if let Some(func) = validator {
            let result = call_callable(&func, std::slice::from_ref(candidate))?;
            if !result.is_truthy() {
                return Err(VncError::illegal_state("atom validator rejected the new value"));
            }
        }
        Ok(())
    }

    fn fire_watches(&self, old_value: Value, new_value: Value) -> Result<(), VncError> {
        let entries: Vec<(Value, Value)> = lock(&self.inner.watches)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let atom_value = Value::Atom(self.clone());
        let mut first_error = None;
        for (key, callback) in entries {
            let args = [key, atom_value.clone(), old_value.clone(), new_value.clone()];
            if let Err(err) = call_callable(&callback, &args) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
