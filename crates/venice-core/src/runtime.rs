use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::ast::{Form, Lambda, Value};
use crate::builtins;
use crate::dynamic_vars::{self, BUILTIN_DYNAMIC_VARS};
use crate::env::{self, new_ref, Env, EnvRef};
use crate::error::VncError;
use crate::eval::Evaluator;
use crate::host_classes;
use crate::interop::HostRegistry;
use crate::macros;
use crate::modules::ModuleRegistry;
use crate::namespaces::{NamespaceStore, CORE_NS, USER_NS};
use crate::options::VeniceOptions;
use crate::reader::Reader;

const CORE_PRELUDE: &str = include_str!("venice/core.venice");

thread_local! {
    static CURRENT_RUNTIME: RefCell<Option<Arc<RuntimeCtx>>> = RefCell::new(None);
}

static NEXT_RUNTIME_ID: AtomicUsize = AtomicUsize::new(1);

pub(crate) struct RuntimeGuard {
    prev: Option<Arc<RuntimeCtx>>,
}

impl RuntimeGuard {
    pub(crate) fn set(ctx: Arc<RuntimeCtx>) -> Self {
        let prev = CURRENT_RUNTIME.with(|cell| cell.replace(Some(ctx)));
        Self { prev }
    }
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        CURRENT_RUNTIME.with(|cell| cell.replace(self.prev.take()));
    }
}

/// Restores the current namespace when dropped, so loaders and `eval` never
/// leak a namespace switch into their caller.
pub(crate) struct NamespaceRestore<'a> {
    ctx: &'a RuntimeCtx,
    saved: String,
}

impl Drop for NamespaceRestore<'_> {
    fn drop(&mut self) {
        self.ctx.switch_ns(&self.saved);
    }
}

/// State of one interpreter: namespaces, dynamic var declarations, module
/// registry and host classes. Nothing here is shared between instances.
pub struct RuntimeCtx {
    runtime_id: usize,
    options: VeniceOptions,
    namespaces: RwLock<NamespaceStore>,
    dynamic_names: RwLock<HashSet<String>>,
    modules: ModuleRegistry,
    hosts: HostRegistry,
    current_file: Mutex<Option<String>>,
    expansions: Mutex<HashMap<usize, CallSiteExpansion>>,
    self_ref: Weak<RuntimeCtx>,
}

/// Expansion of a macro call that the load-time pre-pass could not see.
/// Holding `site` keeps the list alive, so its address stays a valid key.
struct CallSiteExpansion {
    site: Arc<[Form]>,
    macro_fn: Arc<Lambda>,
    expanded: Form,
}

fn site_key(site: &Arc<[Form]>) -> usize {
    Arc::as_ptr(site) as *const Form as usize
}

impl RuntimeCtx {
    pub fn try_with_current<F, R>(f: F) -> Option<Result<R, VncError>>
    where
        F: FnOnce(Arc<RuntimeCtx>) -> Result<R, VncError>,
    {
        CURRENT_RUNTIME.with(|cell| cell.borrow().clone()).map(f)
    }

    pub fn with_current<F, R>(f: F) -> Result<R, VncError>
    where
        F: FnOnce(Arc<RuntimeCtx>) -> Result<R, VncError>,
    {
        Self::try_with_current(f)
            .unwrap_or_else(|| Err(VncError::runtime("runtime context is not available")))
    }

    pub(crate) fn current_handle() -> Option<Arc<RuntimeCtx>> {
        CURRENT_RUNTIME.with(|cell| cell.borrow().clone())
    }

    pub fn new(options: VeniceOptions) -> Result<Arc<Self>, VncError> {
        let runtime_id = NEXT_RUNTIME_ID.fetch_add(1, Ordering::SeqCst);
        let core_env = new_ref(Env::core());
        let modules = ModuleRegistry::new(&options);
        let ctx = Arc::new_cyclic(|weak: &Weak<RuntimeCtx>| RuntimeCtx {
            runtime_id,
            options,
            namespaces: RwLock::new(NamespaceStore::new(core_env.clone())),
            dynamic_names: RwLock::new(
                BUILTIN_DYNAMIC_VARS.iter().map(|s| s.to_string()).collect(),
            ),
            modules,
            hosts: HostRegistry::new(),
            current_file: Mutex::new(None),
            expansions: Mutex::new(HashMap::new()),
            self_ref: weak.clone(),
        });
        host_classes::install(&ctx.hosts, &ctx.options);
        builtins::install(&mut env::write(&core_env), &ctx.options);
        ctx.with_current_ctx(|ctx| -> Result<(), VncError> {
            ctx.switch_ns(CORE_NS);
            let loaded = ctx.eval_source(CORE_PRELUDE, Some("core.venice"));
            ctx.switch_ns(USER_NS);
            loaded.map(|_| ())
        })?;
        tracing::debug!(runtime_id, "interpreter ready");
        Ok(ctx)
    }

    pub fn with_current_ctx<F, R>(self: &Arc<Self>, f: F) -> R
    where
        F: FnOnce(Arc<RuntimeCtx>) -> R,
    {
        let _guard = RuntimeGuard::set(self.clone());
        f(self.clone())
    }

    pub fn id(&self) -> usize {
        self.runtime_id
    }

    pub fn options(&self) -> &VeniceOptions {
        &self.options
    }

    pub fn hosts(&self) -> &HostRegistry {
        &self.hosts
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn handle(&self) -> Option<Arc<RuntimeCtx>> {
        self.self_ref.upgrade()
    }

    fn ns_read(&self) -> RwLockReadGuard<'_, NamespaceStore> {
        self.namespaces.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn ns_write(&self) -> RwLockWriteGuard<'_, NamespaceStore> {
        self.namespaces.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn file_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.current_file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads and evaluates `src` form by form in the current namespace.
    /// Namespace switches made by the source stay in effect.
    pub fn eval_source(&self, src: &str, name: Option<&str>) -> Result<Value, VncError> {
        let forms = Reader::new(src)
            .with_source_name(name.map(str::to_string))
            .read_all()
            .map_err(|err| err.with_file(name.map(str::to_string)))?;
        let previous_file = std::mem::replace(&mut *self.file_slot(), name.map(str::to_string));
        let result = self.eval_forms(&forms);
        *self.file_slot() = previous_file;
        result
    }

    pub fn eval_forms(&self, forms: &[Form]) -> Result<Value, VncError> {
        let mut last = Value::Nil;
        for form in forms {
            last = self.eval_form(form)?;
        }
        Ok(last)
    }

    /// Evaluates one top-level form: macro pre-pass, then evaluation in the
    /// namespace that is current when the form starts.
    pub fn eval_form(&self, form: &Form) -> Result<Value, VncError> {
        let env = self.current_env();
        let expanded = if self.options.macroexpand_on_load {
            macros::expand_all(self, form, &env)?
        } else {
            form.clone()
        };
        Evaluator::new(self).eval(&expanded, &env)
    }

    pub fn current_file(&self) -> Option<String> {
        self.file_slot().clone()
    }

    pub fn current_ns_name(&self) -> String {
        self.ns_read().current_name().to_string()
    }

    pub fn current_env(&self) -> EnvRef {
        self.ns_read().current_env()
    }

    pub fn core_env(&self) -> EnvRef {
        self.ns_read().core_env()
    }

    pub fn switch_ns(&self, name: &str) -> EnvRef {
        self.ns_write().switch_to(name)
    }

    pub(crate) fn preserve_ns(&self) -> NamespaceRestore<'_> {
        NamespaceRestore {
            ctx: self,
            saved: self.current_ns_name(),
        }
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.ns_read().names()
    }

    pub fn add_alias(&self, alias: &str, target: &str) {
        self.ns_write().current_mut().add_alias(alias, target);
    }

    pub fn lookup_qualified(&self, ns: &str, name: &str) -> Option<Value> {
        self.ns_read().lookup_qualified(ns, name)
    }

    /// Binds `name` in the current namespace and returns `ns/name`.
    pub fn define(&self, name: &str, value: Value) -> String {
        let (ns_name, env) = {
            let store = self.ns_read();
            (store.current_name().to_string(), store.current_env())
        };
        env::write(&env).set(name, value);
        format!("{}/{}", ns_name, name)
    }

    /// Expansion cached for this call site, provided the head still names the
    /// same macro.
    pub(crate) fn cached_expansion(&self, site: &Arc<[Form]>, macro_fn: &Arc<Lambda>) -> Option<Form> {
        let cache = self.expansions.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(&site_key(site))
            .filter(|entry| Arc::ptr_eq(&entry.site, site) && Arc::ptr_eq(&entry.macro_fn, macro_fn))
            .map(|entry| entry.expanded.clone())
    }

    pub(crate) fn cache_expansion(&self, site: &Arc<[Form]>, macro_fn: &Arc<Lambda>, expanded: Form) {
        self.expansions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                site_key(site),
                CallSiteExpansion {
                    site: site.clone(),
                    macro_fn: macro_fn.clone(),
                    expanded,
                },
            );
    }

    /// Returns false when `name` was already dynamic.
    pub fn declare_dynamic(&self, name: &str) -> bool {
        self.dynamic_names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string())
    }

    pub fn retract_dynamic(&self, name: &str) {
        self.dynamic_names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    pub fn is_dynamic(&self, name: &str) -> bool {
        self.dynamic_names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    /// `set!`: innermost thread binding first, otherwise the root value.
    pub fn set_dynamic(&self, name: &str, value: Value) -> Result<(), VncError> {
        if !self.is_dynamic(name) {
            return Err(VncError::runtime(format!(
                "Cannot set! '{}': not a dynamic var",
                name
            )));
        }
        if dynamic_vars::set_innermost(name, value.clone()) {
            return Ok(());
        }
        if env::write(&self.current_env()).set_existing(name, value) {
            Ok(())
        } else {
            Err(VncError::unbound_symbol(name))
        }
    }

    /// Root value of a dynamic var, as seen without thread bindings.
    pub fn dynamic_value(&self, name: &str) -> Option<Value> {
        dynamic_vars::current_binding(name).or_else(|| env::read(&self.current_env()).get(name))
    }

    pub fn import_class(&self, name: &str) -> Result<(), VncError> {
        let full = self.resolve_class_name(name)?;
        tracing::trace!(class = full.as_str(), "import");
        self.ns_write().current_mut().add_import(&full);
        Ok(())
    }

    /// Full name of a registered class: exact, imported short name, or
    /// implicit `java.lang.` package.
    pub fn resolve_class_name(&self, name: &str) -> Result<String, VncError> {
        let name = name.trim_start_matches(':');
        if let Some(full) = self.hosts.resolve(name) {
            return Ok(full);
        }
        if let Some(imported) = self.ns_read().resolve_class(name) {
            return Ok(imported);
        }
        Err(VncError::runtime(format!(
            "Class '{}' is not registered for host interop",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instances_do_not_share_namespaces() {
        let a = RuntimeCtx::new(VeniceOptions::default()).unwrap();
        let b = RuntimeCtx::new(VeniceOptions::default()).unwrap();
        a.with_current_ctx(|ctx| ctx.eval_source("(def x 1)", None)).unwrap();
        let missing = b.with_current_ctx(|ctx| ctx.eval_source("x", None));
        assert!(matches!(missing, Err(VncError::UnboundSymbol(_))));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn define_returns_qualified_name() {
        let ctx = RuntimeCtx::new(VeniceOptions::default()).unwrap();
        assert_eq!(ctx.define("answer", Value::Long(42)), "user/answer");
        assert_eq!(ctx.lookup_qualified("user", "answer"), Some(Value::Long(42)));
    }
}
