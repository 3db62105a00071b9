pub mod adapters;
pub mod app_bundle;
pub mod ast;
pub mod builtins;
pub mod collections;
pub mod concurrency;
pub mod destructure;
pub mod dynamic_vars;
pub mod env;
pub mod error;
pub mod eval;
pub mod exception;
pub mod form_value;
pub mod host_classes;
pub mod host_value;
pub mod interop;
pub mod macros;
pub mod modules;
pub mod namespaces;
pub mod number;
pub mod options;
pub mod reader;
pub mod runtime;
mod short_fn;
pub mod try_form;
pub mod value_format;

use std::sync::Arc;

pub use app_bundle::{AppBundle, AppManifest, AppRunner};
pub use ast::Value;
pub use error::{format_error, VncError};
pub use host_value::{HostValue, Parameters};
pub use interop::{HostClass, HostObject, HostRegistry};
pub use options::{OutputBuffer, VeniceOptions};
pub use runtime::RuntimeCtx;

use modules::ScriptSource;

/// An embedded interpreter. Instances share nothing: each has its own
/// namespaces, loaded modules and host class registry.
pub struct Venice {
    ctx: Arc<RuntimeCtx>,
}

impl Venice {
    pub fn new() -> Result<Self, VncError> {
        Self::with_options(VeniceOptions::default())
    }

    pub fn with_options(options: VeniceOptions) -> Result<Self, VncError> {
        Ok(Self {
            ctx: RuntimeCtx::new(options)?,
        })
    }

    /// Evaluates `script` and converts the value of its last form.
    pub fn eval(&self, script: &str) -> Result<HostValue, VncError> {
        self.eval_named("script", script, &Parameters::new())
    }

    /// Like [`Venice::eval`]; each parameter is visible to the script as a
    /// dynamic var for the duration of the call.
    pub fn eval_with(&self, script: &str, params: &Parameters) -> Result<HostValue, VncError> {
        self.eval_named("script", script, params)
    }

    /// Evaluates on a worker thread sized by `stack_size`, so deep non-tail
    /// recursion is bounded by `max_call_depth` rather than the caller's
    /// stack. Namespace switches made by the script do not outlive the call.
    pub fn eval_named(
        &self,
        name: &str,
        script: &str,
        params: &Parameters,
    ) -> Result<HostValue, VncError> {
        let stack_size = self.ctx.options().stack_size;
        let ctx = self.ctx.clone();
        std::thread::scope(|scope| {
            let worker = std::thread::Builder::new()
                .name("venice-eval".to_string())
                .stack_size(stack_size)
                .spawn_scoped(scope, move || {
                    ctx.with_current_ctx(|ctx| run_script(&ctx, name, script, params))
                })?;
            worker
                .join()
                .unwrap_or_else(|_| Err(VncError::runtime("evaluation thread panicked")))
        })
    }

    /// Registers the host class with this interpreter only.
    pub fn registry(&self) -> &HostRegistry {
        self.ctx.hosts()
    }

    /// Scripts in `source` shadow files with the same path on disk.
    pub fn add_script_source(&self, source: Arc<dyn ScriptSource>) {
        self.ctx.modules().add_source(source);
    }

    pub fn runtime(&self) -> &Arc<RuntimeCtx> {
        &self.ctx
    }
}

fn run_script(
    ctx: &RuntimeCtx,
    name: &str,
    script: &str,
    params: &Parameters,
) -> Result<HostValue, VncError> {
    let mut declared = ParamVars {
        ctx,
        names: Vec::new(),
    };
    let bindings: Vec<(String, Value)> = params
        .iter()
        .map(|(key, value)| {
            if ctx.declare_dynamic(key) {
                declared.names.push(key.clone());
            }
            (key.clone(), value.to_value())
        })
        .collect();
    let _bound = dynamic_vars::push_bindings(&bindings);
    let _restore = ctx.preserve_ns();
    tracing::debug!(script = name, params = bindings.len(), "eval");
    let value = ctx.eval_source(script, Some(name))?;
    Ok(HostValue::from_value(&value))
}

/// Parameter names that only became dynamic for one `eval` call.
struct ParamVars<'a> {
    ctx: &'a RuntimeCtx,
    names: Vec<String>,
}

impl Drop for ParamVars<'_> {
    fn drop(&mut self) {
        for name in &self.names {
            self.ctx.retract_dynamic(name);
        }
    }
}
