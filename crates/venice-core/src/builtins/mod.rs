use crate::ast::{FnArity, Value};
use crate::env::Env;
use crate::error::VncError;
use crate::options::VeniceOptions;
use crate::runtime::RuntimeCtx;

mod concurrency;
mod core;
mod interop;
mod io;
mod loading;
mod math;
mod seq;
mod string;

#[macro_export]
macro_rules! def_builtin {
    ($env:expr, $name:expr, $arity:expr, |$args:ident| $body:block) => {
        $env.define_builtin(
            $name,
            $crate::ast::Value::native_fn_with_name($name, $arity, move |$args: &[$crate::ast::Value]| -> Result<$crate::ast::Value, $crate::error::VncError> {
                $body
            }),
        );
    };
    ($env:expr, $name:expr, $arity:expr, |$args:ident| $body:expr) => {
        $env.define_builtin(
            $name,
            $crate::ast::Value::native_fn_with_name($name, $arity, move |$args: &[$crate::ast::Value]| -> Result<$crate::ast::Value, $crate::error::VncError> {
                $body
            }),
        );
    };
}

pub use def_builtin;

/// Installs every native function and the root values of the built-in
/// dynamic vars into the core frame.
pub fn install(env: &mut Env, options: &VeniceOptions) {
    core::install(env);
    math::install(env);
    seq::install(env);
    string::install(env);
    concurrency::install(env);
    io::install(env, options);
    interop::install(env);
    loading::install(env);
}

pub fn err<T>(msg: impl Into<String>) -> Result<T, VncError> {
    Err(VncError::runtime(msg))
}

pub(crate) fn arity(min: usize, max: usize) -> FnArity {
    FnArity::range(min, max)
}

pub(crate) fn expect_str<'a>(value: &'a Value, op: &str) -> Result<&'a str, VncError> {
    value
        .as_str()
        .ok_or_else(|| VncError::type_mismatch(format!("string for '{}'", op), value.type_name()))
}

pub(crate) fn expect_name<'a>(value: &'a Value, op: &str) -> Result<&'a str, VncError> {
    value.as_name().ok_or_else(|| {
        VncError::type_mismatch(format!("string, keyword or symbol for '{}'", op), value.type_name())
    })
}

pub(crate) fn expect_long(value: &Value, op: &str) -> Result<i64, VncError> {
    match value {
        Value::Long(n) => Ok(*n),
        other => Err(VncError::type_mismatch(format!("long for '{}'", op), other.type_name())),
    }
}

/// Current interpreter; natives that evaluate code or consult namespaces
/// need it.
pub(crate) fn with_ctx<R>(
    f: impl FnOnce(std::sync::Arc<RuntimeCtx>) -> Result<R, VncError>,
) -> Result<R, VncError> {
    RuntimeCtx::with_current(f)
}
