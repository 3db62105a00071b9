use std::sync::{Arc, Weak};

use crate::ast::Value;
use crate::error::VncError;
use crate::eval::call_callable;
use crate::host_value::HostValue;
use crate::interop::{HostData, HostObject};
use crate::runtime::RuntimeCtx;

/// Host-side view of a script function: a synchronous call with marshalled
/// arguments. Safe to invoke from any thread.
pub trait HostCallable: Send + Sync {
    fn invoke(&self, args: &[HostValue]) -> Result<HostValue, VncError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ResultShape {
    Void,
    Value,
    Bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionalInterface {
    Runnable,
    Callable,
    Supplier,
    Consumer,
    BiConsumer,
    Function,
    BiFunction,
    UnaryOperator,
    BinaryOperator,
    Predicate,
    BiPredicate,
    /// A script function handed out to the embedder as is.
    ScriptFunction,
}

impl FunctionalInterface {
    pub const ADAPTABLE: &'static [FunctionalInterface] = &[
        FunctionalInterface::Runnable,
        FunctionalInterface::Callable,
        FunctionalInterface::Supplier,
        FunctionalInterface::Consumer,
        FunctionalInterface::BiConsumer,
        FunctionalInterface::Function,
        FunctionalInterface::BiFunction,
        FunctionalInterface::UnaryOperator,
        FunctionalInterface::BinaryOperator,
        FunctionalInterface::Predicate,
        FunctionalInterface::BiPredicate,
    ];

    pub fn class_name(self) -> &'static str {
        match self {
            FunctionalInterface::Runnable => "java.lang.Runnable",
            FunctionalInterface::Callable => "java.util.concurrent.Callable",
            FunctionalInterface::Supplier => "java.util.function.Supplier",
            FunctionalInterface::Consumer => "java.util.function.Consumer",
            FunctionalInterface::BiConsumer => "java.util.function.BiConsumer",
            FunctionalInterface::Function => "java.util.function.Function",
            FunctionalInterface::BiFunction => "java.util.function.BiFunction",
            FunctionalInterface::UnaryOperator => "java.util.function.UnaryOperator",
            FunctionalInterface::BinaryOperator => "java.util.function.BinaryOperator",
            FunctionalInterface::Predicate => "java.util.function.Predicate",
            FunctionalInterface::BiPredicate => "java.util.function.BiPredicate",
            FunctionalInterface::ScriptFunction => "venice.Function",
        }
    }

    /// Name of the single abstract method, e.g. `apply`.
    pub fn method(self) -> &'static str {
        match self {
            FunctionalInterface::Runnable => "run",
            FunctionalInterface::Callable => "call",
            FunctionalInterface::Supplier => "get",
            FunctionalInterface::Consumer | FunctionalInterface::BiConsumer => "accept",
            FunctionalInterface::Function
            | FunctionalInterface::BiFunction
            | FunctionalInterface::UnaryOperator
            | FunctionalInterface::BinaryOperator => "apply",
            FunctionalInterface::Predicate | FunctionalInterface::BiPredicate => "test",
            FunctionalInterface::ScriptFunction => "invoke",
        }
    }

    /// Builtin that wraps a function into this interface.
    pub fn adapter_name(self) -> String {
        let short = self.class_name().rsplit('.').next().unwrap_or_default();
        format!("as-{}", short.to_ascii_lowercase())
    }

    pub fn arg_count(self) -> Option<usize> {
        match self {
            FunctionalInterface::Runnable
            | FunctionalInterface::Callable
            | FunctionalInterface::Supplier => Some(0),
            FunctionalInterface::Consumer
            | FunctionalInterface::Function
            | FunctionalInterface::UnaryOperator
            | FunctionalInterface::Predicate => Some(1),
            FunctionalInterface::BiConsumer
            | FunctionalInterface::BiFunction
            | FunctionalInterface::BinaryOperator
            | FunctionalInterface::BiPredicate => Some(2),
            FunctionalInterface::ScriptFunction => None,
        }
    }

    fn result_shape(self) -> ResultShape {
        match self {
            FunctionalInterface::Runnable
            | FunctionalInterface::Consumer
            | FunctionalInterface::BiConsumer => ResultShape::Void,
            FunctionalInterface::Predicate | FunctionalInterface::BiPredicate => ResultShape::Bool,
            _ => ResultShape::Value,
        }
    }
}

/// A script function wrapped as a host functional object. Holds the
/// interpreter weakly so a stored adapter does not keep it alive.
pub struct FunctionalAdapter {
    interface: FunctionalInterface,
    func: Value,
    ctx: Weak<RuntimeCtx>,
}

impl FunctionalAdapter {
    pub fn interface(&self) -> FunctionalInterface {
        self.interface
    }

    pub fn function(&self) -> &Value {
        &self.func
    }

    /// Runs the wrapped function on the calling thread, binding the
    /// interpreter to it for the duration of the call.
    pub fn call_values(&self, args: &[Value]) -> Result<Value, VncError> {
        if let Some(expected) = self.interface.arg_count() {
            if args.len() != expected {
                return Err(VncError::arity(format!(
                    "{}.{} expects {} argument(s), got {}",
                    self.interface.class_name(),
                    self.interface.method(),
                    expected,
                    args.len()
                )));
            }
        }
        let ctx = self.ctx.upgrade().ok_or_else(|| {
            VncError::illegal_state("The interpreter owning this function has been dropped")
        })?;
        let result = ctx.with_current_ctx(|_| call_callable(&self.func, args))?;
        Ok(match self.interface.result_shape() {
            ResultShape::Void => Value::Nil,
            ResultShape::Bool => Value::Bool(result.is_truthy()),
            ResultShape::Value => result,
        })
    }
}

impl HostData for FunctionalAdapter {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn display(&self) -> Option<String> {
        Some(format!(
            "{} wrapping {}",
            self.interface.class_name(),
            self.func.pr_str()
        ))
    }

    fn as_functional(&self) -> Option<&FunctionalAdapter> {
        Some(self)
    }
}

impl HostCallable for FunctionalAdapter {
    fn invoke(&self, args: &[HostValue]) -> Result<HostValue, VncError> {
        let values: Vec<Value> = args.iter().map(HostValue::to_value).collect();
        let result = self.call_values(&values)?;
        let ctx = self.ctx.upgrade();
        Ok(match ctx {
            Some(ctx) => ctx.with_current_ctx(|_| HostValue::from_value(&result)),
            None => HostValue::from_value(&result),
        })
    }
}

/// Wraps `func` as a host object implementing `interface`.
pub fn adapt(
    ctx: &Arc<RuntimeCtx>,
    interface: FunctionalInterface,
    func: Value,
) -> Result<Value, VncError> {
    if !func.is_callable() && !matches!(&func, Value::Host(obj) if obj.is_functional()) {
        return Err(VncError::type_mismatch("function", func.type_name()));
    }
    tracing::trace!(interface = interface.class_name(), "adapt function");
    Ok(Value::Host(HostObject::new(
        interface.class_name(),
        FunctionalAdapter {
            interface,
            func,
            ctx: Arc::downgrade(ctx),
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_names_follow_interface_names() {
        let names: Vec<String> = FunctionalInterface::ADAPTABLE
            .iter()
            .map(|i| i.adapter_name())
            .collect();
        assert!(names.contains(&"as-runnable".to_string()));
        assert!(names.contains(&"as-bipredicate".to_string()));
        assert!(names.contains(&"as-unaryoperator".to_string()));
        assert_eq!(names.len(), 11);
    }

    #[test]
    fn interfaces_know_their_shapes() {
        assert_eq!(FunctionalInterface::BiFunction.arg_count(), Some(2));
        assert_eq!(FunctionalInterface::Predicate.method(), "test");
        assert_eq!(FunctionalInterface::Runnable.result_shape(), ResultShape::Void);
    }
}
