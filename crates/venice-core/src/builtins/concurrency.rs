use crate::ast::{FnArity, Value};
use crate::builtins::{def_builtin, err};
use crate::concurrency::AtomHandle;
use crate::env::Env;
use crate::error::VncError;

fn expect_atom<'a>(value: &'a Value, op: &str) -> Result<&'a AtomHandle, VncError> {
    match value {
        Value::Atom(handle) => Ok(handle),
        other => Err(VncError::type_mismatch(
            format!("atom for '{}'", op),
            other.type_name(),
        )),
    }
}

fn validator_arg(value: &Value) -> Result<Option<Value>, VncError> {
    match value {
        Value::Nil => Ok(None),
        f if f.is_callable() || matches!(f, Value::Host(obj) if obj.is_functional()) => {
            Ok(Some(f.clone()))
        }
        other => Err(VncError::type_mismatch("validator function", other.type_name())),
    }
}

pub(crate) fn install(env: &mut Env) {
    def_builtin!(env, "atom", FnArity::at_least(1), |args| {
        let mut validator = None;
        for option in args[1..].chunks(2) {
            match option {
                [Value::Keyword(k), f] if &**k == "validator" => validator = validator_arg(f)?,
                [Value::Keyword(k), _] if &**k == "meta" => {}
                _ => return err("atom options must be :validator or :meta key/value pairs"),
            }
        }
        Ok(Value::Atom(AtomHandle::with_validator(args[0].clone(), validator)?))
    });
    def_builtin!(env, "deref", FnArity::exact(1), |args| {
        match &args[0] {
            Value::Atom(handle) => Ok(handle.deref()),
            other => Err(VncError::type_mismatch("atom", other.type_name())),
        }
    });
    def_builtin!(env, "reset!", FnArity::exact(2), |args| {
        expect_atom(&args[0], "reset!")?.set(args[1].clone())
    });
    def_builtin!(env, "swap!", FnArity::at_least(2), |args| {
        expect_atom(&args[0], "swap!")?.update_with_callable(args[1].clone(), args[2..].to_vec())
    });
    def_builtin!(env, "compare-and-set!", FnArity::exact(3), |args| {
        let swapped = expect_atom(&args[0], "compare-and-set!")?.compare_and_set(&args[1], args[2].clone())?;
        Ok(Value::Bool(swapped))
    });
    def_builtin!(env, "add-watch", FnArity::exact(3), |args| {
        expect_atom(&args[0], "add-watch")?.add_watch(args[1].clone(), args[2].clone());
        Ok(args[0].clone())
    });
    def_builtin!(env, "remove-watch", FnArity::exact(2), |args| {
        expect_atom(&args[0], "remove-watch")?.remove_watch(&args[1]);
        Ok(args[0].clone())
    });
    def_builtin!(env, "set-validator!", FnArity::exact(2), |args| {
        expect_atom(&args[0], "set-validator!")?.set_validator(validator_arg(&args[1])?)?;
        Ok(Value::Nil)
    });
    def_builtin!(env, "get-validator", FnArity::exact(1), |args| {
        Ok(expect_atom(&args[0], "get-validator")?.validator().unwrap_or(Value::Nil))
    });
}
