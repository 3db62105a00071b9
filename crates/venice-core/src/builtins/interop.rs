use crate::adapters::{adapt, FunctionalInterface};
use crate::ast::{FnArity, Value};
use crate::builtins::{def_builtin, expect_name, with_ctx};
use crate::env::Env;
use crate::interop::{class_of, instance_of};

pub(crate) fn install(env: &mut Env) {
    for interface in FunctionalInterface::ADAPTABLE.iter().copied() {
        let name = interface.adapter_name();
        def_builtin!(env, &name, FnArity::exact(1), |args| {
            let func = args[0].clone();
            with_ctx(move |ctx| adapt(&ctx, interface, func))
        });
    }

    def_builtin!(env, "instance-of?", FnArity::exact(2), |args| {
        let class = expect_name(&args[0], "instance-of?")?.to_string();
        let value = args[1].clone();
        with_ctx(move |ctx| {
            let full = ctx.resolve_class_name(&class).unwrap_or(class);
            Ok(Value::Bool(instance_of(&ctx, &full, &value)))
        })
    });
    def_builtin!(env, "class", FnArity::exact(1), |args| Ok(class_of(&args[0])));
    def_builtin!(env, "host-classes", FnArity::exact(0), |_args| {
        with_ctx(|ctx| {
            let mut names = ctx.hosts().class_names();
            names.sort();
            Ok(Value::list(names.into_iter().map(Value::keyword)))
        })
    });
}
