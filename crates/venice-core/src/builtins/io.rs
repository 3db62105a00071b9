use crate::ast::{FnArity, Value};
use crate::builtins::{def_builtin, with_ctx};
use crate::env::Env;
use crate::error::VncError;
use crate::host_classes::{buffered_reader, flush_sink, print_stream, read_line, write_text};
use crate::options::VeniceOptions;

fn current_stream(name: &str) -> Result<Value, VncError> {
    with_ctx(|ctx| Ok(ctx.dynamic_value(name).unwrap_or(Value::Nil)))
}

fn emit(text: &str) -> Result<Value, VncError> {
    write_text(&current_stream("*out*")?, text)?;
    Ok(Value::Nil)
}

fn joined(args: &[Value], readable: bool) -> String {
    args.iter()
        .map(|v| if readable { v.pr_str() } else { v.to_str_text() })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn install(env: &mut Env, options: &VeniceOptions) {
    env.define_builtin("*out*", print_stream(options.stdout.clone()));
    env.define_builtin("*err*", print_stream(options.stderr.clone()));
    env.define_builtin("*in*", buffered_reader(options.stdin.clone()));
    env.define_builtin("*ARGV*", Value::Nil);

    def_builtin!(env, "print", FnArity::at_least(0), |args| emit(&joined(args, false)));
    def_builtin!(env, "println", FnArity::at_least(0), |args| {
        emit(&format!("{}\n", joined(args, false)))
    });
    def_builtin!(env, "pr", FnArity::at_least(0), |args| emit(&joined(args, true)));
    def_builtin!(env, "prn", FnArity::at_least(0), |args| {
        emit(&format!("{}\n", joined(args, true)))
    });
    def_builtin!(env, "newline", FnArity::exact(0), |_args| emit("\n"));
    def_builtin!(env, "flush", FnArity::range(0, 1), |args| {
        let sink = match args.first() {
            Some(stream) => stream.clone(),
            None => current_stream("*out*")?,
        };
        flush_sink(&sink)?;
        Ok(Value::Nil)
    });
    def_builtin!(env, "read-line", FnArity::exact(0), |_args| {
        read_line(&current_stream("*in*")?)
    });
}
