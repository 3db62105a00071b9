use crate::ast::{FnArity, Value};
use crate::builtins::{arity, def_builtin, err, expect_name, expect_str, with_ctx};
use crate::env::Env;
use crate::error::VncError;

/// Alias spec `['name :as 'alias]` of `load-module`.
fn parse_alias(spec: &Value, module: &str) -> Result<(String, String), VncError> {
    let items = spec
        .sequential_items()
        .ok_or_else(|| VncError::type_mismatch("alias vector ['ns :as 'alias]", spec.type_name()))?;
    match (items.get(0), items.get(1), items.get(2), items.len()) {
        (Some(target), Some(Value::Keyword(kw)), Some(alias), 3) if &**kw == "as" => Ok((
            expect_name(target, "load-module")?.to_string(),
            expect_name(alias, "load-module")?.to_string(),
        )),
        _ => err(format!(
            "load-module {}: alias must be written as ['{} :as 'alias]",
            module, module
        )),
    }
}

pub(crate) fn install(env: &mut Env) {
    def_builtin!(env, "load-module", arity(1, 2), |args| {
        let name = expect_name(&args[0], "load-module")?.to_string();
        let alias = match args.get(1) {
            Some(spec) => Some(parse_alias(spec, &name)?),
            None => None,
        };
        with_ctx(move |ctx| {
            let status = ctx.modules().load_module(&ctx, &name)?;
            if let Some((target, alias)) = alias {
                ctx.add_alias(&alias, &target);
            }
            Ok(Value::vector(vec![Value::keyword(&name), status.keyword()]))
        })
    });
    def_builtin!(env, "load-file", arity(1, 2), |args| {
        let path = expect_str(&args[0], "load-file")?.to_string();
        let force = args.get(1).map(Value::is_truthy).unwrap_or(false);
        with_ctx(move |ctx| {
            let status = ctx.modules().load_file(&ctx, &path, force)?;
            Ok(Value::vector(vec![Value::string(&path), status.keyword()]))
        })
    });
    def_builtin!(env, "load-string", FnArity::exact(1), |args| {
        let code = expect_str(&args[0], "load-string")?.to_string();
        with_ctx(move |ctx| ctx.eval_source(&code, Some("load-string")))
    });
    def_builtin!(env, "loaded-modules", FnArity::exact(0), |_args| {
        with_ctx(|ctx| {
            Ok(Value::list(
                ctx.modules().loaded_modules().into_iter().map(Value::keyword),
            ))
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_vector_shape() {
        let spec = Value::vector(vec![
            Value::symbol("ansi"),
            Value::keyword("as"),
            Value::symbol("a"),
        ]);
        assert_eq!(
            parse_alias(&spec, "ansi").unwrap(),
            ("ansi".to_string(), "a".to_string())
        );
        assert!(parse_alias(&Value::vector(vec![Value::symbol("ansi")]), "ansi").is_err());
    }
}
