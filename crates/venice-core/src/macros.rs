use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::ast::{Form, FormKind, Lambda, Span, Value};
use crate::env::EnvRef;
use crate::error::VncError;
use crate::eval::Evaluator;
use crate::form_value::{form_to_value, value_to_form};
use crate::runtime::RuntimeCtx;

/// Upper bound on consecutive expansions of one form.
const MAX_EXPANSIONS: usize = 10_000;

static GENSYM_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// Process-wide unique symbol name.
pub fn gensym(prefix: &str) -> String {
    let id = GENSYM_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}__{}__auto__", prefix, id)
}

/// Calls a macro with its unevaluated argument forms and turns the result
/// back into code.
pub fn call_macro(
    ctx: &RuntimeCtx,
    lambda: &Arc<Lambda>,
    args: &[Form],
    span: Span,
) -> Result<Form, VncError> {
    let values: Vec<Value> = args.iter().map(form_to_value).collect();
    tracing::trace!(name = lambda.display_name().as_str(), "expand macro");
    let expanded = Evaluator::new(ctx).apply_lambda(lambda, values)?;
    Ok(value_to_form(&expanded, span))
}

/// Expands `form` once if its head names a macro.
pub fn expand_1(ctx: &RuntimeCtx, form: &Form, env: &EnvRef) -> Result<Option<Form>, VncError> {
    let Some(items) = form.as_list() else {
        return Ok(None);
    };
    let Some(name) = items.first().and_then(|head| head.as_symbol()) else {
        return Ok(None);
    };
    match Evaluator::new(ctx).lookup_macro(name, env) {
        Some(lambda) => call_macro(ctx, &lambda, &items[1..], form.span)
            .map(Some)
            .map_err(|err| err.with_span(form.span)),
        None => Ok(None),
    }
}

/// Re-expands until the head is no longer a macro.
pub fn expand(ctx: &RuntimeCtx, form: &Form, env: &EnvRef) -> Result<Form, VncError> {
    let mut current = form.clone();
    for _ in 0..MAX_EXPANSIONS {
        match expand_1(ctx, &current, env)? {
            Some(next) => current = next,
            None => return Ok(current),
        }
    }
    Err(VncError::runtime(format!(
        "Macro expansion did not terminate after {} steps",
        MAX_EXPANSIONS
    ))
    .with_span(form.span))
}

/// Outermost-first expansion of a whole form tree. Quoted data is left
/// alone; macros the tree defines itself are expanded later by the
/// evaluator.
pub fn expand_all(ctx: &RuntimeCtx, form: &Form, env: &EnvRef) -> Result<Form, VncError> {
    let expanded = expand(ctx, form, env)?;
    let kind = match &expanded.kind {
        FormKind::List(items) => {
            if matches!(expanded.head_symbol(), Some("quote" | "quasiquote")) {
                return Ok(expanded);
            }
            FormKind::List(expand_each(ctx, items, env)?)
        }
        FormKind::Vector(items) => FormKind::Vector(expand_each(ctx, items, env)?),
        FormKind::Set(items) => FormKind::Set(expand_each(ctx, items, env)?),
        FormKind::Map(entries) => FormKind::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((expand_all(ctx, k, env)?, expand_all(ctx, v, env)?)))
                .collect::<Result<Arc<[(Form, Form)]>, VncError>>()?,
        ),
        _ => return Ok(expanded),
    };
    Ok(Form::new(kind, expanded.span).with_meta(expanded.meta.clone()))
}

fn expand_each(ctx: &RuntimeCtx, items: &[Form], env: &EnvRef) -> Result<Arc<[Form]>, VncError> {
    items.iter().map(|item| expand_all(ctx, item, env)).collect()
}

/// Value-level entry points backing `macroexpand-1`, `macroexpand` and
/// `macroexpand-all`.
pub fn expand_value(
    ctx: &RuntimeCtx,
    value: &Value,
    mode: ExpandMode,
) -> Result<Value, VncError> {
    let form = value_to_form(value, Span::default());
    let env = ctx.current_env();
    let result = match mode {
        ExpandMode::Once => expand_1(ctx, &form, &env)?.unwrap_or(form),
        ExpandMode::Head => expand(ctx, &form, &env)?,
        ExpandMode::All => expand_all(ctx, &form, &env)?,
    };
    Ok(form_to_value(&result))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpandMode {
    Once,
    Head,
    All,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gensyms_are_unique() {
        let a = gensym("x");
        let b = gensym("x");
        assert_ne!(a, b);
        assert!(a.starts_with("x__"));
    }
}
