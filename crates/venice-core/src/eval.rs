use std::cell::{Cell, RefCell};
use std::collections::HashMap as StdHashMap;
use std::sync::Arc;

use im::{HashMap, HashSet};

use crate::ast::{FnClause, Form, FormKind, Lambda, Span, Value};
use crate::collections::{get, index_arg, seq_items};
use crate::destructure::bind_pattern;
use crate::dynamic_vars;
use crate::env::{self, child_of, EnvRef};
use crate::error::{StackFrame, VncError};
use crate::exception::ExceptionData;
use crate::form_value::form_to_value;
use crate::interop;
use crate::macros;
use crate::namespaces::split_qualified;
use crate::runtime::RuntimeCtx;
use crate::try_form::parse_try;

pub const SPECIAL_FORMS: &[&str] = &[
    "def",
    "def-dynamic",
    "defmacro",
    "if",
    "do",
    "let",
    "fn",
    "loop",
    "recur",
    "quote",
    "quasiquote",
    "try",
    "throw",
    "set!",
    "binding",
    "ns",
    "import",
    ".",
];

pub fn is_special_form(name: &str) -> bool {
    SPECIAL_FORMS.contains(&name)
}

thread_local! {
    static CALL_STACK: RefCell<Vec<StackFrame>> = RefCell::new(Vec::new());
    static CALL_DEPTH: Cell<usize> = Cell::new(0);
}

struct FrameGuard;

impl FrameGuard {
    fn push(function: String, span: Span, file: Option<String>) -> Self {
        CALL_STACK.with(|stack| {
            stack.borrow_mut().push(StackFrame {
                function,
                span: Some(span),
                file,
            })
        });
        FrameGuard
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        CALL_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

fn stack_snapshot() -> Vec<StackFrame> {
    CALL_STACK.with(|stack| stack.borrow().clone())
}

struct DepthGuard;

impl DepthGuard {
    fn enter(limit: usize) -> Result<Self, VncError> {
        let depth = CALL_DEPTH.with(|d| {
            let next = d.get() + 1;
            d.set(next);
            next
        });
        let guard = DepthGuard;
        if depth > limit {
            return Err(VncError::runtime(format!(
                "Stack overflow: evaluation depth exceeded {}",
                limit
            )));
        }
        Ok(guard)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Where `recur` jumps to: the innermost enclosing `loop` or function body.
#[derive(Clone)]
enum RecurPoint {
    Loop {
        patterns: Arc<[Form]>,
        body: Form,
        outer: EnvRef,
    },
    Fn {
        lambda: Arc<Lambda>,
        clause: usize,
    },
}

enum Step {
    Done(Value),
    /// Evaluate another form in tail position with the same recur point.
    Continue(Form, EnvRef),
    /// Enter a new recur point (function body or loop).
    Enter {
        form: Form,
        env: EnvRef,
        point: RecurPoint,
        frame: Option<String>,
    },
}

pub struct Evaluator<'a> {
    ctx: &'a RuntimeCtx,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a RuntimeCtx) -> Self {
        Self { ctx }
    }

    /// Evaluates `form` outside any tail position.
    pub fn eval(&self, form: &Form, env: &EnvRef) -> Result<Value, VncError> {
        self.run(form.clone(), env.clone(), None, None)
    }

    pub fn eval_body(&self, body: &[Form], env: &EnvRef) -> Result<Value, VncError> {
        let mut last = Value::Nil;
        for form in body {
            last = self.eval(form, env)?;
        }
        Ok(last)
    }

    /// Calls a closure with already evaluated arguments.
    pub fn apply_lambda(&self, lambda: &Arc<Lambda>, args: Vec<Value>) -> Result<Value, VncError> {
        let (clause_idx, call_env) = self.bind_call(lambda, args)?;
        let body = lambda.clauses[clause_idx].body.clone();
        let point = RecurPoint::Fn {
            lambda: lambda.clone(),
            clause: clause_idx,
        };
        self.run(body, call_env, Some(point), Some(lambda.display_name()))
    }

    /// The trampoline. Tail positions (`if` branches, last form of
    /// `do`/`let`/bodies, closure calls, `recur`) replace the current state
    /// instead of recursing.
    fn run(
        &self,
        mut form: Form,
        mut env: EnvRef,
        mut recur: Option<RecurPoint>,
        frame_name: Option<String>,
    ) -> Result<Value, VncError> {
        let _depth = DepthGuard::enter(self.ctx.options().max_call_depth)?;
        let mut _frame = frame_name.map(|name| FrameGuard::push(name, form.span, self.ctx.current_file()));
        loop {
            let step = self
                .step(&form, &env, recur.as_ref())
                .map_err(|err| self.decorate(err, form.span))?;
            match step {
                Step::Done(value) => return Ok(value),
                Step::Continue(next, next_env) => {
                    form = next;
                    env = next_env;
                }
                Step::Enter {
                    form: next,
                    env: next_env,
                    point,
                    frame,
                } => {
                    if let Some(name) = frame {
                        drop(_frame.take());
                        _frame = Some(FrameGuard::push(name, next.span, self.ctx.current_file()));
                    }
                    form = next;
                    env = next_env;
                    recur = Some(point);
                }
            }
        }
    }

    fn decorate(&self, err: VncError, span: Span) -> VncError {
        err.with_span(span)
            .with_stack(stack_snapshot())
            .with_file(self.ctx.current_file())
    }

    fn step(&self, form: &Form, env: &EnvRef, recur: Option<&RecurPoint>) -> Result<Step, VncError> {
        match &form.kind {
            FormKind::Symbol(name) => Ok(Step::Done(self.resolve_symbol(name, env)?)),
            FormKind::List(items) => self.step_list(form, items, env, recur),
            FormKind::Vector(items) => {
                let mut out = im::Vector::new();
                for item in items.iter() {
                    out.push_back(self.eval(item, env)?);
                }
                Ok(Step::Done(Value::Vector(out)))
            }
            FormKind::Map(entries) => {
                let mut out = HashMap::new();
                for (k, v) in entries.iter() {
                    let key = self.eval(k, env)?;
                    let value = self.eval(v, env)?;
                    out.insert(key, value);
                }
                Ok(Step::Done(Value::Map(out)))
            }
            FormKind::Set(items) => {
                let mut out = HashSet::new();
                for item in items.iter() {
                    out.insert(self.eval(item, env)?);
                }
                Ok(Step::Done(Value::Set(out)))
            }
            _ => Ok(Step::Done(form_to_value(form))),
        }
    }

    /// Locals shadow everything; a thread binding of a dynamic var only
    /// overrides the namespace-level value.
    pub fn resolve_symbol(&self, name: &str, env: &EnvRef) -> Result<Value, VncError> {
        if let Some(value) = env::read(env).get_lexical(name) {
            return Ok(value);
        }
        if self.ctx.is_dynamic(name) {
            if let Some(bound) = dynamic_vars::current_binding(name) {
                return Ok(bound);
            }
        }
        if let Some(value) = env::read(env).get(name) {
            return Ok(value);
        }
        if name == "*ns*" {
            return Ok(Value::symbol(self.ctx.current_ns_name()));
        }
        if let Some((ns, local)) = split_qualified(name) {
            if let Some(value) = self.ctx.lookup_qualified(ns, local) {
                if let Value::Fn(lambda) | Value::Macro(lambda) = &value {
                    if lambda.private && *lambda.ns != *self.ctx.current_ns_name() {
                        return Err(VncError::runtime(format!(
                            "Illegal access of private symbol '{}'",
                            name
                        )));
                    }
                }
                return Ok(value);
            }
        }
        Err(VncError::unbound_symbol(name))
    }

    /// Macro bound to `name`, if any. Unbound names are not an error here.
    pub fn lookup_macro(&self, name: &str, env: &EnvRef) -> Option<Arc<Lambda>> {
        if is_special_form(name) {
            return None;
        }
        match self.resolve_symbol(name, env) {
            Ok(Value::Macro(lambda)) => Some(lambda),
            _ => None,
        }
    }

    /// A macro call the pre-pass missed is expanded the first time it is
    /// reached; later visits of the same site reuse that expansion.
    fn expand_call_site(&self, form: &Form, lambda: &Arc<Lambda>, args: &[Form]) -> Result<Form, VncError> {
        let FormKind::List(site) = &form.kind else {
            return macros::call_macro(self.ctx, lambda, args, form.span);
        };
        if let Some(expanded) = self.ctx.cached_expansion(site, lambda) {
            return Ok(expanded);
        }
        let expanded = macros::call_macro(self.ctx, lambda, args, form.span)?;
        self.ctx.cache_expansion(site, lambda, expanded.clone());
        Ok(expanded)
    }

    fn step_list(
        &self,
        form: &Form,
        items: &[Form],
        env: &EnvRef,
        recur: Option<&RecurPoint>,
    ) -> Result<Step, VncError> {
        let Some(head) = items.first() else {
            return Ok(Step::Done(Value::List(im::Vector::new())));
        };
        let args = &items[1..];
        let callee = match head.as_symbol() {
            Some(name) if is_special_form(name) => {
                return self.special_form(name, form, args, env, recur)
            }
            Some(name) => {
                let resolved = self.resolve_symbol(name, env)?;
                if let Value::Macro(lambda) = &resolved {
                    return Ok(Step::Continue(self.expand_call_site(form, lambda, args)?, env.clone()));
                }
                resolved
            }
            None => self.eval(head, env)?,
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, env)?);
        }
        match &callee {
            Value::Fn(lambda) => {
                let (clause_idx, call_env) = self.bind_call(lambda, values)?;
                Ok(Step::Enter {
                    form: lambda.clauses[clause_idx].body.clone(),
                    env: call_env,
                    point: RecurPoint::Fn {
                        lambda: lambda.clone(),
                        clause: clause_idx,
                    },
                    frame: Some(lambda.display_name()),
                })
            }
            other => Ok(Step::Done(call_value(other, &values)?)),
        }
    }

    fn bind_call(&self, lambda: &Arc<Lambda>, args: Vec<Value>) -> Result<(usize, EnvRef), VncError> {
        let clause_idx = lambda
            .clauses
            .iter()
            .position(|c| c.rest.is_none() && c.accepts(args.len()))
            .or_else(|| lambda.clauses.iter().position(|c| c.accepts(args.len())))
            .ok_or_else(|| {
                VncError::arity(format!(
                    "Wrong number of args ({}) passed to function {}. Expected arities: {}",
                    args.len(),
                    lambda.display_name(),
                    lambda.arities()
                ))
            })?;
        let call_env = child_of(&lambda.env);
        if let Some(name) = &lambda.name {
            env::write(&call_env).set(name, Value::Fn(lambda.clone()));
        }
        self.bind_params(&lambda.clauses[clause_idx], &call_env, args)?;
        Ok((clause_idx, call_env))
    }

    fn bind_params(&self, clause: &FnClause, call_env: &EnvRef, args: Vec<Value>) -> Result<(), VncError> {
        let mut iter = args.into_iter();
        let eval_default = |f: &Form| self.eval(f, call_env);
        for param in &clause.params {
            let value = iter.next().unwrap_or(Value::Nil);
            bind_pattern(call_env, param, value, &eval_default)?;
        }
        if let Some(rest) = &clause.rest {
            let remaining: Vec<Value> = iter.collect();
            let rest_value = if remaining.is_empty() {
                Value::Nil
            } else {
                Value::list(remaining)
            };
            bind_pattern(call_env, rest, rest_value, &eval_default)?;
        }
        Ok(())
    }

    fn special_form(
        &self,
        name: &str,
        form: &Form,
        args: &[Form],
        env: &EnvRef,
        recur: Option<&RecurPoint>,
    ) -> Result<Step, VncError> {
        match name {
            "quote" => {
                expect_args(name, args, 1, Some(1))?;
                Ok(Step::Done(form_to_value(&args[0])))
            }
            "quasiquote" => {
                expect_args(name, args, 1, Some(1))?;
                let mut gensyms = StdHashMap::new();
                Ok(Step::Done(self.eval_quasiquote(&args[0], env, &mut gensyms)?))
            }
            "if" => {
                expect_args(name, args, 2, Some(3))?;
                let test = self.eval(&args[0], env)?;
                if test.is_truthy() {
                    Ok(Step::Continue(args[1].clone(), env.clone()))
                } else if let Some(otherwise) = args.get(2) {
                    Ok(Step::Continue(otherwise.clone(), env.clone()))
                } else {
                    Ok(Step::Done(Value::Nil))
                }
            }
            "do" => self.step_body(args, env),
            "let" => {
                let bindings = binding_vector(name, args)?;
                let let_env = child_of(env);
                self.bind_sequentially(bindings, &let_env)?;
                self.step_body(&args[1..], &let_env)
            }
            "loop" => {
                let bindings = binding_vector(name, args)?;
                let loop_env = child_of(env);
                self.bind_sequentially(bindings, &loop_env)?;
                let patterns: Arc<[Form]> = bindings.iter().step_by(2).cloned().collect();
                let body = body_form(&args[1..], form.span);
                Ok(Step::Enter {
                    form: body.clone(),
                    env: loop_env,
                    point: RecurPoint::Loop {
                        patterns,
                        body,
                        outer: env.clone(),
                    },
                    frame: None,
                })
            }
            "recur" => self.step_recur(args, env, recur),
            "fn" => Ok(Step::Done(Value::Fn(Arc::new(self.make_lambda(args, env, form.span)?)))),
            "def" => self.eval_def(args, env, false),
            "def-dynamic" => self.eval_def(args, env, true),
            "defmacro" => {
                let name_form = args
                    .first()
                    .ok_or_else(|| VncError::runtime("defmacro: missing name"))?;
                let macro_name = name_form
                    .as_symbol()
                    .ok_or_else(|| VncError::runtime("defmacro: name must be a symbol"))?;
                let lambda = self.make_lambda(args, env, form.span)?;
                tracing::debug!(name = macro_name, ns = self.ctx.current_ns_name().as_str(), "defmacro");
                let qualified = self.ctx.define(macro_name, Value::Macro(Arc::new(lambda)));
                Ok(Step::Done(Value::symbol(qualified)))
            }
            "set!" => {
                expect_args(name, args, 2, Some(2))?;
                let var = args[0]
                    .as_symbol()
                    .ok_or_else(|| VncError::runtime("set!: target must be a symbol"))?;
                let value = self.eval(&args[1], env)?;
                self.ctx.set_dynamic(var, value.clone())?;
                Ok(Step::Done(value))
            }
            "binding" => {
                let bindings = binding_vector(name, args)?;
                let mut pushed = Vec::with_capacity(bindings.len() / 2);
                for pair in bindings.chunks(2) {
                    let var = pair[0]
                        .as_symbol()
                        .ok_or_else(|| VncError::runtime("binding: names must be symbols"))?;
                    if !self.ctx.is_dynamic(var) {
                        return Err(VncError::runtime(format!(
                            "binding: var '{}' is not dynamic",
                            var
                        )));
                    }
                    pushed.push((var.to_string(), self.eval(&pair[1], env)?));
                }
                let _guard = dynamic_vars::push_bindings(&pushed);
                Ok(Step::Done(self.eval_body(&args[1..], env)?))
            }
            "try" => Ok(Step::Done(self.eval_try(args, env)?)),
            "throw" => {
                expect_args(name, args, 1, Some(1))?;
                let thrown = self.eval(&args[0], env)?;
                Err(match thrown {
                    Value::Exception(ex) => VncError::from_exception(ex),
                    other => VncError::Thrown {
                        exception: Arc::new(ExceptionData::value_exception(other)),
                        context: Default::default(),
                    },
                })
            }
            "ns" => {
                expect_args(name, args, 1, None)?;
                let ns_name = args[0]
                    .as_symbol()
                    .ok_or_else(|| VncError::runtime("ns: name must be a symbol"))?;
                self.ctx.switch_ns(ns_name);
                Ok(Step::Done(Value::symbol(ns_name)))
            }
            "import" => {
                for class in args {
                    let class_name = class
                        .as_keyword()
                        .or_else(|| class.as_symbol())
                        .ok_or_else(|| VncError::runtime("import: expected class names"))?;
                    self.ctx.import_class(class_name)?;
                }
                Ok(Step::Done(Value::Nil))
            }
            "." => Ok(Step::Done(self.eval_interop(args, env)?)),
            other => Err(VncError::runtime(format!("Unknown special form '{}'", other))),
        }
    }

    fn step_body(&self, body: &[Form], env: &EnvRef) -> Result<Step, VncError> {
        match body.split_last() {
            None => Ok(Step::Done(Value::Nil)),
            Some((last, init)) => {
                for form in init {
                    self.eval(form, env)?;
                }
                Ok(Step::Continue(last.clone(), env.clone()))
            }
        }
    }

    fn bind_sequentially(&self, bindings: &[Form], target: &EnvRef) -> Result<(), VncError> {
        let eval_default = |f: &Form| self.eval(f, target);
        for pair in bindings.chunks(2) {
            let value = self.eval(&pair[1], target)?;
            bind_pattern(target, &pair[0], value, &eval_default)?;
        }
        Ok(())
    }

    fn step_recur(
        &self,
        args: &[Form],
        env: &EnvRef,
        recur: Option<&RecurPoint>,
    ) -> Result<Step, VncError> {
        let point = recur.ok_or_else(|| {
            VncError::runtime("recur is only allowed in tail position of a loop or fn body")
        })?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, env)?);
        }
        match point {
            RecurPoint::Loop {
                patterns,
                body,
                outer,
            } => {
                if values.len() != patterns.len() {
                    return Err(VncError::arity(format!(
                        "recur: expected {} args for loop, got {}",
                        patterns.len(),
                        values.len()
                    )));
                }
                let loop_env = child_of(outer);
                let eval_default = |f: &Form| self.eval(f, &loop_env);
                for (pattern, value) in patterns.iter().zip(values) {
                    bind_pattern(&loop_env, pattern, value, &eval_default)?;
                }
                Ok(Step::Continue(body.clone(), loop_env))
            }
            RecurPoint::Fn { lambda, clause } => {
                let target = &lambda.clauses[*clause];
                let expected = target.params.len() + usize::from(target.rest.is_some());
                if values.len() != expected {
                    return Err(VncError::arity(format!(
                        "recur: expected {} args for {}, got {}",
                        expected,
                        lambda.display_name(),
                        values.len()
                    )));
                }
                let call_env = child_of(&lambda.env);
                if let Some(name) = &lambda.name {
                    env::write(&call_env).set(name, Value::Fn(lambda.clone()));
                }
                let eval_default = |f: &Form| self.eval(f, &call_env);
                let mut iter = values.into_iter();
                for param in &target.params {
                    bind_pattern(&call_env, param, iter.next().unwrap_or(Value::Nil), &eval_default)?;
                }
                if let Some(rest) = &target.rest {
                    bind_pattern(&call_env, rest, iter.next().unwrap_or(Value::Nil), &eval_default)?;
                }
                Ok(Step::Continue(target.body.clone(), call_env))
            }
        }
    }

    /// `(fn name? [params] body...)` or `(fn name? ([params] body...) ...)`.
    /// `defmacro` shares the shape and may carry a docstring after the name.
    pub fn make_lambda(&self, args: &[Form], env: &EnvRef, span: Span) -> Result<Lambda, VncError> {
        let mut rest = args;
        let mut name = None;
        if let Some(sym) = rest.first().and_then(|f| f.as_symbol()) {
            name = Some(Arc::from(sym));
            rest = &rest[1..];
        }
        let mut doc = None;
        if let Some(FormKind::Str(s)) = rest.first().map(|f| &f.kind) {
            if rest.len() > 1 {
                doc = Some(s.to_string());
                rest = &rest[1..];
            }
        }
        let clauses = match rest.first().map(|f| &f.kind) {
            Some(FormKind::Vector(_)) => vec![parse_clause(&rest[0], &rest[1..], span)?],
            Some(FormKind::List(_)) => rest
                .iter()
                .map(|clause| {
                    let parts = clause.as_list().unwrap_or(&[]);
                    match parts.first() {
                        Some(params) => parse_clause(params, &parts[1..], clause.span),
                        None => Err(VncError::runtime("fn: empty arity clause").with_span(clause.span)),
                    }
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => {
                return Err(VncError::runtime("fn: expected a parameter vector").with_span(span))
            }
        };
        Ok(Lambda {
            name,
            ns: Arc::from(self.ctx.current_ns_name().as_str()),
            clauses,
            env: env.clone(),
            doc,
            private: false,
        })
    }

    fn eval_def(&self, args: &[Form], env: &EnvRef, dynamic: bool) -> Result<Step, VncError> {
        let name_form = args
            .first()
            .ok_or_else(|| VncError::runtime("def: missing name"))?;
        let name = name_form
            .as_symbol()
            .ok_or_else(|| VncError::runtime("def: name must be a symbol"))?;
        if dynamic || name_form.meta_flag("dynamic") {
            self.ctx.declare_dynamic(name);
        }
        let (doc, init) = match args.len() {
            1 => (None, None),
            2 => (None, Some(&args[1])),
            3 => match &args[1].kind {
                FormKind::Str(doc) => (Some(doc.to_string()), Some(&args[2])),
                _ => return Err(VncError::arity("def: expected (def name doc? value)")),
            },
            n => {
                return Err(VncError::arity(format!(
                    "def: expected at most 3 arguments, got {}",
                    n
                )))
            }
        };
        let mut value = match init {
            Some(form) => self.eval(form, env)?,
            None => Value::Nil,
        };
        let private = name_form.meta_flag("private");
        if let Value::Fn(lambda) = &value {
            if doc.is_some() || private {
                value = Value::Fn(Arc::new(Lambda {
                    name: lambda.name.clone(),
                    ns: lambda.ns.clone(),
                    clauses: lambda.clauses.clone(),
                    env: lambda.env.clone(),
                    doc: doc.or_else(|| lambda.doc.clone()),
                    private: private || lambda.private,
                }));
            }
        }
        let qualified = self.ctx.define(name, value);
        Ok(Step::Done(Value::symbol(qualified)))
    }

    fn eval_try(&self, args: &[Form], env: &EnvRef) -> Result<Value, VncError> {
        let parsed = parse_try(args)?;
        let outcome = match self.eval_body(&parsed.body, env) {
            Ok(value) => Ok(value),
            Err(err) => match parsed
                .catches
                .iter()
                .find(|clause| err.is_instance_of(&clause.class))
            {
                Some(clause) => {
                    let catch_env = child_of(env);
                    env::write(&catch_env)
                        .set(&clause.binding, Value::Exception(err.to_exception()));
                    self.eval_body(&clause.body, &catch_env)
                }
                None => Err(err),
            },
        };
        if let Some(finally) = &parsed.finally {
            self.eval_body(finally, env)?;
        }
        outcome
    }

    fn eval_interop(&self, args: &[Form], env: &EnvRef) -> Result<Value, VncError> {
        expect_args(".", args, 2, None)?;
        let method = args[1]
            .as_keyword()
            .or_else(|| args[1].as_symbol())
            .ok_or_else(|| VncError::runtime(". : method name must be a keyword or symbol"))?;
        let mut values = Vec::with_capacity(args.len() - 2);
        for arg in &args[2..] {
            values.push(self.eval(arg, env)?);
        }
        let target = &args[0];
        let receiver = match &target.kind {
            FormKind::Keyword(class) => return self.invoke_static(class, method, &values),
            FormKind::Symbol(sym) => match self.resolve_symbol(sym, env) {
                Ok(value) => value,
                Err(VncError::UnboundSymbol(_)) => {
                    return self.invoke_static(sym, method, &values)
                }
                Err(err) => return Err(err),
            },
            _ => self.eval(target, env)?,
        };
        interop::invoke_method(self.ctx, &receiver, method, &values)
    }

    fn invoke_static(&self, class: &str, method: &str, args: &[Value]) -> Result<Value, VncError> {
        let resolved = self.ctx.resolve_class_name(class)?;
        interop::invoke_static(self.ctx, &resolved, method, args)
    }

    fn eval_quasiquote(
        &self,
        form: &Form,
        env: &EnvRef,
        gensyms: &mut StdHashMap<String, String>,
    ) -> Result<Value, VncError> {
        let value = self.quasiquote_value(form, env, gensyms)?;
        Ok(match (value, &form.meta) {
            (Value::Symbol(name, inner), Some(meta))
                if !inner.as_ref().is_some_and(|m| Arc::ptr_eq(m, meta)) =>
            {
                let mut entries: Vec<(Form, Form)> = meta.as_ref().clone();
                entries.extend(inner.iter().flat_map(|m| m.iter().cloned()));
                Value::Symbol(name, Some(Arc::new(entries)))
            }
            (value, _) => value,
        })
    }

    fn quasiquote_value(
        &self,
        form: &Form,
        env: &EnvRef,
        gensyms: &mut StdHashMap<String, String>,
    ) -> Result<Value, VncError> {
        match &form.kind {
            FormKind::Symbol(sym) if sym.len() > 1 && sym.ends_with('#') => {
                let generated = gensyms
                    .entry(sym.to_string())
                    .or_insert_with(|| macros::gensym(&sym[..sym.len() - 1]));
                Ok(Value::symbol(generated.as_str()))
            }
            FormKind::List(items) => match form.head_symbol() {
                Some("unquote") => {
                    expect_args("unquote", &items[1..], 1, Some(1))?;
                    self.eval(&items[1], env)
                }
                Some("unquote-splicing") => Err(VncError::runtime(
                    "unquote-splicing used outside of a list or vector",
                )
                .with_span(form.span)),
                _ => Ok(Value::List(self.quasiquote_items(items, env, gensyms)?.into_iter().collect())),
            },
            FormKind::Vector(items) => Ok(Value::Vector(
                self.quasiquote_items(items, env, gensyms)?.into_iter().collect(),
            )),
            FormKind::Set(items) => Ok(Value::Set(
                self.quasiquote_items(items, env, gensyms)?.into_iter().collect(),
            )),
            FormKind::Map(entries) => {
                let mut out = HashMap::new();
                for (k, v) in entries.iter() {
                    out.insert(
                        self.eval_quasiquote(k, env, gensyms)?,
                        self.eval_quasiquote(v, env, gensyms)?,
                    );
                }
                Ok(Value::Map(out))
            }
            _ => Ok(form_to_value(form)),
        }
    }

    fn quasiquote_items(
        &self,
        items: &[Form],
        env: &EnvRef,
        gensyms: &mut StdHashMap<String, String>,
    ) -> Result<Vec<Value>, VncError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if item.head_symbol() == Some("unquote-splicing") {
                let parts = item.as_list().unwrap_or(&[]);
                expect_args("unquote-splicing", &parts[1..], 1, Some(1))?;
                let spliced = self.eval(&parts[1], env)?;
                out.extend(seq_items(&spliced)?);
            } else {
                out.push(self.eval_quasiquote(item, env, gensyms)?);
            }
        }
        Ok(out)
    }
}

fn parse_clause(params: &Form, body: &[Form], span: Span) -> Result<FnClause, VncError> {
    let items = params
        .as_vector()
        .ok_or_else(|| VncError::runtime("fn: parameters must be a vector").with_span(params.span))?;
    let mut fixed = Vec::new();
    let mut rest = None;
    let mut iter = items.iter();
    while let Some(item) = iter.next() {
        if item.as_symbol() == Some("&") {
            rest = Some(iter.next().cloned().ok_or_else(|| {
                VncError::runtime("fn: missing rest parameter after '&'").with_span(item.span)
            })?);
            if iter.next().is_some() {
                return Err(VncError::runtime("fn: only one parameter may follow '&'").with_span(item.span));
            }
            break;
        }
        fixed.push(item.clone());
    }
    Ok(FnClause {
        params: fixed,
        rest,
        body: body_form(body, span),
    })
}

/// Wraps a body in a single `do` so it can be entered as one form.
fn body_form(body: &[Form], span: Span) -> Form {
    if body.len() == 1 {
        return body[0].clone();
    }
    let mut items = Vec::with_capacity(body.len() + 1);
    items.push(Form::symbol("do", span));
    items.extend(body.iter().cloned());
    Form::list(items, span)
}

fn binding_vector<'f>(name: &str, args: &'f [Form]) -> Result<&'f [Form], VncError> {
    let bindings = args
        .first()
        .and_then(|f| f.as_vector())
        .ok_or_else(|| VncError::runtime(format!("{}: expected a binding vector", name)))?;
    if bindings.len() % 2 != 0 {
        return Err(VncError::runtime(format!(
            "{}: binding vector requires an even number of forms",
            name
        )));
    }
    Ok(bindings)
}

fn expect_args(name: &str, args: &[Form], min: usize, max: Option<usize>) -> Result<(), VncError> {
    let n = args.len();
    if n < min || max.is_some_and(|max| n > max) {
        let expected = match max {
            Some(max) if max == min => format!("{}", min),
            Some(max) => format!("{} to {}", min, max),
            None => format!("at least {}", min),
        };
        return Err(VncError::arity(format!(
            "{}: expected {} argument(s), got {}",
            name, expected, n
        )));
    }
    Ok(())
}

fn check_native_arity(name: &str, arity: crate::ast::FnArity, count: usize) -> Result<(), VncError> {
    if arity.accepts(count) {
        Ok(())
    } else {
        Err(VncError::arity(format!(
            "Wrong number of args ({}) passed to function {}. Expected {}",
            count,
            name,
            arity.describe()
        )))
    }
}

/// Applies anything callable to evaluated arguments. Closures need the
/// interpreter bound to the current thread.
pub fn call_callable(callee: &Value, args: &[Value]) -> Result<Value, VncError> {
    match callee {
        Value::Fn(lambda) => RuntimeCtx::with_current(|ctx| {
            Evaluator::new(&ctx).apply_lambda(lambda, args.to_vec())
        }),
        other => call_value(other, args),
    }
}

fn call_value(callee: &Value, args: &[Value]) -> Result<Value, VncError> {
    match callee {
        Value::Native(native) => {
            check_native_arity(native.name(), native.arity(), args.len())?;
            native.call(args)
        }
        Value::Fn(_) => call_callable(callee, args),
        Value::Keyword(_) => {
            check_native_arity("keyword", crate::ast::FnArity::range(1, 2), args.len())?;
            Ok(get(&args[0], callee).unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::Nil)))
        }
        Value::Map(_) | Value::OrderedMap(_) | Value::SortedMap(_) => {
            check_native_arity("map", crate::ast::FnArity::range(1, 2), args.len())?;
            Ok(get(callee, &args[0]).unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::Nil)))
        }
        Value::Set(_) | Value::SortedSet(_) => {
            check_native_arity("set", crate::ast::FnArity::exact(1), args.len())?;
            Ok(get(callee, &args[0]).unwrap_or(Value::Nil))
        }
        Value::Vector(items) => {
            check_native_arity("vector", crate::ast::FnArity::exact(1), args.len())?;
            let idx = index_arg(&args[0], "vector")?;
            items.get(idx).cloned().ok_or_else(|| {
                VncError::index_out_of_bounds(format!(
                    "index {} out of bounds for vector of length {}",
                    idx,
                    items.len()
                ))
            })
        }
        Value::Host(obj) if obj.is_functional() => interop::call_functional(obj, args),
        Value::Macro(lambda) => Err(VncError::runtime(format!(
            "Macro {} cannot be applied as a function",
            lambda.display_name()
        ))),
        other => Err(VncError::runtime(format!(
            "Value of type {} is not a function: {}",
            other.type_name(),
            other.pr_str()
        ))),
    }
}
