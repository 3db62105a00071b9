use std::sync::Arc;

use crate::ast::{Form, FormKind, Span};

/// Placeholders used inside a `#( ... )` literal.
#[derive(Default, Clone, Copy)]
pub struct PlaceholderInfo {
    pub max_index: usize,
    pub has_rest: bool,
}

impl PlaceholderInfo {
    pub fn merge(&mut self, other: &Self) {
        self.max_index = self.max_index.max(other.max_index);
        self.has_rest |= other.has_rest;
    }

    pub fn from_symbol(sym: &str) -> Self {
        match parse_placeholder(sym) {
            Some(PlaceholderRef::Index(i)) => PlaceholderInfo {
                max_index: i,
                has_rest: false,
            },
            Some(PlaceholderRef::Rest) => PlaceholderInfo {
                max_index: 0,
                has_rest: true,
            },
            None => PlaceholderInfo::default(),
        }
    }
}

#[derive(Clone, Copy)]
pub enum PlaceholderRef {
    Index(usize),
    Rest,
}

/// `%` is `%1`; `%&` collects the remaining arguments.
pub fn parse_placeholder(sym: &str) -> Option<PlaceholderRef> {
    match sym {
        "%" => Some(PlaceholderRef::Index(1)),
        "%&" => Some(PlaceholderRef::Rest),
        _ => sym
            .strip_prefix('%')
            .and_then(|digits| digits.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .map(PlaceholderRef::Index),
    }
}

fn scan(form: &Form, info: &mut PlaceholderInfo) {
    match &form.kind {
        FormKind::Symbol(sym) => info.merge(&PlaceholderInfo::from_symbol(sym)),
        FormKind::List(items) | FormKind::Vector(items) | FormKind::Set(items) => {
            for item in items.iter() {
                scan(item, info);
            }
        }
        FormKind::Map(entries) => {
            for (k, v) in entries.iter() {
                scan(k, info);
                scan(v, info);
            }
        }
        _ => {}
    }
}

fn rename_bare_percent(form: &Form) -> Form {
    let kind = match &form.kind {
        FormKind::Symbol(sym) if sym.as_ref() == "%" => FormKind::Symbol(Arc::from("%1")),
        FormKind::List(items) => FormKind::List(items.iter().map(rename_bare_percent).collect()),
        FormKind::Vector(items) => {
            FormKind::Vector(items.iter().map(rename_bare_percent).collect())
        }
        FormKind::Set(items) => FormKind::Set(items.iter().map(rename_bare_percent).collect()),
        FormKind::Map(entries) => FormKind::Map(
            entries
                .iter()
                .map(|(k, v)| (rename_bare_percent(k), rename_bare_percent(v)))
                .collect(),
        ),
        other => other.clone(),
    };
    Form {
        kind,
        span: form.span,
        meta: form.meta.clone(),
    }
}

/// Lowers the body of `#(...)` into `(fn [%1 .. %n & %&] body)`.
pub fn lower_short_fn(body: Form, span: Span) -> Form {
    let mut info = PlaceholderInfo::default();
    scan(&body, &mut info);
    let mut params: Vec<Form> = (1..=info.max_index)
        .map(|i| Form::symbol(&format!("%{}", i), span))
        .collect();
    if info.has_rest {
        params.push(Form::symbol("&", span));
        params.push(Form::symbol("%&", span));
    }
    Form::list(
        vec![
            Form::symbol("fn", span),
            Form::vector(params, span),
            rename_bare_percent(&body),
        ],
        span,
    )
}
