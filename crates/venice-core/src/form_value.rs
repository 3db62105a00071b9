use std::sync::Arc;

use im::Vector;

use crate::ast::{Form, FormKind, Span, Value};

/// Data view of a form, as produced by `quote` and handed to macros.
pub fn form_to_value(form: &Form) -> Value {
    match &form.kind {
        FormKind::Nil => Value::Nil,
        FormKind::Bool(b) => Value::Bool(*b),
        FormKind::Long(n) => Value::Long(*n),
        FormKind::Double(d) => Value::Double(*d),
        FormKind::Decimal(d) => Value::Decimal(d.clone()),
        FormKind::BigInt(n) => Value::BigInt(n.clone()),
        FormKind::Str(s) => Value::String(s.clone()),
        FormKind::Char(c) => Value::Char(*c),
        FormKind::Keyword(k) => Value::Keyword(k.clone()),
        FormKind::Symbol(s) => Value::Symbol(s.clone(), form.meta.clone()),
        FormKind::List(items) => Value::List(items.iter().map(form_to_value).collect()),
        FormKind::Vector(items) => Value::Vector(items.iter().map(form_to_value).collect()),
        FormKind::Set(items) => Value::Set(items.iter().map(form_to_value).collect()),
        FormKind::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| (form_to_value(k), form_to_value(v)))
                .collect(),
        ),
        FormKind::Value(v) => v.clone(),
    }
}

/// Code view of a value, used for macro expansion results and `eval`.
/// Values without a literal syntax are embedded as they are.
pub fn value_to_form(value: &Value, span: Span) -> Form {
    let kind = match value {
        Value::Nil => FormKind::Nil,
        Value::Bool(b) => FormKind::Bool(*b),
        Value::Long(n) => FormKind::Long(*n),
        Value::Double(d) => FormKind::Double(*d),
        Value::Decimal(d) => FormKind::Decimal(d.clone()),
        Value::BigInt(n) => FormKind::BigInt(n.clone()),
        Value::String(s) => FormKind::Str(s.clone()),
        Value::Char(c) => FormKind::Char(*c),
        Value::Keyword(k) => FormKind::Keyword(k.clone()),
        Value::Symbol(s, Some(meta)) => {
            return Form::new(FormKind::Symbol(s.clone()), span).with_meta(Some(meta.clone()))
        }
        Value::Symbol(s, None) => FormKind::Symbol(s.clone()),
        Value::List(items) => FormKind::List(to_forms(items, span)),
        Value::Vector(items) => FormKind::Vector(to_forms(items, span)),
        Value::Map(m) => FormKind::Map(
            m.iter()
                .map(|(k, v)| (value_to_form(k, span), value_to_form(v, span)))
                .collect(),
        ),
        Value::Set(s) => FormKind::Set(s.iter().map(|v| value_to_form(v, span)).collect()),
        other => FormKind::Value(other.clone()),
    };
    Form::new(kind, span)
}

fn to_forms(items: &Vector<Value>, span: Span) -> Arc<[Form]> {
    items.iter().map(|v| value_to_form(v, span)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_all;

    #[test]
    fn quoted_forms_keep_their_shape() {
        let forms = read_all("(a [1 :b] {\"k\" c})", None).unwrap();
        let value = form_to_value(&forms[0]);
        assert_eq!(value.pr_str(), "(a [1 :b] {\"k\" c})");
        let back = value_to_form(&value, Span::default());
        assert_eq!(form_to_value(&back), value);
    }
}
