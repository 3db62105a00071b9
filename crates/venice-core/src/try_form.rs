use crate::ast::{Form, Span};
use crate::error::VncError;
use crate::exception::canonical_class;

#[derive(Clone, Debug)]
pub struct CatchClause {
    pub class: String,
    pub binding: String,
    pub body: Vec<Form>,
    pub span: Span,
}

/// `(try body... (catch :Class e handler...)... (finally cleanup...))`
#[derive(Clone, Debug)]
pub struct TryForm {
    pub body: Vec<Form>,
    pub catches: Vec<CatchClause>,
    pub finally: Option<Vec<Form>>,
}

#[derive(Clone, Debug)]
pub struct TryParseError {
    pub span: Span,
    pub message: String,
}

impl TryParseError {
    fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

impl From<TryParseError> for VncError {
    fn from(err: TryParseError) -> Self {
        VncError::runtime(err.message).with_span(err.span)
    }
}

fn clause_kind(form: &Form) -> Option<&str> {
    match form.head_symbol() {
        Some(head @ ("catch" | "finally")) => Some(head),
        _ => None,
    }
}

fn class_name(form: &Form) -> Option<String> {
    form.as_keyword()
        .or_else(|| form.as_symbol())
        .map(canonical_class)
}

/// Splits the arguments of `try` (everything after the `try` symbol).
/// Catch and finally clauses must trail the body; `finally` comes last.
pub fn parse_try(args: &[Form]) -> Result<TryForm, TryParseError> {
    let mut body = Vec::new();
    let mut catches = Vec::new();
    let mut finally: Option<Vec<Form>> = None;
    for form in args {
        match clause_kind(form) {
            None => {
                if !catches.is_empty() || finally.is_some() {
                    return Err(TryParseError::new(
                        form.span,
                        "try: body forms must precede catch and finally clauses",
                    ));
                }
                body.push(form.clone());
            }
            Some("catch") => {
                if finally.is_some() {
                    return Err(TryParseError::new(
                        form.span,
                        "try: catch clause after finally",
                    ));
                }
                let items = form.as_list().unwrap_or(&[]);
                if items.len() < 3 {
                    return Err(TryParseError::new(
                        form.span,
                        "catch: expected (catch ExceptionClass binding body...)",
                    ));
                }
                let class = class_name(&items[1]).ok_or_else(|| {
                    TryParseError::new(items[1].span, "catch: exception class must be a keyword or symbol")
                })?;
                let binding = items[2]
                    .as_symbol()
                    .ok_or_else(|| TryParseError::new(items[2].span, "catch: binding must be a symbol"))?
                    .to_string();
                catches.push(CatchClause {
                    class,
                    binding,
                    body: items[3..].to_vec(),
                    span: form.span,
                });
            }
            Some(_) => {
                if finally.is_some() {
                    return Err(TryParseError::new(form.span, "try: duplicate finally clause"));
                }
                let items = form.as_list().unwrap_or(&[]);
                finally = Some(items[1..].to_vec());
            }
        }
    }
    Ok(TryForm {
        body,
        catches,
        finally,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_all;

    fn try_args(src: &str) -> Vec<Form> {
        let forms = read_all(src, None).unwrap();
        forms[0].as_list().unwrap()[1..].to_vec()
    }

    #[test]
    fn parses_catch_and_finally() {
        let parsed = parse_try(&try_args(
            "(try (a) (b) (catch :java.lang.ArithmeticException e (c)) (catch VncException e2) (finally (d)))",
        ))
        .unwrap();
        assert_eq!(parsed.body.len(), 2);
        assert_eq!(parsed.catches.len(), 2);
        assert_eq!(parsed.catches[0].class, "ArithmeticException");
        assert_eq!(parsed.catches[1].binding, "e2");
        assert_eq!(parsed.finally.map(|f| f.len()), Some(1));
    }

    #[test]
    fn rejects_body_after_clauses() {
        assert!(parse_try(&try_args("(try (finally 1) (a))")).is_err());
        assert!(parse_try(&try_args("(try (a) (catch :Exception) )")).is_err());
    }
}
