use std::fmt;
use std::sync::Arc;

use crate::ast::{Span, Value};
use crate::exception::{self, ExceptionData};
use thiserror::Error;

pub const ERROR_TAG: &str = "\x1b[31m[ERROR]\x1b[0m";

#[derive(Clone, Debug, Default)]
pub struct StackFrame {
    pub function: String,
    pub span: Option<Span>,
    pub file: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ErrorContext {
    pub span: Option<Span>,
    pub stack: Vec<StackFrame>,
    pub file: Option<String>,
}

impl ErrorContext {
    fn set_span(&mut self, span: Span) {
        if self.span.is_none() {
            self.span = Some(span);
        }
    }

    fn set_stack(&mut self, stack: Vec<StackFrame>) {
        if self.stack.is_empty() && !stack.is_empty() {
            self.stack = stack;
        }
    }

    fn set_file(&mut self, file: Option<String>) {
        if self.file.is_none() {
            self.file = file;
        }
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeErrorData {
    pub message: String,
    pub context: ErrorContext,
}

impl RuntimeErrorData {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }
}

impl fmt::Display for RuntimeErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Clone, Debug)]
pub struct ParseErrorData {
    pub message: String,
    pub line: usize,
    pub col: usize,
    pub context: ErrorContext,
}

impl ParseErrorData {
    pub fn new(message: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            message: message.into(),
            line,
            col,
            context: ErrorContext::default(),
        }
    }
}

impl fmt::Display for ParseErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}, column {})", self.message, self.line, self.col)
    }
}

/// Every failure the interpreter can surface to a host. The variant is the
/// coarse kind; `class_name` gives the exception class scripts catch on.
#[derive(Error, Debug, Clone)]
pub enum VncError {
    #[error("ParseError: {0}")]
    Parse(ParseErrorData),

    #[error("ArityException: {0}")]
    Arity(RuntimeErrorData),

    #[error("AssertionException: {0}")]
    Assertion(RuntimeErrorData),

    #[error("SymbolNotFoundException: {0}")]
    UnboundSymbol(RuntimeErrorData),

    #[error("VncException: type mismatch, expected {expected} but got {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        context: ErrorContext,
    },

    #[error("{exception}")]
    Thrown {
        exception: Arc<ExceptionData>,
        context: ErrorContext,
    },

    #[error("{class}: {message}")]
    Host {
        class: String,
        message: String,
        context: ErrorContext,
    },

    #[error("VncException: {0}")]
    Runtime(RuntimeErrorData),
}

pub type Result<T, E = VncError> = std::result::Result<T, E>;

impl VncError {
    pub fn runtime(message: impl Into<String>) -> Self {
        VncError::Runtime(RuntimeErrorData::new(message))
    }

    pub fn arity(message: impl Into<String>) -> Self {
        VncError::Arity(RuntimeErrorData::new(message))
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        VncError::Assertion(RuntimeErrorData::new(message))
    }

    pub fn unbound_symbol(name: &str) -> Self {
        VncError::UnboundSymbol(RuntimeErrorData::new(format!(
            "Symbol '{}' not found.",
            name
        )))
    }

    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        VncError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn parse(message: impl Into<String>, line: usize, col: usize) -> Self {
        VncError::Parse(ParseErrorData::new(message, line, col))
    }

    pub fn host(class: impl Into<String>, message: impl Into<String>) -> Self {
        VncError::Host {
            class: exception::canonical_class(&class.into()),
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        VncError::host("ArithmeticException", message)
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        VncError::host("IllegalArgumentException", message)
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        VncError::host("IllegalStateException", message)
    }

    pub fn index_out_of_bounds(message: impl Into<String>) -> Self {
        VncError::host("IndexOutOfBoundsException", message)
    }

    /// Turns an exception value back into an error of the matching kind, so a
    /// caught-and-rethrown error keeps its original variant.
    pub fn from_exception(exception: Arc<ExceptionData>) -> Self {
        let message = exception.message.clone().unwrap_or_default();
        let data = RuntimeErrorData::new(message.clone());
        match exception.class.as_str() {
            "ArityException" => VncError::Arity(data),
            "AssertionException" => VncError::Assertion(data),
            "SymbolNotFoundException" => VncError::UnboundSymbol(data),
            "VncException" if exception.value.is_none() && exception.cause.is_none() => {
                VncError::Runtime(data)
            }
            "ParseError" => {
                let (line, col) = exception.position.unwrap_or_default();
                VncError::Parse(ParseErrorData::new(message, line, col))
            }
            _ => VncError::Thrown {
                exception,
                context: ErrorContext::default(),
            },
        }
    }

    /// The exception class this error is catchable as.
    pub fn class_name(&self) -> &str {
        match self {
            VncError::Parse(_) => "ParseError",
            VncError::Arity(_) => "ArityException",
            VncError::Assertion(_) => "AssertionException",
            VncError::UnboundSymbol(_) => "SymbolNotFoundException",
            VncError::TypeMismatch { .. } | VncError::Runtime(_) => "VncException",
            VncError::Thrown { exception, .. } => exception.class.as_str(),
            VncError::Host { class, .. } => class.as_str(),
        }
    }

    pub fn is_instance_of(&self, class: &str) -> bool {
        exception::is_subclass(self.class_name(), class)
    }

    pub fn is_vnc_exception(&self) -> bool {
        self.is_instance_of("VncException")
    }

    pub fn message(&self) -> String {
        match self {
            VncError::Parse(data) => data.to_string(),
            VncError::Arity(data)
            | VncError::Assertion(data)
            | VncError::UnboundSymbol(data)
            | VncError::Runtime(data) => data.message.clone(),
            VncError::TypeMismatch {
                expected, actual, ..
            } => format!("type mismatch, expected {} but got {}", expected, actual),
            VncError::Thrown { exception, .. } => exception.describe(),
            VncError::Host { message, .. } => message.clone(),
        }
    }

    /// Exception value bound by `catch`.
    pub fn to_exception(&self) -> Arc<ExceptionData> {
        match self {
            VncError::Thrown { exception, .. } => exception.clone(),
            VncError::Parse(data) => Arc::new(
                ExceptionData::new("ParseError", Some(data.message.clone()), None, None)
                    .at_position(data.line, data.col),
            ),
            other => Arc::new(ExceptionData::new(
                other.class_name(),
                Some(other.message()),
                None,
                None,
            )),
        }
    }

    /// Payload of a `ValueException`, if this error carries one.
    pub fn thrown_value(&self) -> Option<&Value> {
        match self {
            VncError::Thrown { exception, .. } => exception.value.as_ref(),
            _ => None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.context_mut().set_span(span);
        self
    }

    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.context_mut().set_stack(stack);
        self
    }

    pub fn with_file(mut self, file: Option<String>) -> Self {
        self.context_mut().set_file(file);
        self
    }

    pub fn span(&self) -> Option<Span> {
        self.context_ref().span
    }

    pub fn file(&self) -> Option<&str> {
        self.context_ref().file.as_deref()
    }

    pub fn stack(&self) -> &[StackFrame] {
        self.context_ref().stack.as_slice()
    }

    fn context_ref(&self) -> &ErrorContext {
        match self {
            VncError::Parse(data) => &data.context,
            VncError::Arity(data)
            | VncError::Assertion(data)
            | VncError::UnboundSymbol(data)
            | VncError::Runtime(data) => &data.context,
            VncError::TypeMismatch { context, .. }
            | VncError::Thrown { context, .. }
            | VncError::Host { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            VncError::Parse(data) => &mut data.context,
            VncError::Arity(data)
            | VncError::Assertion(data)
            | VncError::UnboundSymbol(data)
            | VncError::Runtime(data) => &mut data.context,
            VncError::TypeMismatch { context, .. }
            | VncError::Thrown { context, .. }
            | VncError::Host { context, .. } => context,
        }
    }
}

/// Lines printed by the CLI and REPL for an uncaught error.
pub fn format_error(err: &VncError) -> Vec<String> {
    let mut lines = vec![format!("{} {}", ERROR_TAG, err)];
    if let Some(location) = format_error_location(err.file(), err.span()) {
        lines.push(format!("  at {}", location));
    }
    for frame in err.stack().iter().rev() {
        let location = format_error_location(frame.file.as_deref(), frame.span)
            .unwrap_or_else(|| "unknown".into());
        if frame.function.is_empty() {
            lines.push(format!("  at {}", location));
        } else {
            lines.push(format!("  at {} in {}", location, frame.function));
        }
    }
    lines
}

fn format_error_location(file: Option<&str>, span: Option<Span>) -> Option<String> {
    let file_name = file.unwrap_or("unknown");
    match span {
        Some(span) if span.line > 0 => Some(format!("{}:{}:{}", file_name, span.line, span.col)),
        _ => file.map(|f| f.to_string()),
    }
}

impl From<String> for VncError {
    fn from(s: String) -> Self {
        VncError::runtime(s)
    }
}

impl From<&str> for VncError {
    fn from(s: &str) -> Self {
        VncError::runtime(s.to_string())
    }
}

impl From<std::io::Error> for VncError {
    fn from(err: std::io::Error) -> Self {
        VncError::host("java.io.IOException", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_onto_exception_classes() {
        assert!(VncError::unbound_symbol("x").is_vnc_exception());
        assert!(VncError::arity("bad").is_instance_of("RuntimeException"));
        assert!(VncError::arithmetic("/ by zero").is_instance_of("java.lang.ArithmeticException"));
        assert!(!VncError::arithmetic("/ by zero").is_vnc_exception());
    }

    #[test]
    fn rethrown_exception_keeps_its_kind() {
        let err = VncError::assertion("nope");
        let again = VncError::from_exception(err.to_exception());
        assert!(matches!(again, VncError::Assertion(_)));
        assert_eq!(again.message(), "nope");
    }

    #[test]
    fn parse_error_reports_position() {
        let err = VncError::parse("EOF while reading list", 3, 7);
        assert_eq!(
            err.to_string(),
            "ParseError: EOF while reading list (line 3, column 7)"
        );
    }

    #[test]
    fn rethrown_parse_error_keeps_position() {
        let err = VncError::parse("Unterminated string", 4, 12);
        let caught = err.to_exception();
        assert_eq!(caught.message.as_deref(), Some("Unterminated string"));
        let again = VncError::from_exception(caught);
        assert_eq!(again.to_string(), err.to_string());
        assert_eq!(again.message(), "Unterminated string (line 4, column 12)");
    }
}
