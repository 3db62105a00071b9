use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::ast::Value;

/// Exception classes known to the interpreter, child -> parent.
static CLASS_PARENTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Exception", "Throwable"),
        ("Error", "Throwable"),
        ("StackOverflowError", "Error"),
        ("RuntimeException", "Exception"),
        ("java.io.IOException", "Exception"),
        ("java.io.FileNotFoundException", "java.io.IOException"),
        ("VncException", "RuntimeException"),
        ("ValueException", "VncException"),
        ("ArityException", "VncException"),
        ("AssertionException", "VncException"),
        ("ParseError", "VncException"),
        ("SymbolNotFoundException", "VncException"),
        ("SecurityException", "VncException"),
        ("ArithmeticException", "RuntimeException"),
        ("IllegalArgumentException", "RuntimeException"),
        ("NumberFormatException", "IllegalArgumentException"),
        ("IllegalStateException", "RuntimeException"),
        ("IndexOutOfBoundsException", "RuntimeException"),
        ("NullPointerException", "RuntimeException"),
        ("UnsupportedOperationException", "RuntimeException"),
        ("ClassCastException", "RuntimeException"),
        ("InterruptedException", "Exception"),
    ])
});

const STRIPPED_PREFIXES: &[&str] = &[
    "java.lang.",
    "com.github.jlangch.venice.",
    "venice.",
];

/// Canonical class name: `:java.lang.ArithmeticException` and
/// `ArithmeticException` name the same class.
pub fn canonical_class(name: &str) -> String {
    let name = name.trim_start_matches(':');
    for prefix in STRIPPED_PREFIXES {
        if let Some(rest) = name.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    name.to_string()
}

fn parent_of(class: &str) -> Option<&'static str> {
    if class == "Throwable" {
        return None;
    }
    // Classes outside the table behave like plain runtime exceptions.
    Some(CLASS_PARENTS.get(class).copied().unwrap_or("RuntimeException"))
}

pub fn is_subclass(class: &str, ancestor: &str) -> bool {
    let ancestor = canonical_class(ancestor);
    let mut current = canonical_class(class);
    loop {
        if current == ancestor {
            return true;
        }
        match parent_of(&current) {
            Some(parent) => current = parent.to_string(),
            None => return false,
        }
    }
}

/// A thrown or constructed exception as seen by scripts.
#[derive(Clone, Debug)]
pub struct ExceptionData {
    pub class: String,
    pub message: Option<String>,
    pub value: Option<Value>,
    pub cause: Option<Arc<ExceptionData>>,
    /// Line and column of a caught `ParseError`.
    pub position: Option<(usize, usize)>,
}

impl ExceptionData {
    pub fn new(
        class: &str,
        message: Option<String>,
        value: Option<Value>,
        cause: Option<Arc<ExceptionData>>,
    ) -> Self {
        Self {
            class: canonical_class(class),
            message,
            value,
            cause,
            position: None,
        }
    }

    pub fn at_position(mut self, line: usize, col: usize) -> Self {
        self.position = Some((line, col));
        self
    }

    /// `(throw x)` of a non-exception value.
    pub fn value_exception(value: Value) -> Self {
        Self::new("ValueException", None, Some(value), None)
    }

    pub fn describe(&self) -> String {
        match (&self.message, &self.value) {
            (Some(msg), _) => match self.position {
                Some((line, col)) => format!("{} (line {}, column {})", msg, line, col),
                None => msg.clone(),
            },
            (None, Some(value)) => value.pr_str(),
            (None, None) => String::new(),
        }
    }

    pub fn is_instance_of(&self, class: &str) -> bool {
        is_subclass(&self.class, class)
    }
}

impl fmt::Display for ExceptionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.describe();
        if text.is_empty() {
            write!(f, "{}", self.class)
        } else {
            write!(f, "{}: {}", self.class, text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_walks_to_throwable() {
        assert!(is_subclass("ValueException", "VncException"));
        assert!(is_subclass("ValueException", ":java.lang.Exception"));
        assert!(is_subclass("java.lang.ArithmeticException", "Throwable"));
        assert!(!is_subclass("ArithmeticException", "VncException"));
        assert!(is_subclass("MyCustomException", "RuntimeException"));
    }

    #[test]
    fn describes_value_payload() {
        let ex = ExceptionData::value_exception(Value::Long(42));
        assert_eq!(ex.to_string(), "ValueException: 42");
    }
}
