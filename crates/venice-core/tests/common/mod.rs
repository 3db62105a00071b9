#![allow(dead_code)]

use venice_core::{HostValue, Venice, VeniceOptions, VncError};

pub fn venice() -> Venice {
    Venice::with_options(VeniceOptions::default()).expect("interpreter starts")
}

pub fn eval(src: &str) -> Result<HostValue, VncError> {
    venice().eval(src)
}

/// Readable form of the value of the last form in `src`.
pub fn eval_pr(src: &str) -> String {
    pr_with(&venice(), src)
}

pub fn pr_with(venice: &Venice, src: &str) -> String {
    match venice.eval(&format!("(pr-str (do {}))", src)) {
        Ok(HostValue::String(text)) => text,
        Ok(other) => panic!("pr-str returned {:?}", other),
        Err(err) => panic!("eval of {:?} failed: {}", src, err),
    }
}

pub fn eval_err(src: &str) -> VncError {
    match eval(src) {
        Ok(value) => panic!("expected {:?} to fail, got {:?}", src, value),
        Err(err) => err,
    }
}
