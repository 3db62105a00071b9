mod common;

use common::{eval_err, eval_pr, venice};
use venice_core::HostValue;

#[test]
fn catch_matches_class_hierarchy() {
    assert_eq!(
        eval_pr("(try (/ 1 0) (catch :ArithmeticException e :div))"),
        ":div"
    );
    assert_eq!(
        eval_pr("(try (/ 1 0) (catch :RuntimeException e (ex-message e)))"),
        "\"/ by zero\""
    );
    assert_eq!(
        eval_pr("(try (undefined-thing) (catch :VncException e :caught))"),
        ":caught"
    );
}

#[test]
fn first_matching_catch_wins() {
    assert_eq!(
        eval_pr(
            "(try (throw (ex :IllegalArgumentException \"bad\"))
               (catch :IllegalStateException e :state)
               (catch :IllegalArgumentException e :arg)
               (catch :Exception e :any))"
        ),
        ":arg"
    );
}

#[test]
fn finally_runs_exactly_once() {
    let venice = venice();
    let out = venice
        .eval(
            "(def runs (atom 0))
             (try (throw (ex :VncException \"boom\"))
               (catch :VncException e :handled)
               (finally (swap! runs inc)))
             (try 1 (finally (swap! runs inc)))
             @runs",
        )
        .unwrap();
    assert_eq!(out, HostValue::Long(2));
    let err = venice
        .eval("(try (throw (ex :VncException \"up\")) (finally (swap! runs inc)))")
        .unwrap_err();
    assert!(err.message().contains("up"));
    assert_eq!(venice.eval("@runs").unwrap(), HostValue::Long(3));
}

#[test]
fn thrown_values_are_recoverable() {
    assert_eq!(
        eval_pr("(try (throw {:code 7}) (catch :ValueException e (:code (ex-value e))))"),
        "7"
    );
    assert_eq!(
        eval_pr("(try (throw (ex :VncException \"outer\" (ex :VncException \"inner\"))) (catch :VncException e (ex-message (ex-cause e))))"),
        "\"inner\""
    );
}

#[test]
fn uncaught_errors_reach_the_host() {
    let err = eval_err("(throw (ex :IllegalStateException \"stop\"))");
    assert_eq!(err.class_name(), "IllegalStateException");
    assert!(err.is_instance_of("RuntimeException"));
    assert!(!err.is_instance_of("ArithmeticException"));
}

#[test]
fn rethrow_keeps_the_original_class() {
    let err = eval_err("(try (/ 1 0) (catch :Exception e (throw e)))");
    assert_eq!(err.class_name(), "ArithmeticException");
}

#[test]
fn formatted_errors_carry_a_tag() {
    let err = eval_err("(+ 1");
    let lines = venice_core::format_error(&err);
    assert!(lines[0].contains("[ERROR]"), "{:?}", lines);
    assert!(lines[0].contains("ParseError"));
}
