mod common;

use common::{eval, eval_err, eval_pr, venice};
use venice_core::{HostValue, Parameters};

#[test]
fn arithmetic_and_literals() {
    assert_eq!(eval("(+ 1 2 3)").unwrap(), HostValue::Long(6));
    assert_eq!(eval_pr("(* 2 3 4)"), "24");
    assert_eq!(eval_pr("(/ 7 2)"), "3");
    assert_eq!(eval_pr("(/ 7.0 2)"), "3.5");
    assert_eq!(eval_pr("[1 \"a\" #\\b :k nil true]"), "[1 \"a\" #\\b :k nil true]");
}

#[test]
fn def_returns_qualified_name() {
    assert_eq!(eval("(def x 1)").unwrap(), HostValue::String("user/x".into()));
    assert_eq!(eval_pr("(def x 41) (inc x)"), "42");
}

#[test]
fn let_and_destructuring() {
    assert_eq!(eval_pr("(let [[a b & more] [1 2 3 4]] [a b more])"), "[1 2 (3 4)]");
    assert_eq!(
        eval_pr("(let [{:keys [a b] :or {b 5}} {:a 1}] (+ a b))"),
        "6"
    );
    assert_eq!(eval_pr("(let [x 1 y (+ x 1)] (* x y))"), "2");
}

#[test]
fn functions_closures_and_arities() {
    assert_eq!(
        eval_pr("(defn add ([x] (add x 10)) ([x y] (+ x y))) [(add 1) (add 1 2)]"),
        "[11 3]"
    );
    assert_eq!(eval_pr("(defn tail [x & xs] xs) (tail 1 2 3)"), "(2 3)");
    assert_eq!(
        eval_pr("(defn adder [n] (fn [x] (+ x n))) ((adder 5) 10)"),
        "15"
    );
    assert_eq!(eval_pr("(map #(* % %) [1 2 3])"), "(1 4 9)");
}

#[test]
fn recur_runs_in_constant_stack() {
    let out = eval_pr(
        "(loop [i 0 acc 0] (if (< i 100000) (recur (inc i) (+ acc i)) acc))",
    );
    assert_eq!(out, "4999950000");
    assert_eq!(
        eval_pr("(defn count-down [n] (if (zero? n) :done (recur (dec n)))) (count-down 100000)"),
        ":done"
    );
}

#[test]
fn deep_non_tail_recursion_hits_the_depth_limit() {
    let err = eval_err("(defn depth [n] (if (zero? n) 0 (+ 1 (depth (dec n))))) (depth 100000)");
    assert!(err.message().contains("Stack overflow"), "{}", err);
}

#[test]
fn parse_errors_are_reported() {
    let err = eval_err("(+ 1");
    assert_eq!(err.class_name(), "ParseError");
}

#[test]
fn unbound_symbols_are_reported() {
    let err = eval_err("(nonexistent-fn)");
    assert_eq!(err.class_name(), "SymbolNotFoundException");
    assert!(err.message().contains("nonexistent-fn"));
}

#[test]
fn arity_errors_are_reported() {
    let err = eval_err("(defn one [x] x) (one 1 2)");
    assert_eq!(err.class_name(), "ArityException");
}

#[test]
fn dynamic_vars_and_binding() {
    assert_eq!(
        eval_pr("(def-dynamic *level* 1) (defn level [] *level*) [(binding [*level* 2] (level)) (level)]"),
        "[2 1]"
    );
    assert_eq!(
        eval_pr("(def-dynamic *x* 1) (binding [*x* 2] (set! *x* 3) *x*)"),
        "3"
    );
    assert!(eval("(def y 1) (set! y 2)").is_err());
}

#[test]
fn parameters_are_bound_per_call() {
    let venice = venice();
    let mut params = Parameters::new();
    params.insert("x".into(), HostValue::Long(40));
    params.insert("names".into(), HostValue::List(vec![HostValue::String("a".into())]));
    assert_eq!(
        venice.eval_with("(+ x 2)", &params).unwrap(),
        HostValue::Long(42)
    );
    assert_eq!(
        venice.eval_with("(first names)", &params).unwrap(),
        HostValue::String("a".into())
    );
    assert!(venice.eval("x").is_err());
}

#[test]
fn locals_shadow_parameters_and_dynamic_bindings() {
    let venice = venice();
    let mut params = Parameters::new();
    params.insert("x".into(), HostValue::Long(1));
    assert_eq!(venice.eval_with("(let [x 5] x)", &params).unwrap(), HostValue::Long(5));
    assert_eq!(
        venice.eval_with("(defn twice [x] (* x 2)) (twice 10)", &params).unwrap(),
        HostValue::Long(20)
    );
    assert_eq!(venice.eval_with("(+ x (twice 3))", &params).unwrap(), HostValue::Long(7));
    // The parameter was dynamic for those calls only.
    assert!(venice.eval("(def x 0) (binding [x 3] x)").is_err());
    assert_eq!(
        eval_pr("(def ^:dynamic *z* 1) (defn current-z [] *z*) (binding [*z* 2] (let [*z* 9] [*z* (current-z)]))"),
        "[9 2]"
    );
}

#[test]
fn namespaces_do_not_leak_between_calls() {
    let venice = venice();
    venice.eval("(ns shop) (defn price [] 10)").unwrap();
    assert_eq!(venice.eval("(shop/price)").unwrap(), HostValue::Long(10));
    assert_eq!(venice.eval("*ns*").unwrap(), HostValue::String("user".into()));
}

#[test]
fn private_functions_are_hidden_from_other_namespaces() {
    let venice = venice();
    venice
        .eval("(ns vault) (defn- secret [] 42) (defn reveal [] (secret))")
        .unwrap();
    assert_eq!(venice.eval("(vault/reveal)").unwrap(), HostValue::Long(42));
    let err = venice.eval("(vault/secret)").unwrap_err();
    assert!(err.message().contains("private"), "{}", err);
}

#[test]
fn instances_are_isolated() {
    let first = venice();
    let second = venice();
    first.eval("(def shared 1)").unwrap();
    assert!(second.eval("shared").is_err());
}

#[test]
fn numeric_tower() {
    assert_eq!(eval_pr("(+ 1 1.5)"), "2.5");
    assert_eq!(eval_pr("(+ 1.5M 1)"), "2.5M");
    assert_eq!(eval_pr("(== 1 1.0)"), "true");
    assert_eq!(eval_pr("(= 1 1.0)"), "false");
    let err = eval_err("(+ 9223372036854775807 1)");
    assert_eq!(err.class_name(), "ArithmeticException");
    assert_eq!(eval_err("(/ 1 0)").class_name(), "ArithmeticException");
}

#[test]
fn strings_and_regex() {
    assert_eq!(eval_pr("(str/upper-case \"abc\")"), "\"ABC\"");
    assert_eq!(eval_pr("(str/split \"a,b,,c\" \",\")"), "(\"a\" \"b\" \"\" \"c\")");
    assert_eq!(eval_pr("(re-find (re-pattern \"\\\\d+\") \"ab123cd\")"), "\"123\"");
    assert_eq!(eval_pr("(str \"a\" 1 nil :k)"), "\"a1:k\"");
}

#[test]
fn output_goes_to_configured_stream() {
    use venice_core::{OutputBuffer, Venice, VeniceOptions};
    let out = OutputBuffer::new();
    let venice = Venice::with_options(VeniceOptions::default().with_stdout(out.writer())).unwrap();
    venice.eval("(println \"hello\" 42) (print :done)").unwrap();
    assert_eq!(out.contents(), "hello 42\n:done");
    assert_eq!(
        venice.eval("(with-out-str (print 1 2))").unwrap(),
        HostValue::String("1 2".into())
    );
}

#[test]
fn stdin_reads_lines() {
    use venice_core::{Venice, VeniceOptions};
    let venice =
        Venice::with_options(VeniceOptions::default().with_stdin_text("first\nsecond\n")).unwrap();
    assert_eq!(
        venice.eval("[(read-line) (read-line) (read-line)]").unwrap(),
        HostValue::List(vec![
            HostValue::String("first".into()),
            HostValue::String("second".into()),
            HostValue::Nil,
        ])
    );
}
