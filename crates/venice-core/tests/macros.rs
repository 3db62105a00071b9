mod common;

use common::{eval_err, eval_pr, pr_with, venice};

#[test]
fn user_macros_expand_before_evaluation() {
    assert_eq!(
        eval_pr("(defmacro unless [c & body] `(if ~c nil (do ~@body))) (unless false 1 2)"),
        "2"
    );
    assert_eq!(
        eval_pr("(defmacro twice [x] `(+ ~x ~x)) (macroexpand '(twice 3))"),
        "(+ 3 3)"
    );
}

#[test]
fn threading_macros() {
    assert_eq!(eval_pr("(-> 5 (- 2) inc)"), "4");
    assert_eq!(eval_pr("(->> [1 2 3] (map inc) (reduce +))"), "9");
    assert_eq!(eval_pr("(-<> 10 (- 100 <>) (/ <> 2))"), "45");
    assert_eq!(eval_pr("(as-> 3 x (* x x) (+ x 1))"), "10");
}

#[test]
fn conditionals() {
    assert_eq!(eval_pr("(cond false 1 nil 2 :else 3)"), "3");
    assert_eq!(eval_pr("(case 2 1 :one 2 :two :many)"), ":two");
    assert_eq!(eval_pr("(case 9 1 :one (8 9) :big :many)"), ":big");
    assert_eq!(eval_pr("(case 5 1 :one :many)"), ":many");
    assert_eq!(eval_pr("[(and 1 2) (and 1 nil) (or nil 3) (or)]"), "[2 nil 3 nil]");
    assert_eq!(eval_pr("(if-let [x (get {:a 1} :a)] (inc x) :none)"), "2");
    assert_eq!(eval_pr("(when-let [x nil] :never)"), "nil");
}

#[test]
fn looping_macros() {
    assert_eq!(
        eval_pr("(let [a (atom 0)] (dotimes [i 5] (swap! a + i)) @a)"),
        "10"
    );
    assert_eq!(
        eval_pr("(let [a (atom [])] (doseq [x [1 2] y [:a :b]] (swap! a conj [x y])) @a)"),
        "[[1 :a] [1 :b] [2 :a] [2 :b]]"
    );
    assert_eq!(
        eval_pr("(let [a (atom 3)] (while (pos? @a) (swap! a dec)) @a)"),
        "0"
    );
    assert_eq!(
        eval_pr("(list-comp [x (range 5) :when (odd? x)] (* x 10))"),
        "(10 30)"
    );
}

#[test]
fn gensym_keeps_macro_locals_hygienic() {
    assert_eq!(
        eval_pr("(defmacro with-tmp [& body] `(let [tmp# 1] ~@body)) (let [tmp 5] (with-tmp tmp))"),
        "5"
    );
}

#[test]
fn defonce_and_declare() {
    let venice = venice();
    assert_eq!(pr_with(&venice, "(defonce counter 1) (defonce counter 2) counter"), "1");
    assert_eq!(pr_with(&venice, "(declare later) later"), "nil");
}

#[test]
fn assert_raises_assertion_exception() {
    let err = eval_err("(assert (= 1 2) \"numbers differ\")");
    assert_eq!(err.class_name(), "AssertionException");
    assert!(err.message().contains("numbers differ"));
}

#[test]
fn macros_defined_later_in_a_file_still_expand() {
    assert_eq!(
        eval_pr("(defn use-it [] (later-macro 2)) (defmacro later-macro [x] `(* ~x 100)) (use-it)"),
        "200"
    );
}

#[test]
fn metadata_survives_macro_expansion() {
    assert_eq!(
        eval_pr("(defmacro defdyn [n x] `(def ^:dynamic ~n ~x)) (defdyn *q* 1) (binding [*q* 2] *q*)"),
        "2"
    );
    assert_eq!(
        eval_pr("(defmacro defone [n] `(def ~n 1)) (defone ^:dynamic *r*) (binding [*r* 5] *r*)"),
        "5"
    );
}

#[test]
fn late_macro_call_sites_expand_once() {
    assert_eq!(
        eval_pr(
            "(def hits (atom 0))
             (let [_ 0]
               (defmacro tick [] (swap! hits inc) 1)
               (dotimes [i 5] (tick))
               @hits)"
        ),
        "1"
    );
}
