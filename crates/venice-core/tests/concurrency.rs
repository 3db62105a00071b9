mod common;

use common::{eval_err, eval_pr, venice};
use venice_core::HostValue;

#[test]
fn swap_from_many_threads_loses_no_updates() {
    let out = eval_pr(
        "(def counter (atom 0))
         (def workers
           (mapv (fn [_]
                   (. :java.lang.Thread :new
                      (fn [] (dotimes [_ 500] (swap! counter inc)))))
                 (range 4)))
         (doseq [t workers] (. t :start))
         (doseq [t workers] (. t :join))
         @counter",
    );
    assert_eq!(out, "2000");
}

#[test]
fn atom_operations() {
    assert_eq!(eval_pr("(let [a (atom 1)] (reset! a 5) @a)"), "5");
    assert_eq!(eval_pr("(let [a (atom 1)] (swap! a + 10 20))"), "31");
    assert_eq!(
        eval_pr("(let [a (atom 1)] [(compare-and-set! a 2 3) (compare-and-set! a 1 3) @a])"),
        "[false true 3]"
    );
}

#[test]
fn validators_reject_invalid_states() {
    let err = eval_err("(def a (atom 1 :validator pos?)) (reset! a -1)");
    assert_eq!(err.class_name(), "IllegalStateException");
    assert_eq!(
        eval_pr("(def a (atom 1 :validator pos?)) (try (swap! a - 5) (catch :Exception e nil)) @a"),
        "1"
    );
}

#[test]
fn watches_see_old_and_new_values() {
    assert_eq!(
        eval_pr(
            "(def seen (atom []))
             (def a (atom 1))
             (add-watch a :log (fn [key ref old new] (swap! seen conj [key old new])))
             (reset! a 2)
             (swap! a inc)
             (remove-watch a :log)
             (reset! a 10)
             @seen"
        ),
        "[[:log 1 2] [:log 2 3]]"
    );
}

#[test]
fn threads_see_the_interpreter_that_started_them() {
    let venice = venice();
    let out = venice
        .eval(
            "(def result (atom nil))
             (defn compute [] (reset! result (str/upper-case \"done\")))
             (let [t (. :java.lang.Thread :new compute)]
               (. t :start)
               (. t :join))
             @result",
        )
        .unwrap();
    assert_eq!(out, HostValue::String("DONE".into()));
}

#[test]
fn separate_interpreters_run_in_parallel() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let venice = venice();
                venice
                    .eval(&format!("(def n {}) (reduce + (range n))", i * 10))
                    .unwrap()
            })
        })
        .collect();
    let results: Vec<HostValue> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(
        results,
        vec![
            HostValue::Long(0),
            HostValue::Long(45),
            HostValue::Long(190),
            HostValue::Long(435),
        ]
    );
}
