mod common;

use common::{eval_err, eval_pr};

#[test]
fn conj_leaves_the_original_untouched() {
    assert_eq!(
        eval_pr("(let [v [1 2] w (conj v 3)] [v w])"),
        "[[1 2] [1 2 3]]"
    );
    assert_eq!(eval_pr("(conj '(2 3) 1)"), "(1 2 3)");
    assert_eq!(
        eval_pr("(let [m {:a 1} n (assoc m :b 2)] [(count m) (count n) (get n :b)])"),
        "[1 2 2]"
    );
}

#[test]
fn map_access_and_nested_updates() {
    assert_eq!(eval_pr("(get {:a 1} :missing 42)"), "42");
    assert_eq!(eval_pr("(:a {:a 1})"), "1");
    assert_eq!(eval_pr("(get-in {:a {:b [10 20]}} [:a :b 1])"), "20");
    assert_eq!(
        eval_pr("(get-in (assoc-in {} [:a :b] 1) [:a :b])"),
        "1"
    );
    assert_eq!(
        eval_pr("(get-in (update-in {:a {:n 1}} [:a :n] inc) [:a :n])"),
        "2"
    );
    assert_eq!(eval_pr("(dissoc {:a 1} :a)"), "{}");
}

#[test]
fn ordered_and_sorted_collections() {
    assert_eq!(eval_pr("(ordered-map :z 1 :a 2 :m 3)"), "{:z 1 :a 2 :m 3}");
    assert_eq!(eval_pr("(sorted-map :z 1 :a 2 :m 3)"), "{:a 2 :m 3 :z 1}");
    assert_eq!(eval_pr("(sorted-set 3 1 2)"), "#{1 2 3}");
    assert_eq!(eval_pr("(keys (sorted-map :b 1 :a 2))"), "(:a :b)");
}

#[test]
fn sequence_functions() {
    assert_eq!(eval_pr("(map inc [1 2 3])"), "(2 3 4)");
    assert_eq!(eval_pr("(mapv + [1 2] [10 20])"), "[11 22]");
    assert_eq!(eval_pr("(filter odd? (range 10))"), "(1 3 5 7 9)");
    assert_eq!(eval_pr("(reduce + 0 (range 5))"), "10");
    assert_eq!(eval_pr("(take 3 (drop 2 (range 10)))"), "(2 3 4)");
    assert_eq!(eval_pr("(partition 2 [1 2 3 4 5])"), "((1 2) (3 4))");
    assert_eq!(eval_pr("(sort [3 1 2])"), "(1 2 3)");
    assert_eq!(eval_pr("(sort > [3 1 2])"), "(3 2 1)");
    assert_eq!(eval_pr("(sort-by count [\"ccc\" \"a\" \"bb\"])"), "(\"a\" \"bb\" \"ccc\")");
    assert_eq!(eval_pr("(distinct [1 2 1 3 2])"), "(1 2 3)");
    assert_eq!(eval_pr("(flatten [1 [2 [3 4]] 5])"), "(1 2 3 4 5)");
    assert_eq!(eval_pr("(interpose :x [1 2 3])"), "(1 :x 2 :x 3)");
}

#[test]
fn grouping_keeps_first_seen_order() {
    assert_eq!(
        eval_pr("(group-by odd? [1 2 3 4])"),
        "{true [1 3] false [2 4]}"
    );
    assert_eq!(eval_pr("(frequencies [:b :a :b])"), "{:b 2 :a 1}");
}

#[test]
fn into_and_conversions() {
    assert_eq!(eval_pr("(into [] '(1 2 3))"), "[1 2 3]");
    assert_eq!(eval_pr("(into (sorted-map) [[:b 2] [:a 1]])"), "{:a 1 :b 2}");
    assert_eq!(eval_pr("(vec (sorted-set 2 1))"), "[1 2]");
    assert_eq!(eval_pr("(count (set [1 1 2]))"), "2");
}

#[test]
fn predicates_on_collections() {
    assert_eq!(eval_pr("(contains? #{1 2} 2)"), "true");
    assert_eq!(eval_pr("(contains? {:a nil} :a)"), "true");
    assert_eq!(eval_pr("(every? pos? [1 2 3])"), "true");
    assert_eq!(eval_pr("(some even? [1 3 4])"), "true");
    assert_eq!(eval_pr("(empty? [])"), "true");
    assert_eq!(eval_pr("[(vector? [1]) (list? '(1)) (map? {}) (set? #{})]"), "[true true true true]");
}

#[test]
fn out_of_range_access_fails() {
    assert_eq!(eval_err("(nth [1 2] 5)").class_name(), "IndexOutOfBoundsException");
}
