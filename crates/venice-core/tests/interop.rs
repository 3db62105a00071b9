mod common;

use std::any::Any;
use std::sync::Mutex;

use common::{eval_pr, venice};
use venice_core::adapters::HostCallable;
use venice_core::interop::HostData;
use venice_core::{HostClass, HostObject, HostValue, Parameters, Value, VncError};

struct Counter {
    hits: Mutex<i64>,
}

impl HostData for Counter {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn counter_class() -> HostClass {
    HostClass::builder("com.acme.Counter")
        .constructor(|args| {
            let start = match args.first() {
                Some(Value::Long(n)) => *n,
                _ => 0,
            };
            Ok(Value::Host(HostObject::new(
                "com.acme.Counter",
                Counter {
                    hits: Mutex::new(start),
                },
            )))
        })
        .method("hit", |this, _args| {
            let counter = this
                .downcast::<Counter>()
                .ok_or_else(|| VncError::runtime("not a counter"))?;
            let mut hits = counter.hits.lock().unwrap();
            *hits += 1;
            Ok(Value::Long(*hits))
        })
        .static_method("describe", |_args| Ok(Value::string("counts hits")))
        .static_field("LIMIT", Value::Long(99))
        .build()
}

#[test]
fn registered_classes_are_callable_from_scripts() {
    let venice = venice();
    venice.registry().register(counter_class());
    let out = venice
        .eval("(let [c (. :com.acme.Counter :new 10)] (. c :hit) (. c :hit))")
        .unwrap();
    assert_eq!(out, HostValue::Long(12));
    assert_eq!(
        venice.eval("(. :com.acme.Counter :describe)").unwrap(),
        HostValue::String("counts hits".into())
    );
    assert_eq!(venice.eval("(. :com.acme.Counter :LIMIT)").unwrap(), HostValue::Long(99));
}

#[test]
fn import_allows_short_class_names() {
    let venice = venice();
    venice.registry().register(counter_class());
    let out = venice
        .eval("(import :com.acme.Counter) (instance-of? :Counter (. :Counter :new))")
        .unwrap();
    assert_eq!(out, HostValue::Bool(true));
}

#[test]
fn classes_do_not_leak_between_instances() {
    let first = venice();
    first.registry().register(counter_class());
    let second = venice();
    assert!(second.eval("(. :com.acme.Counter :new)").is_err());
}

#[test]
fn unknown_methods_fail() {
    let venice = venice();
    venice.registry().register(counter_class());
    assert!(venice.eval("(. (. :com.acme.Counter :new) :explode)").is_err());
}

#[test]
fn builtin_host_classes() {
    assert_eq!(
        eval_pr("(let [sb (. :java.lang.StringBuilder :new)] (. sb :append \"ab\") (. sb :append 1) (str sb))"),
        "\"ab1\""
    );
    assert_eq!(eval_pr("(. :java.lang.Math :max 3 7)"), "7");
}

#[test]
fn host_objects_passed_as_parameters_take_method_calls() {
    let venice = venice();
    let HostValue::Object(builder) = venice.eval("(. :java.lang.StringBuilder :new)").unwrap() else {
        panic!("expected a host object");
    };
    let mut params = Parameters::new();
    params.insert("sb".into(), HostValue::Object(builder));
    assert_eq!(
        venice.eval_with("(. sb :append \"x\") (. sb :append 1) (str sb)", &params).unwrap(),
        HostValue::String("x1".into())
    );
    assert_eq!(
        venice.eval_with("(. Math :max 2 5)", &params).unwrap(),
        HostValue::Long(5)
    );
}

#[test]
fn adapted_functions_run_as_host_interfaces() {
    let venice = venice();
    let out = venice.eval("(as-function (fn [x] (* x 2)))").unwrap();
    let HostValue::Object(obj) = out else {
        panic!("expected host object, got {:?}", out);
    };
    assert_eq!(obj.class_name(), "java.util.function.Function");
    let adapter = obj.functional().expect("functional object");
    assert_eq!(
        adapter.invoke(&[HostValue::Long(21)]).unwrap(),
        HostValue::Long(42)
    );
    assert!(adapter.invoke(&[]).is_err());
}

#[test]
fn script_functions_are_returned_callable() {
    let venice = venice();
    let out = venice.eval("(fn [a b] (str a \"-\" b))").unwrap();
    let HostValue::Object(obj) = out else {
        panic!("expected host object, got {:?}", out);
    };
    let adapter = obj.functional().expect("functional object");
    assert_eq!(
        adapter
            .invoke(&[HostValue::String("x".into()), HostValue::Long(1)])
            .unwrap(),
        HostValue::String("x-1".into())
    );
}

#[test]
fn predicates_adapt_to_booleans() {
    let venice = venice();
    let HostValue::Object(obj) = venice.eval("(as-predicate (fn [x] (when (pos? x) :yes)))").unwrap() else {
        panic!("expected host object");
    };
    let adapter = obj.functional().unwrap();
    assert_eq!(adapter.invoke(&[HostValue::Long(3)]).unwrap(), HostValue::Bool(true));
    assert_eq!(adapter.invoke(&[HostValue::Long(-3)]).unwrap(), HostValue::Bool(false));
}
