mod common;

use std::fs;

use common::{pr_with, venice};
use tempfile::tempdir;
use venice_core::{HostValue, OutputBuffer, Venice, VeniceOptions};

fn restricted(dir: &std::path::Path) -> Venice {
    Venice::with_options(VeniceOptions::restricted(vec![dir.to_path_buf()])).unwrap()
}

#[test]
fn loading_a_module_twice_reports_already_loaded() {
    let venice = venice();
    assert_eq!(pr_with(&venice, "(load-module :test)"), "[:test :loaded]");
    assert_eq!(pr_with(&venice, "(load-module :test)"), "[:test :already-loaded]");
    assert_eq!(pr_with(&venice, "(loaded-modules)"), "(:test)");
}

#[test]
fn module_side_effects_run_once() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("counter.venice"),
        "(ns counter)\n(println \"loading counter\")\n(defn value [] 7)\n",
    )
    .unwrap();
    let out = OutputBuffer::new();
    let options = VeniceOptions::restricted(vec![dir.path().to_path_buf()]).with_stdout(out.writer());
    let venice = Venice::with_options(options).unwrap();
    assert_eq!(pr_with(&venice, "(load-module :counter)"), "[:counter :loaded]");
    assert_eq!(pr_with(&venice, "(load-module :counter)"), "[:counter :already-loaded]");
    assert_eq!(pr_with(&venice, "(counter/value)"), "7");
    assert_eq!(out.contents(), "loading counter\n");
}

#[test]
fn test_module_runs_registered_tests() {
    let out = OutputBuffer::new();
    let venice = Venice::with_options(VeniceOptions::default().with_stdout(out.writer())).unwrap();
    let result = pr_with(
        &venice,
        "(load-module :test)
         (test/deftest adds (test/assert-eq 3 (+ 1 2)))
         (test/deftest breaks (test/assert-eq 1 2))
         (test/deftest throws (test/assert-throws :ArithmeticException (/ 1 0)))
         (let [r (test/run-tests)] [(:passed r) (:failed r)])",
    );
    assert_eq!(result, "[2 1]");
    assert!(out.contents().contains("FAIL breaks"), "{}", out.contents());
}

#[test]
fn module_alias_shortens_references() {
    let venice = venice();
    let out = venice
        .eval("(load-module :ansi ['ansi :as 'a]) (a/strip (a/style \"hi\" :red))")
        .unwrap();
    assert_eq!(out, HostValue::String("hi".into()));
}

#[test]
fn unknown_modules_fail_to_load() {
    let venice = venice();
    let err = venice.eval("(load-module :no-such-module)").unwrap_err();
    assert!(err.message().contains("no-such-module"), "{}", err);
}

#[test]
fn load_file_reads_from_load_paths() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("util.venice"),
        "(ns util)\n(defn twice [x] (* 2 x))\n",
    )
    .unwrap();
    let venice = restricted(dir.path());
    assert_eq!(
        venice.eval("(load-file \"util\") (util/twice 21)").unwrap(),
        HostValue::Long(42)
    );
    assert_eq!(pr_with(&venice, "(load-file \"util\")"), "[\"util\" :already-loaded]");
    assert_eq!(pr_with(&venice, "(load-file \"util\" true)"), "[\"util\" :loaded]");
    assert_eq!(pr_with(&venice, "(load-file \"util\") *ns*"), "user");
}

#[test]
fn restricted_access_rejects_paths_outside_load_paths() {
    let root = tempdir().unwrap();
    let scripts = root.path().join("scripts");
    fs::create_dir(&scripts).unwrap();
    fs::write(root.path().join("secret.venice"), "42").unwrap();
    let venice = restricted(&scripts);
    let err = venice.eval("(load-file \"../secret\")").unwrap_err();
    assert!(err.message().contains("Access denied"), "{}", err);
    let absolute = root.path().join("secret.venice");
    let script = format!("(load-file {:?})", absolute.display().to_string());
    assert!(venice.eval(&script).is_err());
}

#[test]
fn circular_loads_are_detected() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.venice"), "(load-file \"b\")").unwrap();
    fs::write(dir.path().join("b.venice"), "(load-file \"a\")").unwrap();
    let venice = restricted(dir.path());
    let err = venice.eval("(load-file \"a\")").unwrap_err();
    assert!(err.message().contains("Circular"), "{}", err);
}

#[test]
fn missing_files_are_reported() {
    let dir = tempdir().unwrap();
    let venice = restricted(dir.path());
    let err = venice.eval("(load-file \"nothing-here\")").unwrap_err();
    assert!(err.is_instance_of("java.io.IOException"), "{}", err);
}
