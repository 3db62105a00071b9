use std::fs;

use tempfile::tempdir;
use venice_core::{Venice, VeniceOptions};
use venice_lang::cli::{parse_args, Mode};
use venice_lang::repl::{Outcome, Repl};

fn repl() -> Repl {
    Repl::new(Venice::new().unwrap())
}

#[test]
fn values_are_printed_readably() {
    let mut repl = repl();
    assert_eq!(repl.submit("(str \"a\" 1)"), Outcome::Value("\"a1\"".into()));
    assert_eq!(repl.submit("  "), Outcome::Empty);
    assert_eq!(repl.submit(":k"), Outcome::Value(":k".into()));
}

#[test]
fn namespace_switches_persist_between_submissions() {
    let mut repl = repl();
    assert_eq!(repl.prompt(), "user> ");
    repl.submit("(ns scratch)");
    repl.submit("(def answer 42)");
    assert_eq!(repl.prompt(), "scratch> ");
    assert_eq!(repl.submit("answer"), Outcome::Value("42".into()));
    assert_eq!(repl.submit(":ns"), Outcome::Info("scratch".into()));
}

#[test]
fn errors_are_formatted() {
    let mut repl = repl();
    match repl.submit("(nonexistent-fn)") {
        Outcome::Error(lines) => assert!(lines[0].contains("nonexistent-fn"), "{:?}", lines),
        other => panic!("expected an error, got {:?}", other),
    }
    assert_eq!(repl.submit("(+ 1 1)"), Outcome::Value("2".into()));
}

#[test]
fn meta_commands() {
    let mut repl = repl();
    assert_eq!(repl.submit(":q"), Outcome::Quit);
    assert!(matches!(repl.submit(":help"), Outcome::Info(text) if text.contains(":load")));
    repl.submit("(load-module :ansi)");
    assert_eq!(repl.submit(":modules"), Outcome::Info("ansi".into()));
}

#[test]
fn load_command_reads_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("lib.venice"), "(def loaded-value 7)").unwrap();
    let venice = Venice::with_options(VeniceOptions::restricted(vec![dir.path().to_path_buf()])).unwrap();
    let mut repl = Repl::new(venice);
    assert_eq!(
        repl.submit(":load lib"),
        Outcome::Value("[\"lib\" :loaded]".into())
    );
    assert_eq!(repl.submit("loaded-value"), Outcome::Value("7".into()));
}

#[test]
fn load_paths_from_the_command_line() {
    let args = parse_args(
        ["-loadpath", "/a:/b", "-restricted", "-e", "(+ 1 2)"]
            .iter()
            .map(|s| s.to_string()),
    )
    .unwrap();
    assert_eq!(args.mode, Mode::Eval("(+ 1 2)".into()));
    let options = args.options();
    assert_eq!(options.load_paths.len(), 2);
    assert!(!options.unlimited_access);
}
