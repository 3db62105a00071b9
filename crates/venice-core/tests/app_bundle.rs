use std::fs::File;
use std::io::Write;

use tempfile::tempdir;
use venice_core::{AppBundle, AppRunner, HostValue, OutputBuffer};
use zip::write::FileOptions;

fn write_bundle(path: &std::path::Path, entries: &[(&str, &str)]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, text) in entries {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(text.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

#[test]
fn runs_the_main_file_against_bundled_scripts() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shop.zip");
    write_bundle(
        &path,
        &[
            ("MANIFEST.MF", r#"{"app-name": "shop", "main-file": "main"}"#),
            ("lib/prices.venice", "(ns prices)\n(defn total [xs] (reduce + xs))\n"),
            (
                "main.venice",
                "(load-file \"lib/prices\")\n(println \"args:\" *ARGV*)\n(prices/total [1 2 3])\n",
            ),
        ],
    );
    let bundle = AppBundle::open(&path).unwrap();
    assert_eq!(bundle.manifest().app_name, "shop");
    assert_eq!(bundle.file_names(), vec!["lib/prices.venice", "main.venice"]);

    let out = OutputBuffer::new();
    let result = AppRunner::new()
        .with_stdout(out.writer())
        .with_args(["--fast"])
        .run(&bundle)
        .unwrap();
    assert_eq!(result, HostValue::Long(6));
    assert_eq!(out.contents(), "args: (\"--fast\")\n");
}

#[test]
fn bundled_apps_cannot_reach_the_host_filesystem() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("outside.venice"), "42").unwrap();
    let outside = dir.path().join("outside.venice");
    let main = format!("(load-file {:?})", outside.display().to_string());
    let path = dir.path().join("app.zip");
    write_bundle(
        &path,
        &[
            ("MANIFEST.MF", r#"{"app-name": "sandbox", "main-file": "main.venice"}"#),
            ("main.venice", main.as_str()),
        ],
    );
    let bundle = AppBundle::open(&path).unwrap();
    assert!(AppRunner::new().run(&bundle).is_err());
}

#[test]
fn scripts_missing_from_the_bundle_are_not_found() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gaps.zip");
    write_bundle(
        &path,
        &[
            ("MANIFEST.MF", r#"{"app-name": "gaps", "main-file": "main"}"#),
            ("main.venice", "(load-file \"lib/absent\")"),
        ],
    );
    let bundle = AppBundle::open(&path).unwrap();
    let err = AppRunner::new().run(&bundle).unwrap_err();
    assert_eq!(err.class_name(), "java.io.FileNotFoundException", "{}", err);
}

#[test]
fn stdin_and_stderr_are_configurable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("echo.zip");
    write_bundle(
        &path,
        &[
            ("MANIFEST.MF", r#"{"app-name": "echo", "main-file": "echo"}"#),
            (
                "echo.venice",
                "(let [line (read-line)] (binding [*out* *err*] (println \"got\" line)) line)",
            ),
        ],
    );
    let bundle = AppBundle::open(&path).unwrap();
    let err = OutputBuffer::new();
    let result = AppRunner::new()
        .with_stderr(err.writer())
        .with_stdin_text("ping\n")
        .run(&bundle)
        .unwrap();
    assert_eq!(result, HostValue::String("ping".into()));
    assert_eq!(err.contents(), "got ping\n");
}

#[test]
fn bundles_without_manifest_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.zip");
    write_bundle(&path, &[("main.venice", "1")]);
    let err = AppBundle::open(&path).unwrap_err();
    assert!(err.message().contains("MANIFEST.MF"), "{}", err);
}
