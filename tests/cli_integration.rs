//! Integration tests for the command-line interface
//!
//! Runs the built binary against temporary projects: apply, dry run, undo,
//! history and the external corrector.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const APP_JS: &str = "function total(items) {\n  let sum = 0;\n  return sum;\n}\n";

/// Helper to create a test project
fn setup_test_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/app.js"), APP_JS).unwrap();
    fs::write(dir.path().join("README.md"), "# demo\n").unwrap();
    dir
}

/// Helper to write a change payload outside the project
fn write_changes(json: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("changes.json");
    fs::write(&path, json).unwrap();
    (dir, path)
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_snippet-patcher"))
        .args(args)
        .env("NO_COLOR", "1")
        .env("CLICOLOR", "0")
        .output()
        .unwrap()
}

fn apply(project: &Path, changes: &Path, extra: &[&str]) -> Output {
    let mut args = vec![
        "apply",
        "--project",
        project.to_str().unwrap(),
        "--changes",
        changes.to_str().unwrap(),
    ];
    args.extend_from_slice(extra);
    run(&args)
}

const GOOD_CHANGE: &str = r#"[{
    "fileName": "src/app.js",
    "originalSnippet": "let sum = 0;",
    "correctedSnippet": "let sum = items.reduce((a, b) => a + b, 0);",
    "description": "Sum the items"
}]"#;

#[test]
fn test_apply_help() {
    let output = run(&["apply", "--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Apply a change payload to a project"));
}

#[test]
fn test_apply_writes_changes() {
    let project = setup_test_project();
    let (_changes_dir, changes) = write_changes(GOOD_CHANGE);

    let output = apply(project.path(), &changes, &[]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("Sum the items: Applied to src/app.js"));
    assert!(stdout.contains("Summary:"));

    let content = fs::read_to_string(project.path().join("src/app.js")).unwrap();
    assert!(content.contains("items.reduce"));
    assert!(project
        .path()
        .join(".snippet-patcher/history.json")
        .exists());
}

#[test]
fn test_dry_run_leaves_files() {
    let project = setup_test_project();
    let (_changes_dir, changes) = write_changes(GOOD_CHANGE);

    let output = apply(project.path(), &changes, &["--dry-run", "--diff"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("DRY RUN"));
    assert!(stdout.contains("Would apply"));
    assert!(stdout.contains("+  let sum = items.reduce"));

    assert_eq!(
        fs::read_to_string(project.path().join("src/app.js")).unwrap(),
        APP_JS
    );
    assert!(!project.path().join(".snippet-patcher").exists());
}

#[test]
fn test_partial_failure_exits_nonzero() {
    let project = setup_test_project();
    let (_changes_dir, changes) = write_changes(
        r#"{"changes": [
            {"fileName": "src/app.js", "originalSnippet": "return sum;", "correctedSnippet": "return sum * 2;"},
            {"fileName": "src/app.js", "originalSnippet": "return total;", "correctedSnippet": "x"}
        ]}"#,
    );

    let output = apply(project.path(), &changes, &[]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("snippet not found"));

    // The change that resolved is still written.
    let content = fs::read_to_string(project.path().join("src/app.js")).unwrap();
    assert!(content.contains("return sum * 2;"));
}

#[test]
fn test_recommendation_applies_all_or_nothing() {
    let project = TempDir::new().unwrap();
    fs::write(project.path().join("api.ts"), "export function fetchUser() {}").unwrap();
    fs::write(
        project.path().join("view.ts"),
        "import { fetchUser } from './api';",
    )
    .unwrap();
    let (_changes_dir, changes) = write_changes(
        r#"{
            "mainChange": {"fileName": "api.ts", "originalSnippet": "fetchUser", "correctedSnippet": "loadUser"},
            "relatedChanges": [
                {"fileName": "view.ts", "originalSnippet": "{fetchUser}", "correctedSnippet": "{ loadUser }"}
            ]
        }"#,
    );

    let output = apply(project.path(), &changes, &[]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("recommendation rejected"));
    assert!(stderr.contains("view.ts"));

    assert_eq!(
        fs::read_to_string(project.path().join("api.ts")).unwrap(),
        "export function fetchUser() {}"
    );
    assert_eq!(
        fs::read_to_string(project.path().join("view.ts")).unwrap(),
        "import { fetchUser } from './api';"
    );
    assert!(!project.path().join(".snippet-patcher").exists());
}

#[test]
fn test_invalid_payload_rejected() {
    let project = setup_test_project();
    let (_changes_dir, changes) =
        write_changes(r#"[{"originalSnippet": "a", "correctedSnippet": "b"}]"#);

    let output = apply(project.path(), &changes, &[]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("fileName"));
}

#[test]
fn test_undo_restores_files() {
    let project = setup_test_project();
    let (_changes_dir, changes) = write_changes(GOOD_CHANGE);
    assert!(apply(project.path(), &changes, &[]).status.success());

    let output = run(&["undo", "--project", project.path().to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Restored 1 file(s)"));
    assert_eq!(
        fs::read_to_string(project.path().join("src/app.js")).unwrap(),
        APP_JS
    );

    let output = run(&["undo", "--project", project.path().to_str().unwrap()]);
    assert!(String::from_utf8_lossy(&output.stdout).contains("Nothing to undo"));
}

#[test]
fn test_history_depth() {
    let project = setup_test_project();
    let (_changes_dir, changes) = write_changes(GOOD_CHANGE);
    assert!(apply(project.path(), &changes, &[]).status.success());

    let output = run(&["history", "--project", project.path().to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("Depth: 1/10"));
    assert!(stdout.contains("#1 2 files, 0 recorded changes"));
}

#[test]
fn test_config_file_in_project() {
    let project = setup_test_project();
    fs::create_dir_all(project.path().join(".snippet-patcher")).unwrap();
    fs::write(
        project.path().join(".snippet-patcher/config.toml"),
        "[history]\ncapacity = 4\n",
    )
    .unwrap();

    let output = run(&["history", "--project", project.path().to_str().unwrap()]);
    assert!(String::from_utf8_lossy(&output.stdout).contains("Depth: 0/4"));
}

#[test]
#[cfg(unix)]
fn test_corrector_repairs_stale_snippet() {
    let project = setup_test_project();
    let (_changes_dir, changes) = write_changes(
        r#"[{"fileName": "src/app.js", "originalSnippet": "let sum=0;", "correctedSnippet": "let sum = 1;"}]"#,
    );
    let corrector = r#"cat > /dev/null; echo '[{"fileName":"src/app.js","originalSnippet":"let sum = 0;","correctedSnippet":"let sum = 1;"}]'"#;

    let output = apply(
        project.path(),
        &changes,
        &["--corrector", corrector, "--instruction", "start at one"],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("2 attempts"));

    let content = fs::read_to_string(project.path().join("src/app.js")).unwrap();
    assert!(content.contains("let sum = 1;"));
}
