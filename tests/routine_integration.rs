//! Integration tests for `run routine`.
//!
//! These run real shell commands (`touch`, `false`) inside temporary
//! project directories.

#![cfg(unix)]

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

fn run() -> Command {
    let mut cmd = Command::cargo_bin("run").unwrap();
    cmd.env_remove("RUN_LOG");
    cmd
}

fn project(routines: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    temp.child("meta.json")
        .write_str(&format!(r#"{{"name": "root", "routines": {routines}}}"#))
        .unwrap();
    temp
}

// ============================================================================
// Execution
// ============================================================================

#[test]
fn test_routine_runs_command() {
    let temp = project(r#"{"build": "touch built.txt"}"#);

    run()
        .current_dir(temp.path())
        .args(["routine", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All tasks executed successfully."));

    temp.child("built.txt").assert(predicate::path::exists());
}

#[test]
fn test_cd_persists_within_sequence() {
    let temp = project(r#"{"make": "cd sub && touch made.txt"}"#);
    temp.child("sub").create_dir_all().unwrap();

    run().current_dir(temp.path()).args(["routine", "make"]).assert().success();

    temp.child("sub/made.txt").assert(predicate::path::exists());
    temp.child("made.txt").assert(predicate::path::missing());
}

#[test]
fn test_nested_sequence_and_parallel() {
    let temp = project(
        r#"{
            "a": "touch a.txt",
            "b": "touch b.txt",
            "both": "parallel a b",
            "all": "sequence both c"
        }"#,
    );

    run().current_dir(temp.path()).args(["routine", "all"]).assert().failure();

    temp.child("a.txt").assert(predicate::path::exists());
    temp.child("b.txt").assert(predicate::path::exists());
}

#[test]
fn test_failing_command_exits_one() {
    let temp = project(r#"{"broken": "false"}"#);

    run()
        .current_dir(temp.path())
        .args(["routine", "broken"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("All tasks executed successfully.").not());
}

#[test]
fn test_literal_command_without_routine() {
    let temp = project("{}");

    run().current_dir(temp.path()).args(["routine", "touch literal.txt"]).assert().success();
    temp.child("literal.txt").assert(predicate::path::exists());
}

#[test]
fn test_every_runs_in_sub_projects() {
    let temp = project(r#"{"build-all": "every build !legacy"}"#);
    temp.child("api/meta.json")
        .write_str(r#"{"name": "api", "routines": {"build": "touch built.txt"}}"#)
        .unwrap();
    temp.child("legacy/meta.json")
        .write_str(r#"{"name": "legacy", "routines": {"build": "touch built.txt"}}"#)
        .unwrap();

    run().current_dir(temp.path()).args(["routine", "build-all"]).assert().success();

    temp.child("api/built.txt").assert(predicate::path::exists());
    temp.child("legacy/built.txt").assert(predicate::path::missing());
}

// ============================================================================
// Resolution errors
// ============================================================================

#[test]
fn test_cycle_is_rejected() {
    let temp = project(r#"{"a": "sequence b", "b": "sequence a"}"#);

    run()
        .current_dir(temp.path())
        .args(["routine", "a"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("a -> b -> a"));
}

#[test]
fn test_strict_rejects_unknown() {
    let temp = project(r#"{"build": "touch built.txt"}"#);

    run().current_dir(temp.path()).args(["routine", "--strict", "nope"]).assert().code(1);
    temp.child("built.txt").assert(predicate::path::missing());
}

// ============================================================================
// Listing, dry-run and empty projects
// ============================================================================

#[test]
fn test_list_routines() {
    let temp = project(r#"{"build": "cargo build", "test": "cargo test"}"#);

    run()
        .current_dir(temp.path())
        .args(["routine", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("build").and(predicate::str::contains("cargo test")));
}

#[test]
fn test_dry_run_prints_tree_without_running() {
    let temp = project(r#"{"build": "touch built.txt", "ci": "sequence build"}"#);

    run()
        .current_dir(temp.path())
        .args(["--dry-run", "routine", "ci"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("parallel\n  sequence\n    touch built.txt")
                .and(predicate::str::contains("[DRY RUN]"))
                .and(predicate::str::contains("All tasks executed successfully.")),
        );

    temp.child("built.txt").assert(predicate::path::missing());
}

#[test]
fn test_no_routines_exits_zero() {
    let temp = project("{}");

    run()
        .current_dir(temp.path())
        .arg("routine")
        .assert()
        .success()
        .stdout(predicate::str::contains("No routines found."));
}

#[test]
fn test_missing_meta_json_exits_zero() {
    let temp = TempDir::new().unwrap();

    run()
        .current_dir(temp.path())
        .arg("routine")
        .assert()
        .success()
        .stdout(predicate::str::contains("No routines found."));
}

#[test]
fn test_no_arguments_without_terminal_lists_choices() {
    let temp = project(r#"{"build": "cargo build"}"#);

    run()
        .current_dir(temp.path())
        .arg("routine")
        .assert()
        .failure()
        .stderr(predicate::str::contains("build"));
}
