#![cfg(unix)]
//! Integration tests for the tinyexec binary.

use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)] // cargo_bin works fine; the replacement macro is unstable
fn tinyexec() -> Command {
    Command::cargo_bin("tinyexec").unwrap()
}

#[test]
fn help_lists_subcommands() {
    tinyexec()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("which"))
        .stdout(predicate::str::contains("path"));
}

#[test]
fn run_prints_child_output() {
    tinyexec()
        .args(["run", "--", "echo", "foo"])
        .assert()
        .success()
        .stdout("foo\n");
}

#[test]
fn run_mirrors_exit_code() {
    tinyexec()
        .args(["run", "--", "sh", "-c", "echo oops >&2; exit 3"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("oops"));
}

#[test]
fn run_throw_on_error_reports_status() {
    tinyexec()
        .args(["run", "--throw-on-error", "--", "sh", "-c", "exit 4"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("non-zero status (4)"));
}

#[test]
fn run_passes_env() {
    tinyexec()
        .args(["run", "-e", "GREETING=hi", "--", "sh", "-c", "echo $GREETING"])
        .assert()
        .success()
        .stdout("hi\n");
}

#[test]
fn run_pipes_through_stages() {
    tinyexec()
        .args([
            "run",
            "--pipe",
            "grep foo",
            "--",
            "printf",
            "foo\\nbar\\nfood\\n",
        ])
        .assert()
        .success()
        .stdout("foo\nfood\n");
}

#[test]
fn run_lines_streams_output() {
    tinyexec()
        .args(["run", "--lines", "--", "sh", "-c", "echo a; echo b"])
        .assert()
        .success()
        .stdout("a\nb\n");
}

#[test]
fn run_json_reports_process() {
    let output = tinyexec()
        .args(["run", "--json", "--", "echo", "foo"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["stdout"], "foo\n");
    assert_eq!(report["exit_code"], 0);
    assert_eq!(report["process"]["command"], "echo");
    assert_eq!(report["process"]["status"], "closed");
}

#[test]
fn run_timeout_fails() {
    tinyexec()
        .args(["run", "--timeout", "100", "--", "sleep", "5"])
        .timeout(std::time::Duration::from_secs(5))
        .assert()
        .failure()
        .stderr(predicate::str::contains("timed out"));
}

#[test]
fn run_timeout_reads_env() {
    tinyexec()
        .env("TINYEXEC_TIMEOUT", "100")
        .args(["run", "--", "sleep", "5"])
        .timeout(std::time::Duration::from_secs(5))
        .assert()
        .failure();
}

#[test]
fn run_missing_command_fails() {
    tinyexec()
        .args(["run", "--", "nonexistent_command_12345"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nonexistent_command_12345"));
}

#[test]
fn which_resolves_shell() {
    tinyexec()
        .args(["which", "sh"])
        .assert()
        .success()
        .stdout(predicate::str::ends_with("/sh\n"));
}

#[test]
fn which_unknown_command_fails() {
    tinyexec()
        .args(["which", "nonexistent_command_12345"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn path_lists_bin_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let expected = dir.path().join("node_modules").join(".bin");
    tinyexec()
        .arg("path")
        .arg("--cwd")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(expected.to_string_lossy().into_owned()))
        .stdout(predicate::str::contains("/node_modules/.bin\n"));
}
