//! CLI integration tests for sqlite-pg-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for various error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the sqlite-pg-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("sqlite-pg-migrate").unwrap()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--target-schema"))
        .stdout(predicate::str::contains("--batch-size"))
        .stdout(predicate::str::contains("--force"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sqlite-pg-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_listed() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--progress"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-file"))
        .stdout(predicate::str::contains("--source"));
}

#[test]
fn test_log_format_and_verbosity_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 2)
// =============================================================================

#[test]
fn test_missing_config_without_source_exits_with_code_2() {
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--source"));
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "check"])
        .assert()
        .code(2);
}

#[test]
fn test_empty_config_exits_with_code_2() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "check"])
        .assert()
        .code(2);
}

#[test]
fn test_zero_batch_size_exits_with_code_2() {
    let db = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args([
            "--config",
            "nonexistent_config_file.yaml",
            "--source",
            db.path().to_str().unwrap(),
            "run",
            "--batch-size",
            "0",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("batch_size"));
}

#[test]
fn test_invalid_ssl_mode_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  path: webui.db").unwrap();
    writeln!(file, "target:").unwrap();
    writeln!(file, "  ssl_mode: sometimes").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "check"])
        .assert()
        .code(2);
}

// =============================================================================
// Source Checks (Exit Codes 0, 3)
// =============================================================================

#[test]
fn test_check_passes_on_empty_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("empty.db");
    std::fs::File::create(&db).unwrap();

    cmd()
        .args([
            "--config",
            "nonexistent_config_file.yaml",
            "--source",
            db.to_str().unwrap(),
            "check",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("PASSED"));
}

#[test]
fn test_check_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("empty.db");
    std::fs::File::create(&db).unwrap();

    cmd()
        .args([
            "--config",
            "nonexistent_config_file.yaml",
            "--output-json",
            "--source",
            db.to_str().unwrap(),
            "check",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"integrity_check\""))
        .stdout(predicate::str::contains("\"passed\": true"));
}

#[test]
fn test_missing_source_file_exits_with_code_3() {
    cmd()
        .args([
            "--config",
            "nonexistent_config_file.yaml",
            "--source",
            "definitely_missing.db",
            "check",
        ])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_non_database_file_exits_with_code_3() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "this is not a SQLite database, just some text padding it out").unwrap();

    cmd()
        .args([
            "--config",
            "nonexistent_config_file.yaml",
            "--source",
            file.path().to_str().unwrap(),
            "check",
        ])
        .assert()
        .code(3);
}

#[test]
fn test_log_file_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("empty.db");
    std::fs::File::create(&db).unwrap();
    let log = dir.path().join("migration.log");

    cmd()
        .args([
            "--config",
            "nonexistent_config_file.yaml",
            "--log-file",
            log.to_str().unwrap(),
            "--source",
            db.to_str().unwrap(),
            "check",
        ])
        .assert()
        .success();

    let contents = std::fs::read_to_string(&log).unwrap();
    assert!(contents.contains("Opened SQLite source"));
}
