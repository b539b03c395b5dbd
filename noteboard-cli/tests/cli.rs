//! Exit status and output of the `noteboard` binary with no durable tiers

use assert_cmd::Command;
use predicates::prelude::*;

/// The binary with every backend setting cleared, run from an empty
/// directory so no `.env` or `noteboard.toml` gets picked up.
fn noteboard(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("noteboard").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("DATABASE_URL")
        .env_remove("DATA_API_URL")
        .env_remove("DATA_API_KEY")
        .env("RUST_LOG", "off");
    cmd
}

#[test]
fn move_of_unknown_note_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    noteboard(&dir)
        .args(["move", "missing-id", "10", "20"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not_found"))
        .stderr(predicate::str::contains("Failed to move note"));
}

#[test]
fn blank_post_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    noteboard(&dir)
        .args(["post", "   "])
        .assert()
        .failure()
        .stdout(predicate::str::contains("invalid_input"));
}

#[test]
fn status_succeeds_on_fallback_only() {
    let dir = tempfile::tempdir().unwrap();
    noteboard(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"fallbackCount\": 0"));
}
