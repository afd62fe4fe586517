//! Runs the `mailtriage` binary against snapshot files.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::process::Command;

const CONFIG: &str = r#"
[[state-filters]]
name = "protected"
labels = ["Starred"]
ttl = "Keep"

[[state-filters]]
name = "inbox"
label = "INBOX"
ttl = { read = "7d", unread = "21d" }
action = "Purgatory"
"#;

const MAILBOX: &str = r#"{
  "thread-extension": true,
  "folders": [],
  "messages": [
    {"uid": 1, "headers": "Subject: old read\r\n", "internal-date": "2024-05-20T09:00:00Z", "labels": ["INBOX", "\\Seen"]},
    {"uid": 2, "headers": "Subject: old unread\r\n", "internal-date": "2024-05-20T09:00:00Z", "labels": ["INBOX"]},
    {"uid": 3, "headers": "Subject: kept\r\n", "internal-date": "2023-01-01T00:00:00Z", "labels": ["INBOX", "\\Seen", "\\Starred"]}
  ]
}"#;

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn mailtriage() -> Command {
    Command::new(env!("CARGO_BIN_EXE_mailtriage"))
}

#[test]
fn test_replay_moves_expired_and_writes_back() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "config.toml", CONFIG);
    let mailbox = write(dir.path(), "mailbox.json", MAILBOX);
    let out = dir.path().join("after.json");

    let output = mailtriage()
        .arg("--config")
        .arg(&config)
        .arg("--mailbox")
        .arg(&mailbox)
        .args(["--now", "2024-06-01T09:00:00Z"])
        .arg("--write-back")
        .arg(&out)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("INBOX -> Purgatory \"old read\""));
    assert!(!stdout.contains("old unread"));
    assert!(!stdout.contains("kept"));

    let after = std::fs::read_to_string(&out).unwrap();
    assert!(after.contains("Purgatory"));
}

#[test]
fn test_dry_run_reports_skips() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "config.toml", CONFIG);
    let mailbox = write(dir.path(), "mailbox.json", MAILBOX);

    let output = mailtriage()
        .arg("-c")
        .arg(&config)
        .arg("-m")
        .arg(&mailbox)
        .args(["--now", "2024-06-01T09:00:00Z", "--dry-run"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("skipped: dry run"));
}

#[test]
fn test_invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "config.toml", "[[state-filters]]\nname = \"x\"\nttl = \"30d\"\n");
    let mailbox = write(dir.path(), "mailbox.json", MAILBOX);

    let output = mailtriage()
        .arg("-c")
        .arg(&config)
        .arg("-m")
        .arg(&mailbox)
        .output()
        .unwrap();

    assert!(!output.status.success());
}
