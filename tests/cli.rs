use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn transcriber(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("transcriber").unwrap();
    cmd.arg("--config")
        .arg(config_dir.join("config.yaml"))
        .env_remove("YOUTUBE_API_KEY")
        .env_remove("GOOGLE_SPEECH_API_KEY")
        .env("RUST_LOG", "off");
    cmd
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("transcriber")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("refresh"))
        .stdout(predicate::str::contains("ledger"));
}

#[test]
fn ledger_shows_rows_and_counts() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("videos.csv");
    std::fs::write(
        &ledger,
        "id,title,description,published_at,status,transcript_link\n\
         abc123,Intro,First lesson,2023-01-01T00:00:00Z,Done,abc123.html\n\
         def456,Pricing,,2023-01-08T00:00:00Z,Failed,\n",
    )
    .unwrap();

    transcriber(dir.path())
        .arg("ledger")
        .arg("--ledger")
        .arg(&ledger)
        .assert()
        .success()
        .stdout(predicate::str::contains("abc123.html"))
        .stdout(predicate::str::contains("Pricing"))
        .stdout(predicate::str::contains("2 items"));
}

#[test]
fn corrupt_ledger_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("videos.csv");
    std::fs::write(&ledger, "Title,URL,Body Text\nx,y,z\n").unwrap();

    transcriber(dir.path())
        .arg("ledger")
        .arg("--ledger")
        .arg(&ledger)
        .assert()
        .failure()
        .stderr(predicate::str::contains("corrupt"));
}

#[test]
fn config_is_created_with_defaults() {
    let dir = tempfile::tempdir().unwrap();

    transcriber(dir.path())
        .arg("config")
        .arg("--show")
        .assert()
        .success()
        .stdout(predicate::str::contains("Language: en-US"));

    assert!(dir.path().join("config.yaml").exists());
}

#[test]
fn run_without_credentials_is_rejected() {
    let dir = tempfile::tempdir().unwrap();

    transcriber(dir.path())
        .arg("run")
        .arg("--all")
        .arg("--ledger")
        .arg(dir.path().join("videos.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("api_key"));

    assert!(!dir.path().join("videos.csv").exists());
}
