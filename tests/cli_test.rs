//! Integration tests for the wechat-transcript binary.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary with the local timezone pinned and the user's config file out of reach.
fn bin(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("wechat-transcript").unwrap();
    cmd.env("TZ", "UTC")
        .env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_the_main_options() {
    let home = TempDir::new().unwrap();
    bin(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--from-date"))
        .stdout(predicate::str::contains("--group"))
        .stdout(predicate::str::contains("--chat"));
}

#[test]
fn exports_group_chat_to_stdout() {
    let fixture = common::build();
    let home = TempDir::new().unwrap();
    bin(&home)
        .arg("--db")
        .arg(&fixture.msg_db)
        .args(["--group", "--chat", common::GROUP, "--output", "-"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Alice  (2024-10-01 09:00:00)\ngood morning\n"))
        .stdout(predicate::str::contains("│ Bob: hello\n└─────────────────────────────\nok!\n"))
        .stderr(predicate::str::contains("Done. 4 messages exported."));
}

#[test]
fn writes_output_file_and_finds_contacts_beside_multi_dir() {
    let fixture = common::build();
    let home = TempDir::new().unwrap();
    let out = fixture.dir.path().join("friend.txt");

    bin(&home)
        .arg("--db")
        .arg(&fixture.msg_db)
        .args(["--chat", common::FRIEND, "--quiet", "--output"])
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::is_empty());

    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.starts_with("Friend  ("));
    assert!(text.contains("Me  (2024-10-01 09:01:30)\nhey\n\n"));
}

#[test]
fn config_file_supplies_defaults() {
    let fixture = common::build();
    let home = TempDir::new().unwrap();
    let config = home.path().join("export.toml");
    std::fs::write(
        &config,
        format!(
            "db_path = {:?}\ngroup = true\nchat = {:?}\nlimit = 1\noutput = \"-\"\n",
            fixture.msg_db.display().to_string(),
            common::GROUP
        ),
    )
    .unwrap();

    bin(&home)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout("Alice  (2024-10-01 09:00:00)\ngood morning\n\n");
}

#[test]
fn zero_limit_exports_everything() {
    let fixture = common::build();
    let home = TempDir::new().unwrap();
    bin(&home)
        .arg("--db")
        .arg(&fixture.msg_db)
        .args(["--group", "--chat", common::GROUP, "--limit", "0", "--output", "-"])
        .assert()
        .success()
        .stdout(common::GROUP_TRANSCRIPT);
}

#[test]
fn inspect_shows_how_rows_decode() {
    let fixture = common::build();
    let home = TempDir::new().unwrap();
    bin(&home)
        .arg("--db")
        .arg(&fixture.msg_db)
        .args(["--chat", common::GROUP, "--inspect", "4"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Rows: 6, showing up to 4\n"))
        .stdout(predicate::str::contains("#1  2024-10-01 09:00:00\n"))
        .stdout(predicate::str::contains("  protobuf: alice_id\n  patterns: alice_id\n  contact:  Alice\n"))
        .stdout(predicate::str::contains("  quoted sender: wxid_bob\n  quoted text:   hello\n  own text:      ok!\n"))
        .stdout(predicate::str::contains("#4 "))
        .stdout(predicate::str::contains("#5 ").not())
        .stderr(predicate::str::contains("Done. 4 rows inspected."));
}

#[test]
fn missing_database_fails_with_message() {
    let home = TempDir::new().unwrap();
    bin(&home)
        .args(["--db", "/nonexistent/MSG.db", "--output", "-"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Database not found"));
}

#[test]
fn invalid_date_fails_before_reading() {
    let home = TempDir::new().unwrap();
    bin(&home)
        .args(["--db", "/nonexistent/MSG.db", "--from-date", "2024-13-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid from date"));
}

#[test]
fn group_mode_without_chat_key_is_rejected() {
    let home = TempDir::new().unwrap();
    bin(&home)
        .args(["--group"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Group mode needs a conversation key"));
}

#[test]
fn missing_explicit_config_file_is_an_error() {
    let home = TempDir::new().unwrap();
    bin(&home)
        .args(["--config", "/nonexistent/config.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}
