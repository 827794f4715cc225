//! Integration tests for the catsync CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SNAPSHOT: &str = r#"
channel: 1
link_types:
  - id: ChannelNodes
    source: Channel
    target: ChannelNode
  - id: NodeItems
    source: ChannelNode
    target: Item
entities:
  - id: 10
    kind: ChannelNode
  - id: 30
    kind: Item
    fields:
      - name: ItemName
        value: Blue shirt
links:
  - type: ChannelNodes
    source: 1
    target: 10
  - type: NodeItems
    source: 10
    target: 30
"#;

/// Helper to get a catsync command
fn catsync() -> Command {
    Command::cargo_bin("catsync").unwrap()
}

/// Temp directory holding a snapshot file
fn setup_snapshot() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("snapshot.yaml"), SNAPSHOT).unwrap();
    tmp
}

fn outbox_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn test_help_lists_commands() {
    catsync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("replay"))
        .stdout(predicate::str::contains("publish"))
        .stdout(predicate::str::contains("structure"));
}

#[test]
fn test_replay_writes_documents_to_outbox() {
    let tmp = setup_snapshot();
    fs::write(
        tmp.path().join("event.yaml"),
        "event: entity_added\nchannel: 1\nentity_id: 30\n",
    )
    .unwrap();

    catsync()
        .current_dir(tmp.path())
        .args(["replay", "-s", "snapshot.yaml", "-e", "event.yaml", "-o", "out", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"documents_sent\": 1"));

    let files = outbox_files(&tmp.path().join("out"));
    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|f| f.ends_with("catalog.json")));
    assert!(files.iter().any(|f| f.ends_with("completion.json")));

    let catalog = files.iter().find(|f| f.ends_with("catalog.json")).unwrap();
    let body = fs::read_to_string(tmp.path().join("out").join(catalog)).unwrap();
    assert!(body.contains("\"30\""));
}

#[test]
fn test_replay_ignores_other_channel() {
    let tmp = setup_snapshot();
    fs::write(
        tmp.path().join("event.yaml"),
        "event: publish\nchannel: 7\n",
    )
    .unwrap();
    fs::write(tmp.path().join("config.yaml"), "channel_id: 1\n").unwrap();

    catsync()
        .current_dir(tmp.path())
        .args(["replay", "-s", "snapshot.yaml", "-e", "event.yaml", "-o", "out", "-c", "config.yaml"])
        .assert()
        .success()
        .stderr(predicate::str::contains("does not match"));

    assert!(outbox_files(&tmp.path().join("out")).is_empty());
}

#[test]
fn test_replay_reports_bad_event_file() {
    let tmp = setup_snapshot();
    fs::write(tmp.path().join("event.yaml"), "event: [unclosed\n").unwrap();

    catsync()
        .current_dir(tmp.path())
        .args(["replay", "-s", "snapshot.yaml", "-e", "event.yaml", "-o", "out"])
        .assert()
        .failure();
}

#[test]
fn test_publish_writes_catalog() {
    let tmp = setup_snapshot();

    catsync()
        .current_dir(tmp.path())
        .args(["publish", "-s", "snapshot.yaml", "-o", "out", "-f", "table"])
        .assert()
        .success()
        .stdout(predicate::str::contains("catalog"));

    let files = outbox_files(&tmp.path().join("out"));
    assert!(files.iter().any(|f| f.ends_with("catalog.json")));
}

#[test]
fn test_structure_lists_rows() {
    let tmp = setup_snapshot();

    catsync()
        .current_dir(tmp.path())
        .args(["structure", "-s", "snapshot.yaml", "-f", "table"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1/10/30"))
        .stdout(predicate::str::contains("channel_node_link"));
}

#[test]
fn test_structure_filters_by_kind_as_json() {
    let tmp = setup_snapshot();

    catsync()
        .current_dir(tmp.path())
        .args(["structure", "-s", "snapshot.yaml", "-k", "Item", "-f", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"path\": \"1/10/30\""))
        .stdout(predicate::str::contains("\"path\": \"1/10\"").not());
}

#[test]
fn test_config_show_key() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("config.yaml"), "max_delete_depth: 12\n").unwrap();

    catsync()
        .current_dir(tmp.path())
        .args(["config", "show", "max_delete_depth", "-c", "config.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("12"));
}

#[test]
fn test_config_keys() {
    catsync()
        .args(["config", "keys"])
        .assert()
        .success()
        .stdout(predicate::str::contains("items_to_skus"));
}

#[test]
fn test_completions_bash() {
    catsync()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("catsync"));
}
