//! Fixture files on disk through the full command path.

use std::io::Write;

use clap::Parser;
use tempfile::NamedTempFile;
use threadline_cli::{Cli, execute};
use threadline_core::Config;

fn write_fixture(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(json.as_bytes()).expect("write fixture");
    file.flush().expect("flush fixture");
    file
}

fn run(args: &[&str], config: &Config) -> serde_json::Value {
    let cli = Cli::try_parse_from(args).expect("should parse");
    let out = execute(&cli, config).expect("command should succeed");
    serde_json::from_str(&out).expect("json output")
}

fn post_ids(value: &serde_json::Value) -> Vec<i64> {
    value["sequence"]
        .as_array()
        .expect("sequence")
        .iter()
        .filter_map(|item| item["post_id"].as_i64())
        .collect()
}

const THREADED: &str = r#"{
    "discussion_id": 9,
    "order": [
        {"postId": 1, "order": 0, "depth": 0},
        {"postId": 2, "order": 1, "depth": 1, "parentPostId": 1},
        {"postId": 3, "order": 2, "depth": 0},
        {"postId": 4, "order": 3, "depth": 1, "parentPostId": 3}
    ],
    "entries": [
        {"type": "placeholder", "key": 0, "kind": "loading_gap"},
        {"type": "post", "id": 1, "created_at": "2024-05-01T10:00:00Z"},
        {"type": "post", "id": 3, "created_at": "2024-05-01T10:01:00Z"},
        {"type": "post", "id": 2, "created_at": "2024-05-01T10:02:00Z"},
        {"type": "post", "id": 4, "created_at": "2024-05-01T10:03:00Z"},
        {"type": "placeholder", "key": 1, "kind": "composer"}
    ]
}"#;

#[test]
fn reconcile_threads_a_chronological_window() {
    let file = write_fixture(THREADED);
    let path = file.path().to_str().expect("utf-8 path");
    let value = run(&["threadline", "reconcile", path, "--json"], &Config::default());

    assert_eq!(post_ids(&value), vec![1, 2, 3, 4]);
    let sequence = value["sequence"].as_array().expect("sequence");
    assert_eq!(sequence[0]["entry"], "placeholder#0");
    assert_eq!(sequence[5]["entry"], "placeholder#1");
    assert_eq!(sequence[2]["depth"], 1);
    assert_eq!(value["report"]["changed"], true);
    assert_eq!(value["report"]["local_order"], false);
    assert_eq!(value["redraw"]["discussion_id"], 9);
    assert_eq!(value["redraw"]["reordered"], true);
}

#[test]
fn reconcile_without_order_uses_local_builder() {
    let file = write_fixture(
        r#"{
            "discussion_id": 2,
            "entries": [
                {"type": "post", "id": 10, "created_at": "2024-05-01T10:00:00Z"},
                {"type": "post", "id": 11, "created_at": "2024-05-01T10:01:00Z"},
                {"type": "post", "id": 12, "created_at": "2024-05-01T10:02:00Z", "reply_to": 10},
                {"type": "post", "id": 13, "created_at": "2024-05-01T10:03:00Z", "content_kind": "discussionRenamed"}
            ]
        }"#,
    );
    let path = file.path().to_str().expect("utf-8 path");
    let value = run(&["threadline", "reconcile", path, "--json"], &Config::default());

    assert_eq!(value["report"]["local_order"], true);
    assert_eq!(post_ids(&value), vec![10, 12, 11, 13]);
    assert_eq!(value["sequence"][3]["event"], true);
}

#[test]
fn disabled_config_leaves_window_alone() {
    let file = write_fixture(THREADED);
    let path = file.path().to_str().expect("utf-8 path");
    let config = Config {
        enabled: false,
        ..Config::default()
    };
    let value = run(&["threadline", "reconcile", path, "--json"], &config);
    assert_eq!(value["report"]["disabled"], true);
    assert_eq!(post_ids(&value), vec![1, 3, 2, 4]);
    assert!(value["redraw"].is_null());
}

#[test]
fn build_reports_cycles() {
    let file = write_fixture(
        r#"{
            "discussion_id": 3,
            "entries": [
                {"type": "post", "id": 1, "created_at": "2024-05-01T10:00:00Z", "reply_to": 2},
                {"type": "post", "id": 2, "created_at": "2024-05-01T10:01:00Z", "reply_to": 1},
                {"type": "post", "id": 3, "created_at": "2024-05-01T10:02:00Z"}
            ]
        }"#,
    );
    let path = file.path().to_str().expect("utf-8 path");
    let value = run(&["threadline", "build", path, "--json"], &Config::default());

    let order = value["order"].as_array().expect("order rows");
    assert_eq!(order.len(), 3);
    assert_eq!(value["cycles"].as_array().map(Vec::len), Some(1));
    assert!(order.iter().all(|row| row["postId"].is_i64()));
}

#[test]
fn build_text_indents_replies() {
    let file = write_fixture(
        r#"{
            "discussion_id": 4,
            "entries": [
                {"type": "post", "id": 1, "created_at": "2024-05-01T10:00:00Z"},
                {"type": "post", "id": 2, "created_at": "2024-05-01T10:01:00Z", "reply_to": 1}
            ]
        }"#,
    );
    let path = file.path().to_str().expect("utf-8 path");
    let cli = Cli::try_parse_from(["threadline", "build", path]).expect("should parse");
    let out = execute(&cli, &Config::default()).expect("build");
    assert!(out.contains("  post#2"), "{out}");
}

#[test]
fn malformed_fixture_is_an_error() {
    let file = write_fixture("{\"discussion_id\": 1");
    let path = file.path().to_str().expect("utf-8 path");
    let cli = Cli::try_parse_from(["threadline", "reconcile", path]).expect("should parse");
    let err = execute(&cli, &Config::default()).unwrap_err();
    assert!(err.to_string().starts_with("cannot load fixture"));
}
