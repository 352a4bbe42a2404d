// CLI integration tests: the built binary against the in-process mock server.
mod common;

use std::process::Command;

use common::{MockQdrant, SERVER_VERSION, named_points, point};
use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_qdtk");
    let mut command = Command::new(exe);
    command
        .env_remove("QDRANT_URL")
        .env_remove("QDRANT_API_KEY")
        .env_remove("QDTK_LOG");
    command
}

fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).expect("valid json")
}

fn parse_json_lines(output: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(output)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_json)
        .collect()
}

fn stderr_json(output: &[u8]) -> Value {
    let text = String::from_utf8_lossy(output);
    let line = text
        .lines()
        .find(|line| line.starts_with('{'))
        .expect("json line on stderr");
    parse_json(line)
}

#[test]
fn dump_to_stdout_is_pure_ndjson() {
    let server = MockQdrant::builder()
        .collection("docs", named_points(5))
        .start();
    let output = cmd()
        .args(["--url", server.base_url(), "dump", "-c", "docs", "-b", "2"])
        .output()
        .expect("dump");
    assert!(output.status.success(), "{output:?}");

    let lines = parse_json_lines(&output.stdout);
    assert_eq!(lines.len(), 5);
    for (idx, line) in lines.iter().enumerate() {
        assert_eq!(line["_collection"], "docs");
        assert_eq!(line["_id"], idx as u64 + 1);
        assert!(line.get("vector").is_none());
    }
}

#[test]
fn dump_to_file_with_limit_and_vectors() {
    let server = MockQdrant::builder()
        .collection("docs", named_points(12))
        .start();
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("docs.jsonl");
    let output = cmd()
        .args(["--url", server.base_url(), "dump", "-c", "docs", "-l", "7", "-b", "5", "-v"])
        .arg("-o")
        .arg(&path)
        .output()
        .expect("dump");
    assert!(output.status.success(), "{output:?}");
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Dump completed: 7 points"), "{stderr}");

    let contents = std::fs::read(&path).expect("read output");
    let lines = parse_json_lines(&contents);
    assert_eq!(lines.len(), 7);
    assert_eq!(lines[6]["_id"], 7);
    assert_eq!(lines[0]["vector"][1], 0.5);
}

#[test]
fn dump_all_keeps_going_past_failed_collection() {
    let server = MockQdrant::builder()
        .collection("alpha", named_points(2))
        .broken_collection("broken", named_points(3))
        .collection("omega", vec![point(1, "z")])
        .start();
    let output = cmd()
        .args(["--url", server.base_url(), "dump", "-c", "all", "-p"])
        .output()
        .expect("dump");
    assert_eq!(output.status.code(), Some(0), "{output:?}");

    let lines = parse_json_lines(&output.stdout);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[2]["name"], "z");

    let notice = stderr_json(&output.stderr);
    assert_eq!(notice["notice"]["kind"], "collection_failed");
    assert_eq!(notice["notice"]["collection"], "broken");
    assert_eq!(notice["notice"]["details"]["status"], 500);
}

#[test]
fn dump_all_summary_counts_every_collection() {
    let server = MockQdrant::builder()
        .collection("a", named_points(3))
        .collection("b", named_points(4))
        .start();
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("all.jsonl");
    let output = cmd()
        .args(["--url", server.base_url(), "dump", "-c", "*", "--no-progress"])
        .arg("-o")
        .arg(&path)
        .output()
        .expect("dump");
    assert!(output.status.success(), "{output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Dump completed: 7 points from 2 collections"),
        "{stderr}"
    );
}

#[test]
fn dump_missing_collection_exits_with_request_code() {
    let server = MockQdrant::builder().start();
    let output = cmd()
        .args(["--url", server.base_url(), "dump", "-c", "ghost"])
        .output()
        .expect("dump");
    assert_eq!(output.status.code(), Some(4));
    let err = stderr_json(&output.stderr);
    assert_eq!(err["error"]["kind"], "Request");
    assert_eq!(err["error"]["status"], 404);
    assert_eq!(err["error"]["collection"], "ghost");
}

#[test]
fn search_human_output_lists_hits() {
    let server = MockQdrant::builder()
        .collection("docs", vec![point(1, "red apple"), point(2, "green pear")])
        .start();
    let output = cmd()
        .args(["--url", server.base_url(), "search", "-c", "docs", "-q", "APPLE"])
        .output()
        .expect("search");
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Searched 2 documents, found 1 matches"), "{stdout}");
    assert!(stdout.contains("[1] ID: 1"), "{stdout}");
    assert!(stdout.contains("    {"), "{stdout}");
    assert!(!stdout.contains("ID: 2"));
}

#[test]
fn search_raw_output_is_json_array() {
    let server = MockQdrant::builder()
        .collection("docs", named_points(20))
        .start();
    let output = cmd()
        .args(["--url", server.base_url(), "search", "-c", "docs", "-l", "3", "-r"])
        .output()
        .expect("search");
    assert!(output.status.success(), "{output:?}");
    let value = parse_json(&String::from_utf8_lossy(&output.stdout));
    let points = value.as_array().expect("array");
    assert_eq!(points.len(), 3);
    assert_eq!(points[0]["id"], 1);
    assert_eq!(points[0]["payload"]["name"], "item-1");
    assert_eq!(server.scroll_calls(), 1);
}

#[test]
fn list_and_stats_json() {
    let server = MockQdrant::builder()
        .collection("docs", named_points(4))
        .collection("more", named_points(6))
        .start();
    let list = cmd()
        .args(["--url", server.base_url(), "list", "--json"])
        .output()
        .expect("list");
    assert!(list.status.success(), "{list:?}");
    let value = parse_json(&String::from_utf8_lossy(&list.stdout));
    assert_eq!(value["collections"][0]["name"], "docs");
    assert_eq!(value["collections"][1]["points"], 6);

    let stats = cmd()
        .args(["--url", server.base_url(), "stats", "--json"])
        .output()
        .expect("stats");
    assert!(stats.status.success(), "{stats:?}");
    let value = parse_json(&String::from_utf8_lossy(&stats.stdout));
    assert_eq!(value["version"], SERVER_VERSION);
    assert_eq!(value["collections"], 2);
    assert_eq!(value["total_points"], 10);
}

#[test]
fn list_table_output() {
    let server = MockQdrant::builder()
        .collection("docs", named_points(4))
        .start();
    let output = cmd()
        .args(["--url", server.base_url(), "list", "-v"])
        .output()
        .expect("list");
    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Collections (1)"), "{stdout}");
    assert!(stdout.contains("NAME  POINTS  VECTORS  STATUS  SEGMENTS"), "{stdout}");
    assert!(stdout.contains("green"), "{stdout}");
}

#[test]
fn api_key_from_environment_is_used() {
    let server = MockQdrant::builder()
        .api_key("k-123")
        .collection("docs", named_points(1))
        .start();
    let denied = cmd()
        .args(["--url", server.base_url(), "list"])
        .output()
        .expect("list");
    assert_eq!(denied.status.code(), Some(3));
    let err = stderr_json(&denied.stderr);
    assert_eq!(err["error"]["kind"], "Authentication");

    let allowed = cmd()
        .env("QDRANT_API_KEY", "k-123")
        .args(["--url", server.base_url(), "list"])
        .output()
        .expect("list");
    assert!(allowed.status.success(), "{allowed:?}");
}

#[test]
fn missing_url_is_usage_error() {
    let output = cmd().args(["list"]).output().expect("list");
    assert_eq!(output.status.code(), Some(2));
    let err = stderr_json(&output.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
    assert!(err["error"]["hint"].as_str().unwrap_or_default().contains("--url"));
}

#[test]
fn unknown_flag_is_usage_error() {
    let output = cmd()
        .args(["--url", "http://127.0.0.1:1", "dump", "--bogus"])
        .output()
        .expect("dump");
    assert_eq!(output.status.code(), Some(2));
    let err = stderr_json(&output.stderr);
    assert_eq!(err["error"]["kind"], "Usage");
}

#[test]
fn completion_needs_no_server() {
    let output = cmd().args(["completion", "bash"]).output().expect("completion");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("qdtk"));
}
