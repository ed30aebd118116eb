//! Protocol adapter integration tests over the raw JSON-RPC surface.

mod common;

use common::TestEnv;
use fileward::server::{McpServer, PARSE_ERROR, PROTOCOL_VERSION};
use serde_json::{json, Value};
use std::sync::Arc;

fn server(env: &TestEnv) -> McpServer {
    McpServer::new(Arc::clone(&env.registry))
}

async fn roundtrip(server: &McpServer, message: Value) -> Value {
    let raw = server.handle_raw(&message.to_string()).await;
    serde_json::from_str(&raw).expect("response is valid JSON")
}

#[tokio::test]
async fn initialize_handshake() {
    let env = TestEnv::new();
    let server = server(&env);

    let response = roundtrip(
        &server,
        json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
    )
    .await;

    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
    assert!(response["result"]["capabilities"]["resources"].is_object());
    assert!(response["result"]["serverInfo"]["version"].is_string());
}

#[tokio::test]
async fn tools_list_schemas_are_draft07_objects() {
    let env = TestEnv::new();
    let server = server(&env);

    let response = roundtrip(
        &server,
        json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
    )
    .await;

    let tools = response["result"]["tools"].as_array().expect("tools array");
    assert_eq!(tools.len(), 7); // the exposed wire subset (no analysis model configured)

    let write = tools
        .iter()
        .find(|t| t["name"] == "write_file")
        .expect("write_file surfaced");
    assert_eq!(write["inputSchema"]["type"], "object");
    let required: Vec<&str> = write["inputSchema"]["required"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(required.contains(&"filename"));
    assert!(required.contains(&"content"));
    assert!(!required.contains(&"mode"));
    assert!(write["inputSchema"]["properties"]["mode"]["description"]
        .as_str()
        .unwrap()
        .contains("append"));
}

#[tokio::test]
async fn write_read_delete_via_wire() {
    let env = TestEnv::new();
    let server = server(&env);

    let write = roundtrip(
        &server,
        json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": { "name": "write_file", "arguments": { "filename": "w.txt", "content": "wire" } }
        }),
    )
    .await;
    assert_eq!(write["result"]["isError"], json!(false));

    let read = roundtrip(
        &server,
        json!({
            "jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": { "name": "read_file", "arguments": { "filename": "w.txt" } }
        }),
    )
    .await;
    assert_eq!(read["result"]["content"][0]["text"], "wire");

    let delete = roundtrip(
        &server,
        json!({
            "jsonrpc": "2.0", "id": 5, "method": "tools/call",
            "params": { "name": "delete_file", "arguments": { "filename": "w.txt" } }
        }),
    )
    .await;
    assert_eq!(delete["result"]["isError"], json!(false));
    assert!(!env.ws.exists("w.txt").expect("exists"));
}

#[tokio::test]
async fn parse_error_has_null_id_and_transport_survives() {
    let env = TestEnv::new();
    let server = server(&env);

    let bad = roundtrip_raw(&server, "this is not json").await;
    assert_eq!(bad["id"], Value::Null);
    assert_eq!(bad["error"]["code"], json!(PARSE_ERROR));

    // The server keeps answering after a parse error.
    let ok = roundtrip(
        &server,
        json!({ "jsonrpc": "2.0", "id": 6, "method": "tools/list" }),
    )
    .await;
    assert!(ok["result"]["tools"].is_array());
}

async fn roundtrip_raw(server: &McpServer, raw: &str) -> Value {
    serde_json::from_str(&server.handle_raw(raw).await).expect("valid JSON out")
}

#[tokio::test]
async fn list_tree_over_wire_renders_ascii() {
    let env = TestEnv::new();
    env.mkdir("docs");
    env.write_file("docs/a.md", "a");
    env.write_file("top.txt", "t");

    let server = server(&env);
    let response = roundtrip(
        &server,
        json!({
            "jsonrpc": "2.0", "id": 7, "method": "tools/call",
            "params": { "name": "list_tree", "arguments": {} }
        }),
    )
    .await;
    let tree = response["result"]["content"][0]["text"].as_str().unwrap();
    assert!(tree.contains("docs/"));
    assert!(tree.contains("a.md"));
    assert!(tree.contains("── "));
}

#[tokio::test]
async fn metrics_track_calls_and_errors() {
    let env = TestEnv::new();
    let server = server(&env);

    roundtrip(
        &server,
        json!({ "jsonrpc": "2.0", "id": 8, "method": "tools/list" }),
    )
    .await;
    roundtrip(
        &server,
        json!({
            "jsonrpc": "2.0", "id": 9, "method": "tools/call",
            "params": { "name": "list_files", "arguments": {} }
        }),
    )
    .await;
    roundtrip(
        &server,
        json!({ "jsonrpc": "2.0", "id": 10, "method": "no/such/method" }),
    )
    .await;

    let snapshot = server.metrics_snapshot();
    assert_eq!(snapshot.total_requests, 3);
    assert_eq!(snapshot.error_count, 1);
    assert_eq!(snapshot.tool_calls_by_name.get("list_files"), Some(&1));
    assert!(snapshot.uptime >= 0.0);
    assert!(snapshot.average_response_time_seconds >= 0.0);
}

#[tokio::test]
async fn notification_without_id_still_gets_reply_envelope() {
    let env = TestEnv::new();
    let server = server(&env);

    let response = roundtrip(
        &server,
        json!({ "jsonrpc": "2.0", "method": "resources/list" }),
    )
    .await;
    assert_eq!(response["id"], Value::Null);
    assert_eq!(response["result"]["resources"], json!([]));
}
