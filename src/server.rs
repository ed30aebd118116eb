//! MCP protocol adapter: JSON-RPC 2.0 over stdio and HTTP.
//!
//! One dispatch serves both transports. Stdio carries one JSON-RPC message
//! per line (responses to stdout, logs to stderr); HTTP accepts one message
//! per `POST /mcp` body and additionally exposes `GET /health` and
//! `GET /metrics`.
//!
//! Error-channel policy: failures the caller can fix (bad arguments,
//! missing files, rate limiting) come back on the tool-result channel with
//! `isError: true` so LLM clients can observe and adapt; server faults use
//! the protocol error channel with an MCP error code.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::AgentError;
use crate::tools::{JsonMap, ToolChainContext, ToolExecutor, ToolInvocation, ToolRegistry};

/// MCP protocol revision implemented by this server.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// JSON-RPC 2.0 error codes, plus the MCP-specific range.
pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const TOOL_ERROR: i64 = -32000;
pub const RESOURCE_ERROR: i64 = -32001;
pub const SECURITY_ERROR: i64 = -32002;
pub const TIMEOUT_ERROR: i64 = -32003;

/// Response-time samples retained for the rolling average.
const RESPONSE_TIME_WINDOW: usize = 1000;

/// Incoming JSON-RPC request envelope.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Outgoing JSON-RPC response envelope.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Debug)]
struct Metrics {
    started: Instant,
    total_requests: u64,
    tool_calls: BTreeMap<String, u64>,
    error_count: u64,
    response_times: VecDeque<f64>,
}

impl Metrics {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            total_requests: 0,
            tool_calls: BTreeMap::new(),
            error_count: 0,
            response_times: VecDeque::with_capacity(RESPONSE_TIME_WINDOW),
        }
    }

    fn record(&mut self, elapsed_seconds: f64, is_error: bool, tool: Option<&str>) {
        self.total_requests += 1;
        if is_error {
            self.error_count += 1;
        }
        if let Some(tool) = tool {
            *self.tool_calls.entry(tool.to_string()).or_insert(0) += 1;
        }
        if self.response_times.len() >= RESPONSE_TIME_WINDOW {
            self.response_times.pop_front();
        }
        self.response_times.push_back(elapsed_seconds);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let average = if self.response_times.is_empty() {
            0.0
        } else {
            self.response_times.iter().sum::<f64>() / self.response_times.len() as f64
        };
        MetricsSnapshot {
            total_requests: self.total_requests,
            tool_calls_by_name: self.tool_calls.clone(),
            error_count: self.error_count,
            average_response_time_seconds: average,
            uptime: self.started.elapsed().as_secs_f64(),
        }
    }
}

/// Counters exposed on `GET /metrics`.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub tool_calls_by_name: BTreeMap<String, u64>,
    pub error_count: u64,
    pub average_response_time_seconds: f64,
    pub uptime: f64,
}

// ============================================================================
// Server
// ============================================================================

/// The protocol adapter over a tool registry.
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    executor: ToolExecutor,
    metrics: Mutex<Metrics>,
}

impl McpServer {
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        let executor = ToolExecutor::new(Arc::clone(&registry));
        Self {
            registry,
            executor,
            metrics: Mutex::new(Metrics::new()),
        }
    }

    /// Handles one raw JSON-RPC message, returning the serialized response.
    ///
    /// Malformed JSON yields `{id: null, error: {code: -32700}}` and the
    /// transport keeps reading.
    pub async fn handle_raw(&self, raw: &str) -> String {
        let response = match serde_json::from_str::<RpcRequest>(raw) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable JSON-RPC message");
                RpcResponse::failure(Value::Null, PARSE_ERROR, format!("Parse error: {e}"))
            }
        };
        serde_json::to_string(&response)
            .unwrap_or_else(|e| format!(r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{INTERNAL_ERROR},"message":"serialization failed: {e}"}}}}"#))
    }

    /// Routes one parsed request and records metrics.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let started = Instant::now();
        let id = request.id.clone().unwrap_or(Value::Null);
        let mut tool_called: Option<String> = None;

        let response = match request.method.as_str() {
            "initialize" => RpcResponse::success(id, self.initialize_result()),
            "tools/list" => RpcResponse::success(id, self.tools_list_result()),
            "tools/call" => {
                let (response, tool) = self.tools_call(id, request.params).await;
                tool_called = tool;
                response
            }
            "resources/list" => RpcResponse::success(id, json!({ "resources": [] })),
            other => RpcResponse::failure(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ),
        };

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(elapsed, response.is_error(), tool_called.as_deref());
        response
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {}, "resources": {} },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    fn tools_list_result(&self) -> Value {
        let tools: Vec<Value> = self
            .registry
            .exposed_specs()
            .iter()
            .map(|spec| {
                json!({
                    "name": spec.name,
                    "description": spec.description,
                    "inputSchema": spec.input_schema(),
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    /// Executes `tools/call`. Returns the response plus the tool name for
    /// metrics attribution.
    async fn tools_call(&self, id: Value, params: Value) -> (RpcResponse, Option<String>) {
        let Some(name) = params.get("name").and_then(Value::as_str).map(String::from) else {
            return (
                RpcResponse::failure(id, INVALID_PARAMS, "missing required parameter 'name'"),
                None,
            );
        };
        let arguments: JsonMap = match params.get("arguments") {
            None | Some(Value::Null) => JsonMap::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return (
                    RpcResponse::failure(id, INVALID_PARAMS, "'arguments' must be an object"),
                    Some(name),
                );
            }
        };

        let invocation = ToolInvocation {
            tool_name: name.clone(),
            arguments,
        };
        // Each wire call is its own request: fresh tool-chain context.
        let mut context = ToolChainContext::new();

        let response = match self.executor.try_execute(&invocation, &mut context).await {
            Ok(output) => RpcResponse::success(id, tool_result(&output, false)),
            Err(e) if e.is_client_fixable() => {
                // LLM-visible error: the caller can adapt and retry.
                RpcResponse::success(id, tool_result(&e.to_string(), true))
            }
            Err(e) => RpcResponse::failure(id, rpc_code_for(&e), e.to_string()),
        };
        (response, Some(name))
    }

    #[must_use]
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }

    #[must_use]
    pub fn uptime_seconds(&self) -> f64 {
        self.metrics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .started
            .elapsed()
            .as_secs_f64()
    }
}

fn tool_result(text: &str, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    })
}

/// Maps server-fault errors onto the MCP error-code range.
fn rpc_code_for(error: &AgentError) -> i64 {
    match error {
        AgentError::ToolExecution {
            timed_out: true, ..
        } => TIMEOUT_ERROR,
        AgentError::SafetyViolation(_) => SECURITY_ERROR,
        AgentError::Conversation(_) => RESOURCE_ERROR,
        AgentError::ToolExecution { .. }
        | AgentError::ToolNotFound(_)
        | AgentError::ToolArgument(_)
        | AgentError::Workspace(_) => TOOL_ERROR,
        AgentError::Init(_) | AgentError::ModelConfig(_) | AgentError::Reasoning(_) => {
            INTERNAL_ERROR
        }
    }
}

// ============================================================================
// Stdio transport
// ============================================================================

/// Serves JSON-RPC over stdin/stdout, one message per line.
///
/// Each request runs on its own task; responses are funneled through a
/// single writer so concurrent completions never interleave bytes.
pub async fn run_stdio(server: Arc<McpServer>) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = rx.recv().await {
            if stdout.write_all(response.as_bytes()).await.is_err() {
                break;
            }
            if stdout.write_all(b"\n").await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let server = Arc::clone(&server);
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = server.handle_raw(&line).await;
            let _ = tx.send(response);
        });
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}

// ============================================================================
// HTTP transport
// ============================================================================

/// Builds the axum router: `POST /mcp`, `GET /health`, `GET /metrics`.
#[must_use]
pub fn http_router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/mcp", post(http_mcp))
        .route("/health", get(http_health))
        .route("/metrics", get(http_metrics))
        .with_state(server)
}

async fn http_mcp(State(server): State<Arc<McpServer>>, body: String) -> impl IntoResponse {
    let payload = server.handle_raw(&body).await;
    (
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        payload,
    )
}

async fn http_health(State(server): State<Arc<McpServer>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "server": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": server.uptime_seconds(),
    }))
}

async fn http_metrics(State(server): State<Arc<McpServer>>) -> Json<MetricsSnapshot> {
    Json(server.metrics_snapshot())
}

/// Binds and serves the HTTP transport until the process exits.
pub async fn run_http(server: Arc<McpServer>, host: &str, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!(%host, port, "HTTP transport listening");
    axum::serve(listener, http_router(server)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::register_fs_tools;
    use crate::workspace::{FsLimits, Workspace};

    fn server() -> (tempfile::TempDir, McpServer) {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "alpha").expect("seed file");
        let ws = Arc::new(Workspace::open(dir.path(), FsLimits::default()).expect("workspace"));
        let mut registry = ToolRegistry::new();
        register_fs_tools(&mut registry, &ws);
        (dir, McpServer::new(Arc::new(registry)))
    }

    fn request(method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".into(),
            id: Some(json!(1)),
            method: method.into(),
            params,
        }
    }

    #[tokio::test]
    async fn initialize_reports_protocol_version() {
        let (_dir, server) = server();
        let response = server.dispatch(request("initialize", Value::Null)).await;
        let result = response.result.expect("result");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert!(result["capabilities"]["tools"].is_object());
        assert_eq!(result["serverInfo"]["name"], "fileward");
    }

    #[tokio::test]
    async fn tools_list_surfaces_only_exposed_tools() {
        let (_dir, server) = server();
        let response = server.dispatch(request("tools/list", Value::Null)).await;
        let tools = response.result.expect("result")["tools"]
            .as_array()
            .expect("array")
            .clone();
        let names: Vec<&str> = tools
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        for expected in [
            "list_files",
            "list_directories",
            "list_all",
            "list_tree",
            "read_file",
            "write_file",
            "delete_file",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
        assert!(!names.contains(&"help"));
        assert!(!names.contains(&"find_largest_file"));
        // Every surfaced tool carries a draft-07 style schema.
        for tool in &tools {
            assert_eq!(tool["inputSchema"]["type"], "object");
        }
    }

    #[tokio::test]
    async fn unknown_method_is_minus_32601() {
        let (_dir, server) = server();
        let response = server.dispatch(request("prompts/list", Value::Null)).await;
        assert_eq!(response.error.expect("error").code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn parse_error_replies_with_null_id() {
        let (_dir, server) = server();
        let raw = server.handle_raw("{not json").await;
        let value: Value = serde_json::from_str(&raw).expect("valid JSON out");
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], json!(PARSE_ERROR));
    }

    #[tokio::test]
    async fn tools_call_reads_file() {
        let (_dir, server) = server();
        let response = server
            .dispatch(request(
                "tools/call",
                json!({ "name": "read_file", "arguments": { "filename": "a.txt" } }),
            ))
            .await;
        let result = response.result.expect("result");
        assert_eq!(result["isError"], json!(false));
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], "alpha");
    }

    #[tokio::test]
    async fn tools_call_missing_file_is_tool_level_error() {
        let (_dir, server) = server();
        let response = server
            .dispatch(request(
                "tools/call",
                json!({ "name": "read_file", "arguments": { "filename": "ghost.txt" } }),
            ))
            .await;
        // Client-fixable: surfaced on the result channel, not the protocol channel.
        let result = response.result.expect("result");
        assert_eq!(result["isError"], json!(true));
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("file not found"));
    }

    #[tokio::test]
    async fn tools_call_without_name_is_invalid_params() {
        let (_dir, server) = server();
        let response = server
            .dispatch(request("tools/call", json!({ "arguments": {} })))
            .await;
        assert_eq!(response.error.expect("error").code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn metrics_count_requests_and_tools() {
        let (_dir, server) = server();
        server.dispatch(request("tools/list", Value::Null)).await;
        server
            .dispatch(request(
                "tools/call",
                json!({ "name": "list_files", "arguments": {} }),
            ))
            .await;
        let snapshot = server.metrics_snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.tool_calls_by_name.get("list_files"), Some(&1));
        assert!(snapshot.average_response_time_seconds >= 0.0);
    }
}
