//! Common test utilities for fileward integration tests.
//!
//! Provides `TestEnv` for isolated workspace/registry setups and
//! `ScriptedLlm`, a completion client that replays canned replies while
//! recording every prompt it receives.

#![allow(dead_code)] // Test utilities may not all be used in every test file

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fileward::agent::reasoning::ReasoningLoop;
use fileward::agent::supervisor::Supervisor;
use fileward::agent::FileAgent;
use fileward::config::AgentConfig;
use fileward::llm::{BoundModel, ChatRequest, ChatResponse, LlmClient, LlmError};
use fileward::tools::{register_fs_tools, ToolRegistry};
use fileward::workspace::{FsLimits, Workspace};
use tempfile::TempDir;

/// An isolated workspace with a fully registered tool catalog.
pub struct TestEnv {
    pub dir: TempDir,
    pub ws: Arc<Workspace>,
    pub registry: Arc<ToolRegistry>,
}

impl TestEnv {
    /// Creates an empty environment with default limits.
    pub fn new() -> Self {
        Self::with_limits(FsLimits::default())
    }

    /// Creates an environment with custom limits.
    pub fn with_limits(limits: FsLimits) -> Self {
        let dir = TempDir::new().expect("failed to create temp directory");
        let ws =
            Arc::new(Workspace::open(dir.path(), limits).expect("failed to open workspace"));
        let mut registry = ToolRegistry::new();
        register_fs_tools(&mut registry, &ws);
        Self {
            dir,
            ws,
            registry: Arc::new(registry),
        }
    }

    /// Writes a file directly (bypassing the rate limiter) for setup.
    pub fn write_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent directories");
        }
        std::fs::write(&path, content).expect("failed to write test file");
        // Filesystem mtime resolution can collapse rapid writes into ties;
        // a short pause keeps newest-first ordering observable.
        std::thread::sleep(std::time::Duration::from_millis(15));
    }

    /// Creates a directory directly for setup.
    pub fn mkdir(&self, name: &str) {
        std::fs::create_dir_all(self.dir.path().join(name)).expect("failed to create directory");
        std::thread::sleep(std::time::Duration::from_millis(15));
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// A completion client that replays canned replies in order.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(replies: impl IntoIterator<Item = String>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Every prompt the client has seen, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of completions served so far.
    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let prompt = request
            .messages
            .first()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt);
        match self.replies.lock().unwrap().pop_front() {
            Some(text) => Ok(ChatResponse { text }),
            None => Err(LlmError::InvalidResponse("script exhausted".to_string())),
        }
    }
}

/// Wraps a scripted client as a bound model.
pub fn scripted_model(client: &Arc<ScriptedLlm>) -> BoundModel {
    BoundModel {
        client: Arc::clone(client) as Arc<dyn LlmClient>,
        model: "scripted".to_string(),
    }
}

/// Builds a full agent whose reasoning model replays `replies`. The
/// supervisor runs rule-based (no model), so scripted replies are consumed
/// by the reasoning loop only.
pub fn scripted_agent(
    env: &TestEnv,
    replies: impl IntoIterator<Item = String>,
    debug_mode: bool,
) -> (FileAgent, Arc<ScriptedLlm>) {
    let client = ScriptedLlm::new(replies);
    let reasoning = ReasoningLoop::new(
        scripted_model(&client),
        Arc::clone(&env.registry),
        None,
        env.ws.root().display().to_string(),
        10,
    );
    let config = AgentConfig {
        debug_mode,
        ..AgentConfig::default()
    };
    let agent = FileAgent::from_parts(Supervisor::new(None), reasoning, config);
    (agent, client)
}

/// A consolidated reply that invokes a tool and keeps reasoning.
pub fn tool_step(tool: &str, args: serde_json::Value, goal: &str) -> String {
    serde_json::json!({
        "thinking": format!("I should call {tool} next."),
        "goal": goal,
        "tool_name": tool,
        "tool_args": args,
        "continue_reasoning": true,
        "final_response": null,
        "confidence": 0.9,
    })
    .to_string()
}

/// A consolidated reply that ends the loop with a final answer.
pub fn final_step(text: &str) -> String {
    serde_json::json!({
        "thinking": "I have everything I need to answer.",
        "tool_name": null,
        "continue_reasoning": false,
        "final_response": text,
        "confidence": 0.9,
    })
    .to_string()
}

/// A consolidated reply that invokes a tool and stops afterwards.
pub fn last_tool_step(tool: &str, args: serde_json::Value, goal: &str) -> String {
    serde_json::json!({
        "thinking": format!("One final call to {tool} completes the request."),
        "goal": goal,
        "tool_name": tool,
        "tool_args": args,
        "continue_reasoning": false,
        "final_response": null,
        "confidence": 0.9,
    })
    .to_string()
}
