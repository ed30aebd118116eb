//! Tool catalog and execution.
//!
//! Tools are values with self-describing metadata: name, description,
//! parameter table and usage examples. Consumers (reasoning loop, tool
//! selector, protocol adapter) render prompts and wire schemas from that
//! metadata; nothing about a tool is hard-coded outside its own
//! implementation.

mod analysis;
mod fs;

pub use analysis::QuestionTool;
pub use fs::register_fs_tools;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::{AgentError, Result};

/// JSON object used for tool arguments.
pub type JsonMap = Map<String, Value>;

/// Deadline applied to every tool invocation.
pub const TOOL_DEADLINE: Duration = Duration::from_secs(30);

/// Sentinel filename the LLM may pass to `read_file`; the executor
/// substitutes the newest file before invoking the tool.
pub const LATEST_FILE: &str = "LATEST_FILE";

/// One declared tool parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: &'static str,
    pub required: bool,
    pub description: &'static str,
}

/// Self-describing tool metadata. Immutable for the process lifetime.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub examples: &'static [&'static str],
    /// Whether the tool is surfaced over JSON-RPC `tools/list`. Internal
    /// agent tools stay callable by the reasoning loop but off the wire.
    pub exposed: bool,
}

impl ToolSpec {
    /// Renders the parameter schema as a JSON-Schema draft-07 subset object.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in self.params {
            properties.insert(
                p.name.to_string(),
                json!({ "type": p.ty, "description": p.description }),
            );
            if p.required {
                required.push(Value::String(p.name.to_string()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// One-line rendering for the reasoning prompt's tool catalog.
    #[must_use]
    pub fn catalog_line(&self) -> String {
        if self.params.is_empty() {
            format!("- {}: {}", self.name, self.description)
        } else {
            let args: Vec<&str> = self.params.iter().map(|p| p.name).collect();
            format!(
                "- {}: {} (args: {})",
                self.name,
                self.description,
                args.join(", ")
            )
        }
    }
}

/// A tool: metadata plus an async invocation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    /// Invokes the tool with validated arguments, returning its textual
    /// result. Workspace failures propagate verbatim as typed errors.
    async fn invoke(&self, args: &JsonMap) -> Result<String>;
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable catalog of tools keyed by name.
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Registers a tool. Last registration wins on name collision.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.spec().name, tool);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    /// All tool specs, sorted by name.
    #[must_use]
    pub fn specs(&self) -> Vec<&ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    /// Specs surfaced over JSON-RPC.
    #[must_use]
    pub fn exposed_specs(&self) -> Vec<&ToolSpec> {
        self.tools
            .values()
            .map(|t| t.spec())
            .filter(|s| s.exposed)
            .collect()
    }

    /// Multi-line tool catalog for the consolidated prompt.
    #[must_use]
    pub fn catalog(&self) -> String {
        self.tools
            .values()
            .map(|t| t.spec().catalog_line())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Invocation plumbing
// ============================================================================

/// A tool call produced by the reasoning loop or the protocol adapter.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: JsonMap,
}

/// The coerced result of a tool call.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    #[must_use]
    pub fn ok(content: String) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    #[must_use]
    pub fn error(content: String) -> Self {
        Self {
            content,
            is_error: true,
        }
    }
}

/// Per-request scratchpad shared across a request's tool chain.
///
/// Created fresh per top-level request and discarded at request end.
#[derive(Debug, Default)]
pub struct ToolChainContext {
    pub tool_outputs: BTreeMap<String, String>,
    pub file_content_cache: BTreeMap<String, String>,
    pub discovered_files: Vec<String>,
    pub operation_history: Vec<String>,
}

impl ToolChainContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a tool's output and a trimmed history entry.
    pub fn add_tool_output(&mut self, tool_name: &str, output: &str) {
        self.tool_outputs
            .insert(tool_name.to_string(), output.to_string());
        let trimmed: String = output.chars().take(100).collect();
        self.operation_history
            .push(format!("{tool_name}: {trimmed}..."));
    }

    pub fn cache_file_content(&mut self, filename: &str, content: &str) {
        self.file_content_cache
            .insert(filename.to_string(), content.to_string());
    }

    /// The last 10 discovered filenames.
    #[must_use]
    pub fn recent_files(&self) -> &[String] {
        let len = self.discovered_files.len();
        &self.discovered_files[len.saturating_sub(10)..]
    }

    /// Summary injected into the consolidated prompt.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.discovered_files.is_empty() {
            parts.push(format!("Files discovered: {}", self.recent_files().join(", ")));
        }
        if !self.tool_outputs.is_empty() {
            let recent: Vec<&str> = self
                .operation_history
                .iter()
                .rev()
                .take(3)
                .map(|s| s.split(':').next().unwrap_or(s))
                .collect();
            parts.push(format!("Recent tools used: {}", recent.join(", ")));
        }
        if parts.is_empty() {
            "No context available".to_string()
        } else {
            parts.join("; ")
        }
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Invokes tools by name with validated arguments and bookkeeping.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    deadline: Duration,
}

impl ToolExecutor {
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            deadline: TOOL_DEADLINE,
        }
    }

    #[must_use]
    pub fn with_deadline(registry: Arc<ToolRegistry>, deadline: Duration) -> Self {
        Self { registry, deadline }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Executes an invocation, coercing failures into `ToolResult` text so
    /// the reasoning loop can observe them and plan recovery.
    pub async fn execute(
        &self,
        invocation: &ToolInvocation,
        context: &mut ToolChainContext,
    ) -> ToolResult {
        match self.try_execute(invocation, context).await {
            Ok(output) => ToolResult::ok(output),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    /// Executes an invocation, propagating typed errors. Used by the
    /// protocol adapter where error codes matter.
    pub async fn try_execute(
        &self,
        invocation: &ToolInvocation,
        context: &mut ToolChainContext,
    ) -> Result<String> {
        let tool = self
            .registry
            .get(&invocation.tool_name)
            .ok_or_else(|| AgentError::ToolNotFound(invocation.tool_name.clone()))?
            .clone();
        let spec = tool.spec();

        let mut args = invocation.arguments.clone();
        self.resolve_latest_file(spec.name, &mut args, context)
            .await?;
        validate_args(spec, &args)?;

        let output = match tokio::time::timeout(self.deadline, tool.invoke(&args)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AgentError::ToolExecution {
                    tool: spec.name.to_string(),
                    message: format!("timed out after {}s", self.deadline.as_secs()),
                    timed_out: true,
                })
            }
        };

        self.update_context(spec.name, &args, &output, context);
        Ok(output)
    }

    /// Substitutes the newest filename for the `LATEST_FILE` sentinel.
    async fn resolve_latest_file(
        &self,
        tool_name: &str,
        args: &mut JsonMap,
        context: &mut ToolChainContext,
    ) -> Result<()> {
        if tool_name != "read_file" {
            return Ok(());
        }
        let wants_latest = args
            .get("filename")
            .and_then(Value::as_str)
            .is_some_and(|f| f == LATEST_FILE);
        if !wants_latest {
            return Ok(());
        }

        if let Some(latest) = context.discovered_files.first().cloned() {
            tracing::info!(filename = %latest, "resolved LATEST_FILE from context");
            args.insert("filename".into(), Value::String(latest));
            return Ok(());
        }

        let list = self
            .registry
            .get("list_files")
            .ok_or_else(|| AgentError::ToolNotFound("list_files".into()))?
            .clone();
        let listing = list.invoke(&JsonMap::new()).await?;
        let files: Vec<String> = listing
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("No files"))
            .map(String::from)
            .collect();
        let Some(latest) = files.first().cloned() else {
            return Err(AgentError::ToolArgument(
                "no files found in workspace to resolve LATEST_FILE".to_string(),
            ));
        };
        context.discovered_files.extend(files);
        tracing::info!(filename = %latest, "resolved LATEST_FILE by listing");
        args.insert("filename".into(), Value::String(latest));
        Ok(())
    }

    /// Post-execution bookkeeping: listings feed discovery, reads feed the
    /// content cache, every call lands in the operation history.
    fn update_context(
        &self,
        tool_name: &str,
        args: &JsonMap,
        output: &str,
        context: &mut ToolChainContext,
    ) {
        match tool_name {
            "list_files" | "list_all" | "list_files_recursive" => {
                let files = output
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with("No files"))
                    .map(String::from);
                context.discovered_files.extend(files);
            }
            "read_file" | "read_file_by_path" => {
                if let Some(name) = args.get("filename").and_then(Value::as_str) {
                    context.cache_file_content(name, output);
                } else if let Some(path) = args.get("path").and_then(Value::as_str) {
                    context.cache_file_content(path, output);
                }
            }
            _ => {}
        }
        context.add_tool_output(tool_name, output);
    }
}

/// Checks that every required parameter is present and of roughly the
/// declared type. Unknown extra arguments are tolerated (the LLM sometimes
/// adds them) and ignored by the tools.
fn validate_args(spec: &ToolSpec, args: &JsonMap) -> Result<()> {
    for p in spec.params.iter().filter(|p| p.required) {
        let value = args.get(p.name).ok_or_else(|| {
            AgentError::ToolArgument(format!(
                "tool '{}' requires parameter '{}'",
                spec.name, p.name
            ))
        })?;
        let ok = match p.ty {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            _ => true,
        };
        if !ok {
            return Err(AgentError::ToolArgument(format!(
                "parameter '{}' of tool '{}' must be a {}",
                p.name, spec.name, p.ty
            )));
        }
    }
    Ok(())
}
