//! Error types for fileward.
//!
//! Uses thiserror for ergonomic error handling with proper
//! error chain propagation. Every error carries a machine-readable
//! code and a list of recovery suggestions that the protocol adapter
//! renders for the client.

use thiserror::Error;

/// Errors raised by the sandboxed workspace primitives.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("path traversal blocked: '{attempted}' escapes the workspace root")]
    PathTraversal { attempted: String },

    #[error("symlink denied: '{path}' is or traverses a symbolic link")]
    Symlink { path: String },

    #[error("{operation} size limit exceeded: {actual} bytes (limit {limit} bytes)")]
    SizeLimitExceeded {
        operation: &'static str,
        actual: u64,
        limit: u64,
    },

    #[error("invalid write mode '{mode}' (expected 'overwrite' or 'append')")]
    InvalidMode { mode: String },

    #[error("rate limit exceeded: {current} operations in the last second (limit {limit})")]
    RateLimit { current: usize, limit: usize },

    #[error("file not found: {name}")]
    FileNotFound { name: String },

    #[error("invalid filename '{name}': {reason}")]
    InvalidFilename { name: String, reason: &'static str },

    #[error("workspace error: {0}")]
    Other(String),
}

impl WorkspaceError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathTraversal { .. } => "PATH_TRAVERSAL",
            Self::Symlink { .. } => "SYMLINK_DENIED",
            Self::SizeLimitExceeded { .. } => "SIZE_LIMIT_EXCEEDED",
            Self::InvalidMode { .. } => "INVALID_MODE",
            Self::RateLimit { .. } => "RATE_LIMIT_EXCEEDED",
            Self::FileNotFound { .. } => "FILE_NOT_FOUND",
            Self::InvalidFilename { .. } => "INVALID_FILENAME",
            Self::Other(_) => "WORKSPACE_ERROR",
        }
    }

    /// Actionable recovery steps shown to the client alongside the message.
    #[must_use]
    pub fn recovery_suggestions(&self) -> &'static [&'static str] {
        match self {
            Self::PathTraversal { .. } | Self::InvalidFilename { .. } => &[
                "Use simple filenames without path separators",
                "Work only within the assigned workspace",
            ],
            Self::Symlink { .. } => &[
                "Operate on regular files and directories only",
                "Remove the symbolic link from the workspace",
            ],
            Self::SizeLimitExceeded { .. } => &[
                "Split the content into smaller files",
                "Raise the configured size limit if this is intentional",
            ],
            Self::InvalidMode { .. } => &["Use 'overwrite' to replace or 'append' to extend a file"],
            Self::RateLimit { .. } => &[
                "Wait a moment before retrying",
                "Batch related operations into fewer calls",
            ],
            Self::FileNotFound { .. } => &[
                "List the workspace to see which files exist",
                "Check the filename for typos",
            ],
            Self::Other(_) => &["Retry the operation", "Check workspace permissions"],
        }
    }
}

/// Top-level agent error taxonomy.
///
/// This is a closed set: every failure the pipeline can surface maps to
/// exactly one of these kinds. Workspace errors are nested verbatim so the
/// reasoning loop can show the LLM the precise tool failure.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent initialization failed: {0}")]
    Init(String),

    #[error("model configuration error: {0}")]
    ModelConfig(String),

    #[error("tool '{tool}' failed: {message}")]
    ToolExecution {
        tool: String,
        message: String,
        timed_out: bool,
    },

    #[error("reasoning failed: {0}")]
    Reasoning(String),

    #[error("request blocked by safety policy: {0}")]
    SafetyViolation(String),

    #[error("conversation error: {0}")]
    Conversation(String),

    #[error("unknown tool: {0}")]
    ToolNotFound(String),

    #[error("invalid tool arguments: {0}")]
    ToolArgument(String),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

impl AgentError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Init(_) => "AGENT_INIT_FAILED",
            Self::ModelConfig(_) => "MODEL_CONFIG_ERROR",
            Self::ToolExecution {
                timed_out: true, ..
            } => "TOOL_TIMEOUT",
            Self::ToolExecution { .. } => "TOOL_EXECUTION_FAILED",
            Self::Reasoning(_) => "REASONING_ERROR",
            Self::SafetyViolation(_) => "SAFETY_VIOLATION",
            Self::Conversation(_) => "CONVERSATION_ERROR",
            Self::ToolNotFound(_) => "TOOL_NOT_FOUND",
            Self::ToolArgument(_) => "TOOL_ARGUMENT_ERROR",
            Self::Workspace(e) => e.code(),
        }
    }

    /// Actionable recovery steps for the user-facing rendering.
    #[must_use]
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Init(_) => vec![
                "Check workspace path permissions",
                "Verify model configuration",
                "Review environment variables and API keys",
            ],
            Self::ModelConfig(_) => vec![
                "Verify API keys are properly configured",
                "Ensure the model is available for the configured provider",
                "Try a different provider or model",
            ],
            Self::ToolExecution {
                timed_out: true, ..
            } => vec![
                "Retry the operation",
                "Reduce the amount of data the tool has to process",
            ],
            Self::ToolExecution { .. } => vec![
                "Verify the tool arguments are correct",
                "Check that the referenced files exist",
                "Try with different parameters",
            ],
            Self::Reasoning(_) => vec![
                "Rephrase the request more specifically",
                "Break a complex request into smaller steps",
            ],
            Self::SafetyViolation(_) => vec![
                "Ask about reading, writing, or analyzing workspace files",
                "Avoid system commands and paths outside the workspace",
            ],
            Self::Conversation(_) => vec!["Start a new conversation and retry"],
            Self::ToolNotFound(_) => vec![
                "Use tools/list to see the available tools",
                "Check the tool name for typos",
            ],
            Self::ToolArgument(_) => vec![
                "Check the tool's parameter schema",
                "Supply every required parameter",
            ],
            Self::Workspace(e) => e.recovery_suggestions().to_vec(),
        }
    }

    /// Whether the failure is something the caller can fix by changing
    /// the request, as opposed to a server-side fault.
    #[must_use]
    pub fn is_client_fixable(&self) -> bool {
        matches!(
            self,
            Self::ToolNotFound(_)
                | Self::ToolArgument(_)
                | Self::SafetyViolation(_)
                | Self::Workspace(_)
        )
    }

    /// Context map included in debug-mode renderings and structured logs.
    #[must_use]
    pub fn context(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        match self {
            Self::ToolExecution {
                tool, timed_out, ..
            } => {
                map.insert("tool_name".into(), tool.clone().into());
                map.insert("timed_out".into(), (*timed_out).into());
            }
            Self::ToolNotFound(name) => {
                map.insert("tool_name".into(), name.clone().into());
            }
            Self::Workspace(WorkspaceError::SizeLimitExceeded {
                operation,
                actual,
                limit,
            }) => {
                map.insert("operation".into(), (*operation).into());
                map.insert("actual_bytes".into(), (*actual).into());
                map.insert("limit_bytes".into(), (*limit).into());
            }
            Self::Workspace(WorkspaceError::RateLimit { current, limit }) => {
                map.insert("current_rate".into(), (*current).into());
                map.insert("limit".into(), (*limit).into());
            }
            _ => {}
        }
        map
    }

    /// Renders the error for end users.
    ///
    /// Debug mode appends the error kind, code and context so operators can
    /// trace failures without reading server logs.
    #[must_use]
    pub fn render_user(&self, debug: bool) -> String {
        let mut out = format!("❌ Error: {self}");
        let suggestions = self.recovery_suggestions();
        if !suggestions.is_empty() {
            out.push_str("\n💡 Suggestions:");
            for (i, s) in suggestions.iter().enumerate() {
                out.push_str(&format!("\n   {}. {s}", i + 1));
            }
        }
        if debug {
            out.push_str(&format!("\n[debug] code={}", self.code()));
            let context = self.context();
            if !context.is_empty() {
                out.push_str(&format!(" context={}", serde_json::Value::Object(context)));
            }
        }
        out
    }
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Result type alias for workspace operations.
pub type WsResult<T> = std::result::Result<T, WorkspaceError>;
