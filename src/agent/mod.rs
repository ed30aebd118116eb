//! The agent facade: supervision, reasoning, and response shaping.

pub mod goal;
pub mod reasoning;
pub mod selector;
pub mod supervisor;

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::llm::{LlmRole, LlmRouter};
use crate::tools::{register_fs_tools, QuestionTool, ToolRegistry};
use crate::workspace::Workspace;

use goal::GoalCompliance;
use reasoning::{ReasoningLoop, ReasoningStep};
use selector::ToolSelector;
use supervisor::{ModerationRequest, Supervisor};

/// Structured response emitted for every processed query.
#[derive(Debug, Serialize)]
pub struct AgentResponse {
    pub conversation_id: String,
    pub response: String,
    pub tools_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_steps: Option<Vec<ReasoningStep>>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_compliance: Option<GoalCompliance>,
}

/// Orchestrates Supervisor → Reasoning Loop → response shaping.
pub struct FileAgent {
    supervisor: Supervisor,
    reasoning: ReasoningLoop,
    config: AgentConfig,
}

impl FileAgent {
    /// Wires the agent against a workspace and LLM router.
    ///
    /// The tool registry is populated from the workspace factory plus the
    /// analysis tool (when an analysis-role model resolves). The supervisor
    /// and selector degrade gracefully to rule-based behavior when their
    /// role models are unavailable.
    pub fn new(
        workspace: Arc<Workspace>,
        router: &LlmRouter,
        config: AgentConfig,
    ) -> Result<(Self, Arc<ToolRegistry>)> {
        let agent_model = router.bind(LlmRole::Agent)?;

        let mut registry = ToolRegistry::new();
        register_fs_tools(&mut registry, &workspace);
        match router.bind(LlmRole::FileAnalysis) {
            Ok(analysis_model) => {
                registry.register(Arc::new(QuestionTool::new(
                    Arc::clone(&workspace),
                    analysis_model,
                    config.max_files,
                    config.max_content_per_file,
                )));
            }
            Err(e) => {
                tracing::warn!(error = %e, "analysis tool disabled: no analysis-role model");
            }
        }
        let registry = Arc::new(registry);

        let supervisor = Supervisor::new(router.bind(LlmRole::Supervisor).ok());
        let selector = router.bind(LlmRole::Orchestrator).ok().map(ToolSelector::new);

        let reasoning = ReasoningLoop::new(
            agent_model,
            Arc::clone(&registry),
            selector,
            workspace.root().display().to_string(),
            config.max_iterations,
        );

        tracing::info!(
            workspace = %workspace.root().display(),
            max_iterations = config.max_iterations,
            debug_mode = config.debug_mode,
            "agent initialized"
        );

        Ok((
            Self {
                supervisor,
                reasoning,
                config,
            },
            registry,
        ))
    }

    /// Composes an agent from already-built parts. Hosts and tests use
    /// this to inject their own supervisor or model wiring.
    #[must_use]
    pub fn from_parts(
        supervisor: Supervisor,
        reasoning: ReasoningLoop,
        config: AgentConfig,
    ) -> Self {
        Self {
            supervisor,
            reasoning,
            config,
        }
    }

    /// Processes one query end to end.
    pub async fn process_query(
        &self,
        user_query: &str,
        conversation_id: Option<String>,
    ) -> AgentResponse {
        self.process_query_with_context(user_query, conversation_id, None, &CancellationToken::new())
            .await
    }

    /// Full-control variant: optional conversation context (consumed only
    /// by the supervisor's follow-up expansion) and a cancellation token.
    pub async fn process_query_with_context(
        &self,
        user_query: &str,
        conversation_id: Option<String>,
        conversation_context: Option<String>,
        cancel: &CancellationToken,
    ) -> AgentResponse {
        let conversation_id = conversation_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        tracing::info!(conversation_id = %conversation_id, query_len = user_query.len(), "processing query");

        let moderation_request = ModerationRequest::new(user_query, conversation_id.clone())
            .with_context(conversation_context);
        let moderation = self.supervisor.moderate(&moderation_request).await;

        if !moderation.allowed {
            return AgentResponse {
                conversation_id,
                response: moderation.reason,
                tools_used: Vec::new(),
                reasoning_steps: None,
                success: false,
                error_message: Some(
                    AgentError::SafetyViolation(moderation.risk_factors.join(", ")).to_string(),
                ),
                goal: None,
                goal_compliance: None,
            };
        }

        let outcome = self.reasoning.run(user_query, cancel).await;

        AgentResponse {
            conversation_id,
            response: outcome.response,
            tools_used: outcome.tools_used,
            reasoning_steps: if self.config.debug_mode {
                Some(outcome.steps)
            } else {
                None
            },
            success: outcome.success,
            error_message: outcome.error,
            goal: outcome.goal,
            goal_compliance: outcome.compliance,
        }
    }

    /// Renders a typed error the way the protocol surfaces it.
    #[must_use]
    pub fn render_error(&self, error: &AgentError) -> String {
        error.render_user(self.config.debug_mode)
    }

    #[must_use]
    pub fn debug_mode(&self) -> bool {
        self.config.debug_mode
    }
}
