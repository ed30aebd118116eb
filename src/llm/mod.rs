//! LLM provider clients and role-based model routing.
//!
//! The agent never talks to a provider directly: every consumer receives an
//! injected [`LlmClient`] trait object resolved through a role mapping
//! (`agent`, `supervisor`, `file_analysis`, `orchestrator`). Provider
//! selection is gated on API-key presence, with the fallback order
//! Gemini → Anthropic → OpenAI.

mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AgentError;

/// Default per-call HTTP timeout. The reasoning loop applies its own 60 s
/// deadline on top; this bounds a single hung connection.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from provider clients.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("missing API key")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl From<LlmError> for AgentError {
    fn from(err: LlmError) -> Self {
        AgentError::Reasoning(err.to_string())
    }
}

/// Chat roles on the provider wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: text.into(),
        }
    }
}

/// A single completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatRequest {
    /// A one-shot prompt with an optional system preamble.
    pub fn prompt(model: impl Into<String>, system: Option<String>, user: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system,
            messages: vec![ChatMessage::user(user)],
            max_tokens: 2048,
            temperature: 0.2,
        }
    }
}

/// A completion response, reduced to its text content.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
}

/// Object-safe completion client.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;
}

// ============================================================================
// Providers and model references
// ============================================================================

/// Supported providers, in fallback preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Provider {
    Gemini,
    Anthropic,
    OpenAi,
}

impl Provider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    /// The small, inexpensive model used when a role has no explicit
    /// configuration.
    #[must_use]
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-1.5-flash",
            Self::Anthropic => "claude-3-haiku-20240307",
            Self::OpenAi => "gpt-4o-mini",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gemini" | "google" => Ok(Self::Gemini),
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(AgentError::ModelConfig(format!(
                "unknown provider '{other}'"
            ))),
        }
    }
}

/// A `provider:model` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub provider: Provider,
    pub model: String,
}

impl std::str::FromStr for ModelRef {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (provider, model) = s.split_once(':').ok_or_else(|| {
            AgentError::ModelConfig(format!("model reference '{s}' is not provider:model"))
        })?;
        if model.trim().is_empty() {
            return Err(AgentError::ModelConfig(format!(
                "model reference '{s}' has an empty model name"
            )));
        }
        Ok(Self {
            provider: provider.parse()?,
            model: model.to_string(),
        })
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.provider.as_str(), self.model)
    }
}

/// The roles the core resolves models for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LlmRole {
    /// Main reasoning loop.
    Agent,
    /// Moderation and intent extraction (lightweight model).
    Supervisor,
    /// The answer_question_about_files tool.
    FileAnalysis,
    /// Auxiliary reasoning channel (tool selector).
    Orchestrator,
}

impl LlmRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Supervisor => "supervisor",
            Self::FileAnalysis => "file_analysis",
            Self::Orchestrator => "orchestrator",
        }
    }
}

/// API keys read from the environment.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub gemini: Option<String>,
    pub anthropic: Option<String>,
    pub openai: Option<String>,
}

impl ApiKeys {
    /// Reads `GEMINI_API_KEY`, `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`.
    #[must_use]
    pub fn from_env() -> Self {
        fn non_empty(var: &str) -> Option<String> {
            std::env::var(var).ok().filter(|v| !v.trim().is_empty())
        }
        Self {
            gemini: non_empty("GEMINI_API_KEY"),
            anthropic: non_empty("ANTHROPIC_API_KEY"),
            openai: non_empty("OPENAI_API_KEY"),
        }
    }

    #[must_use]
    pub fn key_for(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Gemini => self.gemini.as_deref(),
            Provider::Anthropic => self.anthropic.as_deref(),
            Provider::OpenAi => self.openai.as_deref(),
        }
    }

    /// The first provider with a configured key, in Gemini → Anthropic →
    /// OpenAI order.
    #[must_use]
    pub fn first_available(&self) -> Option<Provider> {
        [Provider::Gemini, Provider::Anthropic, Provider::OpenAi]
            .into_iter()
            .find(|p| self.key_for(*p).is_some())
    }
}

/// A resolved client plus the model name to pass in requests.
#[derive(Clone)]
pub struct BoundModel {
    pub client: Arc<dyn LlmClient>,
    pub model: String,
}

impl BoundModel {
    /// One-shot convenience used throughout the agent.
    pub async fn prompt(
        &self,
        system: Option<String>,
        user: impl Into<String>,
    ) -> Result<String, LlmError> {
        let request = ChatRequest::prompt(self.model.clone(), system, user);
        Ok(self.client.complete(request).await?.text)
    }
}

/// Role → model router. Immutable after construction.
pub struct LlmRouter {
    keys: ApiKeys,
    roles: BTreeMap<&'static str, ModelRef>,
}

impl LlmRouter {
    /// Builds a router from explicit role assignments; unassigned roles fall
    /// back to the first provider with an API key and its default model.
    #[must_use]
    pub fn new(keys: ApiKeys, roles: BTreeMap<&'static str, ModelRef>) -> Self {
        Self { keys, roles }
    }

    /// Router with no explicit assignments (pure key-gated fallback).
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(ApiKeys::from_env(), BTreeMap::new())
    }

    #[must_use]
    pub fn keys(&self) -> &ApiKeys {
        &self.keys
    }

    /// Resolves the model reference for a role without building a client.
    pub fn model_for(&self, role: LlmRole) -> crate::error::Result<ModelRef> {
        if let Some(m) = self.roles.get(role.as_str()) {
            return Ok(m.clone());
        }
        // The orchestrator channel shadows the supervisor assignment when it
        // has none of its own.
        if role == LlmRole::Orchestrator {
            if let Some(m) = self.roles.get(LlmRole::Supervisor.as_str()) {
                return Ok(m.clone());
            }
        }
        let provider = self.keys.first_available().ok_or_else(|| {
            AgentError::ModelConfig(
                "no LLM API keys found; set GEMINI_API_KEY, ANTHROPIC_API_KEY, or OPENAI_API_KEY"
                    .to_string(),
            )
        })?;
        Ok(ModelRef {
            provider,
            model: provider.default_model().to_string(),
        })
    }

    /// Resolves a role to a ready-to-use client + model pair.
    pub fn bind(&self, role: LlmRole) -> crate::error::Result<BoundModel> {
        let model_ref = self.model_for(role)?;
        let client = self.client_for(model_ref.provider)?;
        Ok(BoundModel {
            client,
            model: model_ref.model,
        })
    }

    /// Builds a provider client, failing when its key is absent.
    pub fn client_for(&self, provider: Provider) -> crate::error::Result<Arc<dyn LlmClient>> {
        let key = self.keys.key_for(provider).ok_or_else(|| {
            AgentError::ModelConfig(format!(
                "no API key configured for provider '{}'",
                provider.as_str()
            ))
        })?;
        let client: Arc<dyn LlmClient> = match provider {
            Provider::Gemini => Arc::new(
                GeminiClient::new(key.to_string()).map_err(|e| AgentError::ModelConfig(e.to_string()))?,
            ),
            Provider::Anthropic => Arc::new(
                AnthropicClient::new(key.to_string())
                    .map_err(|e| AgentError::ModelConfig(e.to_string()))?,
            ),
            Provider::OpenAi => Arc::new(
                OpenAiClient::new(key.to_string()).map_err(|e| AgentError::ModelConfig(e.to_string()))?,
            ),
        };
        Ok(client)
    }
}
