//! OpenAI chat-completions client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use super::{ChatRequest, ChatResponse, LlmClient, LlmError, MessageRole, REQUEST_TIMEOUT};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Client for the OpenAI chat completions endpoint.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_base: String,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Self::with_base(api_key, DEFAULT_API_BASE.to_string())
    }

    pub fn with_base(api_key: String, api_base: String) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|e| LlmError::InvalidResponse(format!("invalid API key header: {e}")))?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, api_base })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

fn build_body(request: &ChatRequest) -> Value {
    let mut messages: Vec<Value> = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for m in &request.messages {
        let role = match m.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        messages.push(json!({ "role": role, "content": m.content }));
    }
    json!({
        "model": request.model,
        "messages": messages,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    })
}

fn parse_response(raw: &str) -> Result<ChatResponse, LlmError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| LlmError::InvalidResponse(format!("non-JSON reply: {e}")))?;
    let text = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if text.is_empty() {
        return Err(LlmError::InvalidResponse(
            "reply contained no message content".to_string(),
        ));
    }
    Ok(ChatResponse { text })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let body = build_body(&request);
        let response = self
            .client
            .post(self.completions_url())
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: raw,
            });
        }
        parse_response(&raw)
    }
}
