//! LLM-backed file analysis tool.
//!
//! Reads a bounded sample of workspace files and asks the analysis-role
//! model to answer a question about them. The file bodies are wrapped in
//! `=== <path> ===` headers so the model can attribute content to files.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::llm::BoundModel;
use crate::workspace::Workspace;

use super::{JsonMap, ParamSpec, Tool, ToolSpec};

const QUESTION_SPEC: ToolSpec = ToolSpec {
    name: "answer_question_about_files",
    description: "Answer a question about the content of workspace files using AI analysis",
    params: &[ParamSpec {
        name: "query",
        ty: "string",
        required: true,
        description: "The question to answer about the files",
    }],
    examples: &["what do these files have in common?", "summarize the project"],
    exposed: true,
};

const ANALYSIS_SYSTEM_PROMPT: &str = "You are a file analysis assistant. You are given the \
contents of files from a user's workspace and a question about them. Answer the question \
based only on the provided file contents. Be concise and specific; name the files you draw \
your answer from.";

/// Collects up to `max_files` file bodies, each truncated to
/// `max_content_per_file` characters, with `=== path ===` headers.
fn collect_sample(ws: &Workspace, max_files: usize, max_content_per_file: usize) -> Result<String> {
    let sections: Vec<String> = ws
        .sample_files(max_files, max_content_per_file)?
        .into_iter()
        .map(|(rel, content)| format!("=== {rel} ===\n{content}"))
        .collect();
    Ok(sections.join("\n\n"))
}

/// Tool that synthesizes an answer from recursively sampled file contents.
pub struct QuestionTool {
    ws: Arc<Workspace>,
    model: BoundModel,
    max_files: usize,
    max_content_per_file: usize,
}

impl QuestionTool {
    #[must_use]
    pub fn new(
        ws: Arc<Workspace>,
        model: BoundModel,
        max_files: usize,
        max_content_per_file: usize,
    ) -> Self {
        Self {
            ws,
            model,
            max_files,
            max_content_per_file,
        }
    }
}

#[async_trait]
impl Tool for QuestionTool {
    fn spec(&self) -> &ToolSpec {
        &QUESTION_SPEC
    }

    async fn invoke(&self, args: &JsonMap) -> Result<String> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AgentError::ToolArgument(
                    "tool 'answer_question_about_files' requires string parameter 'query'"
                        .to_string(),
                )
            })?
            .to_string();

        let ws = Arc::clone(&self.ws);
        let max_files = self.max_files;
        let max_content = self.max_content_per_file;
        let sample =
            tokio::task::spawn_blocking(move || collect_sample(&ws, max_files, max_content))
                .await
                .map_err(|e| AgentError::Reasoning(format!("task failed: {e}")))??;

        if sample.is_empty() {
            return Ok("The workspace contains no readable files to analyze.".to_string());
        }

        let prompt = format!("Files from the workspace:\n\n{sample}\n\nQuestion: {query}\n\nAnswer:");
        let answer = self
            .model
            .prompt(Some(ANALYSIS_SYSTEM_PROMPT.to_string()), prompt)
            .await?;
        Ok(answer.trim().to_string())
    }
}
