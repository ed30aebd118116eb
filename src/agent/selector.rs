//! LLM-driven semantic tool selection.
//!
//! The selector runs a short guided reasoning exchange on an auxiliary
//! model channel (three thoughts: decompose intent, evaluate each tool,
//! commit), then extracts the chosen tool from the reasoning text with an
//! ordered pattern list and a mention-scoring fallback. All reasoning is
//! required to be in English regardless of the user's language.

use regex::Regex;
use serde_json::{Map, Value};

use crate::llm::BoundModel;
use crate::tools::ToolRegistry;

/// Result of tool selection analysis.
#[derive(Debug, Clone)]
pub struct SelectorOutcome {
    pub selected_tool: String,
    pub confidence: f32,
    pub reasoning: String,
    pub alternative_tools: Vec<String>,
    pub requires_parameters: bool,
    pub suggested_parameters: Map<String, Value>,
}

/// Context handed to the selector alongside the query.
#[derive(Debug, Clone, Default)]
pub struct SelectorContext {
    pub previous_action: Option<String>,
    pub discovered_files: Vec<String>,
    pub user_language: Option<&'static str>,
}

/// Italian tokens used for the language hint. The hint is context only;
/// thinking stays in English.
const ITALIAN_TOKENS: &[&str] = &["lista", "cartelle", "mostra", "tutti", "leggi", "scrivi"];

/// Detects the user's language heuristically.
#[must_use]
pub fn detect_language(query: &str) -> Option<&'static str> {
    let q = query.to_lowercase();
    if ITALIAN_TOKENS.iter().any(|t| q.contains(t)) {
        Some("Italian")
    } else {
        None
    }
}

/// Safe default when no tool can be determined.
const DEFAULT_TOOL: &str = "help";

/// Semantic tool selector over an auxiliary reasoning channel.
pub struct ToolSelector {
    model: BoundModel,
}

impl ToolSelector {
    #[must_use]
    pub fn new(model: BoundModel) -> Self {
        Self { model }
    }

    /// Selects the most appropriate tool for `user_query`.
    ///
    /// Never fails: any error collapses to the `help` tool at confidence
    /// 0.1 with the error text as reasoning.
    pub async fn select(
        &self,
        user_query: &str,
        registry: &ToolRegistry,
        context: &SelectorContext,
    ) -> SelectorOutcome {
        match self.reason_about_selection(user_query, registry, context).await {
            Ok(reasoning) => parse_reasoning(&reasoning, registry),
            Err(e) => SelectorOutcome {
                selected_tool: DEFAULT_TOOL.to_string(),
                confidence: 0.1,
                reasoning: format!("Error in tool selection: {e}. Falling back to help."),
                alternative_tools: Vec::new(),
                requires_parameters: false,
                suggested_parameters: Map::new(),
            },
        }
    }

    /// Runs the three guided thoughts and concatenates them.
    async fn reason_about_selection(
        &self,
        user_query: &str,
        registry: &ToolRegistry,
        context: &SelectorContext,
    ) -> Result<String, crate::llm::LlmError> {
        let analysis_prompt = build_analysis_prompt(user_query, registry, context);
        let thoughts = [
            analysis_prompt,
            "Based on the user query and available tools, what is the specific intent and \
             what are the requirements? What tool would best serve this intent?"
                .to_string(),
            "Now make the final tool selection decision with a confidence level and reasoning. \
             What is the BEST tool for this query and why?"
                .to_string(),
        ];

        let mut reasoning = String::new();
        for (i, thought) in thoughts.iter().enumerate() {
            let step = self.model.prompt(None, thought.clone()).await?;
            reasoning.push_str(&format!("Step {}: {step}\n\n", i + 1));
        }
        Ok(reasoning)
    }
}

/// Builds the first thought: the full analysis prompt.
fn build_analysis_prompt(
    user_query: &str,
    registry: &ToolRegistry,
    context: &SelectorContext,
) -> String {
    let mut tools_info = String::new();
    for spec in registry.specs() {
        let params: Vec<&str> = spec.params.iter().map(|p| p.name).collect();
        tools_info.push_str(&format!(
            "\n- {}: {}\n  Parameters: {}",
            spec.name,
            spec.description,
            if params.is_empty() {
                "None".to_string()
            } else {
                params.join(", ")
            }
        ));
    }

    let mut context_info = Vec::new();
    if let Some(previous) = &context.previous_action {
        context_info.push(format!("Previous action: {previous}"));
    }
    if !context.discovered_files.is_empty() {
        context_info.push(format!(
            "Known files: {}",
            context.discovered_files.join(", ")
        ));
    }
    if let Some(language) = context.user_language {
        context_info.push(format!("User language: {language}"));
    }
    let context_info = if context_info.is_empty() {
        "No additional context available.".to_string()
    } else {
        context_info.join("\n")
    };

    format!(
        r#"You are an intelligent tool selector for a file system agent. Your task is to analyze a user query and select the most appropriate tool from the available options.

CRITICAL LANGUAGE RULE: ALL of your thinking, reasoning, and analysis must be in ENGLISH ONLY, regardless of the user's query language.

USER QUERY: "{user_query}"

AVAILABLE TOOLS:{tools_info}

CONTEXT:
{context_info}

TASK:
1. Analyze the user's intent from their query (consider both English and Italian)
2. Evaluate each available tool's suitability for this intent
3. Consider the context and any special requirements
4. Select the BEST tool for this specific query
5. Provide a confidence level (0.0-1.0) and clear reasoning (IN ENGLISH ONLY)

SPECIAL CONSIDERATIONS:
- "lista tutti i files e directory" = list all files AND directories (use "list_all")
- "list directories" or "lista directory" = list only directories (use "list_directories")
- "list files" or "lista files" = list only files (use "list_files")
- If the user wants both files and directories, prefer "list_all"

Think through this step by step and provide your final recommendation."#
    )
}

/// Ordered patterns for explicit tool mentions; the first match wins.
const SELECTION_PATTERNS: &[&str] = &[
    r"'([a-zA-Z_]+)'\s+tool",
    r#""([a-zA-Z_]+)"\s+tool"#,
    r#"use\s+['"]*([a-zA-Z_]+)['"]*"#,
    r#"tool\s+['"]*([a-zA-Z_]+)['"]*"#,
    r#"select\s+['"]*([a-zA-Z_]+)['"]*"#,
    r#"recommend\s+['"]*([a-zA-Z_]+)['"]*"#,
    r#"choose\s+['"]*([a-zA-Z_]+)['"]*"#,
];

/// Extracts the selection from reasoning text. Pure; unit-tested directly.
#[must_use]
pub fn parse_reasoning(reasoning: &str, registry: &ToolRegistry) -> SelectorOutcome {
    let reasoning_lower = reasoning.to_lowercase();

    // Explicit patterns first.
    let mut selected: Option<String> = None;
    for pattern in SELECTION_PATTERNS {
        let Ok(re) = Regex::new(pattern) else { continue };
        if let Some(caps) = re.captures(&reasoning_lower) {
            let candidate = caps.get(1).map(|m| m.as_str().to_string());
            if let Some(c) = candidate {
                if registry.contains(&c) {
                    selected = Some(c);
                    break;
                }
            }
        }
    }

    // Score by mentions plus positive-phrase proximity.
    if selected.is_none() {
        let mut best: Option<(String, usize)> = None;
        for name in registry.names() {
            let tool_lower = name.to_lowercase();
            let mut score = reasoning_lower.matches(&tool_lower).count() * 3;
            for phrase in [
                format!("{tool_lower} is the"),
                format!("{tool_lower} would"),
                format!("{tool_lower} should"),
                format!("{tool_lower} best"),
                format!("{tool_lower} perfect"),
                format!("use {tool_lower}"),
                format!("select {tool_lower}"),
                format!("choose {tool_lower}"),
            ] {
                if reasoning_lower.contains(&phrase) {
                    score += 2;
                }
            }
            if score > 0 && best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((name.to_string(), score));
            }
        }
        selected = best.map(|(name, _)| name);
    }

    let selected_tool = selected.unwrap_or_else(|| DEFAULT_TOOL.to_string());

    // Confidence ladder from certainty markers.
    let confidence = if ["clearly", "definitely", "obvious", "certain", "best choice", "perfect"]
        .iter()
        .any(|m| reasoning_lower.contains(m))
    {
        0.9
    } else if ["probably", "likely", "seems", "appears", "suitable"]
        .iter()
        .any(|m| reasoning_lower.contains(m))
    {
        0.7
    } else if ["might", "could", "perhaps", "possibly", "maybe", "uncertain"]
        .iter()
        .any(|m| reasoning_lower.contains(m))
    {
        0.4
    } else {
        0.6
    };

    // Alternatives: other known tools mentioned in the reasoning.
    let mut alternative_tools = Vec::new();
    for name in registry.names() {
        if name != selected_tool
            && reasoning_lower.contains(&name.to_lowercase())
            && alternative_tools.len() < 3
        {
            alternative_tools.push(name.to_string());
        }
    }

    let spec = registry.get(&selected_tool).map(|t| t.spec());
    let requires_parameters = spec.is_some_and(|s| !s.params.is_empty());
    let suggested_parameters = spec
        .map(|s| extract_parameters(&reasoning_lower, s))
        .unwrap_or_default();

    SelectorOutcome {
        selected_tool,
        confidence,
        reasoning: reasoning.to_string(),
        alternative_tools,
        requires_parameters,
        suggested_parameters,
    }
}

/// Captures filename/pattern parameters mentioned in the reasoning.
fn extract_parameters(reasoning_lower: &str, spec: &crate::tools::ToolSpec) -> Map<String, Value> {
    let mut params = Map::new();
    let declares = |name: &str| spec.params.iter().any(|p| p.name == name);

    if declares("filename") {
        for pattern in [
            r"filename[:\s]+([^\s,]+\.[a-zA-Z0-9]+)",
            r"file[:\s]+([^\s,]+\.[a-zA-Z0-9]+)",
            r"read[:\s]+([^\s,]+\.[a-zA-Z0-9]+)",
        ] {
            let Ok(re) = Regex::new(pattern) else { continue };
            if let Some(caps) = re.captures(reasoning_lower) {
                if let Some(m) = caps.get(1) {
                    params.insert("filename".into(), Value::String(m.as_str().to_string()));
                    break;
                }
            }
        }
    }
    if declares("pattern") {
        if let Ok(re) = Regex::new(r#"pattern[:\s]+["']([^"']+)["']"#) {
            if let Some(caps) = re.captures(reasoning_lower) {
                if let Some(m) = caps.get(1) {
                    params.insert("pattern".into(), Value::String(m.as_str().to_string()));
                }
            }
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{register_fs_tools, ToolRegistry};
    use crate::workspace::{FsLimits, Workspace};
    use std::sync::Arc;

    fn registry() -> (tempfile::TempDir, ToolRegistry) {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = Arc::new(Workspace::open(dir.path(), FsLimits::default()).expect("workspace"));
        let mut registry = ToolRegistry::new();
        register_fs_tools(&mut registry, &ws);
        (dir, registry)
    }

    #[test]
    fn explicit_quoted_tool_wins() {
        let (_dir, registry) = registry();
        let outcome = parse_reasoning(
            "The 'list_all' tool is clearly the best choice for this query.",
            &registry,
        );
        assert_eq!(outcome.selected_tool, "list_all");
        assert!((outcome.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn use_pattern_is_recognized() {
        let (_dir, registry) = registry();
        let outcome = parse_reasoning("I would use list_directories here.", &registry);
        assert_eq!(outcome.selected_tool, "list_directories");
    }

    #[test]
    fn mention_scoring_picks_most_discussed_tool() {
        let (_dir, registry) = registry();
        let outcome = parse_reasoning(
            "Both listing tools apply, but read_file read_file read_file matches the intent.",
            &registry,
        );
        assert_eq!(outcome.selected_tool, "read_file");
        assert!(outcome.requires_parameters);
    }

    #[test]
    fn no_signal_defaults_to_help() {
        let (_dir, registry) = registry();
        let outcome = parse_reasoning("I am not sure about anything here.", &registry);
        assert_eq!(outcome.selected_tool, "help");
    }

    #[test]
    fn hedged_language_lowers_confidence() {
        let (_dir, registry) = registry();
        let outcome = parse_reasoning("Maybe use list_files, possibly.", &registry);
        assert!((outcome.confidence - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn filename_parameter_extracted() {
        let (_dir, registry) = registry();
        let outcome = parse_reasoning(
            "Select read_file. The filename: report.txt was named by the user.",
            &registry,
        );
        assert_eq!(outcome.selected_tool, "read_file");
        assert_eq!(
            outcome.suggested_parameters.get("filename").and_then(|v| v.as_str()),
            Some("report.txt")
        );
    }

    #[test]
    fn italian_language_detected() {
        assert_eq!(detect_language("lista tutti i files"), Some("Italian"));
        assert_eq!(detect_language("list all files"), None);
    }
}
