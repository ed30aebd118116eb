//! Goal synthesis and rule-based goal-compliance validation.
//!
//! No model calls here: compliance is judged from observable features of
//! the goal text, the response text, and the tools that ran. This keeps
//! validation fast and repeatable.

use serde::Serialize;

/// Sentinel goal for queries too vague to act on.
pub const AMBIGUOUS_REQUEST: &str = "AMBIGUOUS_REQUEST";

/// Sentinel goal for action verbs with no file specified.
pub const NEEDS_FILE_SPECIFICATION: &str = "NEEDS_FILE_SPECIFICATION";

/// Levels of goal compliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceLevel {
    FullyCompliant,
    PartiallyCompliant,
    NonCompliant,
    Unclear,
}

impl ComplianceLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullyCompliant => "fully_compliant",
            Self::PartiallyCompliant => "partially_compliant",
            Self::NonCompliant => "non_compliant",
            Self::Unclear => "unclear",
        }
    }
}

/// Result of goal compliance validation.
#[derive(Debug, Clone, Serialize)]
pub struct GoalCompliance {
    pub level: ComplianceLevel,
    pub confidence: f32,
    pub explanation: String,
    pub missing_elements: Vec<String>,
    pub suggestions: Vec<String>,
}

impl GoalCompliance {
    /// A response is adequately compliant at FULLY or PARTIALLY.
    #[must_use]
    pub fn is_compliant(&self) -> bool {
        matches!(
            self.level,
            ComplianceLevel::FullyCompliant | ComplianceLevel::PartiallyCompliant
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct GoalTraits {
    is_information_request: bool,
    is_action_request: bool,
    is_analysis_request: bool,
    requires_file_ops: bool,
    requires_specific_format: bool,
}

#[derive(Debug)]
struct ResponseTraits {
    has_structured_output: bool,
    has_file_content: bool,
    has_error_signal: bool,
    response_length: usize,
    tools_were_used: bool,
    has_explanation: bool,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn analyze_goal(goal: &str) -> GoalTraits {
    let goal = goal.to_lowercase();
    GoalTraits {
        is_information_request: contains_any(
            &goal,
            &["show", "display", "list", "get", "find", "see", "view", "check"],
        ),
        is_action_request: contains_any(
            &goal,
            &["create", "write", "delete", "modify", "update", "change", "execute"],
        ),
        is_analysis_request: contains_any(
            &goal,
            &["analyze", "explain", "understand", "reason", "compare", "evaluate"],
        ),
        requires_file_ops: contains_any(
            &goal,
            &["file", "directory", "folder", "content", "tree", "structure"],
        ),
        requires_specific_format: contains_any(
            &goal,
            &["tree", "format", "table", "json", "list", "hierarchy"],
        ),
    }
}

fn analyze_response(response: &str, tools_used: &[String]) -> ResponseTraits {
    let lower = response.to_lowercase();
    ResponseTraits {
        has_structured_output: contains_any(
            response,
            &["├─", "└─", "│", "•", "- ", "* ", "1.", "2."],
        ),
        has_file_content: lower.contains("file") || lower.contains("directory"),
        has_error_signal: contains_any(
            &lower,
            &["error", "failed", "unable", "cannot", "not found"],
        ),
        response_length: response.len(),
        tools_were_used: !tools_used.is_empty(),
        has_explanation: response.split('.').count() > 2,
    }
}

fn determine_level(goal: &GoalTraits, resp: &ResponseTraits) -> ComplianceLevel {
    if resp.has_error_signal && resp.response_length < 50 {
        return ComplianceLevel::NonCompliant;
    }

    if goal.is_information_request {
        return if resp.has_file_content || resp.has_structured_output || resp.tools_were_used {
            ComplianceLevel::FullyCompliant
        } else if resp.response_length > 20 {
            ComplianceLevel::PartiallyCompliant
        } else {
            ComplianceLevel::NonCompliant
        };
    }

    if goal.is_action_request {
        return if resp.tools_were_used && !resp.has_error_signal {
            ComplianceLevel::FullyCompliant
        } else if resp.tools_were_used {
            ComplianceLevel::PartiallyCompliant
        } else {
            ComplianceLevel::NonCompliant
        };
    }

    if goal.is_analysis_request {
        return if resp.has_explanation && resp.response_length > 100 {
            ComplianceLevel::FullyCompliant
        } else if resp.response_length > 50 {
            ComplianceLevel::PartiallyCompliant
        } else {
            ComplianceLevel::NonCompliant
        };
    }

    if resp.response_length > 30 && !resp.has_error_signal {
        return ComplianceLevel::PartiallyCompliant;
    }
    ComplianceLevel::Unclear
}

fn confidence_for(goal: &GoalTraits, resp: &ResponseTraits) -> f32 {
    let mut confidence: f32 = 0.5;
    if resp.tools_were_used && goal.requires_file_ops {
        confidence += 0.3;
    }
    if resp.has_structured_output && goal.requires_specific_format {
        confidence += 0.2;
    }
    if resp.response_length > 100 {
        confidence += 0.1;
    }
    if resp.has_error_signal {
        confidence -= 0.2;
    }
    if !resp.tools_were_used && goal.requires_file_ops {
        confidence -= 0.3;
    }
    confidence.clamp(0.0, 1.0)
}

/// Validates whether `response` achieves `goal`.
#[must_use]
pub fn validate_compliance(goal: &str, response: &str, tools_used: &[String]) -> GoalCompliance {
    if goal.is_empty() || response.is_empty() {
        return GoalCompliance {
            level: ComplianceLevel::Unclear,
            confidence: 0.0,
            explanation: "Cannot validate compliance without both goal and response".to_string(),
            missing_elements: vec![if goal.is_empty() { "goal" } else { "response" }.to_string()],
            suggestions: vec!["Ensure both goal and response are provided".to_string()],
        };
    }

    let goal_traits = analyze_goal(goal);
    let resp_traits = analyze_response(response, tools_used);
    let level = determine_level(&goal_traits, &resp_traits);
    let confidence = confidence_for(&goal_traits, &resp_traits);

    let explanation = match level {
        ComplianceLevel::FullyCompliant => {
            "Response fully achieves the stated goal with appropriate tools and content."
        }
        ComplianceLevel::PartiallyCompliant => {
            "Response partially achieves the goal but may be missing some elements or details."
        }
        ComplianceLevel::NonCompliant => {
            if resp_traits.has_error_signal {
                "Response indicates an error occurred, preventing goal achievement."
            } else {
                "Response does not adequately address the stated goal."
            }
        }
        ComplianceLevel::Unclear => "Unable to clearly determine if response achieves the goal.",
    }
    .to_string();

    let mut missing_elements = Vec::new();
    if goal_traits.requires_file_ops && !resp_traits.tools_were_used {
        missing_elements.push("file system operations".to_string());
    }
    if goal_traits.requires_specific_format && !resp_traits.has_structured_output {
        missing_elements.push("structured formatting".to_string());
    }
    if goal_traits.is_analysis_request && !resp_traits.has_explanation {
        missing_elements.push("detailed explanation".to_string());
    }

    let mut suggestions = Vec::new();
    if level == ComplianceLevel::NonCompliant {
        suggestions.push("Consider restating the goal more clearly".to_string());
        suggestions.push("Verify that appropriate tools are available".to_string());
    }
    for element in &missing_elements {
        suggestions.push(format!("Consider adding {element} to the response"));
    }
    if goal_traits.requires_specific_format {
        suggestions.push("Ensure response uses the requested format".to_string());
    }

    GoalCompliance {
        level,
        confidence,
        explanation,
        missing_elements,
        suggestions,
    }
}

// ============================================================================
// Goal synthesis
// ============================================================================

/// Queries too vague to derive an operation from.
const VAGUE_QUERIES: &[&str] = &[
    "help",
    "hi",
    "hello",
    "hey",
    "what can you do",
    "what can you do?",
    "?",
];

/// Short affirmative/negative turns that only make sense as follow-ups.
const SHORT_REPLIES: &[&str] = &[
    "yes", "no", "sure", "ok", "okay", "yep", "nope", "si", "sì", "certo", "va bene",
];

/// Action verbs that need an object to act on.
const OBJECTLESS_VERBS: &[&str] = &["read", "delete", "create", "write", "remove", "open"];

/// Synthesizes a goal for queries where the model did not state one.
///
/// The two sentinel values trigger a clarification response instead of tool
/// execution; everything else is a short templated objective.
#[must_use]
pub fn synthesize_goal(query: &str) -> String {
    let q = query.trim().to_lowercase();

    if q.is_empty() || VAGUE_QUERIES.contains(&q.as_str()) || SHORT_REPLIES.contains(&q.as_str()) {
        return AMBIGUOUS_REQUEST.to_string();
    }

    // "read file" / "delete something": a verb with nothing concrete to act on.
    let words: Vec<&str> = q.split_whitespace().collect();
    let has_filename = words.iter().any(|w| {
        w.contains('.') && !w.ends_with('.') || *w == "latest" || *w == "newest"
    });
    if words.len() <= 3
        && words
            .first()
            .is_some_and(|w| OBJECTLESS_VERBS.contains(w))
        && !has_filename
        && !q.contains("list")
    {
        return NEEDS_FILE_SPECIFICATION.to_string();
    }

    if q.contains("tree") || (q.contains("structure") && q.contains("director")) {
        return "Display workspace file and directory structure in tree format".to_string();
    }
    if ((q.contains("list") || q.contains("lista") || q.contains("show"))
        && q.contains("director"))
        || q.contains("cartelle")
    {
        if q.contains("file") || q.contains("tutti") || q.contains("all") {
            return "List all files and directories in the workspace".to_string();
        }
        return "List all directories in the workspace".to_string();
    }
    if q.contains("list") || q.contains("lista") || q.contains("files") {
        return "List all files in the workspace".to_string();
    }
    if q.contains("read") || q.contains("leggi") || q.contains("describe") || q.contains("content")
    {
        return "Read and analyze the specified file content".to_string();
    }
    if q.contains("write") || q.contains("create") || q.contains("save") || q.contains("crea") {
        return "Create or update the specified file with the provided content".to_string();
    }
    if q.contains("delete") || q.contains("remove") || q.contains("cancella") {
        return "Delete the specified file from the workspace".to_string();
    }
    if q.contains("largest") || q.contains("biggest") {
        return "Identify the largest workspace file and report its content".to_string();
    }
    if q.starts_with("what") || q.starts_with("how") || q.contains("?") {
        return "Answer the user's question about workspace file contents".to_string();
    }
    "Assist the user with a workspace file operation".to_string()
}

/// Whether a synthesized goal demands clarification instead of execution.
#[must_use]
pub fn needs_clarification(goal: &str) -> bool {
    goal == AMBIGUOUS_REQUEST || goal == NEEDS_FILE_SPECIFICATION
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn information_request_with_tools_is_fully_compliant() {
        let result = validate_compliance(
            "List all files in the workspace",
            "a.txt\nb.py\ndir1/",
            &tools(&["list_all"]),
        );
        assert_eq!(result.level, ComplianceLevel::FullyCompliant);
        assert!(result.is_compliant());
    }

    #[test]
    fn short_error_response_is_non_compliant() {
        let result = validate_compliance(
            "Read and analyze the specified file content",
            "Error: not found",
            &tools(&["read_file"]),
        );
        assert_eq!(result.level, ComplianceLevel::NonCompliant);
        assert!(!result.is_compliant());
    }

    #[test]
    fn action_request_without_tools_is_non_compliant() {
        let result = validate_compliance(
            "Create or update the specified file with the provided content",
            "I would create the file if asked nicely.",
            &[],
        );
        assert_eq!(result.level, ComplianceLevel::NonCompliant);
        assert!(!result
            .missing_elements
            .iter()
            .any(|m| m.contains("formatting")));
        assert!(result
            .missing_elements
            .iter()
            .any(|m| m.contains("file system operations")));
    }

    #[test]
    fn analysis_request_needs_length_and_explanation() {
        let long = "The file defines a parser. It has three stages. Each stage validates \
                    input before passing it on. The final stage emits the tree.";
        let result = validate_compliance("Analyze the file structure", long, &tools(&["read_file"]));
        assert_eq!(result.level, ComplianceLevel::FullyCompliant);

        let short = "It parses.";
        let result = validate_compliance("Analyze the file structure", short, &[]);
        assert_eq!(result.level, ComplianceLevel::NonCompliant);
    }

    #[test]
    fn confidence_rewards_tool_use_for_file_goals() {
        let with_tools = validate_compliance(
            "List all files in the workspace",
            "a.txt\nb.txt",
            &tools(&["list_files"]),
        );
        let without_tools =
            validate_compliance("List all files in the workspace", "a.txt\nb.txt", &[]);
        assert!(with_tools.confidence > without_tools.confidence);
    }

    #[test]
    fn compliance_property_matches_level() {
        for (goal, response, used) in [
            ("List all files", "a.txt", vec!["list_files".to_string()]),
            ("Delete the file", "no tools ran here, sorry", vec![]),
            ("x", "y", vec![]),
        ] {
            let result = validate_compliance(goal, response, &used);
            assert_eq!(
                result.is_compliant(),
                matches!(
                    result.level,
                    ComplianceLevel::FullyCompliant | ComplianceLevel::PartiallyCompliant
                )
            );
        }
    }

    // Goal synthesis

    #[test]
    fn vague_queries_are_ambiguous() {
        assert_eq!(synthesize_goal("help"), AMBIGUOUS_REQUEST);
        assert_eq!(synthesize_goal("hi"), AMBIGUOUS_REQUEST);
        assert_eq!(synthesize_goal("what can you do"), AMBIGUOUS_REQUEST);
        assert_eq!(synthesize_goal("ok"), AMBIGUOUS_REQUEST);
        assert!(needs_clarification(&synthesize_goal("help")));
    }

    #[test]
    fn objectless_verbs_need_a_file() {
        assert_eq!(synthesize_goal("read file"), NEEDS_FILE_SPECIFICATION);
        assert_eq!(synthesize_goal("delete something"), NEEDS_FILE_SPECIFICATION);
        assert_eq!(synthesize_goal("create file"), NEEDS_FILE_SPECIFICATION);
        assert!(needs_clarification(&synthesize_goal("read file")));
    }

    #[test]
    fn concrete_queries_get_templated_goals() {
        assert_eq!(
            synthesize_goal("list all files"),
            "List all files in the workspace"
        );
        assert_eq!(
            synthesize_goal("read notes.txt"),
            "Read and analyze the specified file content"
        );
        assert_eq!(
            synthesize_goal("show the tree"),
            "Display workspace file and directory structure in tree format"
        );
        assert_eq!(
            synthesize_goal("lista tutti i files e directory"),
            "List all files and directories in the workspace"
        );
        assert!(!needs_clarification(&synthesize_goal("list all files")));
    }
}
