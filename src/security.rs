//! Security module for the fileward agent.
//!
//! Provides protection against:
//! - Path traversal attacks (escaping the workspace root)
//! - Symlink-based sandbox escapes
//! - Unsafe queries (destructive commands, prompt injection, exfiltration)
//!
//! # Design Philosophy
//!
//! Path validation is purely structural where possible (component
//! normalization without filesystem access), with a canonicalization pass
//! for paths that already exist. The content filter is deterministic: the
//! same query always yields the same verdict, so it can run before any
//! model call and its decision can be cached or replayed.

use std::path::{Component, Path, PathBuf};

use regex::RegexSet;
use regex::RegexSetBuilder;

use crate::error::{WorkspaceError, WsResult};

// ============================================================================
// Path Validation
// ============================================================================

/// Validates a single-segment filename (no directory structure allowed).
///
/// # Security Properties
///
/// 1. Rejects empty or whitespace-only names
/// 2. Rejects directory separators (`/`, `\`) and drive colons
/// 3. Rejects the relative components `.` and `..`
///
/// Hidden files (a leading `.` followed by a real name) are allowed; the
/// listing operations skip them, but direct reads and writes may target them.
pub fn validate_filename(name: &str) -> WsResult<()> {
    if name.trim().is_empty() {
        return Err(WorkspaceError::InvalidFilename {
            name: name.to_string(),
            reason: "filename cannot be empty",
        });
    }
    if name.contains('/') || name.contains('\\') || name.contains(':') {
        return Err(WorkspaceError::InvalidFilename {
            name: name.to_string(),
            reason: "filename cannot contain directory separators",
        });
    }
    if name == "." || name == ".." {
        return Err(WorkspaceError::InvalidFilename {
            name: name.to_string(),
            reason: "relative path components are not allowed",
        });
    }
    Ok(())
}

/// Safely joins a single filename to the workspace root.
///
/// The returned path is guaranteed to be a direct child of `root`, with no
/// symlink at the target or at any ancestor up to `root`.
pub fn safe_join(root: &Path, name: &str) -> WsResult<PathBuf> {
    validate_filename(name)?;
    let candidate = root.join(name);
    ensure_within_root(root, &candidate, name)?;
    reject_symlinks(root, &candidate)?;
    Ok(candidate)
}

/// Safely joins a relative path (subdirectories allowed) to the root.
///
/// Used by `read_file_by_path`. The same descendant and symlink checks
/// apply after component normalization.
pub fn safe_join_relative(root: &Path, rel: &str) -> WsResult<PathBuf> {
    if rel.trim().is_empty() {
        return Err(WorkspaceError::InvalidFilename {
            name: rel.to_string(),
            reason: "path cannot be empty",
        });
    }
    let rel_path = Path::new(rel);
    if rel_path.is_absolute() {
        return Err(WorkspaceError::PathTraversal {
            attempted: rel.to_string(),
        });
    }

    let normalized = normalize_path(rel_path);
    for component in normalized.components() {
        if matches!(component, Component::ParentDir) {
            return Err(WorkspaceError::PathTraversal {
                attempted: rel.to_string(),
            });
        }
    }

    let candidate = root.join(&normalized);
    ensure_within_root(root, &candidate, rel)?;
    reject_symlinks(root, &candidate)?;
    Ok(candidate)
}

/// Verifies the (canonicalized, when it exists) candidate stays under root.
fn ensure_within_root(root: &Path, candidate: &Path, attempted: &str) -> WsResult<()> {
    let resolved = if candidate.exists() {
        dunce::canonicalize(candidate).map_err(|_| WorkspaceError::PathTraversal {
            attempted: attempted.to_string(),
        })?
    } else {
        candidate.to_path_buf()
    };
    if !resolved.starts_with(root) {
        return Err(WorkspaceError::PathTraversal {
            attempted: attempted.to_string(),
        });
    }
    Ok(())
}

/// Rejects the candidate if it, or any ancestor up to (but excluding) the
/// root, is a symbolic link. Non-existent components are skipped: a file
/// about to be created has no metadata yet.
fn reject_symlinks(root: &Path, candidate: &Path) -> WsResult<()> {
    let mut current = Some(candidate);
    while let Some(path) = current {
        if path == root {
            break;
        }
        if let Ok(meta) = std::fs::symlink_metadata(path) {
            if meta.file_type().is_symlink() {
                return Err(WorkspaceError::Symlink {
                    path: path.display().to_string(),
                });
            }
        }
        current = path.parent();
    }
    Ok(())
}

/// Normalizes a path by resolving `.` and `..` components without
/// filesystem access. Pure function over path components.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if components
                    .last()
                    .is_some_and(|c| !matches!(c, Component::ParentDir))
                {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            _ => components.push(component),
        }
    }
    components.iter().collect()
}

// ============================================================================
// Content Filter
// ============================================================================

/// The closed set of safety risks the filter can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SafetyRisk {
    PathTraversal,
    MaliciousCode,
    SystemAccess,
    DataExfiltration,
    PromptInjection,
    HarmfulContent,
    OffTopic,
    UnknownRisk,
}

impl SafetyRisk {
    /// Wire/token form used in moderation responses and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PathTraversal => "path_traversal",
            Self::MaliciousCode => "malicious_code",
            Self::SystemAccess => "system_access",
            Self::DataExfiltration => "data_exfiltration",
            Self::PromptInjection => "prompt_injection",
            Self::HarmfulContent => "harmful_content",
            Self::OffTopic => "off_topic",
            Self::UnknownRisk => "unknown_risk",
        }
    }

    /// Parses the wire form back into a risk, defaulting to `UnknownRisk`.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "path_traversal" => Self::PathTraversal,
            "malicious_code" => Self::MaliciousCode,
            "system_access" => Self::SystemAccess,
            "data_exfiltration" => Self::DataExfiltration,
            "prompt_injection" => Self::PromptInjection,
            "harmful_content" => Self::HarmfulContent,
            "off_topic" => Self::OffTopic,
            _ => Self::UnknownRisk,
        }
    }

    /// Human description used in rejection messages.
    #[must_use]
    pub fn concern(self) -> &'static str {
        match self {
            Self::PathTraversal => "attempts to access files outside the workspace",
            Self::MaliciousCode => "contains potentially harmful commands",
            Self::SystemAccess => "requests system-level access",
            Self::DataExfiltration => "attempts to extract or transmit data",
            Self::PromptInjection => "attempts to manipulate system behavior",
            Self::HarmfulContent => "contains potentially harmful content",
            Self::OffTopic => "is not related to file operations",
            Self::UnknownRisk => "triggered an unclassified safety rule",
        }
    }
}

/// Regex patterns per risk category. Fixed at build time.
const RISK_PATTERNS: &[(SafetyRisk, &[&str])] = &[
    (
        SafetyRisk::PathTraversal,
        &[
            r"\.\./",
            r"\.\.\\",
            r"/\.\.",
            r"\\\.\.",
            r"%2e%2e",
            r"%252e%252e",
            r"\.\.%2f",
        ],
    ),
    (
        SafetyRisk::MaliciousCode,
        &[
            r"rm\s+-rf",
            r"del\s+/s",
            r"format\s+c:",
            r"dd\s+if=",
            r"mkfs\.",
            r"fdisk",
            r"killall",
            r"pkill",
        ],
    ),
    (
        SafetyRisk::SystemAccess,
        &[
            r"/etc/passwd",
            r"/etc/shadow",
            r"c:\\windows\\system32",
            r"sudo\s+",
            r"chmod\s+777",
            r"chown\s+",
        ],
    ),
    (
        SafetyRisk::DataExfiltration,
        &[
            r"curl.*http",
            r"wget.*http",
            r"nc\s+.*\d+",
            r"telnet\s+",
            r"ssh\s+.*@",
            r"scp\s+.*@",
            r"rsync\s+.*@",
        ],
    ),
    (
        SafetyRisk::PromptInjection,
        &[
            r"ignore.*instructions",
            r"forget.*previous",
            r"new.*instructions",
            r"system.*prompt",
            r"you.*are.*now",
            r"pretend.*you.*are",
        ],
    ),
    (
        SafetyRisk::HarmfulContent,
        &[
            r"\bhack\b",
            r"\bexploit\b",
            r"\bbackdoor\b",
            r"\bmalware\b",
            r"\bvirus\b",
            r"\btrojan\b",
            r"\brootkit\b",
        ],
    ),
];

/// Keywords indicating the query is about file operations. Includes the
/// Italian synonyms the agent is expected to understand without an LLM call.
const DOMAIN_KEYWORDS: &[&str] = &[
    "file", "files", "read", "write", "delete", "list", "directory", "folder", "create", "save",
    "content", "document", "text", "data", "tree", "show", "describe", "analyze", "explain",
    "summarize", "lista", "cartelle", "cartella", "mostra", "tutti", "leggi", "scrivi", "crea",
    "cancella",
];

/// Question words that keep a query on-topic even without a domain keyword.
const QUESTION_KEYWORDS: &[&str] = &[
    "what", "how", "where", "when", "why", "which", "cosa", "come", "dove", "quale",
];

/// Verdict returned by [`ContentFilter::check`].
#[derive(Debug, Clone)]
pub struct FilterVerdict {
    pub is_safe: bool,
    pub confidence: f32,
    pub detected_risks: Vec<SafetyRisk>,
    pub explanation: String,
    pub suggested_alternatives: Vec<String>,
}

/// Deterministic pre-flight safety check. No model calls.
pub struct ContentFilter {
    rules: Vec<(SafetyRisk, RegexSet)>,
}

impl ContentFilter {
    /// Compiles the fixed risk pattern tables.
    ///
    /// # Panics
    ///
    /// Panics if a built-in pattern fails to compile; the tables are
    /// constants, so this is a build defect, not a runtime condition.
    #[must_use]
    pub fn new() -> Self {
        let rules = RISK_PATTERNS
            .iter()
            .map(|(risk, patterns)| {
                let set = RegexSetBuilder::new(patterns.iter().copied())
                    .case_insensitive(true)
                    .build()
                    .unwrap_or_else(|e| panic!("invalid built-in pattern for {risk:?}: {e}"));
                (*risk, set)
            })
            .collect();
        Self { rules }
    }

    /// Classifies a query. Pure: repeated calls return identical verdicts.
    #[must_use]
    pub fn check(&self, query: &str) -> FilterVerdict {
        let query_lower = query.to_lowercase();
        let mut detected_risks = Vec::new();
        let mut explanation_parts = Vec::new();
        let mut suggested_alternatives = Vec::new();

        for (risk, set) in &self.rules {
            if set.is_match(&query_lower) {
                detected_risks.push(*risk);
                explanation_parts.push(format!("Detected {} pattern", risk.as_str()));
            }
        }

        // Off-topic: neither a domain keyword nor a question word present.
        let on_domain = DOMAIN_KEYWORDS.iter().any(|k| query_lower.contains(k));
        let is_question = QUESTION_KEYWORDS
            .iter()
            .any(|k| query_lower.contains(k));
        if !on_domain && !is_question {
            detected_risks.push(SafetyRisk::OffTopic);
            explanation_parts.push("Query appears unrelated to file operations".to_string());
            suggested_alternatives.extend([
                "Ask about reading, writing, or analyzing files".to_string(),
                "Request file listings or operations".to_string(),
                "Ask questions about file contents".to_string(),
            ]);
        }

        if detected_risks.contains(&SafetyRisk::PathTraversal) {
            suggested_alternatives.extend([
                "Use simple filenames without path separators".to_string(),
                "Work only within the assigned workspace".to_string(),
            ]);
        }
        if detected_risks.contains(&SafetyRisk::MaliciousCode) {
            suggested_alternatives.extend([
                "Focus on safe file read/write operations".to_string(),
                "Avoid system commands and destructive operations".to_string(),
            ]);
        }

        let is_safe = detected_risks.is_empty();
        let confidence = if is_safe {
            0.9
        } else {
            (1.0 - 0.3 * detected_risks.len() as f32).max(0.1)
        };
        let explanation = if explanation_parts.is_empty() {
            "Content appears safe for file operations".to_string()
        } else {
            explanation_parts.join("; ")
        };

        FilterVerdict {
            is_safe,
            confidence,
            detected_risks,
            explanation,
            suggested_alternatives,
        }
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
