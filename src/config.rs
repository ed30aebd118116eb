//! Runtime configuration.
//!
//! Settings come from CLI flags first and environment variables second
//! (`WORKSPACE_PATH`, `HOST`, `PORT`, `WORKERS`, `DEBUG`, `LOG_LEVEL`,
//! plus the provider API keys consumed by [`crate::llm::ApiKeys`]).

use std::path::PathBuf;

use crate::workspace::FsLimits;

/// Knobs for the reasoning pipeline.
#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    /// Iteration cap for the reasoning loop.
    pub max_iterations: usize,
    /// Include reasoning steps in responses and error context.
    pub debug_mode: bool,
    /// Files sampled by the analysis tool.
    pub max_files: usize,
    /// Characters read per file by the analysis tool.
    pub max_content_per_file: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            debug_mode: false,
            max_files: 10,
            max_content_per_file: 2048,
        }
    }
}

/// Complete service settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub workspace: PathBuf,
    pub limits: FsLimits,
    pub agent: AgentConfig,
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("./workspace"),
            limits: FsLimits::default(),
            agent: AgentConfig::default(),
            host: "127.0.0.1".to_string(),
            port: 8000,
            workers: num_workers_default(),
        }
    }
}

impl Settings {
    /// Applies environment overrides on top of the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(path) = std::env::var("WORKSPACE_PATH") {
            if !path.trim().is_empty() {
                settings.workspace = PathBuf::from(path);
            }
        }
        if let Ok(host) = std::env::var("HOST") {
            if !host.trim().is_empty() {
                settings.host = host;
            }
        }
        if let Some(port) = env_parse::<u16>("PORT") {
            settings.port = port;
        }
        if let Some(workers) = env_parse::<usize>("WORKERS") {
            settings.workers = workers.max(1);
        }
        settings.agent.debug_mode = env_truthy("DEBUG");
        settings
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok()?.trim().parse().ok()
}

/// `DEBUG=1`, `true`, `yes` (any case) enable debug mode.
#[must_use]
pub fn env_truthy(var: &str) -> bool {
    std::env::var(var)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn num_workers_default() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}
