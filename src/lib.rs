//! fileward: sandboxed file-operations agent with an MCP server surface.
//!
//! This library provides an autonomous file agent built from:
//! - A path-safe, rate-limited, size-bounded workspace sandbox
//! - A two-phase safety supervisor (regex filter, then LLM moderation)
//! - A consolidated single-call ReAct reasoning loop
//! - A self-describing tool catalog served over JSON-RPC (stdio and HTTP)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        Protocol Adapter (JSON-RPC 2.0)      │
//! │        stdio lines  /  HTTP POST /mcp       │
//! └─────────────────┬───────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────┐
//! │              Agent Facade                    │
//! │   Supervisor → Reasoning Loop → shaping     │
//! └───────┬─────────┬─────────┬─────────────────┘
//!         │         │         │
//!    ┌────▼───┐ ┌───▼────┐ ┌──▼─────┐
//!    │Content │ │  Tool  │ │  Goal  │
//!    │Filter  │ │Selector│ │Validate│
//!    └────┬───┘ └───┬────┘ └──┬─────┘
//!         │         │         │
//!    ┌────▼─────────▼─────────▼────┐
//!    │   Tool Registry + Executor   │
//!    │   (self-describing tools)    │
//!    └──────────────┬───────────────┘
//!                   │
//!    ┌──────────────▼───────────────┐
//!    │     Sandboxed Workspace      │
//!    │  path-safe · rate-limited    │
//!    └──────────────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod security;
pub mod server;
pub mod tools;
pub mod workspace;

pub use agent::{AgentResponse, FileAgent};
pub use config::{AgentConfig, Settings};
pub use error::{AgentError, Result, WorkspaceError};
pub use workspace::{FsLimits, Workspace, WriteMode};
