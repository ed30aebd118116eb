//! fileward: sandboxed file-operations agent with an MCP server surface.
//!
//! Usage:
//!   fileward --mcp --workspace <path>        # stdio JSON-RPC server
//!   fileward serve --workspace <path>        # HTTP server (/mcp, /health, /metrics)
//!   fileward query "list all files"          # one-shot agent query

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fileward::agent::FileAgent;
use fileward::config::{env_truthy, Settings};
use fileward::llm::LlmRouter;
use fileward::server::{run_http, run_stdio, McpServer};
use fileward::workspace::Workspace;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fileward")]
#[command(about = "Sandboxed file-operations agent with an MCP server surface")]
#[command(version)]
struct Cli {
    /// Run as MCP server (stdin/stdout JSON-RPC)
    #[arg(long)]
    mcp: bool,

    /// Workspace directory the agent is confined to
    #[arg(long, env = "WORKSPACE_PATH", default_value = "./workspace")]
    workspace: PathBuf,

    /// Enable debug mode (reasoning traces in responses)
    #[arg(long)]
    debug: bool,

    /// Session name (forwarded to the host's conversation store)
    #[arg(long)]
    session: Option<String>,

    /// Environment profile name
    #[arg(long, value_name = "profile")]
    env: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP transport
    Serve {
        /// Bind address
        #[arg(long, env = "HOST", default_value = "127.0.0.1")]
        host: String,

        /// Bind port
        #[arg(long, env = "PORT", default_value = "8000")]
        port: u16,
    },

    /// Run one query through the agent and print the response
    Query {
        /// The natural-language request
        text: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // CRITICAL: log to stderr only (stdout is JSON-RPC in MCP mode)
    let default_level = if cli.debug || env_truthy("DEBUG") {
        "fileward=debug"
    } else {
        "fileward=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut settings = Settings::from_env();
    settings.workspace = cli.workspace.clone();
    settings.agent.debug_mode = settings.agent.debug_mode || cli.debug;

    if let Some(session) = &cli.session {
        tracing::info!(%session, "session name recorded");
    }
    if let Some(profile) = &cli.env {
        tracing::info!(%profile, "environment profile selected");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.workers)
        .enable_all()
        .build()?;

    // Initialization errors exit with code 1; anyhow renders them on stderr.
    runtime.block_on(run(cli, settings))
}

async fn run(cli: Cli, settings: Settings) -> anyhow::Result<()> {
    let workspace = Arc::new(Workspace::open(&settings.workspace, settings.limits)?);
    tracing::info!(root = %workspace.root().display(), "workspace opened");

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            let server = Arc::new(McpServer::new(build_registry(&workspace, &settings)?));
            run_http(server, &host, port).await?;
        }
        Some(Commands::Query { text }) => {
            let router = LlmRouter::from_env();
            let (agent, _registry) = FileAgent::new(Arc::clone(&workspace), &router, settings.agent)?;
            let response = agent.process_query(&text, None).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        None if cli.mcp => {
            let server = Arc::new(McpServer::new(build_registry(&workspace, &settings)?));
            tracing::info!("stdio transport ready");
            run_stdio(server).await?;
        }
        None => {
            eprintln!("Use --mcp for the stdio server, or a subcommand (serve, query).");
            eprintln!("Run with --help for more information.");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Builds the tool registry for server modes. The analysis tool is included
/// when an analysis-role model is configured; pure file tools never need
/// API keys.
fn build_registry(
    workspace: &Arc<Workspace>,
    settings: &Settings,
) -> anyhow::Result<Arc<fileward::tools::ToolRegistry>> {
    use fileward::llm::LlmRole;
    use fileward::tools::{register_fs_tools, QuestionTool, ToolRegistry};

    let mut registry = ToolRegistry::new();
    register_fs_tools(&mut registry, workspace);

    let router = LlmRouter::from_env();
    match router.bind(LlmRole::FileAnalysis) {
        Ok(model) => {
            registry.register(Arc::new(QuestionTool::new(
                Arc::clone(workspace),
                model,
                settings.agent.max_files,
                settings.agent.max_content_per_file,
            )));
        }
        Err(e) => {
            tracing::warn!(error = %e, "answer_question_about_files disabled: no analysis model");
        }
    }

    Ok(Arc::new(registry))
}
