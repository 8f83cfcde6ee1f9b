//! mcp-toolkit - talk to an MCP server from the command line.
//!
//! Main entry point for the mcp-toolkit CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{CallArgs, Context, TargetArgs, ToolsArgs};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// mcp-toolkit - Model Context Protocol client
#[derive(Parser)]
#[command(name = "mcp-toolkit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file with named servers
    #[arg(long, global = true, env = "MCP_TOOLKIT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the session and show server details
    Info,

    /// List the server's tools
    Tools(ToolsArgs),

    /// Call a tool
    Call(CallArgs),

    /// List servers from the config file (no connection)
    Servers,
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging on stderr; stdout is reserved for command output. With --json
    // the log lines are JSON too, so scripts can parse both streams.
    let filter = if cli.verbose {
        "mcp_toolkit=debug,mcp_toolkit_client=debug,info"
    } else {
        "mcp_toolkit=info,mcp_toolkit_client=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let console_layer = (!cli.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
    });
    let json_layer = cli.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .init();

    let ctx = Context {
        json_output: cli.json,
        verbose: cli.verbose,
        config_path: cli.config,
        target: cli.target,
    };

    match cli.command {
        Commands::Info => commands::run_info(&ctx),
        Commands::Tools(args) => commands::run_tools(args, &ctx),
        Commands::Call(args) => commands::run_call(args, &ctx),
        Commands::Servers => commands::run_servers(&ctx),
    }
}
