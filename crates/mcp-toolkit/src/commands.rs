//! Command handlers.
//!
//! Every connecting command goes through [`with_session`], which closes the
//! session whether or not the command succeeded.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow, bail};
use clap::Args;
use serde_json::{Value, json};

use mcp_toolkit_client::{ClientConfig, McpClient, McpServerConfig, ToolInfo, TransportType};

/// Shared state for command handlers.
pub struct Context {
    pub json_output: bool,
    pub verbose: bool,
    pub config_path: Option<PathBuf>,
    pub target: TargetArgs,
}

/// Which server to talk to. Exactly one of the selectors is required by
/// connecting commands.
#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Named server from the config file
    #[arg(long, conflicts_with_all = ["stdio", "http", "sse"])]
    pub server: Option<String>,

    /// Spawn this command and talk over stdin/stdout
    #[arg(long, value_name = "CMD", conflicts_with_all = ["http", "sse"])]
    pub stdio: Option<String>,

    /// Argument for the --stdio command (repeatable)
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true, requires = "stdio")]
    pub args: Vec<String>,

    /// POST JSON-RPC to this URL
    #[arg(long, value_name = "URL", conflicts_with = "sse")]
    pub http: Option<String>,

    /// POST to this URL and accept event-stream replies
    #[arg(long, value_name = "URL")]
    pub sse: Option<String>,

    /// Reply timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Arguments for `mcp-toolkit tools`.
#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Follow pagination cursors and list every tool
    #[arg(long)]
    pub all: bool,

    /// Include each tool's input schema
    #[arg(long)]
    pub full: bool,
}

/// Arguments for `mcp-toolkit call`.
#[derive(Args, Debug)]
pub struct CallArgs {
    /// Tool name
    pub name: String,

    /// Tool arguments as a JSON object
    #[arg(long, value_name = "JSON")]
    pub args: Option<String>,
}

/// Default config location: `<config dir>/mcp-toolkit/config.toml`.
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mcp-toolkit").join("config.toml"))
}

fn load_config(ctx: &Context) -> Result<ClientConfig> {
    match &ctx.config_path {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => match default_config_path() {
            Some(path) => Ok(ClientConfig::load_or_default(&path)?),
            None => Ok(ClientConfig::default()),
        },
    }
}

fn resolve_target(ctx: &Context) -> Result<McpServerConfig> {
    let target = &ctx.target;

    let mut config = if let Some(name) = &target.server {
        load_config(ctx)?.server_config(name)?
    } else if let Some(command) = &target.stdio {
        McpServerConfig::new("stdio", command).with_args(target.args.clone())
    } else if let Some(url) = &target.http {
        McpServerConfig::http("http", url)
    } else if let Some(url) = &target.sse {
        McpServerConfig::sse("sse", url)
    } else {
        bail!("no server selected: pass --server, --stdio, --http or --sse");
    };

    if let Some(secs) = target.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

/// Connect, run `f`, and always close the session afterwards.
fn with_session<T>(ctx: &Context, f: impl FnOnce(&mut McpClient) -> Result<T>) -> Result<T> {
    let config = resolve_target(ctx)?;
    let name = config.name.clone();
    let mut client = McpClient::connect(config)
        .with_context(|| format!("failed to connect to MCP server '{name}'"))?;

    let outcome = f(&mut client);

    if let Err(e) = client.shutdown() {
        tracing::warn!(server = %name, error = %e, "failed to close MCP session");
    }
    outcome
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run `mcp-toolkit info`.
pub fn run_info(ctx: &Context) -> Result<()> {
    with_session(ctx, |client| {
        let init = client.initialize().context("initialize failed")?;

        if ctx.json_output {
            return print_json(init);
        }

        println!("Server:   {} v{}", init.server_info.name, init.server_info.version);
        println!("Protocol: {}", init.protocol_version);

        let caps = &init.capabilities;
        let mut advertised = Vec::new();
        if caps.tools.is_some() {
            advertised.push("tools");
        }
        if caps.resources.is_some() {
            advertised.push("resources");
        }
        if caps.prompts.is_some() {
            advertised.push("prompts");
        }
        if caps.logging.is_some() {
            advertised.push("logging");
        }
        if advertised.is_empty() {
            println!("Capabilities: (none)");
        } else {
            println!("Capabilities: {}", advertised.join(", "));
        }
        Ok(())
    })
}

/// Run `mcp-toolkit tools`.
pub fn run_tools(args: ToolsArgs, ctx: &Context) -> Result<()> {
    with_session(ctx, |client| {
        client.initialize().context("initialize failed")?;
        let listed = if args.all {
            client.list_all_tools()
        } else {
            client.list_tools()
        };
        let tools = listed.context("failed to list tools")?;

        if ctx.json_output {
            let tools: Vec<Value> = tools.iter().map(|t| tool_json(t, args.full)).collect();
            return print_json(&tools);
        }

        if tools.is_empty() {
            println!("No tools available.");
            return Ok(());
        }

        println!("Available tools ({}):", tools.len());
        for tool in &tools {
            println!("  • {}", tool.name);
            if let Some(desc) = &tool.description {
                println!("      {desc}");
            }
            if args.full
                && let Some(schema) = &tool.input_schema
            {
                println!("      Schema: {}", serde_json::to_string(schema)?);
            }
        }
        Ok(())
    })
}

fn tool_json(tool: &ToolInfo, full: bool) -> Value {
    if full {
        json!({
            "name": tool.name,
            "description": tool.description,
            "schema": tool.input_schema,
        })
    } else {
        json!({
            "name": tool.name,
            "description": tool.description,
        })
    }
}

fn parse_arguments(raw: Option<&str>) -> Result<Option<Value>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(raw).context("--args is not valid JSON")?;
    if !value.is_object() {
        bail!("--args must be a JSON object");
    }
    Ok(Some(value))
}

/// Run `mcp-toolkit call`.
pub fn run_call(args: CallArgs, ctx: &Context) -> Result<()> {
    // Validate before spawning or connecting anything.
    let arguments = parse_arguments(args.args.as_deref())?;

    with_session(ctx, |client| {
        client.initialize().context("initialize failed")?;
        let result = client
            .call_tool(&args.name, arguments)
            .with_context(|| format!("call to '{}' failed", args.name))?;

        if ctx.json_output {
            print_json(&result)?;
        } else if let Some(text) = result.text() {
            println!("{text}");
        } else {
            println!("{}", serde_json::to_string_pretty(&result.content)?);
        }

        if result.is_error() {
            return Err(anyhow!("tool '{}' reported an error", args.name));
        }
        Ok(())
    })
}

/// Run `mcp-toolkit servers`.
pub fn run_servers(ctx: &Context) -> Result<()> {
    let config = load_config(ctx)?;

    if ctx.json_output {
        return print_json(&config.servers);
    }

    if config.servers.is_empty() {
        println!("No MCP servers configured.");
        if let Some(path) = default_config_path() {
            println!("Add [[servers]] entries to {}", path.display());
        }
        return Ok(());
    }

    for server in &config.servers {
        let target = match server.transport {
            TransportType::Stdio => std::iter::once(server.command.as_str())
                .chain(server.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" "),
            TransportType::Http | TransportType::Sse => {
                server.url.clone().unwrap_or_else(|| "(no url)".to_string())
            }
        };
        let status = if server.enabled { "" } else { " (disabled)" };
        println!(
            "{:<16} {:<6} {}{}",
            server.name,
            server.transport.to_string(),
            target,
            status
        );
        if ctx.verbose
            && let Some(secs) = server.timeout_secs
        {
            println!("{:<16} timeout {secs}s", "");
        }
    }
    Ok(())
}
