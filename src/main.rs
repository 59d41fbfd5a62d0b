use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jadx_mcp::config::load_config;
use jadx_mcp::daemon::DaemonClient;
use jadx_mcp::manifest::{exported_components, ComponentKind};
use jadx_mcp::sanitizer::sanitize_bytes;
use jadx_mcp::server::run_stdio_server;
use serde_json::json;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "jadx-mcp")]
#[command(version)]
#[command(about = "MCP stdio bridge for a jadx decompiler daemon")]
struct Cli {
    /// Extract exported components from a local AndroidManifest.xml and
    /// print the result as JSON (no daemon required)
    #[arg(long, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Component tag to extract when using --manifest
    #[arg(long, default_value = "activity", value_parser = ["activity", "service"])]
    component: String,

    /// Print the sanitized form of a manifest file and exit
    #[arg(long, value_name = "FILE")]
    sanitize: Option<PathBuf>,

    /// Daemon base URL override (e.g. http://localhost:8651); defaults to
    /// ~/.jadx-mcp.json and JADX_DAEMON_MCP_HOST/PORT
    #[arg(long, value_name = "URL")]
    daemon_url: Option<String>,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start MCP stdio server
    Mcp,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.cmd, Some(Command::Mcp)) {
        let daemon = match cli.daemon_url {
            Some(url) => DaemonClient::from_url(url),
            None => DaemonClient::new(&load_config()),
        };
        return run_stdio_server(daemon);
    }

    if let Some(path) = cli.sanitize {
        let raw = std::fs::read(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        print!("{}", sanitize_bytes(&raw));
        return Ok(());
    }

    if let Some(path) = cli.manifest {
        let raw = std::fs::read(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let kind = match cli.component.as_str() {
            "service" => ComponentKind::Service,
            _ => ComponentKind::Activity,
        };
        let reply = match exported_components(&String::from_utf8_lossy(&raw), kind) {
            Ok(names) => json!({ "result": names }),
            Err(e) => json!({ "error": e.to_string() }),
        };
        println!("{}", serde_json::to_string_pretty(&reply)?);
        return Ok(());
    }

    anyhow::bail!("Nothing to do: pass --manifest/--sanitize, or run the `mcp` subcommand");
}
