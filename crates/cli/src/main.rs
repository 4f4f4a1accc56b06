mod chat;
mod config;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use mcp::ServerConfig;
use runtime::{AnthropicBackend, McpToolHost, Orchestrator};
use tokio::io::BufReader;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::Result;

/// Chat with a language model that can call tools from an MCP server.
#[derive(Parser, Debug)]
#[command(name = "mcp-client")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the server script (.py or .js)
    #[arg(value_name = "SERVER_SCRIPT")]
    server_script: PathBuf,

    /// Path to configuration file (default: ./mcp-client.toml if present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

fn log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => config_level.parse().unwrap_or(Level::WARN),
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Logs go to stderr so they never interleave with answers on stdout.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match std::env::current_dir()
        .map_err(config::ConfigError::from)
        .and_then(|cwd| Config::discover(cli.config.as_deref(), &cwd))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(log_level(cli.verbose, cli.quiet, &config.logging.level));

    let api_key = std::env::var("ANTHROPIC_API_KEY").ok();

    match run(&cli, &config, api_key).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "mcp-client failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, config: &Config, api_key: Option<String>) -> Result<()> {
    let api_key = config.api_key(api_key)?;
    let backend = AnthropicBackend::builder(api_key)
        .timeout(config.backend_timeout())
        .build()
        .map_err(runtime::Error::from)?;

    let server_config = ServerConfig::for_script(&cli.server_script)
        .map_err(runtime::Error::from)?
        .with_handshake_timeout(config.handshake_timeout())
        .with_request_timeout(config.request_timeout());

    let host = McpToolHost::connect(server_config).await?;
    let names: Vec<_> = host
        .cached_tools()
        .await
        .into_iter()
        .map(|tool| tool.name)
        .collect();
    println!("\nConnected to server with tools: {names:?}");
    info!(%backend, model = %config.backend.model, "ready");

    let orchestrator = Orchestrator::new(backend, host, config.completion_settings());
    let result = chat::run(
        &orchestrator,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await;

    orchestrator.into_host().shutdown().await;
    result?;
    Ok(())
}
