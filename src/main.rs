mod abilities;
mod agent;
mod config;
mod content;
mod llm;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::abilities::builtin::builtin_abilities;
use crate::abilities::schema::catalog;
use crate::abilities::{AbilityContext, AbilityRegistry};
use crate::agent::{ChatOutcome, Orchestrator};
use crate::config::Config;
use crate::content::{ContentSource, DirectoryContentSource, NullContentSource};
use crate::llm::{GeminiClient, ModelClient};

const DEFAULT_CONFIG_PATH: &str = "config/bridge.toml";

fn print_help() {
    println!(
        "\
ability-bridge v{}

Lets a function-calling LLM use the host's abilities to answer prompts.

USAGE:
    ability-bridge [OPTIONS] [CONFIG_PATH]

ARGUMENTS:
    CONFIG_PATH    Path to TOML configuration file [default: {DEFAULT_CONFIG_PATH}]

OPTIONS:
    -p, --prompt <TEXT>    Answer a single prompt and exit
    -l, --list             Print the ability catalog (declarations and output schemas) and exit
    -a, --anonymous        Act as an unauthenticated caller
    -h, --help             Print this help message and exit
    -V, --version          Print version and exit

Without --prompt, prompts are read from stdin (one per line) and each
outcome is printed as a JSON line: {{\"success\": bool, \"message\": string}}.

ENVIRONMENT VARIABLES:
    Variables are referenced in the config file via ${{VAR_NAME}} syntax.

    RUST_LOG          Log level filter for tracing, written to stderr
                      (e.g. debug, ability_bridge=debug,warn)
    GEMINI_API_KEY    API key for Gemini models
                      (from https://aistudio.google.com/)

EXAMPLES:
    ability-bridge --list
    ability-bridge --prompt \"What does the site say about pricing?\"
    echo \"Who runs this site?\" | RUST_LOG=debug ability-bridge /etc/bridge.toml",
        env!("CARGO_PKG_VERSION"),
    );
}

/// Parsed command line.
struct Cli {
    config_path: String,
    prompt: Option<String>,
    list: bool,
    anonymous: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Cli> {
    let mut cli = Cli {
        config_path: DEFAULT_CONFIG_PATH.to_string(),
        prompt: None,
        list: false,
        anonymous: false,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("ability-bridge v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--list" | "-l" => cli.list = true,
            "--anonymous" | "-a" => cli.anonymous = true,
            "--prompt" | "-p" => {
                let text = args
                    .next()
                    .ok_or_else(|| anyhow!("--prompt requires a value"))?;
                cli.prompt = Some(text);
            }
            other if other.starts_with('-') => {
                return Err(anyhow!("Unknown option: {other} (see --help)"));
            }
            path => cli.config_path = path.to_string(),
        }
    }

    Ok(cli)
}

fn print_outcome(outcome: &ChatOutcome) -> Result<()> {
    println!("{}", serde_json::to_string(outcome)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_args(std::env::args().skip(1))?;

    // Logs go to stderr so stdout only carries outcomes
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ability_bridge=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Loading configuration from {}", cli.config_path);
    let config = Config::load(&cli.config_path)?;

    info!("Site: {}", config.site.name);
    info!("Model: {}", config.model_description());

    // Host content backend, or the no-op fallback
    let source: Arc<dyn ContentSource> = match config.content {
        Some(ref content) => Arc::new(DirectoryContentSource::new(
            content.path.clone(),
            &content.base_url,
        )),
        None => {
            warn!("No [content] section configured, content search will return nothing");
            Arc::new(NullContentSource)
        }
    };
    info!("Content source: {}", source.name());

    let mut registry = AbilityRegistry::new(config.registry.on_duplicate);
    for ability in builtin_abilities(&config, source) {
        registry.register(ability)?;
    }
    info!(
        "Abilities: {} registered ({})",
        registry.len(),
        registry.names().join(", ")
    );
    if registry.is_empty() {
        warn!("No abilities registered, the model will answer without tools");
    }

    let client = GeminiClient::new(config.model.clone())?;
    info!("Model client: {}", client.description());

    if cli.list {
        println!("{}", serde_json::to_string_pretty(&catalog(&registry))?);
        return Ok(());
    }

    let orchestrator = Orchestrator::new(Arc::new(registry), Arc::new(client));

    // The CLI operator is the local, trusted caller unless told otherwise
    let context = if cli.anonymous {
        AbilityContext::anonymous("cli")
    } else {
        AbilityContext::authenticated("cli")
    };

    if let Some(prompt) = cli.prompt {
        tokio::select! {
            outcome = orchestrator.handle(&prompt, &context) => print_outcome(&outcome)?,
            _ = tokio::signal::ctrl_c() => info!("Shutdown signal received, request abandoned"),
        }
        return Ok(());
    }

    info!("Reading prompts from stdin (one per line)...");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, exiting");
                return Ok(());
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        // Dropping the in-flight request on Ctrl-C cancels it
        tokio::select! {
            outcome = orchestrator.handle(&line, &context) => print_outcome(&outcome)?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, request abandoned");
                return Ok(());
            }
        }
    }

    Ok(())
}
