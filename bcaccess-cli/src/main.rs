use anyhow::{Context, Result};
use bcaccess_core::core_identity::{Keystore, Password};
use bcaccess_core::logging::{init_logging_with_config, LogConfig};
use bcaccess_core::{AccessCode, Config, LogLevel};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

mod app;
mod prompt;

use app::App;
use prompt::TerminalPrompt;

#[derive(Parser, Debug)]
#[command(name = "bcaccess")]
#[command(about = "BC identity access client", long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Enable JSON structured logging
    #[arg(long)]
    json_logs: bool,

    /// Configuration file (TOML)
    #[arg(long, short)]
    config: Option<String>,

    /// Root directory for keys, cache and the local ledger
    #[arg(long)]
    root: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Sign in, sign up or import keys, then show the resulting node
    Node,
    /// List aliases with keys on this machine
    List,
    /// Upload the signed-in key to a host and print its access code
    Export {
        /// Host to hold the key; defaults to the configured BC host
        #[arg(long)]
        host: Option<String>,
    },
    /// Fetch a key from a host with an access code
    Import {
        alias: String,
        #[arg(long)]
        code: String,
        #[arg(long)]
        host: Option<String>,
    },
    /// Delete a key from this machine
    Delete { alias: String },
    /// Sign in, sign out, then sign in again as someone else
    Switch,
}

#[derive(Serialize)]
struct NodeSummary {
    alias: String,
    public_key: String,
}

fn expand(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).with_context(|| format!("expanding {}", path))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(expand(path)?)?,
        None => Config::from_env()?,
    };
    if let Some(root) = &args.root {
        config.client.root_dir = expand(root)?;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    config.logging.json_format |= args.json_logs;
    config.validate()?;
    Ok(config)
}

fn print_node(alias: &str, public_key: String, json: bool) -> Result<()> {
    if json {
        let summary = NodeSummary {
            alias: alias.to_string(),
            public_key,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Alias: {}", alias);
        println!("Public Key: {}", public_key);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let log_config = LogConfig::try_from(&config.logging).unwrap_or_else(|e| {
        eprintln!("{}; using info", e);
        LogConfig::new(LogLevel::Info).json_format(config.logging.json_format)
    });
    init_logging_with_config(log_config)?;
    debug!(command = ?args.command, "Starting");

    let app = App::build(&config, TerminalPrompt::stdin()).await?;

    match args.command {
        Command::Node => {
            let node = app.orchestrator.get_node().await?;
            print_node(node.alias(), node.public_key_base64(), args.json)?;
        }
        Command::List => {
            let aliases = app.keystore.list()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&aliases)?);
            } else if aliases.is_empty() {
                println!("No keys in {}", app.session.root().await?.display());
            } else {
                for alias in aliases {
                    println!("{}", alias);
                }
            }
        }
        Command::Export { host } => {
            let node = app.orchestrator.get_node().await?;
            let password = app
                .prompt
                .read_line("Password: ")
                .await
                .map(Password::from)
                .context("no password given")?;
            let host = host.unwrap_or_else(|| app.bc_host.clone());
            let code = app.lifecycle.export_keys(&node, &password, &host).await?;
            println!("Access Code: {}", code);
        }
        Command::Import { alias, code, host } => {
            let host = host.unwrap_or_else(|| app.bc_host.clone());
            app.lifecycle.import_keys(&host, &alias, &AccessCode::from(code)).await?;
        }
        Command::Delete { alias } => {
            app.lifecycle.delete_keys(&alias).await?;
        }
        Command::Switch => {
            let previous = app.orchestrator.get_node().await?;
            app.lifecycle.switch_identity().await;
            let node = app.orchestrator.get_node().await?;
            debug!(from = previous.alias(), to = node.alias(), "Switched identity");
            print_node(node.alias(), node.public_key_base64(), args.json)?;
        }
    }

    Ok(())
}
