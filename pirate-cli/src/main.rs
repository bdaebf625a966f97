use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pirate_broker::Broker;
use pirate_config::{ConfigLoader, PirateConfig};

mod cli;
use cli::{Cli, Commands, ConfigCommands};

/// Load configuration from file or environment
fn load_config(config_path: Option<&PathBuf>) -> Result<PirateConfig> {
    let loader = ConfigLoader::new();

    match config_path {
        Some(path) => {
            if path.exists() {
                info!("Loading configuration from: {:?}", path);
                loader
                    .from_file(path)
                    .context(format!("Failed to load configuration from {:?}", path))
            } else {
                warn!("Configuration file not found: {:?}. Using defaults.", path);
                loader
                    .from_env()
                    .context("Failed to load configuration from environment")
            }
        }
        None => {
            debug!("No configuration file specified. Loading from environment or defaults.");
            loader
                .from_env()
                .context("Failed to load configuration from environment")
        }
    }
}

/// Replace the broker endpoints given on the command line
fn apply_endpoint_overrides(
    mut config: PirateConfig,
    frontend: Option<&String>,
    backend: Option<&String>,
) -> Result<PirateConfig> {
    if frontend.is_none() && backend.is_none() {
        return Ok(config);
    }

    let mut broker = config.broker_or_default();
    if let Some(frontend) = frontend {
        broker.frontend = frontend.clone();
    }
    if let Some(backend) = backend {
        broker.backend = backend.clone();
    }
    config.broker = Some(broker);
    config
        .validate_all()
        .context("Invalid broker endpoints")?;
    Ok(config)
}

/// Run the broker until Ctrl-C
async fn broker_command(config: PirateConfig) -> Result<()> {
    let mut broker = Broker::bind_tcp(&config)
        .await
        .context("Failed to start broker")?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        trigger.cancel();
    });

    let result = broker.run(shutdown).await;
    info!(stats = ?broker.stats(), "Broker stopped");
    result.context("Broker terminated")
}

/// Handle configuration validation
fn handle_config_validate(config_file: &PathBuf) -> Result<()> {
    info!("Validating configuration file: {:?}", config_file);

    if !config_file.exists() {
        return Err(anyhow::anyhow!(
            "Configuration file not found: {:?}",
            config_file
        ));
    }

    match load_config(Some(config_file)) {
        Ok(_config) => {
            println!("Configuration file is valid");
            info!("Configuration validation passed");
            Ok(())
        }
        Err(e) => {
            println!("Configuration validation failed: {:#}", e);
            error!("Configuration validation failed: {:#}", e);
            Err(e)
        }
    }
}

/// Handle configuration generation
fn handle_config_generate(output: &PathBuf, force: bool) -> Result<()> {
    info!("Generating configuration at: {:?}", output);

    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    fs::write(output, PirateConfig::generate_sample())
        .context(format!("Failed to write configuration to {:?}", output))?;

    println!("Configuration written to {:?}", output);
    Ok(())
}

/// Render the effective configuration
fn render_config(config: &PirateConfig, format: &str) -> Result<String> {
    match format.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::to_string(config).context("Failed to serialize to YAML"),
        "json" => serde_json::to_string_pretty(config).context("Failed to serialize to JSON"),
        _ => Err(anyhow::anyhow!(
            "Unknown output format: {}. Valid formats: yaml, json",
            format
        )),
    }
}

fn handle_config_show(config_file: Option<&PathBuf>, format: &str) -> Result<()> {
    let config = load_config(config_file)?;
    println!("{}", render_config(&config, format)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    pirate_logging::init_logging(&config.logging, cli.log_level.as_deref())?;

    match &cli.command {
        Some(Commands::Broker { frontend, backend }) => {
            let config = apply_endpoint_overrides(config, frontend.as_ref(), backend.as_ref())?;
            broker_command(config).await
        }
        Some(Commands::Config { config_cmd }) => match config_cmd {
            ConfigCommands::Validate { config_file } => handle_config_validate(config_file),
            ConfigCommands::Generate { output, force } => handle_config_generate(output, *force),
            ConfigCommands::Show {
                config_file,
                format,
            } => handle_config_show(config_file.as_ref().or(cli.config.as_ref()), format),
        },
        None => {
            // If no subcommand is provided, print help
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            cmd.print_help().context("Failed to print help")?;
            println!();
            Ok(())
        }
    }
}
