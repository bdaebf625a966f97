//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the broker until interrupted
    Broker {
        /// Frontend endpoint for clients (overrides configuration)
        #[arg(long, value_name = "ADDR")]
        frontend: Option<String>,

        /// Backend endpoint for workers (overrides configuration)
        #[arg(long, value_name = "ADDR")]
        backend: Option<String>,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output file path
        #[arg(long, value_name = "PATH")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration in use
    Show {
        /// Path to configuration file (optional, uses default loading logic)
        #[arg(long, value_name = "PATH")]
        config_file: Option<PathBuf>,

        /// Output format: yaml, json
        #[arg(long, value_name = "FORMAT", default_value = "yaml")]
        format: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_overrides() {
        let cli = Cli::try_parse_from([
            "pirate",
            "--log-level",
            "debug",
            "broker",
            "--frontend",
            "0.0.0.0:7000",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Some(Commands::Broker { frontend, backend }) => {
                assert_eq!(frontend.as_deref(), Some("0.0.0.0:7000"));
                assert!(backend.is_none());
            }
            _ => panic!("expected broker command"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["pirate", "config", "show", "--config", "pirate.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("pirate.yaml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                config_cmd: ConfigCommands::Show { .. }
            })
        ));
    }

    #[test]
    fn test_generate_requires_output() {
        assert!(Cli::try_parse_from(["pirate", "config", "generate"]).is_err());
    }
}
