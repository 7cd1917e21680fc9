//! Main CLI application structure

use clap::Parser;
use std::path::PathBuf;

use crate::cli::commands::{keys, serve, Commands};
use crate::cli::error::CliResult;

/// pack-registry - Private registry for signed pacman packages
#[derive(Debug, Parser)]
#[command(name = "pack-registry")]
#[command(version = pack_registry::VERSION)]
#[command(about = "Private registry for signed pacman packages")]
#[command(long_about = "Stores signed .pkg.tar.zst packages per owner and serves them \
                         together with pacman repository databases built on demand.\n\n\
                         Configuration is read from defaults, an optional TOML file, \
                         PACK_REGISTRY_* environment variables and flags, in that order.\n\n\
                         Examples:\n\
                           pack-registry serve --port 8080 --key-dir ./keys\n\
                           pack-registry --config registry.toml serve\n\
                           pack-registry keys --key-dir ./keys")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML configuration file
    #[arg(long, global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> CliResult<()> {
        if self.verbose {
            pack_registry::init_logging_with_default("pack_registry=debug,tower_http=debug");
        } else {
            pack_registry::init_logging();
        }

        let config_file = self.config.as_deref();
        match self.command {
            Commands::Serve(args) => serve::execute_serve(config_file, args).await,
            Commands::Keys(args) => keys::execute_keys(config_file, args).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::try_parse_from([
            "pack-registry",
            "--config",
            "registry.toml",
            "serve",
            "--port",
            "9000",
            "--name",
            "pkg.example.com",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("registry.toml")));
        match cli.command {
            Commands::Serve(args) => {
                let overrides = args.overrides();
                assert_eq!(overrides.port, Some(9000));
                assert_eq!(overrides.name.as_deref(), Some("pkg.example.com"));
                assert!(overrides.host.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["pack-registry"]).is_err());
    }
}
