//! Keys command implementation

use crate::cli::config::{load_config, ConfigOverrides};
use crate::cli::error::CliResult;
use clap::Args;
use pack_registry::storage::redb::discover_key_files;
use std::path::{Path, PathBuf};

/// Validate the owner key directory
#[derive(Debug, Args)]
pub struct KeysArgs {
    #[arg(long, help = "Directory of owner public keys (<owner>/<email>)")]
    key_dir: Option<PathBuf>,
}

pub async fn execute_keys(config_file: Option<&Path>, args: KeysArgs) -> CliResult<()> {
    let overrides = ConfigOverrides {
        key_dir: args.key_dir,
        ..ConfigOverrides::default()
    };
    let config = load_config(config_file, &overrides)?;

    let files = discover_key_files(&config.key_dir)?;
    if files.is_empty() {
        println!("No public keys found in {}", config.key_dir.display());
        return Ok(());
    }

    for file in &files {
        println!("  {}/{}", file.owner, file.email);
    }
    println!(
        "{} valid key files in {}",
        files.len(),
        config.key_dir.display()
    );
    Ok(())
}
