//! Configuration loading for the CLI
//!
//! Layers, lowest priority first: built-in defaults, an optional TOML file,
//! `PACK_REGISTRY_*` environment variables, then command line flags.

use crate::cli::error::{CliError, CliResult};
use config::{Config, Environment, File, FileFormat};
use pack_registry::RegistryConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "PACK_REGISTRY";

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub key_dir: Option<PathBuf>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

fn path_value(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().into_owned())
}

/// Resolve the registry configuration
pub fn load_config(file: Option<&Path>, overrides: &ConfigOverrides) -> CliResult<RegistryConfig> {
    let mut builder = Config::builder().add_source(Config::try_from(&RegistryConfig::default())?);

    if let Some(path) = file {
        debug!("Reading configuration from {}", path.display());
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }

    builder = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .set_override_option("name", overrides.name.clone())?
        .set_override_option("host", overrides.host.clone())?
        .set_override_option("port", overrides.port.map(i64::from))?
        .set_override_option("db_path", path_value(&overrides.db_path))?
        .set_override_option("key_dir", path_value(&overrides.key_dir))?
        .set_override_option("tls_cert", path_value(&overrides.tls_cert))?
        .set_override_option("tls_key", path_value(&overrides.tls_key))?;

    let config: RegistryConfig = builder.build()?.try_deserialize()?;
    config
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(config)
}
