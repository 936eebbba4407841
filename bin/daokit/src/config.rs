use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use daokit_deploy::{CONFIG_FILENAME, DeployConfig};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::cli::ConfigOverrides;

/// Prefix of the environment variables read as settings.
const ENV_PREFIX: &str = "DAOKIT_";

/// Configuration file used when `--config` is not given: `./Daokit.toml` if
/// present, otherwise the one in the user's config directory.
fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir().map(|dir| dir.join("daokit").join(CONFIG_FILENAME))
}

fn resolve_config_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(CONFIG_FILENAME)
    } else {
        path.to_path_buf()
    }
}

/// Layer defaults, the configuration file, `DAOKIT_*` variables and command
/// line overrides, in increasing priority.
pub fn load(config: Option<&Path>, overrides: &ConfigOverrides) -> Result<DeployConfig> {
    let path = match config {
        Some(path) => {
            let path = resolve_config_path(path);
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            Some(path)
        }
        None => default_config_path(),
    };

    let mut figment = Figment::from(Serialized::defaults(DeployConfig::default()));
    if let Some(path) = &path {
        tracing::debug!(path = %path.display(), "Reading configuration file");
        figment = figment.merge(Toml::file(path));
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["verbosity", "config"]))
        .merge(Serialized::defaults(overrides))
        .extract()
        .context("Invalid configuration")
}
