pub mod compare;
pub mod download;
pub mod index;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};

use transfiler_core::{config, Config};

/// Resolve configuration: `--config`, then `./transfiler.yaml`, then
/// `~/.transfiler/config.yaml`, then defaults.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let cwd = std::env::current_dir().context("could not determine working directory")?;
    let home = dirs::home_dir();
    let config = config::resolve_at(explicit, &cwd, home.as_deref())
        .context("failed to load configuration")?;
    tracing::debug!(?config, "configuration resolved");
    Ok(config)
}
