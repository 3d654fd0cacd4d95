//! Inventory file loading

use anyhow::{bail, Context, Result};
use latitude_inventory_core::application::options::{verify_source_path, InventoryOptions};
use std::path::PathBuf;
use tracing::debug;

/// Expand `~` in the inventory path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Parse and validate inventory file contents
pub fn parse_options(contents: &str) -> Result<InventoryOptions> {
    if contents.trim().is_empty() {
        bail!("inventory file is empty");
    }

    let options: InventoryOptions =
        serde_yaml::from_str(contents).context("Invalid inventory file")?;
    options.validate()?;
    Ok(options)
}

/// Read, parse and validate the inventory file at `path`
pub async fn load_options(path: &str) -> Result<InventoryOptions> {
    let path = expand_path(path);

    if !verify_source_path(&path) {
        bail!(
            "{} is not a Latitude inventory file (name must end with latitude.yml or latitude.yaml)",
            path.display()
        );
    }

    debug!(path = %path.display(), "Loading inventory file");

    let contents = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse_options(&contents).with_context(|| format!("Failed to load {}", path.display()))
}
