//! Agent configuration with the access code in the OS keyring.
//!
//! The YAML file holds connection settings; the access code may be left out
//! of it and stored per serial number with `store-access-code` instead.

use anyhow::{Context, Result};
use keyring::Entry;
use printlink_core::config::{config_path, load_config};
use printlink_core::ClientConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const KEYRING_SERVICE: &str = "printlink";

/// Resolve the config file: explicit path, else `PRINTLINK_CONFIG`, else the
/// platform config dir.
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map(Path::to_path_buf).unwrap_or_else(config_path)
}

/// Load, apply environment overrides, fill the access code from the keyring
/// when the file has none, then validate.
pub async fn load(explicit: Option<&Path>) -> Result<ClientConfig> {
    let path = resolve_path(explicit);
    let mut config = load_config(&path)
        .await
        .with_context(|| format!("failed to load {}", path.display()))?;

    if config.access_code.trim().is_empty() && !config.serial.is_empty() {
        match load_access_code(&config.serial) {
            Ok(code) => {
                debug!(serial = %config.serial, "access code loaded from keyring");
                config.access_code = code;
            }
            Err(e) => debug!("no access code in keyring: {e}"),
        }
    }

    config.validate().context("invalid printer configuration")?;
    Ok(config)
}

fn keyring_user(serial: &str) -> String {
    format!("access-code-{serial}")
}

fn entry(serial: &str) -> Result<Entry> {
    Entry::new(KEYRING_SERVICE, &keyring_user(serial)).context("keyring unavailable")
}

pub fn load_access_code(serial: &str) -> Result<String> {
    entry(serial)?.get_password().map_err(Into::into)
}

pub fn store_access_code(serial: &str, access_code: &str) -> Result<()> {
    entry(serial)?
        .set_password(access_code)
        .context("failed to store access code")?;
    info!(serial, "access code stored in keyring");
    Ok(())
}

pub fn delete_access_code(serial: &str) -> Result<()> {
    entry(serial)?.delete_credential().map_err(Into::into)
}
