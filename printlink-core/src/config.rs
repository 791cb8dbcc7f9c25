use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

use crate::error::{PrinterError, Result};

/// Connection and synchronisation settings for one printer.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    pub hostname: String,
    /// LAN access code, used as the MQTT password.
    #[serde(default)]
    pub access_code: String,
    pub serial: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Minimum seconds between two full refresh requests.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_true")]
    pub refresh_on_connect: bool,
    /// Fail reads with `NotReady` instead of returning defaults.
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,
    #[serde(default)]
    pub client_id: Option<String>,
}

fn default_username() -> String {
    "bblp".into()
}
fn default_port() -> u16 {
    8883
}
fn default_keep_alive() -> u64 {
    60
}
fn default_refresh_interval() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
fn default_publish_timeout() -> u64 {
    10
}

impl ClientConfig {
    pub fn new(
        hostname: impl Into<String>,
        access_code: impl Into<String>,
        serial: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            access_code: access_code.into(),
            serial: serial.into(),
            username: default_username(),
            port: default_port(),
            keep_alive_secs: default_keep_alive(),
            refresh_interval_secs: default_refresh_interval(),
            refresh_on_connect: true,
            strict: false,
            publish_timeout_secs: default_publish_timeout(),
            client_id: None,
        }
    }

    pub fn report_topic(&self) -> String {
        format!("device/{}/report", self.serial)
    }

    pub fn request_topic(&self) -> String {
        format!("device/{}/request", self.serial)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    /// Configured client id, or a fresh `printlink-<uuid>`.
    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("printlink-{}", uuid::Uuid::new_v4()))
    }

    /// Override fields from `PRINTLINK_HOST`, `PRINTLINK_SERIAL` and
    /// `PRINTLINK_ACCESS_CODE` when set.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("PRINTLINK_HOST") {
            self.hostname = host;
        }
        if let Ok(serial) = std::env::var("PRINTLINK_SERIAL") {
            self.serial = serial;
        }
        if let Ok(code) = std::env::var("PRINTLINK_ACCESS_CODE") {
            self.access_code = code;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("hostname", &self.hostname),
            ("serial", &self.serial),
            ("access_code", &self.access_code),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(PrinterError::Config(format!("{name} must not be empty")));
            }
        }
        if self.refresh_interval_secs == 0 {
            return Err(PrinterError::Config("refresh_interval_secs must be positive".into()));
        }
        if self.publish_timeout_secs == 0 {
            return Err(PrinterError::Config("publish_timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

/// `PRINTLINK_CONFIG`, else `<config dir>/printlink/printer.yaml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("PRINTLINK_CONFIG") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("printlink")
        .join("printer.yaml")
}

/// Read a YAML config file. Validation is left to the caller, which may
/// still need to fill in the access code.
pub async fn load_config_from(path: &Path) -> Result<ClientConfig> {
    let txt = fs::read_to_string(path).await?;
    if txt.trim().is_empty() {
        return Err(PrinterError::Config(format!("{} is empty", path.display())));
    }
    let config: ClientConfig = serde_yaml::from_str(&txt)
        .map_err(|e| PrinterError::Config(format!("{}: {e}", path.display())))?;
    info!("loaded printer config from {}", path.display());
    Ok(config)
}

/// Load `path` when it exists, else start empty, then apply environment
/// overrides. Not validated.
pub async fn load_config(path: &Path) -> Result<ClientConfig> {
    let mut config = if path.exists() {
        load_config_from(&path).await?
    } else {
        warn!("no config at {}, using environment only", path.display());
        ClientConfig::new("", "", "")
    };
    config.apply_env();
    Ok(config)
}

pub async fn save_config(config: &ClientConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let yaml = serde_yaml::to_string(config).map_err(|e| PrinterError::Config(e.to_string()))?;
    fs::write(path, yaml).await?;
    Ok(())
}
