//! Configuration loading and resolution
//!
//! Resolution priority for every setting: environment variable, then TOML
//! config file, then compiled default. The data-provider token is required
//! for scan/enrich runs; messaging credentials are optional and their
//! absence disables outbound sends rather than aborting startup.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable names
pub const ENV_DATA_DIR: &str = "LEADTRAP_DATA_DIR";
pub const ENV_RADAR_TOKEN: &str = "LEADTRAP_RADAR_API_TOKEN";
pub const ENV_TWILIO_SID: &str = "LEADTRAP_TWILIO_ACCOUNT_SID";
pub const ENV_TWILIO_TOKEN: &str = "LEADTRAP_TWILIO_AUTH_TOKEN";
pub const ENV_TWILIO_FROM: &str = "LEADTRAP_TWILIO_FROM_NUMBER";

/// Default data directory (relative to the working directory)
const DEFAULT_DATA_DIR: &str = "leadtrap-data";

/// On-disk TOML configuration schema
///
/// All fields optional; missing files or fields fall back to environment
/// variables and compiled defaults rather than terminating startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub data_dir: Option<String>,
    pub radar_api_token: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_from_number: Option<String>,
}

impl TomlConfig {
    /// Load TOML config from a path; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file not found: {} (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }
}

/// Messaging provider credentials
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

/// Fully resolved engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the SQLite database
    pub data_dir: PathBuf,
    /// Data provider bearer token (required for scan and enrich)
    pub radar_api_token: Option<String>,
    /// Messaging credentials; `None` disables outbound sends
    pub messaging: Option<MessagingConfig>,
}

impl EngineConfig {
    /// Resolve configuration from ENV over TOML over defaults.
    pub fn resolve(toml: &TomlConfig) -> Self {
        let data_dir = env_or(ENV_DATA_DIR, toml.data_dir.as_deref())
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());

        let radar_api_token = env_or(ENV_RADAR_TOKEN, toml.radar_api_token.as_deref());

        let sid = env_or(ENV_TWILIO_SID, toml.twilio_account_sid.as_deref());
        let token = env_or(ENV_TWILIO_TOKEN, toml.twilio_auth_token.as_deref());
        let from = env_or(ENV_TWILIO_FROM, toml.twilio_from_number.as_deref());

        let messaging = match (sid, token, from) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(MessagingConfig {
                account_sid,
                auth_token,
                from_number,
            }),
            (None, None, None) => None,
            _ => {
                warn!("Partial messaging credentials found; outbound sends disabled");
                None
            }
        };

        if messaging.is_none() {
            warn!("Messaging credentials missing; outbound sends disabled");
        }

        EngineConfig {
            data_dir: PathBuf::from(data_dir),
            radar_api_token,
            messaging,
        }
    }

    /// Require a data-provider token, erroring when unconfigured.
    ///
    /// Fatal at the start of any operation that talks to the provider.
    pub fn require_radar_token(&self) -> Result<&str> {
        self.radar_api_token.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "Data provider token not configured. Set {} or radar_api_token in the TOML config.",
                ENV_RADAR_TOKEN
            ))
        })
    }

    /// Path to the SQLite database inside the data directory.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("leadtrap.db")
    }
}

/// Non-empty environment value, falling back to the TOML value.
fn env_or(env_name: &str, toml_value: Option<&str>) -> Option<String> {
    match std::env::var(env_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => toml_value
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.to_string()),
    }
}
