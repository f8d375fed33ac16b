//! CLI configuration, parsed from an optional TOML file plus environment
//! variable overrides.
//!
//! Priority: environment variables > config file > defaults.
//!
//! Secrets never live here. The `[secrets]` section only names the
//! environment variables that carry them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "seqrets.toml";

pub const BACKEND_PCSC: &str = "pcsc";
pub const BACKEND_SIMULATOR: &str = "simulator";

const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub general: GeneralSection,

    /// Smart card access
    #[serde(default)]
    pub card: CardSection,

    /// Names of the environment variables holding secrets
    #[serde(default)]
    pub secrets: SecretsSection,

    #[serde(default)]
    pub vault: VaultSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSection {
    /// Log level (off, error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardSection {
    /// "pcsc" or "simulator"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Reader to use when `--reader` is not given; empty means the first one
    #[serde(default)]
    pub reader: String,
}

impl Default for CardSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            reader: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsSection {
    /// Share password
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Password of encrypted vault files
    #[serde(default = "default_vault_password_env")]
    pub vault_password_env: String,

    /// Current card PIN
    #[serde(default = "default_pin_env")]
    pub pin_env: String,

    /// PIN to set, change to, or put on a clone
    #[serde(default = "default_new_pin_env")]
    pub new_pin_env: String,
}

impl Default for SecretsSection {
    fn default() -> Self {
        Self {
            password_env: default_password_env(),
            vault_password_env: default_vault_password_env(),
            pin_env: default_pin_env(),
            new_pin_env: default_new_pin_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSection {
    /// Label for exported vaults when `--label` is not given
    #[serde(default = "default_vault_label")]
    pub default_label: String,
}

impl Default for VaultSection {
    fn default() -> Self {
        Self {
            default_label: default_vault_label(),
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_backend() -> String {
    BACKEND_PCSC.to_string()
}

fn default_password_env() -> String {
    "SEQRETS_PASSWORD".to_string()
}

fn default_vault_password_env() -> String {
    "SEQRETS_VAULT_PASSWORD".to_string()
}

fn default_pin_env() -> String {
    "SEQRETS_PIN".to_string()
}

fn default_new_pin_env() -> String {
    "SEQRETS_NEW_PIN".to_string()
}

fn default_vault_label() -> String {
    "seQRets vault".to_string()
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl CliConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Load `path`, or `seqrets.toml` in the working directory if present,
    /// or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `SEQRETS_LOG_LEVEL`
    /// - `SEQRETS_CARD_BACKEND`
    /// - `SEQRETS_CARD_READER`
    /// - `SEQRETS_PASSWORD_ENV`
    /// - `SEQRETS_VAULT_PASSWORD_ENV`
    /// - `SEQRETS_PIN_ENV`
    /// - `SEQRETS_NEW_PIN_ENV`
    /// - `SEQRETS_VAULT_LABEL`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SEQRETS_LOG_LEVEL") {
            self.general.log_level = v;
        }
        if let Ok(v) = std::env::var("SEQRETS_CARD_BACKEND") {
            self.card.backend = v;
        }
        if let Ok(v) = std::env::var("SEQRETS_CARD_READER") {
            self.card.reader = v;
        }
        if let Ok(v) = std::env::var("SEQRETS_PASSWORD_ENV") {
            self.secrets.password_env = v;
        }
        if let Ok(v) = std::env::var("SEQRETS_VAULT_PASSWORD_ENV") {
            self.secrets.vault_password_env = v;
        }
        if let Ok(v) = std::env::var("SEQRETS_PIN_ENV") {
            self.secrets.pin_env = v;
        }
        if let Ok(v) = std::env::var("SEQRETS_NEW_PIN_ENV") {
            self.secrets.new_pin_env = v;
        }
        if let Ok(v) = std::env::var("SEQRETS_VAULT_LABEL") {
            self.vault.default_label = v;
        }
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            is_log_filter(&self.general.log_level),
            "general.log_level must be one of {} or comma-separated target=level directives",
            LOG_LEVELS.join(", ")
        );

        anyhow::ensure!(
            [BACKEND_PCSC, BACKEND_SIMULATOR].contains(&self.card.backend.as_str()),
            "card.backend must be \"{}\" or \"{}\"",
            BACKEND_PCSC,
            BACKEND_SIMULATOR
        );

        for (key, name) in [
            ("secrets.password_env", &self.secrets.password_env),
            ("secrets.vault_password_env", &self.secrets.vault_password_env),
            ("secrets.pin_env", &self.secrets.pin_env),
            ("secrets.new_pin_env", &self.secrets.new_pin_env),
        ] {
            anyhow::ensure!(!name.is_empty(), "{} must not be empty", key);
            anyhow::ensure!(
                !name.contains('=') && !name.contains('\0'),
                "{} is not a valid environment variable name",
                key
            );
        }

        anyhow::ensure!(
            self.secrets.pin_env != self.secrets.new_pin_env,
            "secrets.pin_env and secrets.new_pin_env must differ"
        );

        Ok(())
    }
}

/// `level` or `target=level` directives, comma-separated, as `RUST_LOG` takes them.
fn is_log_filter(filter: &str) -> bool {
    let is_level = |level: &str| LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str());
    let is_target = |target: &str| {
        !target.is_empty()
            && target
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':' || c == '-')
    };

    filter.split(',').all(|directive| match directive.trim().split_once('=') {
        Some((target, level)) => is_target(target) && is_level(level),
        None => is_level(directive.trim()),
    })
}

// ============================================================================
// Tests
// ============================================================================
