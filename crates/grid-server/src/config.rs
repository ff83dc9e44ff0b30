//! Server configuration.
//!
//! Loaded from `grid-config.yaml` (path overridable with `GRID_CONFIG`).
//! Every field has a serde default, so a missing file, a missing section
//! or a missing key all fall back to development defaults. Environment
//! variables are applied last and win over the file.

use std::path::Path;

use grid_hub::{DEV_JWT_SECRET, HubConfig};
use serde::Deserialize;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "grid-config.yaml";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override had an unusable value.
    #[error("invalid value for {key}: {value:?}")]
    InvalidOverride {
        /// Variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
    },

    /// Production was requested without a JWT secret.
    #[error("JWT_SECRET must be set when running in production")]
    MissingSecret,
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GridConfig {
    /// Listener and deployment settings.
    #[serde(default)]
    pub server: ServerSection,
    /// Credential verification.
    #[serde(default)]
    pub auth: AuthSection,
    /// Hub tuning.
    #[serde(default)]
    pub realtime: HubConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl GridConfig {
    /// Load from `path` if it exists (defaults otherwise), then apply
    /// process environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load from a YAML file without environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse a YAML document.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides looked up through `lookup`: `HOST`, `PORT`,
    /// `JWT_SECRET`, `CLIENT_URL`, `GRID_ENV`, `LOG_FORMAT`.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("HOST") {
            self.server.host = val;
        }
        if let Some(val) = lookup("PORT") {
            self.server.port = val
                .trim()
                .parse()
                .map_err(|_err| ConfigError::InvalidOverride { key: "PORT", value: val })?;
        }
        if let Some(val) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = Some(val);
        }
        if let Some(val) = lookup("CLIENT_URL") {
            self.server.cors_origin = val;
        }
        if let Some(val) = lookup("GRID_ENV") {
            self.server.environment = match val.trim().to_ascii_lowercase().as_str() {
                "production" | "prod" => Environment::Production,
                "development" | "dev" => Environment::Development,
                _ => return Err(ConfigError::InvalidOverride { key: "GRID_ENV", value: val }),
            };
        }
        if let Some(val) = lookup("LOG_FORMAT") {
            self.logging.format = match val.trim().to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                _ => return Err(ConfigError::InvalidOverride { key: "LOG_FORMAT", value: val }),
            };
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development; a missing secret falls back to the dev secret.
    #[default]
    Development,
    /// Production; a missing secret is fatal.
    Production,
}

/// `server` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,
    /// Allowed dashboard origin for CORS; `*` allows any.
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: Environment::default(),
            cors_origin: default_cors_origin(),
        }
    }
}

/// `auth` section.
#[derive(Clone, Default, Deserialize)]
pub struct AuthSection {
    /// Shared HS256 secret. Prefer the `JWT_SECRET` variable.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Clock skew tolerated on `exp`, in seconds.
    #[serde(default)]
    pub leeway_secs: u64,
}

impl core::fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthSection")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

/// Where the verification secret came from.
#[derive(PartialEq, Eq)]
pub enum JwtSecret {
    /// Set in the file or environment.
    Configured(String),
    /// Built-in development secret.
    Development,
}

impl JwtSecret {
    /// Secret bytes for the authenticator.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Configured(secret) => secret.as_bytes(),
            Self::Development => DEV_JWT_SECRET.as_bytes(),
        }
    }
}

impl core::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Configured(_) => f.write_str("Configured(<redacted>)"),
            Self::Development => f.write_str("Development"),
        }
    }
}

impl AuthSection {
    /// Pick the secret for `environment`. Production without a configured
    /// secret is an error.
    pub fn resolve_secret(&self, environment: Environment) -> Result<JwtSecret, ConfigError> {
        match self.jwt_secret.as_deref() {
            Some(secret) if !secret.trim().is_empty() => {
                Ok(JwtSecret::Configured(secret.to_owned()))
            }
            _ if environment == Environment::Production => Err(ConfigError::MissingSecret),
            _ => Ok(JwtSecret::Development),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// `logging` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Default filter directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    3001
}

fn default_cors_origin() -> String {
    String::from("*")
}

fn default_log_level() -> String {
    String::from("info")
}
