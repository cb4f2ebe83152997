//! Configuration Management
//!
//! This module builds the `GatewayConfig` handed to `Gateway::new`. There is no
//! process-wide configuration: callers construct one explicitly, either directly
//! or by layering the config files and command-line overrides.
//!
//! # Configuration Locations
//! - Local: `.pgwarden/config.json` (per-project)
//! - Global: `<config dir>/pgwarden/config.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Command-line flags and environment (highest priority)
//! 2. Local config file (`.pgwarden/config.json`)
//! 3. Global config file
//! 4. Built-in defaults
//!
//! # Secrets
//! A file may name an environment variable (`database_url_env`) instead of storing
//! the connection descriptor itself.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{redact_descriptor, CallContext, ConnectionDescriptor};
use crate::error::{GatewayError, Result};

/// Default row limit injected into plain `SELECT`s
pub const DEFAULT_LIMIT: i64 = 1000;

/// Default per-call deadline in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default `application_name` reported to the server
pub const DEFAULT_APPLICATION_NAME: &str = "pgwarden";

/// Session configuration for one gateway
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Connection descriptor; absent means the no-connection state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Environment variable holding the descriptor, used when `database_url` is absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url_env: Option<String>,

    /// Row limit for `query` when the caller passes none (`<= 0` disables)
    pub default_limit: i64,

    /// Per-call deadline in seconds (`0` disables)
    pub timeout_secs: u64,

    /// Open every session with `default_transaction_read_only=on`
    pub read_only_session: bool,

    /// `application_name` reported to the server
    pub application_name: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_url_env: None,
            default_limit: DEFAULT_LIMIT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            read_only_session: true,
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("database_url", &self.database_url.as_deref().map(redact_descriptor))
            .field("database_url_env", &self.database_url_env)
            .field("default_limit", &self.default_limit)
            .field("timeout_secs", &self.timeout_secs)
            .field("read_only_session", &self.read_only_session)
            .field("application_name", &self.application_name)
            .finish()
    }
}

impl GatewayConfig {
    /// Defaults plus a connection descriptor
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self { database_url: Some(database_url.into()), ..Self::default() }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.default_limit = limit;
        self
    }

    /// Rounded up to whole seconds; `Duration::ZERO` disables the deadline
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let partial = u64::from(timeout.subsec_nanos() > 0);
        self.timeout_secs = timeout.as_secs().saturating_add(partial);
        self
    }

    #[must_use]
    pub fn with_read_only_session(mut self, enabled: bool) -> Self {
        self.read_only_session = enabled;
        self
    }

    /// Per-call deadline, `None` when disabled
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// The descriptor, or `None` when absent or blank
    #[must_use]
    pub fn descriptor(&self) -> Option<ConnectionDescriptor> {
        self.database_url.as_deref().and_then(ConnectionDescriptor::new)
    }

    /// A fresh call context carrying the configured deadline
    #[must_use]
    pub fn call_context(&self) -> CallContext {
        CallContext::new().with_optional_deadline(self.timeout())
    }

    /// Overlay every field `layer` sets
    pub fn apply(&mut self, layer: ConfigLayer) {
        if let Some(url) = layer.database_url {
            self.database_url = Some(url);
        }
        if let Some(env) = layer.database_url_env {
            self.database_url_env = Some(env);
        }
        if let Some(limit) = layer.default_limit {
            self.default_limit = limit;
        }
        if let Some(secs) = layer.timeout_secs {
            self.timeout_secs = secs;
        }
        if let Some(read_only) = layer.read_only_session {
            self.read_only_session = read_only;
        }
        if let Some(name) = layer.application_name {
            self.application_name = name;
        }
    }

    /// Fill `database_url` from `database_url_env` when no descriptor is set
    pub fn resolve_env(mut self) -> Result<Self> {
        let has_url = self.database_url.as_deref().is_some_and(|url| !url.trim().is_empty());
        if has_url {
            return Ok(self);
        }

        if let Some(env_var) = &self.database_url_env {
            match std::env::var(env_var) {
                Ok(url) => self.database_url = Some(url),
                Err(_) => {
                    return Err(GatewayError::config_error(format!(
                        "Environment variable {env_var} not found for database_url"
                    )));
                }
            }
        }

        Ok(self)
    }

    /// Layer global file, local file, then `overrides` over the defaults
    pub fn load(overrides: ConfigLayer) -> Result<Self> {
        Self::load_from(&global_config_path()?, &local_config_path()?, overrides)
    }

    /// `load` with explicit file locations
    pub fn load_from(global: &Path, local: &Path, overrides: ConfigLayer) -> Result<Self> {
        let mut config = Self::default();
        config.apply(load_layer(global)?);
        config.apply(load_layer(local)?);
        config.apply(overrides);
        config.resolve_env()
    }
}

/// A partial configuration: one config file, or the command-line overrides
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_limit: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only_session: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
}

impl fmt::Debug for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLayer")
            .field("database_url", &self.database_url.as_deref().map(redact_descriptor))
            .field("database_url_env", &self.database_url_env)
            .field("default_limit", &self.default_limit)
            .field("timeout_secs", &self.timeout_secs)
            .field("read_only_session", &self.read_only_session)
            .field("application_name", &self.application_name)
            .finish()
    }
}

/// Get path to local config file (`.pgwarden/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        GatewayError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".pgwarden").join("config.json"))
}

/// Get path to global config file (`<config dir>/pgwarden/config.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| GatewayError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("pgwarden").join("config.json"))
}

/// Load one config file; a missing file is an empty layer
pub fn load_layer(path: &Path) -> Result<ConfigLayer> {
    if !path.exists() {
        return Ok(ConfigLayer::default());
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        GatewayError::config_error(format!("Could not read config file {}: {e}", path.display()))
    })?;

    serde_json::from_str(&contents).map_err(|e| {
        GatewayError::config_error(format!("Invalid config file format in {}: {e}", path.display()))
    })
}
