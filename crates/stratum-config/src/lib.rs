//! # Stratum Config - Configuration Management
//!
//! Handles configuration loading from files and environment variables.

use std::path::Path;

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Flags consumed by the resolution core.
///
/// These are injected into holders at construction time; the core
/// never reads configuration globally.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Expand the root wildcard and trailing-wildcard permissions
    /// against the caller-supplied universe during export.
    #[serde(default = "default_true")]
    pub apply_wildcards: bool,

    /// Expand `(a|b)` alternation groups during export.
    #[serde(default = "default_true")]
    pub apply_shorthand: bool,

    /// Treat `R=`-prefixed server and world matchers as regular
    /// expressions.
    #[serde(default = "default_true")]
    pub applying_regex: bool,

    /// Whether unscoped nodes apply by default in scope-based exports.
    #[serde(default = "default_true")]
    pub including_global_perms: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            apply_wildcards: default_true(),
            apply_shorthand: default_true(),
            applying_regex: default_true(),
            including_global_perms: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Load configuration from file and environment
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let builder = ConfigBuilder::builder()
        .add_source(File::from(path.as_ref()).required(false))
        .add_source(Environment::with_prefix("STRATUM").separator("__"))
        .build()?;

    builder.try_deserialize()
}

/// Load configuration with defaults
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Config {
    load(path).unwrap_or_default()
}
