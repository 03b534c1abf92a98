//! Hook settings
//!
//! Settings are built from three layers, last wins:
//! 1. Built-in defaults
//! 2. Settings file (~/.config/spark-submit-hook/settings.toml)
//! 3. CLI overrides

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::merge::merge_layers;
use super::ConfigError;
use crate::keytab::DEFAULT_KEYTAB_PREFIX;

/// External binaries invoked besides spark-submit itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinarySettings {
    /// YARN CLI, used to kill applications
    pub yarn: String,
    /// Kerberos `kinit`, used to renew tickets before a YARN kill
    pub kinit: String,
    /// `curl`, used to query the standalone REST submission server
    pub curl: String,
}

impl Default for BinarySettings {
    fn default() -> Self {
        Self {
            yarn: "yarn".to_string(),
            kinit: "kinit".to_string(),
            curl: "/usr/bin/curl".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KerberosSettings {
    /// Credential cache written by `kinit` and exported as KRB5CCNAME
    pub ccache: String,
    /// Principal used in ticket-cache mode when none is given explicitly.
    /// `_HOST` is replaced with the local host name.
    pub principal: Option<String>,
}

impl Default for KerberosSettings {
    fn default() -> Self {
        Self {
            ccache: "/tmp/spark_hook_krb5_ccache".to_string(),
            principal: None,
        }
    }
}

/// Driver status polling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    /// `--max-time` passed to curl for REST status queries
    pub curl_max_time_seconds: u64,
    /// Consecutive failed status queries tolerated before giving up
    pub max_missed_reports: u32,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            curl_max_time_seconds: 30,
            max_missed_reports: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeytabSettings {
    /// File name prefix for materialized keytabs
    pub prefix: String,
    /// Directory for materialized keytabs (default: system temp dir)
    pub dir: Option<PathBuf>,
}

impl Default for KeytabSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_KEYTAB_PREFIX.to_string(),
            dir: None,
        }
    }
}

/// Effective hook settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookSettings {
    pub binaries: BinarySettings,
    pub kerberos: KerberosSettings,
    pub status: StatusSettings,
    pub keytab: KeytabSettings,
    /// Seconds between SIGTERM and SIGKILL when cancelling spark-submit
    pub termination_grace_seconds: u64,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            binaries: BinarySettings::default(),
            kerberos: KerberosSettings::default(),
            status: StatusSettings::default(),
            keytab: KeytabSettings::default(),
            termination_grace_seconds: 10,
        }
    }
}

impl HookSettings {
    /// Build settings from layers.
    ///
    /// A missing settings file is not an error; the builtin layer applies.
    pub fn load(path: Option<&Path>, overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = Vec::new();

        layers.push(
            serde_json::to_value(Self::default()).map_err(|e| ConfigError::ParseError(e.to_string()))?,
        );

        if let Some(path) = path {
            if path.exists() {
                layers.push(Self::load_toml_file(path)?);
            }
        }

        if let Some(overrides) = overrides {
            layers.push(overrides);
        }

        let merged = merge_layers(layers);
        let settings: HookSettings = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ParseError(format!("invalid settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Default settings file location
    pub fn default_path() -> Option<PathBuf> {
        std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".config/spark-submit-hook/settings.toml"))
    }

    fn load_toml_file(path: &Path) -> Result<Value, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        toml::from_str::<Value>(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.status.max_missed_reports == 0 {
            return Err(ConfigError::ValidationError(
                "status.max_missed_reports must be at least 1".to_string(),
            ));
        }
        if self.keytab.prefix.is_empty() || self.keytab.prefix.contains('/') {
            return Err(ConfigError::ValidationError(
                "keytab.prefix must be a non-empty file name".to_string(),
            ));
        }
        Ok(())
    }
}
