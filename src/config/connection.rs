//! Spark connection records
//!
//! Connections live in a TOML file, by default
//! `~/.config/spark-submit-hook/connections.toml`:
//!
//! ```toml
//! [[connection]]
//! conn_id = "spark_default"
//! host = "yarn"
//!
//! [[connection]]
//! conn_id = "spark_standalone"
//! host = "spark://spark-master"
//! port = 6066
//!
//! [connection.extra]
//! deploy-mode = "cluster"
//! spark-binary = "spark3-submit"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Optional connection fields, named the way they appear in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionExtra {
    /// YARN queue
    #[serde(default)]
    pub queue: Option<String>,

    /// `client` or `cluster`
    #[serde(default, rename = "deploy-mode")]
    pub deploy_mode: Option<String>,

    /// One of the allowed spark-submit binaries
    #[serde(default, rename = "spark-binary")]
    pub spark_binary: Option<String>,

    /// No longer supported; rejected during resolution
    #[serde(default, rename = "spark-home")]
    pub spark_home: Option<String>,

    /// Kubernetes namespace
    #[serde(default)]
    pub namespace: Option<String>,

    /// Kerberos principal
    #[serde(default)]
    pub principal: Option<String>,

    /// Base64-encoded keytab content
    #[serde(default)]
    pub keytab: Option<String>,
}

/// A single connection entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Unique connection id
    pub conn_id: String,

    /// Master host or URL: `yarn`, `local[*]`, `spark://host`,
    /// `k8s://https://host`
    pub host: String,

    /// Master port, appended to the host when present
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub extra: ConnectionExtra,
}

impl ConnectionRecord {
    /// The master URL passed to `--master`
    pub fn master(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

/// Errors that can occur when loading or looking up connections
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to read connection file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Duplicate connection id: '{0}'")]
    DuplicateId(String),

    #[error("Connection '{conn_id}': missing required field '{field}'")]
    MissingField { conn_id: String, field: String },

    #[error("Connection file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("The conn_id `{0}` isn't defined")]
    NotFound(String),
}

/// Anything that can hand out connection records by id.
pub trait ConnectionSource {
    fn get_connection(&self, conn_id: &str) -> Result<ConnectionRecord, ConnectionError>;
}

/// File-backed connection store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionStore {
    #[serde(default, rename = "connection")]
    pub connections: Vec<ConnectionRecord>,
}

impl ConnectionStore {
    /// A store with no connections; every lookup falls back to defaults.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get the default connection file path
    pub fn default_path() -> Result<PathBuf, ConnectionError> {
        let home = std::env::var("HOME").map_err(|_| {
            ConnectionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "HOME environment variable not set",
            ))
        })?;
        Ok(PathBuf::from(home).join(".config/spark-submit-hook/connections.toml"))
    }

    /// Load connections from a specific path
    pub fn load(path: &Path) -> Result<Self, ConnectionError> {
        if !path.exists() {
            return Err(ConnectionError::FileNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse connections from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConnectionError> {
        let store: ConnectionStore = toml::from_str(content)?;
        store.validate()?;
        Ok(store)
    }

    fn validate(&self) -> Result<(), ConnectionError> {
        let mut seen = HashSet::new();
        for conn in &self.connections {
            if conn.conn_id.is_empty() {
                return Err(ConnectionError::MissingField {
                    conn_id: "(unnamed)".to_string(),
                    field: "conn_id".to_string(),
                });
            }
            if conn.host.is_empty() {
                return Err(ConnectionError::MissingField {
                    conn_id: conn.conn_id.clone(),
                    field: "host".to_string(),
                });
            }
            if !seen.insert(&conn.conn_id) {
                return Err(ConnectionError::DuplicateId(conn.conn_id.clone()));
            }
        }
        Ok(())
    }

    /// Get a connection by id
    pub fn get(&self, conn_id: &str) -> Option<&ConnectionRecord> {
        self.connections.iter().find(|c| c.conn_id == conn_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl ConnectionSource for ConnectionStore {
    fn get_connection(&self, conn_id: &str) -> Result<ConnectionRecord, ConnectionError> {
        self.get(conn_id)
            .cloned()
            .ok_or_else(|| ConnectionError::NotFound(conn_id.to_string()))
    }
}
