//! Keytab materialization
//!
//! Connections may carry a keytab as base64 text. spark-submit only accepts
//! a path, so the decoded bytes are written to a predictable file:
//!
//! ```text
//! {dir}/<prefix>-<principal or uuid>      final path
//! {dir}/.<prefix>-<...>.<uuid>            staging file, renamed into place
//! ```
//!
//! Writers racing on the same principal converge on the same bytes; the last
//! rename wins and no reader ever sees a partial file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{error, info};

use crate::config::KeytabSettings;

/// File name prefix for materialized keytabs
pub const DEFAULT_KEYTAB_PREFIX: &str = "spark_keytab";

/// Errors from decoding or persisting a keytab
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Failed to decode base64 keytab: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Failed to save keytab to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a materialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedKeytab {
    /// Final keytab path
    pub path: PathBuf,
    /// True when an identical file was already present and nothing was written
    pub reused: bool,
}

/// Writes decoded keytabs under a fixed directory
#[derive(Debug, Clone)]
pub struct KeytabMaterializer {
    dir: PathBuf,
    prefix: String,
}

impl KeytabMaterializer {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        let dir = dir.into();
        let dir = fs::canonicalize(&dir).unwrap_or(dir);
        Self {
            dir,
            prefix: prefix.into(),
        }
    }

    /// Materializer for the configured directory, the system temp dir by default
    pub fn from_settings(settings: &KeytabSettings) -> Self {
        let dir = settings.dir.clone().unwrap_or_else(std::env::temp_dir);
        Self::new(dir, settings.prefix.as_str())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path for a principal. Principals such as `spark/host@REALM`
    /// contain a slash, which is replaced to keep the file inside `dir`.
    pub fn keytab_path(&self, principal: &str) -> PathBuf {
        self.dir.join(self.file_name(principal))
    }

    fn file_name(&self, id: &str) -> String {
        format!("{}-{}", self.prefix, id.replace('/', "_"))
    }

    /// Decode `base64_keytab` and persist it.
    ///
    /// Without a principal the file is named after a fresh uuid, so every
    /// call writes a new file.
    pub fn materialize(
        &self,
        base64_keytab: &str,
        principal: Option<&str>,
    ) -> Result<MaterializedKeytab, CredentialError> {
        let keytab = STANDARD.decode(base64_keytab.trim()).map_err(|e| {
            error!(error = %e, "Failed to decode base64 keytab");
            CredentialError::Decode(e)
        })?;

        let unique = uuid::Uuid::new_v4().to_string();
        let name = self.file_name(principal.unwrap_or(&unique));
        let keytab_path = self.dir.join(&name);

        if let Ok(existing) = fs::read(&keytab_path) {
            if existing == keytab {
                info!(path = %keytab_path.display(), "Keytab file already exists with identical content");
                return Ok(MaterializedKeytab {
                    path: keytab_path,
                    reused: true,
                });
            }
        }

        let staging = Staging::new(self.dir.join(format!(".{}.{}", name, unique)));
        self.write_staged(&staging, &keytab, &keytab_path)
            .map_err(|source| {
                error!(path = %keytab_path.display(), error = %source, "Failed to save keytab");
                CredentialError::Write {
                    path: keytab_path.clone(),
                    source,
                }
            })?;

        Ok(MaterializedKeytab {
            path: keytab_path,
            reused: false,
        })
    }

    fn write_staged(&self, staging: &Staging, keytab: &[u8], target: &Path) -> std::io::Result<()> {
        info!(path = %staging.path.display(), "Saving keytab");

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&staging.path)?;
        file.write_all(keytab)?;
        file.sync_all()?;
        drop(file);

        info!(from = %staging.path.display(), to = %target.display(), "Moving keytab into place");
        fs::rename(&staging.path, target)
    }
}

/// Staging file removed on drop unless it was already renamed away.
struct Staging {
    path: PathBuf,
}

impl Staging {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if self.path.exists() {
            info!(path = %self.path.display(), "Removing staging keytab file");
            let _ = fs::remove_file(&self.path);
        }
    }
}
