//! Target resolution
//!
//! Folds a connection record and the request's explicit overrides into a
//! single immutable [`TargetConnection`].

use serde::Serialize;
use spark_log_classifier::{DeployMode, LogClassifier, TargetKind};
use tracing::{debug, info};

use super::connection::{ConnectionRecord, ConnectionSource};
use super::settings::HookSettings;
use super::ConfigError;
use crate::command::SubmissionRequest;
use crate::error::HookResult;
use crate::keytab::KeytabMaterializer;

/// Binary used when neither the request nor the connection names one
pub const DEFAULT_SPARK_BINARY: &str = "spark-submit";

/// Binaries that may be invoked as spark-submit
pub const ALLOWED_SPARK_BINARIES: &[&str] = &["spark-submit", "spark2-submit", "spark3-submit"];

/// Master used when no connection could be loaded
pub const DEFAULT_MASTER: &str = "yarn";

const NAMESPACE_CONF: &str = "spark.kubernetes.namespace";

/// Normalized submission target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetConnection {
    /// Value of `--master`
    pub master: String,
    /// Cluster manager, derived from `master` once
    pub kind: TargetKind,
    pub deploy_mode: Option<DeployMode>,
    pub queue: Option<String>,
    pub spark_binary: String,
    pub namespace: Option<String>,
    pub principal: Option<String>,
    /// Path to a keytab file
    pub keytab: Option<String>,
}

impl TargetConnection {
    /// The target used when no connection record is available
    pub fn fallback() -> Self {
        Self {
            master: DEFAULT_MASTER.to_string(),
            kind: TargetKind::from_master(DEFAULT_MASTER),
            deploy_mode: None,
            queue: None,
            spark_binary: DEFAULT_SPARK_BINARY.to_string(),
            namespace: None,
            principal: None,
            keytab: None,
        }
    }

    pub fn is_cluster_mode(&self) -> bool {
        self.deploy_mode == Some(DeployMode::Cluster)
    }

    /// Whether the driver status is polled after submission
    pub fn tracks_driver_status(&self) -> bool {
        self.kind == TargetKind::Standalone && self.is_cluster_mode()
    }

    /// Output classifier for this target
    pub fn classifier(&self) -> LogClassifier {
        LogClassifier::new(self.kind, self.deploy_mode)
    }
}

/// Resolve the target for `conn_id`.
///
/// Explicit request values win over connection extras, which win over
/// defaults. A connection that cannot be loaded is not an error: the
/// default target is used and the fallback is logged.
///
/// Fails with [`crate::HookError::Config`] for an invalid target and with
/// [`crate::HookError::Credential`] when the connection's keytab cannot be
/// written.
pub fn resolve_target(
    conn_id: &str,
    source: &dyn ConnectionSource,
    request: &SubmissionRequest,
    settings: &HookSettings,
) -> HookResult<TargetConnection> {
    let mut target = TargetConnection::fallback();
    target.principal = resolve_principal(request, settings)?;
    target.keytab = request.keytab.clone();

    match source.get_connection(conn_id) {
        Ok(record) => apply_connection(&mut target, &record, request, settings)?,
        Err(e) => {
            info!(
                conn_id,
                master = %target.master,
                reason = %e,
                "Could not load connection, using default master"
            );
        }
    }

    // Explicit values hold regardless of whether the connection loaded
    if let Some(queue) = &request.yarn_queue {
        target.queue = Some(queue.clone());
    }
    if let Some(mode) = request.deploy_mode {
        target.deploy_mode = Some(mode);
    }
    if let Some(binary) = &request.spark_binary {
        target.spark_binary = binary.clone();
    }
    if let Some(namespace) = request.conf.get(NAMESPACE_CONF) {
        target.namespace = Some(namespace.clone());
    }

    validate_binary(&target.spark_binary)?;
    target.kind = TargetKind::from_master(&target.master);

    debug!(
        conn_id,
        master = %target.master,
        kind = %target.kind,
        deploy_mode = ?target.deploy_mode,
        "Resolved submission target"
    );

    Ok(target)
}

fn apply_connection(
    target: &mut TargetConnection,
    record: &ConnectionRecord,
    request: &SubmissionRequest,
    settings: &HookSettings,
) -> HookResult<()> {
    let extra = &record.extra;

    if extra.spark_home.as_deref().is_some_and(|home| !home.is_empty()) {
        return Err(ConfigError::DeprecatedSparkHome {
            allowed: ALLOWED_SPARK_BINARIES,
        }
        .into());
    }

    target.master = record.master();
    target.queue = extra.queue.clone();
    target.deploy_mode = extra
        .deploy_mode
        .as_deref()
        .map(str::parse::<DeployMode>)
        .transpose()
        .map_err(ConfigError::from)?;
    if let Some(binary) = &extra.spark_binary {
        target.spark_binary = binary.clone();
    }
    target.namespace = extra.namespace.clone();

    if target.principal.is_none() {
        target.principal = extra.principal.clone();
    }

    if request.keytab.is_none() {
        if let Some(encoded) = &extra.keytab {
            let materializer = KeytabMaterializer::from_settings(&settings.keytab);
            let keytab = materializer.materialize(encoded, target.principal.as_deref())?;
            target.keytab = Some(keytab.path.to_string_lossy().into_owned());
        }
    }

    Ok(())
}

fn validate_binary(binary: &str) -> Result<(), ConfigError> {
    if ALLOWED_SPARK_BINARIES.contains(&binary) {
        Ok(())
    } else {
        Err(ConfigError::DisallowedBinary {
            binary: binary.to_string(),
            allowed: ALLOWED_SPARK_BINARIES,
        })
    }
}

/// In ticket-cache mode the principal falls back to the configured one,
/// with `_HOST` expanded to the local host name.
fn resolve_principal(
    request: &SubmissionRequest,
    settings: &HookSettings,
) -> Result<Option<String>, ConfigError> {
    if !request.use_krb5ccache || request.principal.is_some() {
        return Ok(request.principal.clone());
    }

    let configured = settings
        .kerberos
        .principal
        .as_deref()
        .ok_or(ConfigError::MissingPrincipal)?;
    Ok(Some(configured.replace("_HOST", &local_hostname())))
}

fn local_hostname() -> String {
    #[cfg(unix)]
    {
        if let Ok(name) = nix::unistd::gethostname() {
            return name.to_string_lossy().into_owned();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
