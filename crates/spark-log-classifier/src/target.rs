//! Target classification derived from the Spark master URL.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The cluster manager a submission is aimed at.
///
/// Decided once from the master string; everything that branches on the
/// cluster manager (env injection, log extraction, cancellation) matches on
/// this instead of re-inspecting the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// YARN resource manager (`yarn`)
    Yarn,
    /// Kubernetes (`k8s://https://host:port`)
    Kubernetes,
    /// Spark standalone cluster manager (`spark://host:port`)
    Standalone,
    /// Anything else: `local[*]`, `mesos://...`
    Local,
}

impl TargetKind {
    /// Classify a master URL.
    pub fn from_master(master: &str) -> Self {
        if master.contains("yarn") {
            TargetKind::Yarn
        } else if master.contains("k8s") {
            TargetKind::Kubernetes
        } else if master.contains("spark://") {
            TargetKind::Standalone
        } else {
            TargetKind::Local
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Yarn => "yarn",
            TargetKind::Kubernetes => "kubernetes",
            TargetKind::Standalone => "standalone",
            TargetKind::Local => "local",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the driver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// Driver runs inside the submitting process
    Client,
    /// Driver runs on a worker node of the cluster
    Cluster,
}

impl DeployMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployMode::Client => "client",
            DeployMode::Cluster => "cluster",
        }
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for deploy mode strings other than `client` or `cluster`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("deploy mode must be client or cluster, got '{0}'")]
pub struct InvalidDeployMode(pub String);

impl FromStr for DeployMode {
    type Err = InvalidDeployMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "client" => Ok(DeployMode::Client),
            "cluster" => Ok(DeployMode::Cluster),
            other => Err(InvalidDeployMode(other.to_string())),
        }
    }
}
