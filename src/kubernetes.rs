//! Driver pod removal through the Kubernetes API
//!
//! The client is configured the standard way: in-cluster service account
//! when running inside a pod, otherwise the local kubeconfig.

use std::io;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams};
use kube::Client;

/// Namespace used when the target names none
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum PodDeleteError {
    #[error("Failed to start Kubernetes client runtime: {0}")]
    Runtime(#[from] io::Error),

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),
}

/// Deletes driver pods
pub trait PodDeleter: Send + Sync {
    fn delete_pod(&self, pod: &str, namespace: &str) -> Result<(), PodDeleteError>;
}

/// Talks to the API server with a short-lived current-thread runtime per
/// call; deletion only happens on cancel.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeApi;

impl KubeApi {
    pub fn new() -> Self {
        Self
    }
}

impl PodDeleter for KubeApi {
    fn delete_pod(&self, pod: &str, namespace: &str) -> Result<(), PodDeleteError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        runtime.block_on(async {
            let client = Client::try_default().await?;
            let pods: Api<Pod> = Api::namespaced(client, namespace);
            pods.delete(pod, &DeleteParams::default()).await?;
            Ok::<(), PodDeleteError>(())
        })
    }
}

/// Namespace to delete in: the target's, or [`DEFAULT_NAMESPACE`]
pub fn effective_namespace(namespace: Option<&str>) -> &str {
    namespace
        .filter(|ns| !ns.is_empty())
        .unwrap_or(DEFAULT_NAMESPACE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_namespace() {
        assert_eq!(effective_namespace(Some("spark-jobs")), "spark-jobs");
        assert_eq!(effective_namespace(Some("")), "default");
        assert_eq!(effective_namespace(None), "default");
    }
}
