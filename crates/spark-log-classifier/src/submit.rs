//! Classification of spark-submit output lines.
//!
//! Each line is inspected on its own; the classifier holds no state
//! between lines. Rules such as "the first driver id wins" are enforced by
//! whoever folds the events into run state.

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::target::{DeployMode, TargetKind};

/// An identifier or status extracted from a single output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// YARN application id, e.g. `application_1486558679801_1820`
    ApplicationId(String),
    /// Kubernetes driver pod name
    DriverPod(String),
    /// Kubernetes `spark-app-selector` label value
    KubernetesApplicationId(String),
    /// Exit code reported by the Kubernetes submission client
    ExitCode(i32),
    /// Standalone cluster driver id, e.g. `driver-20171128111415-0001`
    DriverId(String),
}

fn yarn_application_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"application[0-9_]+").unwrap())
}

fn driver_pod_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*pod name: ((.+?)-([a-z0-9]+)-driver$)").unwrap())
}

fn app_selector_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*spark-app-selector -> (spark-([a-z0-9]+)), ").unwrap())
}

fn exit_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*[eE]xit code: (\d+)").unwrap())
}

fn driver_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"driver-[0-9\-]+").unwrap())
}

/// Target-specific extractor for spark-submit output.
#[derive(Debug, Clone, Copy)]
pub struct LogClassifier {
    kind: TargetKind,
    deploy_mode: Option<DeployMode>,
}

impl LogClassifier {
    pub fn new(kind: TargetKind, deploy_mode: Option<DeployMode>) -> Self {
        Self { kind, deploy_mode }
    }

    /// Whether the standalone driver status must be polled after submission.
    pub fn tracks_driver(&self) -> bool {
        self.kind == TargetKind::Standalone && self.is_cluster_mode()
    }

    fn is_cluster_mode(&self) -> bool {
        self.deploy_mode == Some(DeployMode::Cluster)
    }

    /// Extract events from one (already trimmed) output line.
    pub fn classify(&self, line: &str) -> Vec<LogEvent> {
        let mut events = Vec::new();

        match self.kind {
            TargetKind::Yarn if self.is_cluster_mode() => {
                if let Some(m) = yarn_application_re().find(line) {
                    events.push(LogEvent::ApplicationId(m.as_str().to_string()));
                }
            }
            TargetKind::Kubernetes => {
                if let Some(caps) = driver_pod_re().captures(line) {
                    if let Some(pod) = caps.get(1) {
                        events.push(LogEvent::DriverPod(pod.as_str().to_string()));
                    }
                }
                if let Some(caps) = app_selector_re().captures(line) {
                    if let Some(app) = caps.get(1) {
                        events.push(LogEvent::KubernetesApplicationId(app.as_str().to_string()));
                    }
                }
                // Only the cluster-mode client reports the driver's exit code.
                if self.is_cluster_mode() {
                    let code = exit_code_re()
                        .captures(line)
                        .and_then(|caps| caps.get(1))
                        .and_then(|m| m.as_str().parse::<i32>().ok());
                    if let Some(code) = code {
                        events.push(LogEvent::ExitCode(code));
                    }
                }
            }
            TargetKind::Standalone if self.tracks_driver() => {
                if let Some(m) = driver_id_re().find(line) {
                    events.push(LogEvent::DriverId(m.as_str().to_string()));
                }
            }
            _ => {}
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yarn_cluster() -> LogClassifier {
        LogClassifier::new(TargetKind::Yarn, Some(DeployMode::Cluster))
    }

    fn k8s(mode: DeployMode) -> LogClassifier {
        LogClassifier::new(TargetKind::Kubernetes, Some(mode))
    }

    fn standalone_cluster() -> LogClassifier {
        LogClassifier::new(TargetKind::Standalone, Some(DeployMode::Cluster))
    }

    #[test]
    fn test_yarn_cluster_application_id() {
        let line = "INFO Client: Submitting application application_1486558679801_1820 to ResourceManager";
        assert_eq!(
            yarn_cluster().classify(line),
            vec![LogEvent::ApplicationId("application_1486558679801_1820".to_string())]
        );
    }

    #[test]
    fn test_yarn_client_mode_ignores_application_id() {
        let classifier = LogClassifier::new(TargetKind::Yarn, Some(DeployMode::Client));
        let line = "Submitting application application_1486558679801_1820 to ResourceManager";
        assert!(classifier.classify(line).is_empty());
    }

    #[test]
    fn test_kubernetes_driver_pod() {
        let line = "pod name: spark-pi-edf2ace37be7353a958b38733a12f8e6-driver";
        assert_eq!(
            k8s(DeployMode::Cluster).classify(line),
            vec![LogEvent::DriverPod(
                "spark-pi-edf2ace37be7353a958b38733a12f8e6-driver".to_string()
            )]
        );
    }

    #[test]
    fn test_kubernetes_app_selector() {
        let line = "labels: spark-app-selector -> spark-465b868ada474bda82ccb84ab2747fcd, spark-role -> driver";
        assert_eq!(
            k8s(DeployMode::Cluster).classify(line),
            vec![LogEvent::KubernetesApplicationId(
                "spark-465b868ada474bda82ccb84ab2747fcd".to_string()
            )]
        );
    }

    #[test]
    fn test_kubernetes_exit_code_cluster_only() {
        let line = "Exit code: 999";
        assert_eq!(
            k8s(DeployMode::Cluster).classify(line),
            vec![LogEvent::ExitCode(999)]
        );
        assert!(k8s(DeployMode::Client).classify(line).is_empty());
    }

    #[test]
    fn test_standalone_driver_id() {
        let line = "INFO Client: Driver successfully submitted as driver-20171128111415-0001";
        assert_eq!(
            standalone_cluster().classify(line),
            vec![LogEvent::DriverId("driver-20171128111415-0001".to_string())]
        );
    }

    #[test]
    fn test_standalone_client_mode_does_not_track() {
        let classifier = LogClassifier::new(TargetKind::Standalone, Some(DeployMode::Client));
        assert!(!classifier.tracks_driver());
        assert!(classifier.classify("driver-001 started").is_empty());
    }

    #[test]
    fn test_local_target_extracts_nothing() {
        let classifier = LogClassifier::new(TargetKind::Local, None);
        assert!(classifier
            .classify("application_1_2 driver-001 Exit code: 1")
            .is_empty());
    }

    #[test]
    fn test_unrelated_line() {
        assert!(yarn_cluster().classify("INFO SparkContext: Running Spark").is_empty());
    }
}
