//! Run state of a single submission
//!
//! Built up as a fold over the events classified from spark-submit output.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use spark_log_classifier::{DeployMode, DriverState, LogEvent, TargetKind};

use super::{PhaseError, SubmissionPhase, TerminalState};

/// Everything learned about a submission so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunState {
    pub phase: SubmissionPhase,

    /// Standalone driver id; the first one seen is kept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,

    /// Last status reported for the driver
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_driver_state"
    )]
    pub driver_status: Option<DriverState>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub yarn_application_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_driver_pod: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_application_id: Option<String>,

    /// Exit code reported in the Kubernetes client output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spark_exit_code: Option<i32>,

    /// Exit code of the spark-submit process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_exit_code: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Set once cancellation has been requested
    pub cancelled: bool,
}

fn serialize_driver_state<S: Serializer>(
    state: &Option<DriverState>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match state {
        Some(state) => serializer.serialize_str(state.as_str()),
        None => serializer.serialize_none(),
    }
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter RUNNING.
    ///
    /// The Kubernetes client in client mode never reports an exit code, so
    /// a zero is assumed for it up front.
    pub fn start(&mut self, kind: TargetKind, deploy_mode: Option<DeployMode>) -> Result<(), PhaseError> {
        self.transition(SubmissionPhase::Running)?;
        self.started_at = Some(Utc::now());
        if kind == TargetKind::Kubernetes && deploy_mode != Some(DeployMode::Cluster) {
            self.spark_exit_code = Some(0);
        }
        Ok(())
    }

    /// Enter SUCCEEDED or FAILED
    pub fn finish(&mut self, succeeded: bool) -> Result<(), PhaseError> {
        let target = if succeeded {
            SubmissionPhase::Succeeded
        } else {
            SubmissionPhase::Failed
        };
        self.transition(target)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, to: SubmissionPhase) -> Result<(), PhaseError> {
        if self.phase.is_terminal() {
            return Err(PhaseError::Terminal(self.phase));
        }
        if !self.phase.can_transition_to(to) {
            return Err(PhaseError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }

    /// Fold one classified event into the state.
    pub fn apply(mut self, event: &LogEvent) -> Self {
        match event {
            LogEvent::ApplicationId(id) => self.yarn_application_id = Some(id.clone()),
            LogEvent::DriverPod(pod) => self.kubernetes_driver_pod = Some(pod.clone()),
            LogEvent::KubernetesApplicationId(id) => {
                self.kubernetes_application_id = Some(id.clone())
            }
            LogEvent::ExitCode(code) => self.spark_exit_code = Some(*code),
            LogEvent::DriverId(id) => {
                if self.driver_id.is_none() {
                    self.driver_id = Some(id.clone());
                }
            }
        }
        self
    }

    /// Fold a batch of events in place.
    ///
    /// Returns the events that changed the state; a second driver id, or an
    /// identifier seen before, is not among them.
    pub fn absorb<'a, I>(&mut self, events: I) -> Vec<LogEvent>
    where
        I: IntoIterator<Item = &'a LogEvent>,
    {
        let mut changed = Vec::new();
        for event in events {
            let next = self.clone().apply(event);
            if next != *self {
                *self = next;
                changed.push(event.clone());
            }
        }
        changed
    }

    /// True once the driver reached a state it will not leave
    pub fn driver_is_terminal(&self) -> bool {
        self.driver_status
            .as_ref()
            .is_some_and(DriverState::is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_driver_id_wins() {
        let classifier = spark_log_classifier::LogClassifier::new(
            TargetKind::Standalone,
            Some(DeployMode::Cluster),
        );
        let state = ["driver-001 started", "driver-002 started"]
            .iter()
            .flat_map(|line| classifier.classify(line))
            .fold(RunState::new(), |state, event| state.apply(&event));

        assert_eq!(state.driver_id.as_deref(), Some("driver-001"));
    }

    #[test]
    fn test_later_identifiers_overwrite() {
        let mut state = RunState::new();
        state.absorb(&[
            LogEvent::ApplicationId("application_1_1".to_string()),
            LogEvent::ApplicationId("application_1_2".to_string()),
            LogEvent::ExitCode(0),
            LogEvent::ExitCode(143),
        ]);

        assert_eq!(state.yarn_application_id.as_deref(), Some("application_1_2"));
        assert_eq!(state.spark_exit_code, Some(143));
    }

    #[test]
    fn test_absorb_reports_only_changes() {
        let mut state = RunState::new();
        let first = LogEvent::DriverId("driver-001".to_string());
        let changed = state.absorb(&[first.clone()]);
        assert_eq!(changed, vec![first]);

        let changed = state.absorb(&[
            LogEvent::DriverId("driver-002".to_string()),
            LogEvent::ExitCode(1),
            LogEvent::ExitCode(1),
        ]);
        assert_eq!(changed, vec![LogEvent::ExitCode(1)]);
        assert_eq!(state.driver_id.as_deref(), Some("driver-001"));
    }

    #[test]
    fn test_kubernetes_client_mode_assumes_zero_exit() {
        let mut state = RunState::new();
        state.start(TargetKind::Kubernetes, Some(DeployMode::Client)).unwrap();
        assert_eq!(state.spark_exit_code, Some(0));

        let mut state = RunState::new();
        state.start(TargetKind::Kubernetes, Some(DeployMode::Cluster)).unwrap();
        assert_eq!(state.spark_exit_code, None);
    }

    #[test]
    fn test_lifecycle() {
        let mut state = RunState::new();
        assert!(state.finish(true).is_err());

        state.start(TargetKind::Yarn, None).unwrap();
        assert_eq!(state.phase, SubmissionPhase::Running);
        assert!(state.started_at.is_some());

        state.finish(true).unwrap();
        assert_eq!(state.phase, SubmissionPhase::Succeeded);
        assert!(state.finished_at.is_some());

        assert!(matches!(state.finish(false), Err(PhaseError::Terminal(_))));
    }

    #[test]
    fn test_driver_terminal() {
        let mut state = RunState::new();
        assert!(!state.driver_is_terminal());
        state.driver_status = Some(DriverState::Running);
        assert!(!state.driver_is_terminal());
        state.driver_status = Some(DriverState::Killed);
        assert!(state.driver_is_terminal());
    }

    #[test]
    fn test_serialize_driver_status_as_string() {
        let state = RunState {
            driver_id: Some("driver-1".to_string()),
            driver_status: Some(DriverState::Finished),
            ..RunState::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["driver_status"], "FINISHED");
        assert_eq!(json["phase"], "NOT_STARTED");
        assert!(json.get("yarn_application_id").is_none());
    }
}
