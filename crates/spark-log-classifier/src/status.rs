//! Driver status parsing for standalone cluster polling.
//!
//! Status responses come either from the REST submission server
//! (`/v1/submissions/status/<id>`) or from `spark-submit --status`, and in
//! both cases contain a JSON document printed one field per line:
//!
//! ```text
//! {
//!   "action" : "SubmissionStatusResponse",
//!   "driverState" : "RUNNING",
//!   "submissionId" : "driver-20171128111415-0001",
//!   "success" : true
//! }
//! ```

use std::fmt;
use std::sync::OnceLock;

use regex_lite::Regex;

/// Driver states reported by the standalone master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverState {
    /// Submitted but not yet scheduled on a worker
    Submitted,
    /// Allocated to a worker and running
    Running,
    /// Exited cleanly
    Finished,
    /// Exited non-zero or lost its worker; will be restarted
    Relaunching,
    /// Temporarily unknown during master failure recovery
    Unknown,
    /// Killed by a user
    Killed,
    /// Exited non-zero and was not supervised
    Failed,
    /// Could not run or restart (e.g. missing jar)
    Error,
    /// A value this client does not know about
    Unrecognized(String),
}

impl DriverState {
    pub fn parse(value: &str) -> Self {
        match value {
            "SUBMITTED" => DriverState::Submitted,
            "RUNNING" => DriverState::Running,
            "FINISHED" => DriverState::Finished,
            "RELAUNCHING" => DriverState::Relaunching,
            "UNKNOWN" => DriverState::Unknown,
            "KILLED" => DriverState::Killed,
            "FAILED" => DriverState::Failed,
            "ERROR" => DriverState::Error,
            other => DriverState::Unrecognized(other.to_string()),
        }
    }

    /// No further transition happens from a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DriverState::Finished
                | DriverState::Unknown
                | DriverState::Killed
                | DriverState::Failed
                | DriverState::Error
        )
    }

    /// Only a finished driver counts as a successful submission.
    pub fn is_success(&self) -> bool {
        matches!(self, DriverState::Finished)
    }

    pub fn as_str(&self) -> &str {
        match self {
            DriverState::Submitted => "SUBMITTED",
            DriverState::Running => "RUNNING",
            DriverState::Finished => "FINISHED",
            DriverState::Relaunching => "RELAUNCHING",
            DriverState::Unknown => "UNKNOWN",
            DriverState::Killed => "KILLED",
            DriverState::Failed => "FAILED",
            DriverState::Error => "ERROR",
            DriverState::Unrecognized(value) => value,
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn driver_state_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"driverState"?\s*:\s*"?([A-Za-z_]+)"?"#).unwrap())
}

/// Incremental parser over the output of one status query.
#[derive(Debug, Default)]
pub struct StatusParser {
    state: Option<DriverState>,
    valid_response: bool,
}

impl StatusParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line.
    pub fn feed(&mut self, line: &str) {
        let line = line.trim();

        // A well-formed response always echoes the submission id
        if line.contains("submissionId") {
            self.valid_response = true;
        }

        if line.contains("driverState") {
            let value = driver_state_re()
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string());
            if let Some(value) = value {
                self.state = Some(DriverState::parse(&value));
            }
        }
    }

    /// Outcome of the query.
    ///
    /// `None` means the output said nothing about the driver and the previous
    /// state should stand. A well-formed response without a `driverState`
    /// yields `UNKNOWN` rather than a stale state.
    pub fn finish(self) -> Option<DriverState> {
        match (self.state, self.valid_response) {
            (Some(state), _) => Some(state),
            (None, true) => Some(DriverState::Unknown),
            (None, false) => None,
        }
    }
}

/// Parse a complete status response.
pub fn parse_status_output<I, S>(lines: I) -> Option<DriverState>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = StatusParser::new();
    for line in lines {
        parser.feed(line.as_ref());
    }
    parser.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rest_response() {
        let output = [
            "{",
            "  \"action\" : \"SubmissionStatusResponse\",",
            "  \"driverState\" : \"FINISHED\",",
            "  \"serverSparkVersion\" : \"1.6.0\",",
            "  \"submissionId\" : \"driver-20171128111415-0001\",",
            "  \"success\" : true,",
            "  \"workerHostPort\" : \"172.18.0.7:38561\",",
            "  \"workerId\" : \"worker-20171128110741-172.18.0.7-38561\"",
            "}",
        ];
        assert_eq!(parse_status_output(output), Some(DriverState::Finished));
    }

    #[test]
    fn test_parse_inline_field() {
        let line = r#"... "driverState" : "FINISHED", ..."#;
        assert_eq!(parse_status_output([line]), Some(DriverState::Finished));
    }

    #[test]
    fn test_submission_id_without_state_is_unknown() {
        let output = [
            "{",
            "  \"action\" : \"SubmissionStatusResponse\",",
            "  \"submissionId\" : \"driver-20171128111415-0001\",",
            "  \"success\" : false",
            "}",
        ];
        assert_eq!(parse_status_output(output), Some(DriverState::Unknown));
    }

    #[test]
    fn test_unrelated_output_leaves_state() {
        let output = ["curl: (7) Failed to connect to spark-master port 6066"];
        assert_eq!(parse_status_output(output), None);
    }

    #[test]
    fn test_last_state_wins() {
        let output = ["\"driverState\" : \"RUNNING\",", "\"driverState\" : \"KILLED\","];
        assert_eq!(parse_status_output(output), Some(DriverState::Killed));
    }

    #[test]
    fn test_unrecognized_state_is_not_terminal() {
        let state = parse_status_output(["\"driverState\" : \"PENDING\","]).unwrap();
        assert_eq!(state, DriverState::Unrecognized("PENDING".to_string()));
        assert!(!state.is_terminal());
        assert_eq!(state.to_string(), "PENDING");
    }

    #[test]
    fn test_terminal_set() {
        for state in ["FINISHED", "UNKNOWN", "KILLED", "FAILED", "ERROR"] {
            assert!(DriverState::parse(state).is_terminal(), "{state}");
        }
        for state in ["SUBMITTED", "RUNNING", "RELAUNCHING"] {
            assert!(!DriverState::parse(state).is_terminal(), "{state}");
        }
        assert!(DriverState::Finished.is_success());
        assert!(!DriverState::Killed.is_success());
    }
}
