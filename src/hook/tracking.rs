//! Driver status polling for standalone cluster submissions
//!
//! A slow or overloaded master can time out status queries, so failed
//! queries are retried. Only consecutive failures count against the budget.

use spark_log_classifier::{DriverState, StatusParser};
use tracing::{debug, warn};

use super::{lock, ExecutionError, SparkSubmitHook};
use crate::command::build_status_command;
use crate::process::CommandSpec;

/// Poll until the driver reaches a terminal state and return that state.
pub(super) fn track_driver(
    hook: &SparkSubmitHook,
    driver_id: &str,
) -> Result<DriverState, ExecutionError> {
    let max_missed = hook.settings.status.max_missed_reports;
    let mut missed = 0u32;

    loop {
        {
            let state = lock(&hook.shared.state);
            if state.cancelled {
                return Err(ExecutionError::Cancelled);
            }
            if let Some(status) = state.driver_status.as_ref().filter(|s| s.is_terminal()) {
                return Ok(status.clone());
            }
        }

        std::thread::sleep(hook.request.status_poll_interval);

        debug!(driver_id, "Polling status of spark driver");
        let tokens = build_status_command(&hook.target, driver_id, &hook.settings);
        debug!(command = ?tokens, "Poll driver status cmd");
        let spec = CommandSpec::from_tokens(&tokens).with_env(hook.env.clone());

        let failure = match hook.runner.run(&spec) {
            Ok(output) => {
                let mut parser = StatusParser::new();
                for line in &output.lines {
                    let line = line.trim();
                    parser.feed(line);
                    debug!(target: "spark_status", "spark driver status log: {}", line);
                }
                if let Some(status) = parser.finish() {
                    lock(&hook.shared.state).driver_status = Some(status);
                }

                if output.status.success() {
                    None
                } else {
                    Some(output.status.to_string())
                }
            }
            Err(e) => Some(e.to_string()),
        };

        match failure {
            None => missed = 0,
            Some(status) => {
                missed += 1;
                warn!(driver_id, missed, max_missed, status = %status, "Driver status query failed");
                if missed >= max_missed {
                    return Err(ExecutionError::StatusPollExhausted {
                        attempts: missed,
                        status,
                    });
                }
            }
        }
    }
}
