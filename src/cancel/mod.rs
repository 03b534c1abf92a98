//! Best-effort cancellation of a submission
//!
//! Teardown runs in a fixed order, each step independent of the others:
//! 1. Kill the standalone driver (tracked submissions, driver not terminal)
//! 2. Terminate spark-submit: SIGTERM, then SIGKILL after the grace period
//! 3. Kill the YARN application, renewing the Kerberos ticket first
//! 4. Delete the Kubernetes driver pod
//!
//! Steps 3 and 4 only run when spark-submit was still alive. Failures are
//! logged and recorded in the [`CancellationReport`]; cancellation never
//! returns an error.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::command::{
    build_driver_kill_command, build_kinit_command, build_yarn_kill_command, masked_display,
    KRB5CCNAME,
};
use crate::config::{HookSettings, TargetConnection};
use crate::hook::{lock, SharedRun};
use crate::kubernetes::{effective_namespace, PodDeleter};
use crate::process::{CommandRunner, CommandSpec, ExitOutcome, ProcessEnv, RunningCommand};

const TERMINATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A single teardown action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    KillDriver,
    TerminateProcess,
    RenewKerberos,
    KillYarnApplication,
    DeleteDriverPod,
}

impl fmt::Display for CleanupAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CleanupAction::KillDriver => "kill driver",
            CleanupAction::TerminateProcess => "terminate spark-submit",
            CleanupAction::RenewKerberos => "renew kerberos ticket",
            CleanupAction::KillYarnApplication => "kill yarn application",
            CleanupAction::DeleteDriverPod => "delete driver pod",
        };
        f.write_str(name)
    }
}

/// Outcome of one teardown action
#[derive(Debug, Clone)]
pub struct CleanupStep {
    pub action: CleanupAction,
    /// Masked command line, for steps that run a command
    pub command: Option<String>,
    pub succeeded: bool,
    /// Exit status or error message
    pub detail: Option<String>,
}

impl CleanupStep {
    fn success(action: CleanupAction, command: Option<String>, detail: Option<String>) -> Self {
        Self {
            action,
            command,
            succeeded: true,
            detail,
        }
    }

    fn failure(action: CleanupAction, command: Option<String>, detail: String) -> Self {
        Self {
            action,
            command,
            succeeded: false,
            detail: Some(detail),
        }
    }
}

/// Result of a cancellation
#[derive(Debug, Default)]
pub struct CancellationReport {
    /// Steps in the order they ran
    pub steps: Vec<CleanupStep>,
    /// An earlier cancel already ran; nothing was done
    pub already_cancelled: bool,
    pub succeeded_count: usize,
    pub failed_count: usize,
}

impl CancellationReport {
    pub fn new() -> Self {
        Self::default()
    }

    fn already_cancelled() -> Self {
        Self {
            already_cancelled: true,
            ..Self::default()
        }
    }

    /// Add a step result
    pub fn add(&mut self, step: CleanupStep) {
        if step.succeeded {
            self.succeeded_count += 1;
        } else {
            self.failed_count += 1;
        }
        self.steps.push(step);
    }

    /// Check if every step that ran succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed_count == 0
    }

    /// Whether a step of this kind ran
    pub fn ran(&self, action: CleanupAction) -> bool {
        self.steps.iter().any(|s| s.action == action)
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        if self.already_cancelled {
            return "Submission already cancelled".to_string();
        }
        if self.steps.is_empty() {
            return "Nothing to cancel".to_string();
        }

        let mut parts = Vec::new();
        if self.succeeded_count > 0 {
            parts.push(format!("{} succeeded", self.succeeded_count));
        }
        if self.failed_count > 0 {
            parts.push(format!("{} failed", self.failed_count));
        }
        let actions: Vec<String> = self.steps.iter().map(|s| s.action.to_string()).collect();

        format!(
            "Cancelled: {} ({})",
            actions.join(", "),
            parts.join(", ")
        )
    }
}

/// Cancels the submission of a [`crate::SparkSubmitHook`] from any thread
#[derive(Clone)]
pub struct CancelHandle {
    target: TargetConnection,
    settings: HookSettings,
    env: ProcessEnv,
    runner: Arc<dyn CommandRunner>,
    pods: Arc<dyn PodDeleter>,
    shared: Arc<SharedRun>,
}

impl CancelHandle {
    pub(crate) fn new(
        target: TargetConnection,
        settings: HookSettings,
        env: ProcessEnv,
        runner: Arc<dyn CommandRunner>,
        pods: Arc<dyn PodDeleter>,
        shared: Arc<SharedRun>,
    ) -> Self {
        Self {
            target,
            settings,
            env,
            runner,
            pods,
            shared,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        lock(&self.shared.state).cancelled
    }

    /// Tear down everything the submission started.
    ///
    /// Safe to call at any point, including before submission and after
    /// completion. Only the first call acts.
    pub fn cancel(&self) -> CancellationReport {
        let snapshot = {
            let mut state = lock(&self.shared.state);
            if state.cancelled {
                return CancellationReport::already_cancelled();
            }
            state.cancelled = true;
            state.clone()
        };
        info!("Kill command is being called");

        let mut report = CancellationReport::new();

        if self.target.tracks_driver_status() && !snapshot.driver_is_terminal() {
            if let Some(driver_id) = &snapshot.driver_id {
                info!(driver_id = %driver_id, "Killing driver on cluster");
                let tokens = build_driver_kill_command(&self.target, driver_id);
                report.add(self.run_step(CleanupAction::KillDriver, &tokens, self.env.clone()));
            }
        }

        if !self.terminate_submit_process(&mut report) {
            info!(summary = %report.summary(), "Cancellation finished");
            return report;
        }

        // Identifiers may have been folded in while the process was stopping
        let snapshot = lock(&self.shared.state).clone();

        if let Some(application_id) = &snapshot.yarn_application_id {
            self.kill_yarn_application(application_id, &mut report);
        }

        if let Some(pod) = &snapshot.kubernetes_driver_pod {
            report.add(self.delete_driver_pod(pod));
        }

        info!(summary = %report.summary(), "Cancellation finished");
        report
    }

    /// Stop spark-submit if it is still running. Returns whether it was.
    fn terminate_submit_process(&self, report: &mut CancellationReport) -> bool {
        let mut slot = lock(&self.shared.process);
        let Some(child) = slot.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => {}
            Ok(Some(_)) => return false,
            Err(e) => {
                warn!(error = %e, "Could not check spark-submit process");
                return false;
            }
        }

        info!(binary = %self.target.spark_binary, pid = ?child.id(), "Sending kill signal");
        let grace = Duration::from_secs(self.settings.termination_grace_seconds);
        let step = match terminate_with_grace(child.as_mut(), grace) {
            Ok(status) => CleanupStep::success(
                CleanupAction::TerminateProcess,
                None,
                Some(status.to_string()),
            ),
            Err(e) => CleanupStep::failure(CleanupAction::TerminateProcess, None, e.to_string()),
        };
        report.add(step);
        true
    }

    fn kill_yarn_application(&self, application_id: &str, report: &mut CancellationReport) {
        let mut env = lock(&self.shared.submit_env)
            .clone()
            .unwrap_or_else(|| self.env.clone());

        if let (Some(keytab), Some(principal)) = (&self.target.keytab, &self.target.principal) {
            // A failed renewal may just mean the ticket is not renewable;
            // the kill is attempted regardless.
            let tokens = build_kinit_command(&self.settings, keytab, principal);
            let step = self.run_step(CleanupAction::RenewKerberos, &tokens, self.env.clone());
            if !step.succeeded {
                warn!(principal = %principal, "Kerberos renewal failed, killing application anyway");
            }
            report.add(step);

            env = self.env.clone();
            env.set(KRB5CCNAME, self.settings.kerberos.ccache.as_str());
        }

        info!(application_id, "Killing YARN application");
        let tokens = build_yarn_kill_command(&self.settings, application_id);
        report.add(self.run_step(CleanupAction::KillYarnApplication, &tokens, env));
    }

    fn delete_driver_pod(&self, pod: &str) -> CleanupStep {
        let namespace = effective_namespace(self.target.namespace.as_deref());
        let detail = format!("{}/{}", namespace, pod);
        info!(pod, namespace, "Killing pod on Kubernetes");

        match self.pods.delete_pod(pod, namespace) {
            Ok(()) => {
                info!(pod, "Spark on K8s killed");
                CleanupStep::success(CleanupAction::DeleteDriverPod, None, Some(detail))
            }
            Err(e) => {
                warn!(pod, namespace, error = %e, "Failed to delete driver pod");
                CleanupStep::failure(CleanupAction::DeleteDriverPod, None, format!("{}: {}", detail, e))
            }
        }
    }

    fn run_step(&self, action: CleanupAction, tokens: &[String], env: ProcessEnv) -> CleanupStep {
        let command = masked_display(tokens);
        let spec = CommandSpec::from_tokens(tokens).with_env(env);

        match self.runner.run(&spec) {
            Ok(output) if output.status.success() => {
                info!(%action, return_code = %output.status, "Cleanup command finished");
                CleanupStep::success(action, Some(command), Some(output.status.to_string()))
            }
            Ok(output) => {
                warn!(%action, return_code = %output.status, "Cleanup command failed");
                CleanupStep::failure(action, Some(command), output.status.to_string())
            }
            Err(e) => {
                warn!(%action, error = %e, "Cleanup command could not be started");
                CleanupStep::failure(action, Some(command), e.to_string())
            }
        }
    }
}

/// SIGTERM, then SIGKILL once `grace` has passed without an exit.
pub(crate) fn terminate_with_grace(
    child: &mut dyn RunningCommand,
    grace: Duration,
) -> io::Result<ExitOutcome> {
    if let Err(e) = child.terminate() {
        warn!(error = %e, "Failed to send SIGTERM to spark-submit");
    }

    let start = Instant::now();
    while start.elapsed() < grace {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => std::thread::sleep(TERMINATE_POLL_INTERVAL),
            Err(_) => break,
        }
    }

    warn!(grace_seconds = grace.as_secs(), "spark-submit still running, killing");
    child.kill()?;
    child.wait()
}
