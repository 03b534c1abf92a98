//! Spark submission hook
//!
//! Drives one spark-submit invocation:
//! - Resolves the target at construction
//! - Launches spark-submit and folds its output into [`RunState`]
//! - Polls the driver status for standalone cluster submissions
//! - Hands out a [`CancelHandle`] for teardown from another thread
//!
//! A hook is single-use: a second `submit` fails.

mod tracking;

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use spark_log_classifier::{DriverState, LogEvent, TargetKind};
use tracing::{debug, info};

use crate::cancel::{terminate_with_grace, CancelHandle, CancellationReport};
use crate::command::{build_submit_command, SubmissionRequest};
use crate::config::{resolve_target, ConnectionSource, HookSettings, TargetConnection};
use crate::error::HookResult;
use crate::kubernetes::{KubeApi, PodDeleter};
use crate::process::{CommandRunner, ExitOutcome, ProcessEnv, RunningCommand, SystemRunner};
use crate::state::{PhaseError, RunState};

/// Interval between exit checks on the submit process
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors raised while running a submission
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Cannot execute: {command}. Failed to start process: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot execute: {command}. Error code is: {status}.")]
    NonZeroExit { command: String, status: ExitOutcome },

    #[error(
        "Cannot execute: {command}. Error code is: {status}. Kubernetes spark exit code is: {}",
        display_exit_code(.spark_exit_code)
    )]
    KubernetesExitCode {
        command: String,
        status: ExitOutcome,
        spark_exit_code: Option<i32>,
    },

    #[error("No driver id is known: something went wrong when executing the spark submit command")]
    MissingDriverId,

    #[error("Failed to poll for the driver status {attempts} times: returncode = {status}")]
    StatusPollExhausted { attempts: u32, status: String },

    #[error("ERROR : Driver {driver_id} badly exited with status {status}")]
    DriverFailed {
        driver_id: String,
        status: DriverState,
    },

    #[error("Submission was cancelled")]
    Cancelled,

    #[error("State error: {0}")]
    Phase(#[from] PhaseError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn display_exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "None".to_string(), |c| c.to_string())
}

/// State shared between the submitting thread and cancel handles
pub(crate) struct SharedRun {
    pub(crate) state: Mutex<RunState>,
    /// The spark-submit child while it runs
    pub(crate) process: Mutex<Option<Box<dyn RunningCommand>>>,
    /// Environment spark-submit was started with
    pub(crate) submit_env: Mutex<Option<ProcessEnv>>,
}

impl SharedRun {
    fn new() -> Self {
        Self {
            state: Mutex::new(RunState::new()),
            process: Mutex::new(None),
            submit_env: Mutex::new(None),
        }
    }
}

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Submits one Spark application and tracks it to completion
pub struct SparkSubmitHook {
    conn_id: String,
    request: SubmissionRequest,
    target: TargetConnection,
    settings: HookSettings,
    env: ProcessEnv,
    runner: Arc<dyn CommandRunner>,
    pods: Arc<dyn PodDeleter>,
    shared: Arc<SharedRun>,
}

impl SparkSubmitHook {
    /// Resolve the target for `conn_id` and prepare a submission.
    pub fn new(
        conn_id: impl Into<String>,
        request: SubmissionRequest,
        connections: &dyn ConnectionSource,
        settings: HookSettings,
    ) -> HookResult<Self> {
        let conn_id = conn_id.into();
        let target = resolve_target(&conn_id, connections, &request, &settings)?;

        Ok(Self {
            conn_id,
            request,
            target,
            settings,
            env: ProcessEnv::from_current(),
            runner: Arc::new(SystemRunner::new()),
            pods: Arc::new(KubeApi::new()),
            shared: Arc::new(SharedRun::new()),
        })
    }

    /// Use a different command runner
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Use a different client for driver pod deletion
    pub fn with_pod_deleter(mut self, pods: Arc<dyn PodDeleter>) -> Self {
        self.pods = pods;
        self
    }

    /// Use a fixed base environment instead of the current one
    pub fn with_env(mut self, env: ProcessEnv) -> Self {
        self.env = env;
        self
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn target(&self) -> &TargetConnection {
        &self.target
    }

    pub fn request(&self) -> &SubmissionRequest {
        &self.request
    }

    /// Snapshot of the run state
    pub fn run_state(&self) -> RunState {
        lock(&self.shared.state).clone()
    }

    /// Handle that can cancel this submission from another thread
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(
            self.target.clone(),
            self.settings.clone(),
            self.env.clone(),
            Arc::clone(&self.runner),
            Arc::clone(&self.pods),
            Arc::clone(&self.shared),
        )
    }

    /// Cancel the submission; see [`CancelHandle::cancel`]
    pub fn cancel(&self) -> CancellationReport {
        self.cancel_handle().cancel()
    }

    /// Run spark-submit and, for standalone cluster submissions, wait for
    /// the driver to finish.
    ///
    /// Returns the final run state on success.
    pub fn submit(&self) -> HookResult<RunState> {
        let result = self.run_submission();
        let mut state = lock(&self.shared.state);
        match &result {
            Ok(()) => state.finish(true).map_err(ExecutionError::from)?,
            Err(_) => {
                if let Err(e) = state.finish(false) {
                    debug!(error = %e, "Run state already final");
                }
            }
        }
        result.map(|()| state.clone())
    }

    fn run_submission(&self) -> HookResult<()> {
        if lock(&self.shared.state).cancelled {
            return Err(ExecutionError::Cancelled.into());
        }

        let command = build_submit_command(&self.target, &self.request, &self.env)?;
        let masked = command.masked();
        info!(command = %masked, "Spark-Submit cmd");

        let spec = command.to_spec(&self.env);
        *lock(&self.shared.submit_env) = spec.env.clone();

        lock(&self.shared.state)
            .start(self.target.kind, self.target.deploy_mode)
            .map_err(ExecutionError::from)?;

        let mut child = self.runner.spawn(&spec).map_err(|source| ExecutionError::Spawn {
            command: masked.clone(),
            source,
        })?;
        let output = child.take_output();
        if let Some(mut child) = self.publish_process(child) {
            // A cancel that ran during spawn found no process to stop
            info!(pid = ?child.id(), "Cancelled while starting, stopping spark-submit");
            let grace = Duration::from_secs(self.settings.termination_grace_seconds);
            let status = terminate_with_grace(child.as_mut(), grace).map_err(ExecutionError::from)?;
            lock(&self.shared.state).process_exit_code = status.code;
            return Err(ExecutionError::Cancelled.into());
        }

        if let Some(lines) = output {
            self.process_submit_log(lines);
        }

        let status = self.wait_for_exit()?;
        let (cancelled, spark_exit_code) = {
            let mut state = lock(&self.shared.state);
            state.process_exit_code = status.code;
            (state.cancelled, state.spark_exit_code)
        };

        let kubernetes_failed =
            self.target.kind == TargetKind::Kubernetes && spark_exit_code != Some(0);
        if !status.success() || kubernetes_failed {
            if cancelled {
                return Err(ExecutionError::Cancelled.into());
            }
            if self.target.kind == TargetKind::Kubernetes {
                return Err(ExecutionError::KubernetesExitCode {
                    command: masked,
                    status,
                    spark_exit_code,
                }
                .into());
            }
            return Err(ExecutionError::NonZeroExit {
                command: masked,
                status,
            }
            .into());
        }

        debug!(track = self.target.tracks_driver_status(), "Should track driver");
        if !self.target.tracks_driver_status() {
            return Ok(());
        }

        let driver_id = {
            let mut state = lock(&self.shared.state);
            let driver_id = state.driver_id.clone().ok_or(ExecutionError::MissingDriverId)?;
            state.driver_status = Some(DriverState::Submitted);
            driver_id
        };

        let status = tracking::track_driver(self, &driver_id)?;
        if !status.is_success() {
            return Err(ExecutionError::DriverFailed { driver_id, status }.into());
        }

        Ok(())
    }

    /// Classify each line, fold it into the run state, then log it.
    fn process_submit_log(&self, lines: impl Iterator<Item = String>) {
        let classifier = self.target.classifier();

        for line in lines {
            let line = line.trim();
            let events = classifier.classify(line);
            if !events.is_empty() {
                let changed = lock(&self.shared.state).absorb(&events);
                for event in &changed {
                    log_identified(event);
                }
            }
            info!(target: "spark_submit", "{}", line);
        }
    }

    /// Put the child where cancel handles can reach it, unless a cancel
    /// already ran; then the child is handed back.
    ///
    /// The cancelled flag is read while the process slot is held. A cancel
    /// sets the flag before taking the slot, so it either sees the child
    /// here or this sees the flag.
    fn publish_process(&self, child: Box<dyn RunningCommand>) -> Option<Box<dyn RunningCommand>> {
        let mut slot = lock(&self.shared.process);
        if lock(&self.shared.state).cancelled {
            return Some(child);
        }
        *slot = Some(child);
        None
    }

    /// Wait for spark-submit to exit without holding the process slot, so a
    /// concurrent cancel can still reach the child.
    fn wait_for_exit(&self) -> Result<ExitOutcome, ExecutionError> {
        loop {
            {
                let mut slot = lock(&self.shared.process);
                let child = slot.as_mut().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "spark-submit process handle missing")
                })?;
                if let Some(status) = child.try_wait()? {
                    slot.take();
                    return Ok(status);
                }
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

fn log_identified(event: &LogEvent) {
    match event {
        LogEvent::ApplicationId(id) => info!(application_id = %id, "Identified spark application id"),
        LogEvent::DriverPod(pod) => info!(pod = %pod, "Identified spark driver pod"),
        LogEvent::KubernetesApplicationId(id) => {
            info!(application_id = %id, "Identified spark application id")
        }
        LogEvent::ExitCode(code) => debug!(exit_code = code, "Spark exit code reported"),
        LogEvent::DriverId(id) => info!(driver_id = %id, "Identified spark driver id"),
    }
}
