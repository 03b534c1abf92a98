//! Spark Submit Hook - launch and track Spark applications
//!
//! This crate wraps the `spark-submit` binary: it resolves a named
//! connection into a target cluster, builds the command line, follows the
//! submission log for driver and application identifiers, polls standalone
//! cluster drivers until they finish, and tears everything down on cancel.

pub mod cancel;
pub mod command;
pub mod config;
pub mod error;
pub mod hook;
pub mod keytab;
pub mod kubernetes;
pub mod logging;
pub mod mock;
pub mod process;
pub mod signal;
pub mod state;

pub use cancel::{CancelHandle, CancellationReport, CleanupAction};
pub use command::SubmissionRequest;
pub use config::{ConfigError, ConnectionStore, HookSettings, TargetConnection};
pub use error::{HookError, HookResult};
pub use hook::{ExecutionError, SparkSubmitHook};
pub use keytab::CredentialError;
pub use state::{RunState, SubmissionPhase};

pub use spark_log_classifier::{DeployMode, DriverState, TargetKind};
