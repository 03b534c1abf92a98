//! Line classifiers for spark-submit output.
//!
//! Two classifiers live here: [`LogClassifier`] extracts identifiers
//! (application id, driver pod, driver id, exit code) from the output of a
//! submission, and [`StatusParser`] reads the driver state out of a status
//! query against a standalone master.

mod status;
mod submit;
mod target;

pub use status::{parse_status_output, DriverState, StatusParser};
pub use submit::{LogClassifier, LogEvent};
pub use target::{DeployMode, InvalidDeployMode, TargetKind};
