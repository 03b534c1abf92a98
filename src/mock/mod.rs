//! Scripted command runner for tests
//!
//! [`ScriptedRunner`] stands in for real processes: each program name maps
//! to a queue of canned responses, and every spawned command is recorded for
//! later assertions.
//!
//! # Usage
//!
//! ```
//! use spark_submit_hook::mock::{ScriptedResponse, ScriptedRunner};
//!
//! let runner = ScriptedRunner::new();
//! runner.script("spark-submit", ScriptedResponse::success(["driver-20171128111415-0001"]));
//! runner.script("/usr/bin/curl", ScriptedResponse::success(["\"driverState\" : \"FINISHED\","]));
//! ```

mod pods;
mod runner;

pub use pods::RecordingPodDeleter;
pub use runner::{ScriptedResponse, ScriptedRunner};
