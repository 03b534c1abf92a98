//! Connection resolution and hook settings
//!
//! A submission target is resolved from three sources, highest first:
//! 1. Explicit values on the submission request
//! 2. Extras of the named connection record
//! 3. Built-in defaults
//!
//! Hook settings (external binaries, Kerberos cache, poll budget) are layered
//! separately: built-in defaults, then the settings file, then CLI flags.

mod connection;
mod merge;
mod resolver;
mod settings;

pub use connection::{
    ConnectionError, ConnectionExtra, ConnectionRecord, ConnectionSource, ConnectionStore,
};
pub use merge::{deep_merge, merge_layers};
pub use resolver::{
    resolve_target, TargetConnection, ALLOWED_SPARK_BINARIES, DEFAULT_MASTER,
    DEFAULT_SPARK_BINARY,
};
pub use settings::{BinarySettings, HookSettings, KerberosSettings, KeytabSettings, StatusSettings};

use spark_log_classifier::InvalidDeployMode;


/// Errors raised while resolving configuration or building commands
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "The spark-binary can be one of {allowed:?} and it was `{binary}`. Please make sure your \
         spark binary is one of the allowed ones and that it is available on the PATH"
    )]
    DisallowedBinary {
        binary: String,
        allowed: &'static [&'static str],
    },

    #[error(
        "The `spark-home` extra is not allowed any more. Please make sure one of {allowed:?} is \
         available on the PATH, and set `spark-binary` if needed."
    )]
    DeprecatedSparkHome { allowed: &'static [&'static str] },

    #[error(transparent)]
    InvalidDeployMode(#[from] InvalidDeployMode),

    #[error("env_vars is not supported in standalone-cluster mode")]
    UnsupportedEnvInjection,

    #[error("{0} environment variable required to use ticket ccache is missing")]
    MissingEnvVar(String),

    #[error("No Kerberos principal configured for ticket ccache mode")]
    MissingPrincipal,

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
