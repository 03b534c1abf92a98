//! Top-level error type

use crate::config::ConfigError;
use crate::hook::ExecutionError;
use crate::keytab::CredentialError;

/// Any error a hook operation can return
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl HookError {
    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            HookError::Config(_) | HookError::Credential(_) => 2,
            HookError::Execution(ExecutionError::Cancelled) => 130,
            HookError::Execution(_) => 1,
        }
    }
}

pub type HookResult<T> = Result<T, HookError>;
