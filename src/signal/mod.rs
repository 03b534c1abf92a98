//! Interrupt handling for the CLI (SIGINT/SIGTERM)
//!
//! The first interrupt cancels the submission on a separate thread, so the
//! handler stays responsive during the termination grace period. A second
//! interrupt exits at once with [`EXIT_CODE_INTERRUPTED`], abandoning any
//! cleanup still in progress.

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::{info, warn};

use crate::cancel::CancelHandle;

/// Exit code after a second interrupt
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// What an interrupt should trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Tear the submission down
    Cancel,
    /// Leave without waiting for teardown
    Exit,
    Ignore,
}

/// Counts interrupts received by the process
#[derive(Debug, Default)]
pub struct InterruptState {
    received: AtomicU8,
}

impl InterruptState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an interrupt and decide what it triggers
    pub fn record(&self) -> InterruptAction {
        let previous = self
            .received
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_add(1)))
            .unwrap_or_else(|n| n);
        match previous {
            0 => InterruptAction::Cancel,
            1 => InterruptAction::Exit,
            _ => InterruptAction::Ignore,
        }
    }
}

/// Route SIGINT and SIGTERM to `cancel`.
///
/// Must be called at most once per process.
pub fn install_interrupt_handler(cancel: CancelHandle) -> Result<(), ctrlc::Error> {
    let state = InterruptState::new();

    ctrlc::set_handler(move || match state.record() {
        InterruptAction::Cancel => {
            info!("Received interrupt, cancelling submission");
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                let report = cancel.cancel();
                info!(summary = %report.summary(), "Submission torn down");
            });
        }
        InterruptAction::Exit => {
            warn!("Received second interrupt, exiting without cleanup");
            std::process::exit(EXIT_CODE_INTERRUPTED);
        }
        InterruptAction::Ignore => {}
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_sequence() {
        let state = InterruptState::new();

        assert_eq!(state.record(), InterruptAction::Cancel);
        assert_eq!(state.record(), InterruptAction::Exit);
        assert_eq!(state.record(), InterruptAction::Ignore);
        assert_eq!(state.record(), InterruptAction::Ignore);
    }

    #[test]
    fn test_states_count_independently() {
        let first = InterruptState::new();
        let second = InterruptState::new();

        assert_eq!(first.record(), InterruptAction::Cancel);
        assert_eq!(second.record(), InterruptAction::Cancel);
        assert_eq!(first.record(), InterruptAction::Exit);
    }
}
