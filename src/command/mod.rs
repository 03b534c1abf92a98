//! Submission request, command construction and masking

mod builder;
mod mask;
mod request;

pub use builder::{
    build_driver_kill_command, build_kinit_command, build_status_command, build_submit_command,
    build_yarn_kill_command, SubmitCommand, KRB5CCNAME,
};
pub use mask::{mask_command_line, mask_tokens, masked_display, MASK};
pub use request::{SubmissionRequest, DEFAULT_APP_NAME};
