//! Subprocess execution for host collaborators.
//!
//! Commands are exec'd directly (no shell) with a pass-through timeout.

mod output;
mod subprocess;

pub use output::sanitize_output;
pub use subprocess::{run_command, SubprocessBuilder, SubprocessResult};
