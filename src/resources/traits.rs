//! The two-action resource interface.

use crate::error::ConvergeResult;
use crate::host::Host;

use super::report::ConvergenceReport;

/// A resource that can be converged onto a host and removed again.
///
/// Both actions are idempotent: running one twice is observably the same as
/// running it once, and a run that stopped half way is repaired by running
/// it again.
pub trait Convergence {
    /// Resource name used in logs and the audit journal.
    fn name(&self) -> &str;

    fn install(&self, host: &Host<'_>) -> ConvergeResult<ConvergenceReport>;

    fn delete(&self, host: &Host<'_>) -> ConvergeResult<ConvergenceReport>;
}
