//! External collaborators.
//!
//! Everything the convergence pipelines do to the machine goes through the
//! traits in [`traits`]. The local implementations shell out to the
//! platform tools; tests substitute in-memory doubles.

mod detect;
mod fs;
mod packages;
mod supervisor;
mod traits;
mod verify;

pub use detect::{detect_os_family, detect_supervisor, os_family_from_release, supervisor_from_comm};
pub use fs::LocalFileSystem;
pub use packages::{package_manager_for, AptPackageManager, YumPackageManager};
pub use supervisor::{supervisor_for, SystemdSupervisor, SysvinitSupervisor};
pub use traits::{
    ConfigVerifier, FileAttrs, FileSystem, PackageManager, ServiceState, ServiceStatus,
    ServiceSupervisor, UnitSpec,
};
pub use verify::CommandVerifier;

use crate::templates::TemplateEngine;

/// The collaborators a convergence run works against.
#[derive(Clone, Copy)]
pub struct Host<'a> {
    pub packages: &'a dyn PackageManager,
    pub supervisor: &'a dyn ServiceSupervisor,
    pub fs: &'a dyn FileSystem,
    pub verifier: &'a dyn ConfigVerifier,
    pub templates: &'a TemplateEngine,
}
