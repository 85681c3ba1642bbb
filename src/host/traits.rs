//! Collaborator interfaces.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{OsFamily, SupervisorKind};
use crate::error::ConvergeResult;

/// Installs versioned packages.
pub trait PackageManager: Send + Sync {
    /// Packaging family this manager serves.
    fn family(&self) -> OsFamily;

    /// Make sure `name` is installed at exactly `version`.
    ///
    /// Returns `true` when something was installed or changed.
    fn ensure_installed(&self, name: &str, version: &str) -> ConvergeResult<bool>;
}

/// Definition of a supervised service unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitSpec {
    pub description: String,
    pub after: Vec<String>,
    /// Foreground command line. Supervisors that need a daemonizing
    /// command add the flag themselves.
    pub exec_start: String,
    pub restart: String,
    pub timeout_sec: u64,
    pub user: String,
    pub group: String,
    /// Signal name without the `SIG` prefix.
    pub kill_signal: String,
    /// Directory name created under `/var/run` for the service.
    pub runtime_directory: String,
    pub pid_file: PathBuf,
}

/// Desired enablement and run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceState {
    pub enabled: bool,
    pub running: bool,
}

/// Observed enablement and run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub enabled: bool,
    pub running: bool,
}

/// Starts, stops, enables and disables service units.
pub trait ServiceSupervisor: Send + Sync {
    fn kind(&self) -> SupervisorKind;

    /// Install or update the unit definition. Returns `true` on change.
    fn define_unit(&self, name: &str, unit: &UnitSpec) -> ConvergeResult<bool>;

    /// Bring the unit to `desired`. Returns `true` on change.
    fn set_state(&self, name: &str, desired: ServiceState) -> ConvergeResult<bool>;

    /// Stop the unit if it is running. Returns `true` on change.
    fn stop(&self, name: &str) -> ConvergeResult<bool>;

    /// Disable the unit if it is enabled. Returns `true` on change.
    fn disable(&self, name: &str) -> ConvergeResult<bool>;

    fn status(&self, name: &str) -> ConvergeResult<ServiceStatus>;

    fn restart(&self, name: &str) -> ConvergeResult<()>;
}

/// Ownership and permissions for a written file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttrs {
    pub owner: String,
    pub group: String,
    pub mode: u32,
}

/// Filesystem primitives.
pub trait FileSystem: Send + Sync {
    /// Create `path` and missing parents, then make sure `path` is owned by
    /// `owner:group`. Returns `true` on change.
    fn mkdir_all(&self, path: &Path, owner: &str, group: &str) -> ConvergeResult<bool>;

    /// File content, or `None` when the file does not exist.
    fn read_file(&self, path: &Path) -> ConvergeResult<Option<String>>;

    /// Write `content` to `path` atomically with the given attributes.
    fn write_file(&self, path: &Path, content: &str, attrs: &FileAttrs) -> ConvergeResult<()>;

    /// Bring owner, group and mode of an existing file to `attrs`.
    /// Returns `true` on change.
    fn set_attrs(&self, path: &Path, attrs: &FileAttrs) -> ConvergeResult<bool>;

    fn rename(&self, from: &Path, to: &Path) -> ConvergeResult<()>;

    /// Remove a file. Returns `false` when it was already absent.
    fn delete_file(&self, path: &Path) -> ConvergeResult<bool>;
}

/// Dry-runs the server binary against a candidate config file.
pub trait ConfigVerifier: Send + Sync {
    fn verify(&self, generic_bin: &Path, candidate: &Path) -> ConvergeResult<()>;
}
