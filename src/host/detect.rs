//! Host fact detection, used when settings leave a fact on `auto`.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::config::{OsFamily, SupervisorKind};
use crate::error::{ConvergeError, ConvergeResult};
use crate::executor::SubprocessBuilder;

const OS_RELEASE: &str = "/etc/os-release";

const DEBIAN_IDS: &[&str] = &["debian", "ubuntu"];
const RHEL_IDS: &[&str] = &["rhel", "centos", "fedora", "rocky", "almalinux", "amzn", "ol"];

/// Packaging family from `/etc/os-release`.
pub fn detect_os_family() -> ConvergeResult<OsFamily> {
    let path = Path::new(OS_RELEASE);
    let content = std::fs::read_to_string(path).map_err(|e| ConvergeError::filesystem(path, e))?;
    let family = os_family_from_release(&content);
    debug!(?family, "Detected OS family");
    Ok(family)
}

/// Classify os-release content by `ID` and `ID_LIKE`.
pub fn os_family_from_release(content: &str) -> OsFamily {
    let mut ids = Vec::new();
    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.trim() == "ID" || key.trim() == "ID_LIKE" {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            ids.extend(value.split_whitespace().map(str::to_lowercase));
        }
    }

    if ids.iter().any(|id| DEBIAN_IDS.contains(&id.as_str())) {
        OsFamily::Debian
    } else if ids.iter().any(|id| RHEL_IDS.contains(&id.as_str())) {
        OsFamily::Rhel
    } else {
        OsFamily::Other
    }
}

/// Init system from the command name of PID 1.
pub fn detect_supervisor(timeout: Duration) -> ConvergeResult<SupervisorKind> {
    let result = SubprocessBuilder::new("ps")
        .args(["--no-headers", "-o", "comm", "1"])
        .timeout(timeout)
        .run_checked()?;
    let kind = supervisor_from_comm(&result.stdout);
    debug!(?kind, "Detected service supervisor");
    Ok(kind)
}

pub fn supervisor_from_comm(comm: &str) -> SupervisorKind {
    if comm.trim() == "systemd" {
        SupervisorKind::Systemd
    } else {
        SupervisorKind::Sysvinit
    }
}
