//! Package manager collaborators.

use std::time::Duration;

use tracing::{debug, info};

use crate::config::OsFamily;
use crate::error::{CollaboratorErrorKind, ConvergeError, ConvergeResult};
use crate::executor::SubprocessBuilder;

use super::traits::PackageManager;

/// Pick the package manager for a packaging family.
///
/// Debian uses apt. Everything else goes through yum; only the RHEL family
/// flushes the metadata cache before installing.
pub fn package_manager_for(family: OsFamily, timeout: Duration) -> Box<dyn PackageManager> {
    match family {
        OsFamily::Debian => Box::new(AptPackageManager::new(timeout)),
        OsFamily::Rhel | OsFamily::Other => Box::new(YumPackageManager::new(family, timeout)),
    }
}

/// apt/dpkg based package manager.
pub struct AptPackageManager {
    timeout: Duration,
}

impl AptPackageManager {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Installed version, or `None` when the package is not installed.
    fn installed_version(&self, name: &str) -> ConvergeResult<Option<String>> {
        let result = SubprocessBuilder::new("dpkg-query")
            .args(["-W", "-f=${Status}\t${Version}", name])
            .timeout(self.timeout)
            .run()
            .map_err(package_error)?;

        if !result.success {
            return Ok(None);
        }
        Ok(parse_dpkg_status(&result.stdout))
    }
}

impl PackageManager for AptPackageManager {
    fn family(&self) -> OsFamily {
        OsFamily::Debian
    }

    fn ensure_installed(&self, name: &str, version: &str) -> ConvergeResult<bool> {
        let installed = self.installed_version(name)?;
        if installed.as_deref() == Some(version) {
            debug!(package = name, version, "Package already installed");
            return Ok(false);
        }

        info!(package = name, version, installed = ?installed, "Installing package");

        SubprocessBuilder::new("apt-get")
            .args([
                "install",
                "-y",
                "--no-install-recommends",
                "--allow-downgrades",
                "-o",
                "Dpkg::Options::=--force-confdef",
                "-o",
                "Dpkg::Options::=--force-confold",
            ])
            .arg(&format!("{}={}", name, version))
            .env("DEBIAN_FRONTEND", "noninteractive")
            .timeout(self.timeout)
            .run_checked()
            .map_err(package_error)?;

        Ok(true)
    }
}

/// yum/rpm based package manager.
pub struct YumPackageManager {
    family: OsFamily,
    timeout: Duration,
}

impl YumPackageManager {
    pub fn new(family: OsFamily, timeout: Duration) -> Self {
        Self { family, timeout }
    }

    fn flushes_cache(&self) -> bool {
        self.family == OsFamily::Rhel
    }

    fn installed_version(&self, name: &str) -> ConvergeResult<Option<String>> {
        let result = SubprocessBuilder::new("rpm")
            .args(["-q", "--qf", "%{VERSION}-%{RELEASE}", name])
            .timeout(self.timeout)
            .run()
            .map_err(package_error)?;

        if !result.success {
            return Ok(None);
        }
        Ok(Some(result.stdout.trim().to_string()))
    }
}

impl PackageManager for YumPackageManager {
    fn family(&self) -> OsFamily {
        self.family
    }

    fn ensure_installed(&self, name: &str, version: &str) -> ConvergeResult<bool> {
        let installed = self.installed_version(name)?;
        if installed
            .as_deref()
            .is_some_and(|v| rpm_version_matches(v, version))
        {
            debug!(package = name, version, "Package already installed");
            return Ok(false);
        }

        if self.flushes_cache() {
            debug!("Flushing yum metadata cache");
            SubprocessBuilder::new("yum")
                .args(["clean", "all"])
                .timeout(self.timeout)
                .run_checked()
                .map_err(package_error)?;
        }

        info!(package = name, version, installed = ?installed, "Installing package");

        SubprocessBuilder::new("yum")
            .args(["install", "-y"])
            .arg(&format!("{}-{}", name, version))
            .timeout(self.timeout)
            .run_checked()
            .map_err(package_error)?;

        Ok(true)
    }
}

/// Parse `dpkg-query -f '${Status}\t${Version}'` output.
fn parse_dpkg_status(output: &str) -> Option<String> {
    let (status, version) = output.trim().split_once('\t')?;
    if status.ends_with(" installed") && !version.is_empty() {
        Some(version.to_string())
    } else {
        None
    }
}

/// `VERSION-RELEASE` from rpm against a selector that may omit the release.
fn rpm_version_matches(installed: &str, selector: &str) -> bool {
    if selector.contains('-') {
        installed == selector
    } else {
        installed.split_once('-').map_or(installed, |(v, _)| v) == selector
    }
}

/// Timeouts stay timeouts; any other subprocess failure is reported against
/// the package manager.
fn package_error(err: ConvergeError) -> ConvergeError {
    match err {
        ConvergeError::Collaborator {
            kind: CollaboratorErrorKind::ExecutionFailed { message },
        } => ConvergeError::Collaborator {
            kind: CollaboratorErrorKind::PackageManager { message },
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dpkg_status() {
        assert_eq!(
            parse_dpkg_status("install ok installed\t22.3.2.2\n"),
            Some("22.3.2.2".to_string())
        );
        assert_eq!(parse_dpkg_status("deinstall ok config-files\t22.3"), None);
        assert_eq!(parse_dpkg_status("unknown ok not-installed\t"), None);
        assert_eq!(parse_dpkg_status(""), None);
    }

    #[test]
    fn test_rpm_version_matches() {
        assert!(rpm_version_matches("22.3-2", "22.3-2"));
        assert!(rpm_version_matches("22.3-2", "22.3"));
        assert!(!rpm_version_matches("22.3-2", "22.3-1"));
        assert!(!rpm_version_matches("22.4-1", "22.3"));
    }

    #[test]
    fn test_family_selection() {
        let timeout = Duration::from_secs(1);
        assert_eq!(package_manager_for(OsFamily::Debian, timeout).family(), OsFamily::Debian);
        assert_eq!(package_manager_for(OsFamily::Rhel, timeout).family(), OsFamily::Rhel);
        assert_eq!(package_manager_for(OsFamily::Other, timeout).family(), OsFamily::Other);
    }

    #[test]
    fn test_cache_flush_only_on_rhel() {
        let timeout = Duration::from_secs(1);
        assert!(YumPackageManager::new(OsFamily::Rhel, timeout).flushes_cache());
        assert!(!YumPackageManager::new(OsFamily::Other, timeout).flushes_cache());
    }

    #[test]
    fn test_package_error_keeps_timeouts() {
        let err = package_error(ConvergeError::Collaborator {
            kind: CollaboratorErrorKind::Timeout { timeout_secs: 5 },
        });
        assert!(matches!(
            err,
            ConvergeError::Collaborator {
                kind: CollaboratorErrorKind::Timeout { .. }
            }
        ));
    }
}
