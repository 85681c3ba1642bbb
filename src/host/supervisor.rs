//! Service supervisor collaborators.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use crate::attributes::TemplateSource;
use crate::config::{OsFamily, PathsConfig, SupervisorKind};
use crate::error::{CollaboratorErrorKind, ConvergeError, ConvergeResult};
use crate::executor::{run_command, SubprocessBuilder, SubprocessResult};
use crate::templates::{TemplateEngine, SYSTEMD_UNIT_TEMPLATE, SYSVINIT_SCRIPT_TEMPLATE};

use super::fs::write_atomic;
use super::traits::{ServiceState, ServiceStatus, ServiceSupervisor, UnitSpec};

const UNIT_FILE_MODE: u32 = 0o644;
const INIT_SCRIPT_MODE: u32 = 0o755;

/// Build the supervisor for an init system.
pub fn supervisor_for(
    kind: SupervisorKind,
    family: OsFamily,
    paths: &PathsConfig,
    templates: TemplateEngine,
    timeout: Duration,
) -> Box<dyn ServiceSupervisor> {
    match kind {
        SupervisorKind::Systemd => Box::new(SystemdSupervisor::new(
            paths.systemd_unit_dir.clone(),
            templates,
            timeout,
        )),
        SupervisorKind::Sysvinit => Box::new(SysvinitSupervisor::new(
            paths.init_script_dir.clone(),
            family,
            templates,
            timeout,
        )),
    }
}

/// systemd via `systemctl`.
pub struct SystemdSupervisor {
    unit_dir: PathBuf,
    templates: TemplateEngine,
    timeout: Duration,
}

impl SystemdSupervisor {
    pub fn new(unit_dir: PathBuf, templates: TemplateEngine, timeout: Duration) -> Self {
        Self {
            unit_dir,
            templates,
            timeout,
        }
    }

    fn unit_path(&self, name: &str) -> PathBuf {
        self.unit_dir.join(format!("{}.service", name))
    }

    fn systemctl(&self, args: &[&str]) -> ConvergeResult<SubprocessResult> {
        SubprocessBuilder::new("systemctl")
            .args(args.iter().copied())
            .timeout(self.timeout)
            .run()
            .map_err(supervisor_error)
    }

    fn systemctl_checked(&self, args: &[&str]) -> ConvergeResult<()> {
        SubprocessBuilder::new("systemctl")
            .args(args.iter().copied())
            .timeout(self.timeout)
            .run_checked()
            .map(|_| ())
            .map_err(supervisor_error)
    }
}

impl ServiceSupervisor for SystemdSupervisor {
    fn kind(&self) -> SupervisorKind {
        SupervisorKind::Systemd
    }

    fn define_unit(&self, name: &str, unit: &UnitSpec) -> ConvergeResult<bool> {
        let content = render_unit(&self.templates, SYSTEMD_UNIT_TEMPLATE, name, unit)?;
        let changed = write_if_changed(&self.unit_path(name), &content, UNIT_FILE_MODE)?;
        if changed {
            info!(service = name, "Unit file updated, reloading systemd");
            self.systemctl_checked(&["daemon-reload"])?;
        }
        Ok(changed)
    }

    fn set_state(&self, name: &str, desired: ServiceState) -> ConvergeResult<bool> {
        let current = self.status(name)?;
        let mut changed = false;

        if desired.enabled != current.enabled {
            let verb = if desired.enabled { "enable" } else { "disable" };
            self.systemctl_checked(&[verb, name])?;
            changed = true;
        }
        if desired.running != current.running {
            let verb = if desired.running { "start" } else { "stop" };
            self.systemctl_checked(&[verb, name])?;
            changed = true;
        }

        if changed {
            info!(
                service = name,
                enabled = desired.enabled,
                running = desired.running,
                "Service state converged"
            );
        }
        Ok(changed)
    }

    fn stop(&self, name: &str) -> ConvergeResult<bool> {
        if !self.status(name)?.running {
            return Ok(false);
        }
        self.systemctl_checked(&["stop", name])?;
        info!(service = name, "Service stopped");
        Ok(true)
    }

    fn disable(&self, name: &str) -> ConvergeResult<bool> {
        if !self.status(name)?.enabled {
            return Ok(false);
        }
        self.systemctl_checked(&["disable", name])?;
        info!(service = name, "Service disabled");
        Ok(true)
    }

    fn status(&self, name: &str) -> ConvergeResult<ServiceStatus> {
        let enabled = self.systemctl(&["is-enabled", name])?;
        let active = self.systemctl(&["is-active", name])?;
        let status = ServiceStatus {
            enabled: matches!(enabled.stdout.trim(), "enabled" | "enabled-runtime"),
            running: active.success,
        };
        debug!(service = name, ?status, "Service status");
        Ok(status)
    }

    fn restart(&self, name: &str) -> ConvergeResult<()> {
        self.systemctl_checked(&["restart", name])?;
        info!(service = name, "Service restarted");
        Ok(())
    }
}

/// SysV init scripts via `service` plus `update-rc.d` or `chkconfig`.
pub struct SysvinitSupervisor {
    script_dir: PathBuf,
    family: OsFamily,
    templates: TemplateEngine,
    timeout: Duration,
    rc_root: PathBuf,
}

impl SysvinitSupervisor {
    pub fn new(
        script_dir: PathBuf,
        family: OsFamily,
        templates: TemplateEngine,
        timeout: Duration,
    ) -> Self {
        Self {
            script_dir,
            family,
            templates,
            timeout,
            rc_root: PathBuf::from("/etc"),
        }
    }

    /// Directory holding the `rcN.d` link farms.
    pub fn with_rc_root(mut self, rc_root: PathBuf) -> Self {
        self.rc_root = rc_root;
        self
    }

    fn run(&self, program: &str, args: &[&str]) -> ConvergeResult<SubprocessResult> {
        run_command(program, args, self.timeout).map_err(supervisor_error)
    }

    fn run_checked(&self, program: &str, args: &[&str]) -> ConvergeResult<()> {
        SubprocessBuilder::new(program)
            .args(args.iter().copied())
            .timeout(self.timeout)
            .run_checked()
            .map(|_| ())
            .map_err(supervisor_error)
    }

    /// Enabled means a start link exists in runlevel 2 or 3.
    fn is_enabled(&self, name: &str) -> ConvergeResult<bool> {
        for runlevel in ["rc2.d", "rc3.d"] {
            let dir = self.rc_root.join(runlevel);
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(ConvergeError::filesystem(&dir, e)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| ConvergeError::filesystem(&dir, e))?;
                if is_start_link(&entry.file_name().to_string_lossy(), name) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn is_running(&self, name: &str) -> ConvergeResult<bool> {
        if !self.script_dir.join(name).exists() {
            return Ok(false);
        }
        Ok(self.run("service", &[name, "status"])?.success)
    }

    fn enable(&self, name: &str) -> ConvergeResult<()> {
        match self.family {
            OsFamily::Debian => self.run_checked("update-rc.d", &[name, "defaults"]),
            OsFamily::Rhel | OsFamily::Other => {
                self.run_checked("chkconfig", &["--add", name])?;
                self.run_checked("chkconfig", &[name, "on"])
            }
        }
    }

    fn remove_links(&self, name: &str) -> ConvergeResult<()> {
        match self.family {
            OsFamily::Debian => self.run_checked("update-rc.d", &["-f", name, "remove"]),
            OsFamily::Rhel | OsFamily::Other => self.run_checked("chkconfig", &[name, "off"]),
        }
    }
}

impl ServiceSupervisor for SysvinitSupervisor {
    fn kind(&self) -> SupervisorKind {
        SupervisorKind::Sysvinit
    }

    fn define_unit(&self, name: &str, unit: &UnitSpec) -> ConvergeResult<bool> {
        let content = render_unit(&self.templates, SYSVINIT_SCRIPT_TEMPLATE, name, unit)?;
        let changed = write_if_changed(&self.script_dir.join(name), &content, INIT_SCRIPT_MODE)?;
        if changed {
            info!(service = name, "Init script updated");
        }
        Ok(changed)
    }

    fn set_state(&self, name: &str, desired: ServiceState) -> ConvergeResult<bool> {
        let current = self.status(name)?;
        let mut changed = false;

        if desired.enabled != current.enabled {
            if desired.enabled {
                self.enable(name)?;
            } else {
                self.remove_links(name)?;
            }
            changed = true;
        }
        if desired.running != current.running {
            let verb = if desired.running { "start" } else { "stop" };
            self.run_checked("service", &[name, verb])?;
            changed = true;
        }

        if changed {
            info!(
                service = name,
                enabled = desired.enabled,
                running = desired.running,
                "Service state converged"
            );
        }
        Ok(changed)
    }

    fn stop(&self, name: &str) -> ConvergeResult<bool> {
        if !self.is_running(name)? {
            return Ok(false);
        }
        self.run_checked("service", &[name, "stop"])?;
        info!(service = name, "Service stopped");
        Ok(true)
    }

    fn disable(&self, name: &str) -> ConvergeResult<bool> {
        if !self.is_enabled(name)? {
            return Ok(false);
        }
        self.remove_links(name)?;
        info!(service = name, "Service disabled");
        Ok(true)
    }

    fn status(&self, name: &str) -> ConvergeResult<ServiceStatus> {
        Ok(ServiceStatus {
            enabled: self.is_enabled(name)?,
            running: self.is_running(name)?,
        })
    }

    fn restart(&self, name: &str) -> ConvergeResult<()> {
        self.run_checked("service", &[name, "restart"])?;
        info!(service = name, "Service restarted");
        Ok(())
    }
}

fn render_unit(
    templates: &TemplateEngine,
    source: &str,
    name: &str,
    unit: &UnitSpec,
) -> ConvergeResult<String> {
    templates.render(
        &TemplateSource::builtin(source),
        &json!({ "name": name, "unit": unit }),
    )
}

fn write_if_changed(path: &Path, content: &str, mode: u32) -> ConvergeResult<bool> {
    match fs::read_to_string(path) {
        Ok(existing) if existing == content => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(ConvergeError::filesystem(path, e)),
    }
    write_atomic(path, content, mode, None)?;
    Ok(true)
}

/// `S20clickhouse-server` is a start link for `clickhouse-server`.
fn is_start_link(file_name: &str, name: &str) -> bool {
    file_name
        .strip_prefix('S')
        .map(|rest| rest.trim_start_matches(|c: char| c.is_ascii_digit()))
        .is_some_and(|rest| rest == name)
}

fn supervisor_error(err: ConvergeError) -> ConvergeError {
    match err {
        ConvergeError::Collaborator {
            kind: CollaboratorErrorKind::ExecutionFailed { message },
        } => ConvergeError::Collaborator {
            kind: CollaboratorErrorKind::Supervisor { message },
        },
        other => other,
    }
}
