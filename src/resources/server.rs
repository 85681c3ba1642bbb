//! ClickHouse server install and delete pipelines.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use crate::attributes::ServiceSpec;
use crate::config::{OsFamily, SupervisorKind};
use crate::error::ConvergeResult;
use crate::host::{FileAttrs, Host, ServiceState, ServiceStatus, UnitSpec};
use crate::paths::DerivedPaths;

use super::files::converge_file;
use super::report::{Action, ConvergenceReport, Step};
use super::traits::Convergence;
use super::zookeeper::ZookeeperConfig;

/// Files the distribution package installs that would shadow the managed
/// layout. Removed on every install.
pub const LEGACY_FILES: &[&str] = &[
    "/etc/cron.d/clickhouse-server",
    "/etc/init.d/clickhouse-server",
    "/etc/security/limits.d/clickhouse.conf",
    "/etc/clickhouse-server/users.xml",
    "/etc/clickhouse-server/config.xml",
];

const CONFIG_FILE_MODE: u32 = 0o640;
const KILL_SIGNAL: &str = "TERM";

/// Server package for a packaging family.
pub fn package_name(family: OsFamily) -> &'static str {
    match family {
        OsFamily::Debian => "clickhouse-server-base",
        OsFamily::Rhel | OsFamily::Other => "clickhouse-server",
    }
}

/// One ClickHouse server instance.
pub struct ServiceConvergence {
    spec: ServiceSpec,
    paths: DerivedPaths,
}

impl ServiceConvergence {
    pub fn new(spec: ServiceSpec) -> Self {
        let paths = DerivedPaths::derive(&spec);
        Self { spec, paths }
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    pub fn paths(&self) -> &DerivedPaths {
        &self.paths
    }

    /// Unit definition handed to the supervisor.
    pub fn unit_spec(&self) -> UnitSpec {
        UnitSpec {
            description: format!("ClickHouse Server ({})", self.spec.service_name),
            after: self.spec.service_unit_after.clone(),
            exec_start: format!(
                "{} --pid-file={} --config-file={}",
                self.spec.server_bin.display(),
                self.paths.pid_file_path.display(),
                self.paths.config_file_path.display()
            ),
            restart: self.spec.service_restart.clone(),
            timeout_sec: self.spec.service_timeout_sec,
            user: self.spec.user.clone(),
            group: self.spec.group.clone(),
            kill_signal: KILL_SIGNAL.to_string(),
            runtime_directory: self.spec.service_name.clone(),
            pid_file: self.paths.pid_file_path.clone(),
        }
    }

    /// Variables for the main config template.
    pub fn config_variables(&self) -> Value {
        let mut vars = self.paths.template_variables();
        vars.insert("service_name".to_string(), Value::from(self.spec.service_name.as_str()));
        vars.insert("config".to_string(), self.spec.config.clone());
        if let Some(incl) = &self.spec.zookeeper_include {
            vars.insert("zookeeper_include".to_string(), Value::from(incl.as_str()));
        }
        Value::Object(vars)
    }

    fn users_variables(&self) -> Value {
        serde_json::json!({
            "service_name": self.spec.service_name,
            "users": self.spec.users,
        })
    }

    fn file_attrs(&self) -> FileAttrs {
        FileAttrs {
            owner: self.spec.user.clone(),
            group: self.spec.group.clone(),
            mode: CONFIG_FILE_MODE,
        }
    }

    pub fn status(&self, host: &Host<'_>) -> ConvergeResult<ServiceStatus> {
        host.supervisor.status(&self.spec.service_name)
    }

    pub fn restart(&self, host: &Host<'_>) -> ConvergeResult<()> {
        host.supervisor.restart(&self.spec.service_name)
    }

    fn install_package(&self, host: &Host<'_>, report: &mut ConvergenceReport) -> ConvergeResult<()> {
        let name = package_name(host.packages.family());
        let version = self.spec.version_selector();
        debug!(package = name, version = %version, "Ensuring package");

        let changed = host.packages.ensure_installed(name, &version)?;
        report.record_detail(Step::Package, changed, format!("{} {}", name, version));
        Ok(())
    }

    fn purge_legacy_files(&self, host: &Host<'_>, report: &mut ConvergenceReport) -> ConvergeResult<()> {
        // A sysvinit instance named like the package owns its init script.
        let own_script = format!("/etc/init.d/{}", self.spec.service_name);
        let keep_own_script = host.supervisor.kind() == SupervisorKind::Sysvinit;

        let mut removed = Vec::new();
        for legacy in LEGACY_FILES {
            if keep_own_script && *legacy == own_script {
                continue;
            }
            if host.fs.delete_file(Path::new(legacy))? {
                removed.push(*legacy);
            }
        }

        if removed.is_empty() {
            report.record(Step::LegacyCleanup, false);
        } else {
            info!(files = ?removed, "Removed legacy package files");
            report.record_detail(Step::LegacyCleanup, true, removed.join(", "));
        }
        Ok(())
    }

    fn create_directories(&self, host: &Host<'_>, report: &mut ConvergenceReport) -> ConvergeResult<()> {
        let mut changed = false;
        for dir in self.paths.directories() {
            changed |= host.fs.mkdir_all(dir, &self.spec.user, &self.spec.group)?;
        }
        report.record(Step::Directories, changed);
        Ok(())
    }

    fn converge_zookeeper(&self, host: &Host<'_>, report: &mut ConvergenceReport) -> ConvergeResult<()> {
        let request = ZookeeperConfig::compose(&self.spec)?;
        let path = request.file_path();
        let sub = ZookeeperConfig::new(request).install(host)?;
        report.record_detail(Step::Zookeeper, sub.changed(), path.display().to_string());
        Ok(())
    }

    fn converge_config(&self, host: &Host<'_>) -> ConvergeResult<bool> {
        let content = host
            .templates
            .render(&self.spec.config_template, &self.config_variables())?;
        converge_file(
            host,
            &self.paths.config_file_path,
            &content,
            &self.file_attrs(),
            Some(&self.spec.generic_bin),
        )
    }

    fn converge_users(&self, host: &Host<'_>) -> ConvergeResult<bool> {
        let content = host
            .templates
            .render(&self.spec.users_template, &self.users_variables())?;
        converge_file(host, &self.paths.users_file_path, &content, &self.file_attrs(), None)
    }

    /// Enable and start, then restart a unit that was already running when
    /// its config or definition changed under it.
    fn converge_service_state(
        &self,
        host: &Host<'_>,
        restart_needed: bool,
        report: &mut ConvergenceReport,
    ) -> ConvergeResult<()> {
        let name = &self.spec.service_name;
        let before = host.supervisor.status(name)?;
        let changed = host.supervisor.set_state(
            name,
            ServiceState {
                enabled: true,
                running: true,
            },
        )?;
        report.record(Step::ServiceState, changed);

        if restart_needed && before.running {
            info!(service = %name, "Restarting service to pick up changes");
            host.supervisor
                .restart(name)
                .map_err(|e| e.in_step(Step::Restart))?;
            report.record(Step::Restart, true);
        }
        Ok(())
    }
}

impl Convergence for ServiceConvergence {
    fn name(&self) -> &str {
        &self.spec.service_name
    }

    fn install(&self, host: &Host<'_>) -> ConvergeResult<ConvergenceReport> {
        let name = self.name();
        let mut report = ConvergenceReport::new(name, Action::Install);
        info!(service = %name, version = %self.spec.version_selector(), "Converging server");

        self.install_package(host, &mut report)
            .map_err(|e| e.in_step(Step::Package))?;
        self.purge_legacy_files(host, &mut report)
            .map_err(|e| e.in_step(Step::LegacyCleanup))?;
        self.create_directories(host, &mut report)
            .map_err(|e| e.in_step(Step::Directories))?;

        if self.spec.zookeeper_enabled {
            self.converge_zookeeper(host, &mut report)
                .map_err(|e| e.in_step(Step::Zookeeper))?;
        }

        let config_changed = self.converge_config(host).map_err(|e| e.in_step(Step::Config))?;
        report.record_detail(
            Step::Config,
            config_changed,
            self.paths.config_file_path.display().to_string(),
        );

        let users_changed = self.converge_users(host).map_err(|e| e.in_step(Step::Users))?;
        report.record_detail(
            Step::Users,
            users_changed,
            self.paths.users_file_path.display().to_string(),
        );

        let unit_changed = host
            .supervisor
            .define_unit(name, &self.unit_spec())
            .map_err(|e| e.in_step(Step::Unit))?;
        report.record(Step::Unit, unit_changed);

        self.converge_service_state(host, config_changed || unit_changed, &mut report)
            .map_err(|e| e.in_step(Step::ServiceState))?;

        info!(service = %name, changed = ?report.changed_steps(), "Server converged");
        Ok(report)
    }

    fn delete(&self, host: &Host<'_>) -> ConvergeResult<ConvergenceReport> {
        let name = self.name();
        let mut report = ConvergenceReport::new(name, Action::Delete);
        info!(service = %name, "Deleting server");

        let stopped = host.supervisor.stop(name).map_err(|e| e.in_step(Step::Stop))?;
        report.record(Step::Stop, stopped);

        let disabled = host
            .supervisor
            .disable(name)
            .map_err(|e| e.in_step(Step::Disable))?;
        report.record(Step::Disable, disabled);

        let deleted = host
            .fs
            .delete_file(&self.paths.config_file_path)
            .map_err(|e| e.in_step(Step::DeleteConfig))?;
        report.record_detail(
            Step::DeleteConfig,
            deleted,
            self.paths.config_file_path.display().to_string(),
        );

        info!(service = %name, changed = ?report.changed_steps(), "Server deleted");
        Ok(report)
    }
}
