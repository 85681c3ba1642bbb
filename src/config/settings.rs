//! Configuration settings for a convergence run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::attributes::ServiceSpecInput;
use crate::error::ConvergeError;
use crate::resources::CompressionInput;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    /// Environment-sourced attribute defaults (`clickhouse.server.*`).
    #[serde(default = "default_attributes")]
    pub attributes: serde_json::Value,
    /// Explicit attributes for the service instance.
    #[serde(default)]
    pub service: ServiceSpecInput,
    /// Optional compression settings snippet.
    #[serde(default)]
    pub compression: Option<CompressionInput>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Host facts. `auto` defers to the detection collaborators.
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub os_family: OsFamilySetting,
    #[serde(default)]
    pub supervisor: SupervisorSetting,
}

/// Operating system packaging family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Debian,
    Rhel,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamilySetting {
    #[default]
    Auto,
    Debian,
    Rhel,
    Other,
}

impl OsFamilySetting {
    /// The configured family, or `None` when it must be detected.
    pub fn fixed(self) -> Option<OsFamily> {
        match self {
            Self::Auto => None,
            Self::Debian => Some(OsFamily::Debian),
            Self::Rhel => Some(OsFamily::Rhel),
            Self::Other => Some(OsFamily::Other),
        }
    }
}

/// Init system managing the service unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorKind {
    Systemd,
    Sysvinit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorSetting {
    #[default]
    Auto,
    Systemd,
    Sysvinit,
}

impl SupervisorSetting {
    /// The configured supervisor, or `None` when it must be detected.
    pub fn fixed(self) -> Option<SupervisorKind> {
        match self {
            Self::Auto => None,
            Self::Systemd => Some(SupervisorKind::Systemd),
            Self::Sysvinit => Some(SupervisorKind::Sysvinit),
        }
    }
}

/// Timeouts handed through to collaborators.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Timeout for the config verification subprocess.
    #[serde(default = "default_verify_timeout")]
    pub verify_timeout_seconds: u64,
    /// Timeout for each supervisor call (start, stop, enable...).
    #[serde(default = "default_supervisor_timeout")]
    pub supervisor_timeout_seconds: u64,
    /// Timeout for package installation.
    #[serde(default = "default_package_timeout")]
    pub package_timeout_seconds: u64,
}

impl LimitsConfig {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_seconds)
    }

    pub fn supervisor_timeout(&self) -> Duration {
        Duration::from_secs(self.supervisor_timeout_seconds)
    }

    pub fn package_timeout(&self) -> Duration {
        Duration::from_secs(self.package_timeout_seconds)
    }
}

/// Paths configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory whose subdirectories are custom template origins.
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    /// Where systemd unit files are written.
    #[serde(default = "default_systemd_unit_dir")]
    pub systemd_unit_dir: PathBuf,
    /// Where sysvinit scripts are written.
    #[serde(default = "default_init_script_dir")]
    pub init_script_dir: PathBuf,
}

/// Audit journal configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Whether audit logging is enabled.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Path to the audit log file.
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_verify_timeout() -> u64 {
    30
}

fn default_supervisor_timeout() -> u64 {
    90
}

fn default_package_timeout() -> u64 {
    600
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("/etc/clickhouse-converge/templates")
}

fn default_systemd_unit_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

fn default_init_script_dir() -> PathBuf {
    PathBuf::from("/etc/init.d")
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("/var/log/clickhouse-converge/audit.log")
}

fn default_attributes() -> serde_json::Value {
    serde_json::json!({})
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            os_family: OsFamilySetting::Auto,
            supervisor: SupervisorSetting::Auto,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            verify_timeout_seconds: default_verify_timeout(),
            supervisor_timeout_seconds: default_supervisor_timeout(),
            package_timeout_seconds: default_package_timeout(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
            systemd_unit_dir: default_systemd_unit_dir(),
            init_script_dir: default_init_script_dir(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            log_path: default_audit_log_path(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConvergeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConvergeError::Configuration {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml(&content).map_err(|e| ConvergeError::Configuration {
            message: format!("Invalid config file '{}': {}", path.display(), e),
        })
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConvergeError> {
        let settings: Settings = toml::from_str(content).map_err(|e| ConvergeError::Configuration {
            message: format!("Failed to parse settings: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    fn validate(&self) -> Result<(), ConvergeError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConvergeError::Configuration {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(ConvergeError::Configuration {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        let timeouts = [
            ("verify_timeout_seconds", self.limits.verify_timeout_seconds),
            ("supervisor_timeout_seconds", self.limits.supervisor_timeout_seconds),
            ("package_timeout_seconds", self.limits.package_timeout_seconds),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConvergeError::Configuration {
                    message: format!("limits.{} must be greater than zero", name),
                });
            }
        }

        if !self.attributes.is_object() {
            return Err(ConvergeError::Configuration {
                message: "[attributes] must be a table".to_string(),
            });
        }

        Ok(())
    }
}
