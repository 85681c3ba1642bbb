//! Service specification types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Template origin served from the templates compiled into the binary.
pub const BUILTIN_ORIGIN: &str = "builtin";

/// A template name plus the origin it is loaded from.
///
/// The origin is either [`BUILTIN_ORIGIN`] or the name of a subdirectory of
/// the configured templates directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSource {
    pub source: String,
    pub origin: String,
}

impl TemplateSource {
    pub fn new(source: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            origin: origin.into(),
        }
    }

    pub fn builtin(source: impl Into<String>) -> Self {
        Self::new(source, BUILTIN_ORIGIN)
    }
}

/// Partially-specified service description, as written by the operator.
///
/// Every field is optional; the resolver fills gaps from the environment
/// defaults tree and static defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSpecInput {
    pub service_name: Option<String>,
    pub version: Option<String>,
    pub package_release: Option<String>,
    pub bin_dir: Option<PathBuf>,
    pub generic_bin: Option<PathBuf>,
    pub server_bin: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub config: Option<Value>,
    pub users: Option<Value>,
    pub zookeeper_enabled: Option<bool>,
    /// Raw endpoint records; validated when the sub-config is composed.
    pub zookeeper_nodes: Option<Vec<Value>>,
    pub service_unit_after: Option<Vec<String>>,
    pub service_timeout_sec: Option<u64>,
    pub service_restart: Option<String>,
    pub config_source: Option<String>,
    pub config_origin: Option<String>,
    pub users_source: Option<String>,
    pub users_origin: Option<String>,
    pub zookeeper_source: Option<String>,
    pub zookeeper_origin: Option<String>,
    pub user: Option<String>,
    pub group: Option<String>,
}

/// Fully resolved desired state of one ClickHouse server instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSpec {
    pub service_name: String,
    pub version: String,
    pub package_release: String,
    pub bin_dir: PathBuf,
    pub generic_bin: PathBuf,
    pub server_bin: PathBuf,
    pub config_dir: PathBuf,
    pub config: Value,
    pub users: Value,
    /// File name of the users config, read from `config.users_config`.
    pub users_config: String,
    pub zookeeper_enabled: bool,
    pub zookeeper_nodes: Vec<Value>,
    /// Include name read from `config.zookeeper.incl` when zookeeper is enabled.
    pub zookeeper_include: Option<String>,
    pub service_unit_after: Vec<String>,
    pub service_timeout_sec: u64,
    pub service_restart: String,
    pub config_template: TemplateSource,
    pub users_template: TemplateSource,
    pub zookeeper_template: TemplateSource,
    pub user: String,
    pub group: String,
}

impl ServiceSpec {
    /// Package version selector: `<version>-<release>`, or just the version
    /// when the release is empty.
    pub fn version_selector(&self) -> String {
        if self.package_release.is_empty() {
            self.version.clone()
        } else {
            format!("{}-{}", self.version, self.package_release)
        }
    }
}
