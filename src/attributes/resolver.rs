//! Two-phase attribute resolver.
//!
//! Phase 1 resolves every attribute whose default does not read another
//! attribute: explicit value, then the environment defaults tree, then a
//! static default. Phase 2 computes the attributes whose defaults are
//! functions of phase 1 results (`generic_bin`, `server_bin`,
//! `users_config`, `zookeeper_include`). Phase 2 only ever sees the finished
//! [`BaseAttributes`], so a dependency cycle cannot be written.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::error::{ConvergeError, ConvergeResult};
use crate::paths::DerivedPaths;
use crate::resources::LEGACY_FILES;
use crate::templates::is_xml_name;
use crate::validation::{validate_absolute_path, validate_file_name, validate_service_name};

use super::spec::{ServiceSpec, ServiceSpecInput, TemplateSource};
use super::value::{lookup, lookup_str};

/// Root of the environment defaults consulted for server attributes.
const SERVER_ATTRIBUTES: &[&str] = &["clickhouse", "server"];

const DEFAULT_SERVICE_NAME: &str = "clickhouse-server";
const DEFAULT_BIN_DIR: &str = "/usr/bin";
const DEFAULT_CONFIG_DIR: &str = "/etc/clickhouse-server";
const DEFAULT_UNIT_AFTER: &str = "network.target";
const DEFAULT_TIMEOUT_SEC: u64 = 5;
const DEFAULT_RESTART: &str = "on-failure";
const DEFAULT_OWNER: &str = "clickhouse";

const CONFIG_TEMPLATE: &str = "config.xml.tera";
const USERS_TEMPLATE: &str = "users.xml.tera";
const ZOOKEEPER_TEMPLATE: &str = "zookeeper.xml.tera";

/// Restart policies accepted by the service supervisor.
const RESTART_POLICIES: &[&str] = &[
    "no",
    "always",
    "on-success",
    "on-failure",
    "on-abnormal",
    "on-abort",
    "on-watchdog",
];

/// Resolves a [`ServiceSpecInput`] against an environment defaults tree.
pub struct AttributeResolver<'a> {
    defaults: &'a Value,
}

/// Attributes with no intra-spec dependency.
struct BaseAttributes {
    service_name: String,
    version: String,
    package_release: String,
    bin_dir: PathBuf,
    config_dir: PathBuf,
    config: Value,
    users: Value,
    zookeeper_enabled: bool,
    zookeeper_nodes: Vec<Value>,
    service_unit_after: Vec<String>,
    service_timeout_sec: u64,
    service_restart: String,
    config_template: TemplateSource,
    users_template: TemplateSource,
    zookeeper_template: TemplateSource,
    user: String,
    group: String,
}

/// Explicit values for attributes that otherwise default from phase 1.
struct DerivedOverrides {
    generic_bin: Option<PathBuf>,
    server_bin: Option<PathBuf>,
}

/// Attributes whose defaults read phase 1 results.
struct DerivedAttributes {
    generic_bin: PathBuf,
    server_bin: PathBuf,
    users_config: String,
    zookeeper_include: Option<String>,
}

impl<'a> AttributeResolver<'a> {
    pub fn new(defaults: &'a Value) -> Self {
        Self { defaults }
    }

    /// Produce a fully-populated spec or fail on the first missing or
    /// invalid attribute.
    pub fn resolve(&self, input: ServiceSpecInput) -> ConvergeResult<ServiceSpec> {
        let overrides = DerivedOverrides {
            generic_bin: input.generic_bin.clone(),
            server_bin: input.server_bin.clone(),
        };

        let base = self.resolve_base(input)?;
        let derived = DerivedAttributes::derive(&base, overrides)?;

        debug!(
            service = %base.service_name,
            version = %base.version,
            zookeeper = base.zookeeper_enabled,
            "Attributes resolved"
        );

        let spec = assemble(base, derived);
        reject_legacy_collisions(&spec)?;
        Ok(spec)
    }

    fn resolve_base(&self, input: ServiceSpecInput) -> ConvergeResult<BaseAttributes> {
        let service_name = input
            .service_name
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
        validate_service_name(&service_name)
            .map_err(|e| ConvergeError::invalid_attribute("service_name", e))?;

        let version = match input.version {
            Some(version) => version,
            None => self
                .env_string("version")?
                .ok_or_else(|| ConvergeError::missing_attribute("version"))?,
        };
        if version.trim().is_empty() {
            return Err(ConvergeError::invalid_attribute("version", "must not be empty"));
        }

        let package_release = match input.package_release {
            Some(release) => release,
            None => self.env_string("package_release")?.unwrap_or_default(),
        };

        let bin_dir = input
            .bin_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BIN_DIR));
        validate_absolute_path("bin_dir", &bin_dir)
            .map_err(|e| ConvergeError::invalid_attribute("bin_dir", e))?;

        let config_dir = input
            .config_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR));
        validate_absolute_path("config_dir", &config_dir)
            .map_err(|e| ConvergeError::invalid_attribute("config_dir", e))?;

        let config = match input.config {
            Some(config) => config,
            None => self
                .env_value("config")?
                .ok_or_else(|| ConvergeError::missing_attribute("config"))?,
        };
        require_mapping("config", &config)?;

        let users = match input.users {
            Some(users) => users,
            None => self
                .env_value("users")?
                .unwrap_or_else(|| Value::Object(Default::default())),
        };
        require_mapping("users", &users)?;

        let zookeeper_enabled = input.zookeeper_enabled.unwrap_or(true);
        let zookeeper_nodes = match input.zookeeper_nodes {
            Some(nodes) if !nodes.is_empty() => nodes,
            _ if zookeeper_enabled => {
                return Err(ConvergeError::Configuration {
                    message: "attribute `zookeeper_nodes` is required and must not be empty \
                              when `zookeeper_enabled` is true"
                        .to_string(),
                })
            }
            other => other.unwrap_or_default(),
        };

        let service_unit_after = input
            .service_unit_after
            .unwrap_or_else(|| vec![DEFAULT_UNIT_AFTER.to_string()]);

        let service_timeout_sec = input.service_timeout_sec.unwrap_or(DEFAULT_TIMEOUT_SEC);
        if service_timeout_sec == 0 {
            return Err(ConvergeError::invalid_attribute(
                "service_timeout_sec",
                "must be greater than zero",
            ));
        }

        let service_restart = input
            .service_restart
            .unwrap_or_else(|| DEFAULT_RESTART.to_string());
        if !RESTART_POLICIES.contains(&service_restart.as_str()) {
            return Err(ConvergeError::invalid_attribute(
                "service_restart",
                format!("'{}' is not one of {:?}", service_restart, RESTART_POLICIES),
            ));
        }

        let config_template = self.template(
            input.config_source,
            input.config_origin,
            CONFIG_TEMPLATE,
            &["configuration", "cookbook"],
        )?;
        let users_template = self.template(
            input.users_source,
            input.users_origin,
            USERS_TEMPLATE,
            &["users_configuration", "cookbook"],
        )?;
        let zookeeper_template = self.template(
            input.zookeeper_source,
            input.zookeeper_origin,
            ZOOKEEPER_TEMPLATE,
            &["zookeeper", "cookbook"],
        )?;

        let user = match input.user {
            Some(user) => user,
            None => self
                .env_string("user")?
                .unwrap_or_else(|| DEFAULT_OWNER.to_string()),
        };
        let group = match input.group {
            Some(group) => group,
            None => self
                .env_string("group")?
                .unwrap_or_else(|| DEFAULT_OWNER.to_string()),
        };

        Ok(BaseAttributes {
            service_name,
            version,
            package_release,
            bin_dir,
            config_dir,
            config,
            users,
            zookeeper_enabled,
            zookeeper_nodes,
            service_unit_after,
            service_timeout_sec,
            service_restart,
            config_template,
            users_template,
            zookeeper_template,
            user,
            group,
        })
    }

    fn template(
        &self,
        source: Option<String>,
        origin: Option<String>,
        default_source: &str,
        origin_key: &[&str],
    ) -> ConvergeResult<TemplateSource> {
        let origin = match origin {
            Some(origin) => origin,
            None => self
                .env_string_at(origin_key)?
                .unwrap_or_else(|| super::spec::BUILTIN_ORIGIN.to_string()),
        };
        Ok(TemplateSource::new(
            source.unwrap_or_else(|| default_source.to_string()),
            origin,
        ))
    }

    fn env_value(&self, key: &str) -> ConvergeResult<Option<Value>> {
        self.env_at(&[key]).map(|v| v.cloned())
    }

    fn env_string(&self, key: &str) -> ConvergeResult<Option<String>> {
        self.env_string_at(&[key])
    }

    fn env_string_at(&self, key: &[&str]) -> ConvergeResult<Option<String>> {
        match self.env_at(key)? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            // Versions such as 22 come through TOML as integers.
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(_) => Err(ConvergeError::invalid_attribute(
                &env_path(key),
                "must be a string",
            )),
        }
    }

    fn env_at(&self, key: &[&str]) -> ConvergeResult<Option<&'a Value>> {
        let path: Vec<&str> = SERVER_ATTRIBUTES.iter().chain(key).copied().collect();
        match lookup(self.defaults, &path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_missing() => Ok(None),
            Err(e) => Err(ConvergeError::invalid_attribute(&env_path(key), e)),
        }
    }
}

impl DerivedAttributes {
    fn derive(base: &BaseAttributes, overrides: DerivedOverrides) -> ConvergeResult<Self> {
        let generic_bin = overrides
            .generic_bin
            .unwrap_or_else(|| base.bin_dir.join("clickhouse"));
        let server_bin = overrides
            .server_bin
            .unwrap_or_else(|| base.bin_dir.join("clickhouse-server"));

        let users_config = config_string(&base.config, &["users_config"])?;
        validate_file_name("users_config", &users_config)
            .map_err(|e| ConvergeError::invalid_attribute("config.users_config", e))?;

        let zookeeper_include = if base.zookeeper_enabled {
            let incl = config_string(&base.config, &["zookeeper", "incl"])?;
            validate_file_name("zookeeper.incl", &incl)
                .map_err(|e| ConvergeError::invalid_attribute("config.zookeeper.incl", e))?;
            // Also used as the root element name of the include file.
            if !is_xml_name(&incl) {
                return Err(ConvergeError::invalid_attribute(
                    "config.zookeeper.incl",
                    "must be a valid XML element name",
                ));
            }
            Some(incl)
        } else {
            None
        };

        Ok(Self {
            generic_bin,
            server_bin,
            users_config,
            zookeeper_include,
        })
    }
}

fn assemble(base: BaseAttributes, derived: DerivedAttributes) -> ServiceSpec {
    ServiceSpec {
        service_name: base.service_name,
        version: base.version,
        package_release: base.package_release,
        bin_dir: base.bin_dir,
        generic_bin: derived.generic_bin,
        server_bin: derived.server_bin,
        config_dir: base.config_dir,
        config: base.config,
        users: base.users,
        users_config: derived.users_config,
        zookeeper_enabled: base.zookeeper_enabled,
        zookeeper_nodes: base.zookeeper_nodes,
        zookeeper_include: derived.zookeeper_include,
        service_unit_after: base.service_unit_after,
        service_timeout_sec: base.service_timeout_sec,
        service_restart: base.service_restart,
        config_template: base.config_template,
        users_template: base.users_template,
        zookeeper_template: base.zookeeper_template,
        user: base.user,
        group: base.group,
    }
}

/// Every install starts by deleting the legacy package files, so no file of
/// the instance may live at one of those paths.
fn reject_legacy_collisions(spec: &ServiceSpec) -> ConvergeResult<()> {
    let paths = DerivedPaths::derive(spec);
    let collision = paths
        .owned_paths()
        .into_iter()
        .find(|owned| LEGACY_FILES.iter().any(|legacy| Path::new(legacy) == *owned));

    match collision {
        Some(path) => Err(ConvergeError::invalid_attribute(
            "config_dir",
            format!(
                "derived path {} is a legacy package file removed on every install",
                path.display()
            ),
        )),
        None => Ok(()),
    }
}

fn config_string(config: &Value, path: &[&str]) -> ConvergeResult<String> {
    let field = format!("config.{}", path.join("."));
    match lookup_str(config, path) {
        Ok(s) => Ok(s.to_string()),
        Err(e) if e.is_missing() => Err(ConvergeError::missing_attribute(&field)),
        Err(e) => Err(ConvergeError::invalid_attribute(&field, e)),
    }
}

fn require_mapping(field: &str, value: &Value) -> ConvergeResult<()> {
    if value.is_object() {
        Ok(())
    } else {
        Err(ConvergeError::invalid_attribute(field, "must be a mapping"))
    }
}

fn env_path(key: &[&str]) -> String {
    SERVER_ATTRIBUTES
        .iter()
        .chain(key)
        .copied()
        .collect::<Vec<_>>()
        .join(".")
}
