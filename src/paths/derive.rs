//! Path derivation rules.

use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};

use crate::attributes::ServiceSpec;

const DATA_ROOT: &str = "/var/lib";
const LOG_ROOT: &str = "/var/log";
const RUN_ROOT: &str = "/var/run";

const CONFIG_FILE: &str = "config.xml";
const CONF_D: &str = "conf.d";
const COMPRESSION_FILE: &str = "compression.xml";
const PID_FILE: &str = "server.pid";

/// Every filesystem location owned by one service instance.
///
/// Filesystem targets carry no trailing separator. Directory values handed
/// to templates go through [`normalize_dir`] instead, see
/// [`DerivedPaths::template_variables`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedPaths {
    pub config_dir: PathBuf,
    pub service_config_path: PathBuf,
    pub conf_d_path: PathBuf,
    pub data_path: PathBuf,
    pub temp_data_path: PathBuf,
    pub format_schema_path: PathBuf,
    pub user_files_path: PathBuf,
    pub log_path: PathBuf,
    pub pid_file_path: PathBuf,
    pub config_file_path: PathBuf,
    pub users_file_path: PathBuf,
    pub zookeeper_config_file_path: Option<PathBuf>,
    pub compression_config_path: PathBuf,
}

impl DerivedPaths {
    pub fn derive(spec: &ServiceSpec) -> Self {
        let name = spec.service_name.as_str();

        let config_dir = clean(&spec.config_dir);
        let service_config_path = config_dir.join(name);
        let conf_d_path = service_config_path.join(CONF_D);

        let data_path = Path::new(DATA_ROOT).join(name);

        Self {
            temp_data_path: data_path.join("tmp"),
            format_schema_path: data_path.join("format_schemas"),
            user_files_path: data_path.join("user_files"),
            log_path: Path::new(LOG_ROOT).join(name),
            pid_file_path: Path::new(RUN_ROOT).join(name).join(PID_FILE),
            config_file_path: service_config_path.join(CONFIG_FILE),
            users_file_path: service_config_path.join(&spec.users_config),
            zookeeper_config_file_path: spec
                .zookeeper_include
                .as_ref()
                .map(|incl| service_config_path.join(format!("{}.xml", incl))),
            compression_config_path: conf_d_path.join(COMPRESSION_FILE),
            data_path,
            conf_d_path,
            service_config_path,
            config_dir,
        }
    }

    /// Directories created by the install pipeline, parents first.
    pub fn directories(&self) -> Vec<&Path> {
        vec![
            self.config_dir.as_path(),
            self.service_config_path.as_path(),
            self.conf_d_path.as_path(),
            self.log_path.as_path(),
            self.data_path.as_path(),
            self.temp_data_path.as_path(),
            self.format_schema_path.as_path(),
            self.user_files_path.as_path(),
        ]
    }

    /// Paths owned exclusively by this instance (excludes the shared
    /// `config_dir` root).
    pub fn owned_paths(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = vec![
            self.service_config_path.as_path(),
            self.conf_d_path.as_path(),
            self.data_path.as_path(),
            self.temp_data_path.as_path(),
            self.format_schema_path.as_path(),
            self.user_files_path.as_path(),
            self.log_path.as_path(),
            self.pid_file_path.as_path(),
            self.config_file_path.as_path(),
            self.users_file_path.as_path(),
            self.compression_config_path.as_path(),
        ];
        if let Some(zk) = &self.zookeeper_config_file_path {
            paths.push(zk.as_path());
        }
        paths
    }

    /// Path-valued template variables.
    ///
    /// Directories end with exactly one `/`; file paths are emitted as-is.
    pub fn template_variables(&self) -> Map<String, Value> {
        let mut vars = Map::new();

        let dirs: [(&str, &Path); 7] = [
            ("service_config_path", self.service_config_path.as_path()),
            ("conf_d_path", self.conf_d_path.as_path()),
            ("log_path", self.log_path.as_path()),
            ("data_path", self.data_path.as_path()),
            ("temp_data_path", self.temp_data_path.as_path()),
            ("format_schema_path", self.format_schema_path.as_path()),
            ("user_files_path", self.user_files_path.as_path()),
        ];
        for (key, dir) in dirs {
            vars.insert(key.to_string(), Value::String(normalize_dir(dir)));
        }

        vars.insert("config_file_path".to_string(), path_value(&self.config_file_path));
        vars.insert("users_file_path".to_string(), path_value(&self.users_file_path));
        vars.insert("pid_file_path".to_string(), path_value(&self.pid_file_path));
        if let Some(zk) = &self.zookeeper_config_file_path {
            vars.insert("zookeeper_config_file_path".to_string(), path_value(zk));
        }

        vars
    }
}

/// Render a directory for template use with exactly one trailing `/`.
///
/// Idempotent: `normalize_dir("/a/")`, `normalize_dir("/a//")` and
/// `normalize_dir("/a")` all yield `"/a/"`.
pub fn normalize_dir(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let trimmed = raw.trim_end_matches('/');
    format!("{}/", trimmed)
}

/// Drop trailing and repeated separators so existence checks compare equal.
fn clean(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}
