//! In-memory host collaborators for pipeline tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{json, Value};

use clickhouse_converge::attributes::{AttributeResolver, ServiceSpec, ServiceSpecInput};
use clickhouse_converge::config::{OsFamily, SupervisorKind};
use clickhouse_converge::error::{
    CollaboratorErrorKind, ConvergeError, ConvergeResult,
};
use clickhouse_converge::host::{
    ConfigVerifier, FileAttrs, FileSystem, Host, PackageManager, ServiceState, ServiceStatus,
    ServiceSupervisor, UnitSpec,
};
use clickhouse_converge::templates::TemplateEngine;

/// Filesystem kept in maps. Directory ownership is tracked per path.
#[derive(Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<PathBuf, (String, FileAttrs)>>,
    dirs: Mutex<BTreeMap<PathBuf, (String, String)>>,
    writes: Mutex<Vec<PathBuf>>,
}

impl MemoryFs {
    pub fn seed(&self, path: &str, content: &str) {
        let attrs = FileAttrs {
            owner: "root".to_string(),
            group: "root".to_string(),
            mode: 0o644,
        };
        self.files
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), (content.to_string(), attrs));
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(Path::new(path))
            .map(|(content, _)| content.clone())
    }

    pub fn attrs(&self, path: &str) -> Option<FileAttrs> {
        self.files
            .lock()
            .unwrap()
            .get(Path::new(path))
            .map(|(_, attrs)| attrs.clone())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(Path::new(path))
    }

    pub fn paths(&self) -> BTreeSet<PathBuf> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.dirs.lock().unwrap().contains_key(Path::new(path))
    }

    /// Every path passed to `write_file`, staged candidates included.
    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.lock().unwrap().clone()
    }
}

impl FileSystem for MemoryFs {
    fn mkdir_all(&self, path: &Path, owner: &str, group: &str) -> ConvergeResult<bool> {
        let mut dirs = self.dirs.lock().unwrap();
        let wanted = (owner.to_string(), group.to_string());
        if dirs.get(path) == Some(&wanted) {
            return Ok(false);
        }
        dirs.insert(path.to_path_buf(), wanted);
        Ok(true)
    }

    fn read_file(&self, path: &Path) -> ConvergeResult<Option<String>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(path)
            .map(|(content, _)| content.clone()))
    }

    fn write_file(&self, path: &Path, content: &str, attrs: &FileAttrs) -> ConvergeResult<()> {
        self.writes.lock().unwrap().push(path.to_path_buf());
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), (content.to_string(), attrs.clone()));
        Ok(())
    }

    fn set_attrs(&self, path: &Path, attrs: &FileAttrs) -> ConvergeResult<bool> {
        let mut files = self.files.lock().unwrap();
        let entry = files.get_mut(path).ok_or_else(|| missing(path))?;
        if &entry.1 == attrs {
            return Ok(false);
        }
        entry.1 = attrs.clone();
        Ok(true)
    }

    fn rename(&self, from: &Path, to: &Path) -> ConvergeResult<()> {
        let mut files = self.files.lock().unwrap();
        let entry = files.remove(from).ok_or_else(|| missing(from))?;
        files.insert(to.to_path_buf(), entry);
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> ConvergeResult<bool> {
        Ok(self.files.lock().unwrap().remove(path).is_some())
    }
}

fn missing(path: &Path) -> ConvergeError {
    ConvergeError::Collaborator {
        kind: CollaboratorErrorKind::Filesystem {
            path: path.to_path_buf(),
            message: "no such file".to_string(),
        },
    }
}

/// Package manager remembering installed versions.
pub struct FakePackages {
    family: OsFamily,
    installed: Mutex<HashMap<String, String>>,
    installs: Mutex<Vec<(String, String)>>,
}

impl FakePackages {
    pub fn new(family: OsFamily) -> Self {
        Self {
            family,
            installed: Mutex::new(HashMap::new()),
            installs: Mutex::new(Vec::new()),
        }
    }

    pub fn installs(&self) -> Vec<(String, String)> {
        self.installs.lock().unwrap().clone()
    }
}

impl PackageManager for FakePackages {
    fn family(&self) -> OsFamily {
        self.family
    }

    fn ensure_installed(&self, name: &str, version: &str) -> ConvergeResult<bool> {
        let mut installed = self.installed.lock().unwrap();
        if installed.get(name).map(String::as_str) == Some(version) {
            return Ok(false);
        }
        installed.insert(name.to_string(), version.to_string());
        self.installs
            .lock()
            .unwrap()
            .push((name.to_string(), version.to_string()));
        Ok(true)
    }
}

/// Supervisor tracking one state per unit and the calls made.
pub struct FakeSupervisor {
    kind: SupervisorKind,
    units: Mutex<HashMap<String, UnitSpec>>,
    states: Mutex<HashMap<String, ServiceStatus>>,
    calls: Mutex<Vec<String>>,
}

impl FakeSupervisor {
    pub fn new(kind: SupervisorKind) -> Self {
        Self {
            kind,
            units: Mutex::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unit(&self, name: &str) -> Option<UnitSpec> {
        self.units.lock().unwrap().get(name).cloned()
    }

    pub fn state(&self, name: &str) -> ServiceStatus {
        self.current(name)
    }

    pub fn set_status(&self, name: &str, status: ServiceStatus) {
        self.states.lock().unwrap().insert(name.to_string(), status);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn current(&self, name: &str) -> ServiceStatus {
        self.states
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(ServiceStatus {
                enabled: false,
                running: false,
            })
    }

    fn call(&self, what: &str, name: &str) {
        self.calls.lock().unwrap().push(format!("{} {}", what, name));
    }
}

impl ServiceSupervisor for FakeSupervisor {
    fn kind(&self) -> SupervisorKind {
        self.kind
    }

    fn define_unit(&self, name: &str, unit: &UnitSpec) -> ConvergeResult<bool> {
        let mut units = self.units.lock().unwrap();
        if units.get(name) == Some(unit) {
            return Ok(false);
        }
        units.insert(name.to_string(), unit.clone());
        self.call("define", name);
        Ok(true)
    }

    fn set_state(&self, name: &str, desired: ServiceState) -> ConvergeResult<bool> {
        let current = self.current(name);
        let mut changed = false;
        if current.enabled != desired.enabled {
            self.call(if desired.enabled { "enable" } else { "disable" }, name);
            changed = true;
        }
        if current.running != desired.running {
            self.call(if desired.running { "start" } else { "stop" }, name);
            changed = true;
        }
        self.set_status(
            name,
            ServiceStatus {
                enabled: desired.enabled,
                running: desired.running,
            },
        );
        Ok(changed)
    }

    fn stop(&self, name: &str) -> ConvergeResult<bool> {
        let current = self.current(name);
        if !current.running {
            return Ok(false);
        }
        self.call("stop", name);
        self.set_status(name, ServiceStatus { running: false, ..current });
        Ok(true)
    }

    fn disable(&self, name: &str) -> ConvergeResult<bool> {
        let current = self.current(name);
        if !current.enabled {
            return Ok(false);
        }
        self.call("disable", name);
        self.set_status(name, ServiceStatus { enabled: false, ..current });
        Ok(true)
    }

    fn status(&self, name: &str) -> ConvergeResult<ServiceStatus> {
        Ok(self.current(name))
    }

    fn restart(&self, name: &str) -> ConvergeResult<()> {
        self.call("restart", name);
        let current = self.current(name);
        self.set_status(name, ServiceStatus { running: true, ..current });
        Ok(())
    }
}

/// Verifier that accepts everything until told to reject.
#[derive(Default)]
pub struct FakeVerifier {
    reject: Mutex<Option<String>>,
    candidates: Mutex<Vec<PathBuf>>,
}

impl FakeVerifier {
    pub fn reject_with(&self, message: &str) {
        *self.reject.lock().unwrap() = Some(message.to_string());
    }

    pub fn candidates(&self) -> Vec<PathBuf> {
        self.candidates.lock().unwrap().clone()
    }
}

impl ConfigVerifier for FakeVerifier {
    fn verify(&self, _generic_bin: &Path, candidate: &Path) -> ConvergeResult<()> {
        self.candidates.lock().unwrap().push(candidate.to_path_buf());
        match self.reject.lock().unwrap().as_ref() {
            Some(message) => Err(ConvergeError::Configuration {
                message: format!("{} rejected: {}", candidate.display(), message),
            }),
            None => Ok(()),
        }
    }
}

/// A full set of in-memory collaborators.
pub struct TestHost {
    pub fs: MemoryFs,
    pub packages: FakePackages,
    pub supervisor: FakeSupervisor,
    pub verifier: FakeVerifier,
    pub templates: TemplateEngine,
}

impl TestHost {
    pub fn new(family: OsFamily, kind: SupervisorKind) -> Self {
        Self {
            fs: MemoryFs::default(),
            packages: FakePackages::new(family),
            supervisor: FakeSupervisor::new(kind),
            verifier: FakeVerifier::default(),
            templates: TemplateEngine::builtin().expect("builtin templates"),
        }
    }

    pub fn systemd() -> Self {
        Self::new(OsFamily::Debian, SupervisorKind::Systemd)
    }

    pub fn host(&self) -> Host<'_> {
        Host {
            packages: &self.packages,
            supervisor: &self.supervisor,
            fs: &self.fs,
            verifier: &self.verifier,
            templates: &self.templates,
        }
    }
}

/// Environment defaults as a site would ship them.
pub fn environment() -> Value {
    json!({
        "clickhouse": {
            "server": {
                "version": "22.3.2.2",
                "package_release": "",
                "config": {
                    "users_config": "users.xml",
                    "zookeeper": {"incl": "zookeeper-servers"},
                    "http_port": 8123,
                    "tcp_port": 9000
                },
                "users": {
                    "default": {"password": "", "profile": "default"}
                }
            }
        }
    })
}

pub fn input(name: &str) -> ServiceSpecInput {
    ServiceSpecInput {
        service_name: Some(name.to_string()),
        zookeeper_nodes: Some(vec![
            json!({"index": 2, "host": "zk2", "port": 2181}),
            json!({"index": 1, "host": "zk1", "port": 2181}),
        ]),
        ..Default::default()
    }
}

pub fn resolve(input: ServiceSpecInput) -> ServiceSpec {
    AttributeResolver::new(&environment())
        .resolve(input)
        .expect("attributes resolve")
}
