//! Coordination-service endpoint include file.

use std::path::PathBuf;

use serde_json::json;
use tracing::info;

use crate::attributes::{ServiceSpec, TemplateSource};
use crate::error::{ConvergeError, ConvergeResult};
use crate::host::{FileAttrs, Host};
use crate::paths::DerivedPaths;
use crate::validation::{validate_endpoints, Endpoint};

use super::files::converge_file;
use super::report::{Action, ConvergenceReport, Step};
use super::traits::Convergence;

const INCLUDE_FILE_MODE: u32 = 0o640;

/// Everything needed to render the include file on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubConfigRequest {
    pub service_name: String,
    /// Per-service config directory the include file lives in.
    pub config_root: PathBuf,
    /// Include name; also the root element of the rendered file.
    pub include_name: String,
    pub nodes: Vec<Endpoint>,
    pub template: TemplateSource,
    pub user: String,
    pub group: String,
}

impl SubConfigRequest {
    pub fn file_path(&self) -> PathBuf {
        self.config_root.join(format!("{}.xml", self.include_name))
    }
}

/// The include file referenced from the main config by `incl`.
pub struct ZookeeperConfig {
    request: SubConfigRequest,
}

impl ZookeeperConfig {
    /// Validate the endpoint list and build the sub-config request.
    pub fn compose(spec: &ServiceSpec) -> ConvergeResult<SubConfigRequest> {
        let include_name = spec.zookeeper_include.clone().ok_or_else(|| {
            ConvergeError::Configuration {
                message: "zookeeper config requested but `zookeeper_enabled` is false".to_string(),
            }
        })?;
        let nodes = validate_endpoints(&spec.zookeeper_nodes)?;

        Ok(SubConfigRequest {
            service_name: spec.service_name.clone(),
            config_root: DerivedPaths::derive(spec).service_config_path,
            include_name,
            nodes,
            template: spec.zookeeper_template.clone(),
            user: spec.user.clone(),
            group: spec.group.clone(),
        })
    }

    pub fn new(request: SubConfigRequest) -> Self {
        Self { request }
    }
}

impl Convergence for ZookeeperConfig {
    fn name(&self) -> &str {
        &self.request.service_name
    }

    fn install(&self, host: &Host<'_>) -> ConvergeResult<ConvergenceReport> {
        let request = &self.request;
        let mut report = ConvergenceReport::new(self.name(), Action::Install);

        let content = host.templates.render(
            &request.template,
            &json!({
                "include_name": request.include_name,
                "nodes": request.nodes,
            }),
        )?;
        let attrs = FileAttrs {
            owner: request.user.clone(),
            group: request.group.clone(),
            mode: INCLUDE_FILE_MODE,
        };

        let path = request.file_path();
        let changed = converge_file(host, &path, &content, &attrs, None)?;
        if changed {
            info!(
                service = %request.service_name,
                path = %path.display(),
                nodes = request.nodes.len(),
                "Zookeeper include converged"
            );
        }
        report.record_detail(Step::Zookeeper, changed, path.display().to_string());
        Ok(report)
    }

    fn delete(&self, host: &Host<'_>) -> ConvergeResult<ConvergenceReport> {
        let mut report = ConvergenceReport::new(self.name(), Action::Delete);
        let path = self.request.file_path();
        let changed = host.fs.delete_file(&path)?;
        report.record_detail(Step::DeleteConfig, changed, path.display().to_string());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttributeResolver, ServiceSpecInput};
    use serde_json::{json, Value};

    fn spec(nodes: Vec<Value>) -> ServiceSpec {
        let env = json!({"clickhouse": {"server": {
            "version": "22.3",
            "config": {"users_config": "users.xml", "zookeeper": {"incl": "zookeeper-servers"}}
        }}});
        AttributeResolver::new(&env)
            .resolve(ServiceSpecInput {
                service_name: Some("ch".to_string()),
                zookeeper_nodes: Some(nodes),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_compose() {
        let request = ZookeeperConfig::compose(&spec(vec![
            json!({"index": 2, "host": "zk2", "port": 2181}),
            json!({"index": 1, "host": "zk1", "port": 2181}),
        ]))
        .unwrap();

        assert_eq!(request.include_name, "zookeeper-servers");
        assert_eq!(request.config_root, PathBuf::from("/etc/clickhouse-server/ch"));
        assert_eq!(
            request.file_path(),
            PathBuf::from("/etc/clickhouse-server/ch/zookeeper-servers.xml")
        );
        assert_eq!(request.nodes[0].host, "zk1");
        assert_eq!(request.template, TemplateSource::builtin("zookeeper.xml.tera"));
    }

    #[test]
    fn test_compose_validates_nodes() {
        let err = ZookeeperConfig::compose(&spec(vec![json!({"host": "zk1", "port": "2181"})]))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("key :port must be Integer"));
    }

    #[test]
    fn test_compose_requires_enabled() {
        let mut disabled = spec(vec![json!({"host": "zk1", "port": 2181})]);
        disabled.zookeeper_enabled = false;
        disabled.zookeeper_include = None;
        assert!(ZookeeperConfig::compose(&disabled).unwrap_err().is_configuration());
    }
}
