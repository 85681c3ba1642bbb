//! Compression settings snippet under `conf.d`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::attributes::ServiceSpec;
use crate::error::{ConvergeError, ConvergeResult};
use crate::host::{FileAttrs, Host};
use crate::validation::{validate_absolute_path, validate_service_name};

use super::files::converge_file;
use super::report::{Action, ConvergenceReport, Step};
use super::traits::Convergence;

const SNIPPET_FILE: &str = "compression.xml";
const SNIPPET_MODE: u32 = 0o640;

/// Operator input for the compression snippet.
///
/// `config` is the complete XML document written verbatim. The other
/// fields default to the service instance's values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressionInput {
    pub config: String,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub config_dir: Option<PathBuf>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

/// `<config_dir>/<service>/conf.d/compression.xml`.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    service_name: String,
    path: PathBuf,
    content: String,
    attrs: FileAttrs,
}

impl CompressionConfig {
    pub fn from_input(input: &CompressionInput, spec: &ServiceSpec) -> ConvergeResult<Self> {
        let service_name = input
            .service_name
            .clone()
            .unwrap_or_else(|| spec.service_name.clone());
        validate_service_name(&service_name)?;

        let config_dir = input
            .config_dir
            .clone()
            .unwrap_or_else(|| spec.config_dir.clone());
        validate_absolute_path("compression.config_dir", &config_dir)?;

        if input.config.trim().is_empty() {
            return Err(ConvergeError::missing_attribute("compression.config"));
        }
        let mut content = input.config.clone();
        if !content.ends_with('\n') {
            content.push('\n');
        }

        Ok(Self {
            path: config_dir
                .join(&service_name)
                .join("conf.d")
                .join(SNIPPET_FILE),
            service_name,
            content,
            attrs: FileAttrs {
                owner: input.user.clone().unwrap_or_else(|| spec.user.clone()),
                group: input.group.clone().unwrap_or_else(|| spec.group.clone()),
                mode: SNIPPET_MODE,
            },
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Convergence for CompressionConfig {
    fn name(&self) -> &str {
        &self.service_name
    }

    fn install(&self, host: &Host<'_>) -> ConvergeResult<ConvergenceReport> {
        let mut report = ConvergenceReport::new(self.name(), Action::Install);
        let changed = converge_file(host, &self.path, &self.content, &self.attrs, None)
            .map_err(|e| e.in_step(Step::Compression))?;
        if changed {
            info!(
                service = %self.service_name,
                path = %self.path.display(),
                "Compression config converged"
            );
        }
        report.record_detail(Step::Compression, changed, self.path.display().to_string());
        Ok(report)
    }

    fn delete(&self, host: &Host<'_>) -> ConvergeResult<ConvergenceReport> {
        let mut report = ConvergenceReport::new(self.name(), Action::Delete);
        let changed = host
            .fs
            .delete_file(&self.path)
            .map_err(|e| e.in_step(Step::DeleteConfig))?;
        report.record_detail(Step::DeleteConfig, changed, self.path.display().to_string());
        Ok(report)
    }
}
