//! Per-run record of what each pipeline step changed.

use std::fmt;

use serde::Serialize;

/// Lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Install,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Install => "install",
            Self::Delete => "delete",
        })
    }
}

/// Pipeline steps, in the order the pipelines run them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Package,
    LegacyCleanup,
    Directories,
    Zookeeper,
    Config,
    Users,
    Unit,
    ServiceState,
    Restart,
    Compression,
    Stop,
    Disable,
    DeleteConfig,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::LegacyCleanup => "legacy-cleanup",
            Self::Directories => "directories",
            Self::Zookeeper => "zookeeper",
            Self::Config => "config",
            Self::Users => "users",
            Self::Unit => "unit",
            Self::ServiceState => "service-state",
            Self::Restart => "restart",
            Self::Compression => "compression",
            Self::Stop => "stop",
            Self::Disable => "disable",
            Self::DeleteConfig => "delete-config",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Outcome of a completed pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct ConvergenceReport {
    pub resource: String,
    pub action: Action,
    pub steps: Vec<StepRecord>,
}

impl ConvergenceReport {
    pub fn new(resource: impl Into<String>, action: Action) -> Self {
        Self {
            resource: resource.into(),
            action,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, step: Step, changed: bool) {
        self.steps.push(StepRecord {
            step,
            changed,
            detail: None,
        });
    }

    pub fn record_detail(&mut self, step: Step, changed: bool, detail: impl Into<String>) {
        self.steps.push(StepRecord {
            step,
            changed,
            detail: Some(detail.into()),
        });
    }

    /// Whether any step changed the host.
    pub fn changed(&self) -> bool {
        self.steps.iter().any(|s| s.changed)
    }

    pub fn changed_steps(&self) -> Vec<Step> {
        self.steps.iter().filter(|s| s.changed).map(|s| s.step).collect()
    }

    pub fn step(&self, step: Step) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step == step)
    }
}
