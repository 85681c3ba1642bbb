//! Audit entry types.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ConvergeError;
use crate::resources::{ConvergenceReport, Step};

/// A single audit journal entry.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// RFC 3339 timestamp of the end of the run.
    pub timestamp: String,
    pub run_id: Uuid,
    /// Service (or sub-resource) the run targeted.
    pub resource: String,
    /// `install`, `delete`, `status` or `restart`.
    pub action: String,
    /// Sanitized attributes the run was started with.
    pub params: serde_json::Value,
    pub result: AuditResult,
    pub duration_ms: u64,
}

impl AuditEntry {
    /// Entry for a run that completed.
    pub fn success(
        run_id: Uuid,
        resource: &str,
        action: &str,
        params: serde_json::Value,
        reports: &[ConvergenceReport],
        duration_ms: u64,
    ) -> Self {
        let changed_steps = reports
            .iter()
            .flat_map(|r| r.changed_steps())
            .collect();

        Self {
            timestamp: now(),
            run_id,
            resource: resource.to_string(),
            action: action.to_string(),
            params,
            result: AuditResult::Success { changed_steps },
            duration_ms,
        }
    }

    /// Entry for a run that stopped on an error.
    pub fn failure(
        run_id: Uuid,
        resource: &str,
        action: &str,
        params: serde_json::Value,
        error: &ConvergeError,
        duration_ms: u64,
    ) -> Self {
        Self {
            timestamp: now(),
            run_id,
            resource: resource.to_string(),
            action: action.to_string(),
            params,
            result: AuditResult::Failure {
                error_code: error.code().to_string(),
                step: error.step(),
                error_message: error.to_string(),
            },
            duration_ms,
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// How the run ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum AuditResult {
    #[serde(rename = "success")]
    Success {
        /// Steps that changed the host, in execution order.
        changed_steps: Vec<Step>,
    },
    #[serde(rename = "failure")]
    Failure {
        error_code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<Step>,
        error_message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Action;

    #[test]
    fn test_success_lists_changed_steps() {
        let mut report = ConvergenceReport::new("clickhouse-server", Action::Install);
        report.record(Step::Package, false);
        report.record(Step::Config, true);
        report.record(Step::Restart, true);

        let entry = AuditEntry::success(
            Uuid::nil(),
            "clickhouse-server",
            "install",
            serde_json::json!({"version": "22.3"}),
            &[report],
            15,
        );

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["result"]["status"], "success");
        assert_eq!(
            json["result"]["changed_steps"],
            serde_json::json!(["config", "restart"])
        );
        assert_eq!(json["action"], "install");
        assert_eq!(json["duration_ms"], 15);
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_failure_carries_step_and_code() {
        let error = ConvergeError::Configuration {
            message: "config rejected".to_string(),
        }
        .in_step(Step::Config);

        let entry = AuditEntry::failure(
            Uuid::nil(),
            "clickhouse-server",
            "install",
            serde_json::json!({}),
            &error,
            5,
        );

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["result"]["status"], "failure");
        assert_eq!(json["result"]["error_code"], "CONFIGURATION_ERROR");
        assert_eq!(json["result"]["step"], "config");
        assert!(json["result"]["error_message"]
            .as_str()
            .unwrap()
            .contains("config rejected"));
    }

    #[test]
    fn test_failure_without_step() {
        let error = ConvergeError::missing_attribute("version");
        let entry = AuditEntry::failure(Uuid::nil(), "x", "status", serde_json::json!({}), &error, 0);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("\"step\""));
    }
}
