//! Audit logger writing entries as JSON lines.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{ConvergeError, ConvergeResult};

use super::entry::AuditEntry;

/// Appends audit entries to a journal file, one JSON object per line.
pub struct AuditLogger {
    file: Mutex<File>,
    path: PathBuf,
}

impl AuditLogger {
    /// Open `path` for appending, creating the parent directory if needed.
    pub fn new(path: &Path) -> ConvergeResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                debug!(path = %parent.display(), "Creating audit log directory");
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConvergeError::filesystem(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ConvergeError::filesystem(path, e))?;

        debug!(path = %path.display(), "Audit logger initialized");

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Append one entry and sync it to disk.
    pub fn log(&self, entry: &AuditEntry) -> ConvergeResult<()> {
        let json = serde_json::to_string(entry)?;

        let mut file = self.file.lock().map_err(|e| {
            ConvergeError::filesystem(&self.path, format!("audit log lock poisoned: {}", e))
        })?;

        writeln!(file, "{}", json).map_err(|e| ConvergeError::filesystem(&self.path, e))?;

        if let Err(e) = file.sync_data() {
            warn!(error = %e, "Failed to sync audit log");
        }

        debug!(
            run_id = %entry.run_id,
            action = %entry.action,
            "Audit entry logged"
        );

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Audit sink used when the journal is disabled.
pub struct NullAuditLogger;

impl NullAuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn log(&self, _entry: &AuditEntry) -> ConvergeResult<()> {
        Ok(())
    }
}

impl Default for NullAuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Action, ConvergenceReport, Step};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn success_entry() -> AuditEntry {
        let mut report = ConvergenceReport::new("clickhouse-server", Action::Install);
        report.record(Step::Config, true);
        AuditEntry::success(
            Uuid::nil(),
            "clickhouse-server",
            "install",
            serde_json::json!({"version": "22.3"}),
            &[report],
            10,
        )
    }

    #[test]
    fn test_logger_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("subdir/audit.log");

        let logger = AuditLogger::new(&log_path).unwrap();
        assert!(log_path.parent().unwrap().exists());
        assert_eq!(logger.path(), log_path);
    }

    #[test]
    fn test_logger_writes_json_lines() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("audit.log");
        let logger = AuditLogger::new(&log_path).unwrap();

        let error = ConvergeError::missing_attribute("version");
        let failure = AuditEntry::failure(
            Uuid::nil(),
            "clickhouse-server",
            "delete",
            serde_json::json!({}),
            &error,
            5,
        );

        logger.log(&success_entry()).unwrap();
        logger.log(&failure).unwrap();

        let content = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["action"], "install");
        assert_eq!(first["result"]["status"], "success");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["action"], "delete");
        assert_eq!(second["result"]["error_code"], "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_logger_appends_to_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("audit.log");

        for _ in 0..2 {
            let logger = AuditLogger::new(&log_path).unwrap();
            logger.log(&success_entry()).unwrap();
        }

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_null_logger() {
        assert!(NullAuditLogger::new().log(&success_entry()).is_ok());
    }
}
