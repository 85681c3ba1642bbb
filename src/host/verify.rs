//! Config verification through the server binary.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ConvergeError, ConvergeResult};
use crate::executor::SubprocessBuilder;

use super::traits::ConfigVerifier;

/// Runs `<generic_bin> extract-from-config --config-file=<candidate> --key=path`.
///
/// A non-zero exit or anything on stderr rejects the candidate with a
/// configuration error. Spawn failures and timeouts stay collaborator errors.
pub struct CommandVerifier {
    timeout: Duration,
}

impl CommandVerifier {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ConfigVerifier for CommandVerifier {
    fn verify(&self, generic_bin: &Path, candidate: &Path) -> ConvergeResult<()> {
        let program = generic_bin.to_string_lossy();
        let config_arg = format!("--config-file={}", candidate.display());

        let result = SubprocessBuilder::new(&program)
            .args(["extract-from-config", config_arg.as_str(), "--key=path"])
            .timeout(self.timeout)
            .run()?;

        if !result.success || !result.stderr.trim().is_empty() {
            warn!(
                candidate = %candidate.display(),
                exit_code = ?result.exit_code,
                "Config verification rejected candidate"
            );
            return Err(ConvergeError::Configuration {
                message: format!(
                    "config verification failed for '{}' (exit {:?}): {}",
                    candidate.display(),
                    result.exit_code,
                    result.diagnostics()
                ),
            });
        }

        debug!(candidate = %candidate.display(), "Config verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_binary(dir: &TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("clickhouse");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_accepts_clean_exit() {
        let dir = TempDir::new().unwrap();
        let bin = fake_binary(&dir, "echo /var/lib/ch/");
        let verifier = CommandVerifier::new(Duration::from_secs(5));
        assert!(verifier.verify(&bin, Path::new("/tmp/config.xml")).is_ok());
    }

    #[test]
    fn test_passes_candidate_path() {
        let dir = TempDir::new().unwrap();
        let bin = fake_binary(
            &dir,
            "[ \"$1\" = extract-from-config ] && [ \"$2\" = --config-file=/tmp/c.xml ] \
             && [ \"$3\" = --key=path ] || exit 1",
        );
        let verifier = CommandVerifier::new(Duration::from_secs(5));
        assert!(verifier.verify(&bin, Path::new("/tmp/c.xml")).is_ok());
    }

    #[test]
    fn test_rejects_non_zero_exit() {
        let dir = TempDir::new().unwrap();
        let bin = fake_binary(&dir, "exit 36");
        let err = CommandVerifier::new(Duration::from_secs(5))
            .verify(&bin, Path::new("/tmp/config.xml"))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejects_stderr_output() {
        let dir = TempDir::new().unwrap();
        let bin = fake_binary(&dir, "echo 'Unknown element <bogus>' >&2");
        let err = CommandVerifier::new(Duration::from_secs(5))
            .verify(&bin, Path::new("/tmp/config.xml"))
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_missing_binary_is_collaborator_error() {
        let err = CommandVerifier::new(Duration::from_secs(5))
            .verify(Path::new("/nonexistent/clickhouse"), Path::new("/tmp/config.xml"))
            .unwrap_err();
        assert!(err.is_collaborator());
    }
}
