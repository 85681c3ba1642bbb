//! Path attribute validation.
//!
//! Root directories (`bin_dir`, `config_dir`) feed every derived path, so
//! they must be absolute and free of traversal components.

use std::path::{Component, Path};

use crate::error::{ConvergeError, ValidationErrorKind};

/// Validates a directory attribute used as a root for derived paths.
///
/// # Rules
///
/// - Must not be empty
/// - Must be absolute
/// - Must not contain `..` components
/// - Must not contain newlines or null bytes (they end up in unit files)
pub fn validate_absolute_path(param: &str, path: &Path) -> Result<(), ConvergeError> {
    let path_str = path.to_string_lossy();

    if path_str.is_empty() {
        return Err(invalid(param, "Path cannot be empty"));
    }

    if !path.is_absolute() {
        return Err(invalid(param, "Path must be absolute (start with /)"));
    }

    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(invalid(
            param,
            "Path cannot contain path traversal sequences (..)",
        ));
    }

    if path_str.contains('\n') || path_str.contains('\0') {
        return Err(invalid(param, "Path cannot contain newlines or null bytes"));
    }

    Ok(())
}

/// Validates a bare file name that is joined onto a config directory.
pub fn validate_file_name(param: &str, name: &str) -> Result<(), ConvergeError> {
    if name.trim().is_empty() {
        return Err(invalid(param, "File name cannot be empty"));
    }

    if name.contains('/') || name == "." || name == ".." {
        return Err(invalid(param, "File name cannot contain path separators"));
    }

    if name.contains('\n') || name.contains('\0') {
        return Err(invalid(param, "File name cannot contain newlines or null bytes"));
    }

    Ok(())
}

fn invalid(param: &str, message: &str) -> ConvergeError {
    ConvergeError::Validation {
        kind: ValidationErrorKind::InvalidParameter {
            param: param.to_string(),
            message: message.to_string(),
        },
    }
}
