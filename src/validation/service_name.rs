//! Service name validation.
//!
//! The service name becomes a directory name under `/etc`, `/var/lib`,
//! `/var/log` and `/var/run`, and the supervisor unit name.

use crate::error::{ConvergeError, ValidationErrorKind};

/// Maximum length of a service name (systemd unit names are capped at 256).
const MAX_SERVICE_NAME_LENGTH: usize = 128;

/// Validate a service name.
///
/// # Rules
///
/// - Must not be empty
/// - Only ASCII alphanumerics, `-`, `_` and `.`
/// - Must start with an alphanumeric character
///
/// # Example
///
/// ```
/// use clickhouse_converge::validation::validate_service_name;
///
/// assert!(validate_service_name("clickhouse-server").is_ok());
/// assert!(validate_service_name("../etc").is_err());
/// ```
pub fn validate_service_name(name: &str) -> Result<(), ConvergeError> {
    if name.is_empty() {
        return Err(invalid("Service name cannot be empty"));
    }

    if name.len() > MAX_SERVICE_NAME_LENGTH {
        return Err(invalid("Service name is too long"));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid(
            "Service name may only contain letters, digits, '-', '_' and '.'",
        ));
    }

    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(invalid("Service name must start with a letter or digit"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConvergeError {
    ConvergeError::Validation {
        kind: ValidationErrorKind::InvalidParameter {
            param: "service_name".to_string(),
            message: message.to_string(),
        },
    }
}
