//! Error types for the convergence engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::resources::Step;

/// Main error type for convergence runs.
#[derive(Error, Debug)]
pub enum ConvergeError {
    /// Missing or invalid attributes, or a rendered config rejected by verification.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Malformed structured input.
    #[error("Validation error: {kind}")]
    Validation { kind: ValidationErrorKind },

    /// An external collaborator reported failure.
    #[error("Collaborator error: {kind}")]
    Collaborator { kind: CollaboratorErrorKind },

    /// Template loading or rendering errors.
    #[error("Template error: {message}")]
    Template { message: String },

    /// A pipeline step failed; wraps the first error encountered.
    #[error("Step '{step}' failed: {source}")]
    Step {
        step: Step,
        #[source]
        source: Box<ConvergeError>,
    },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Validation error kinds.
///
/// `entry` fields carry the offending element verbatim (as JSON) so the
/// operator can find it in their source attributes.
#[derive(Error, Debug)]
pub enum ValidationErrorKind {
    #[error("`nodes` attribute can't be empty")]
    EmptyEndpoints,

    #[error("{entry} must be a record with `host` and `port` keys")]
    EndpointNotRecord { entry: String },

    #[error("{entry} missing key :host")]
    MissingHost { entry: String },

    #[error("{entry} missing key :port")]
    MissingPort { entry: String },

    #[error("{entry} key :port must be Integer")]
    PortNotInteger { entry: String },

    #[error("{entry} key :port must be between 1 and 65535")]
    PortOutOfRange { entry: String },

    #[error("{entry} key :index must be Integer")]
    IndexNotInteger { entry: String },

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },
}

/// Collaborator error kinds.
#[derive(Error, Debug)]
pub enum CollaboratorErrorKind {
    #[error("package manager: {message}")]
    PackageManager { message: String },

    #[error("service supervisor: {message}")]
    Supervisor { message: String },

    #[error("filesystem operation on {path}: {message}")]
    Filesystem { path: PathBuf, message: String },

    #[error("subprocess failed: {message}")]
    ExecutionFailed { message: String },

    #[error("subprocess timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

impl ConvergeError {
    /// Configuration error for an attribute that could not be resolved.
    pub fn missing_attribute(field: &str) -> Self {
        Self::Configuration {
            message: format!("required attribute `{}` is missing", field),
        }
    }

    /// Configuration error for an attribute with an unusable value.
    pub fn invalid_attribute(field: &str, reason: impl std::fmt::Display) -> Self {
        Self::Configuration {
            message: format!("attribute `{}` is invalid: {}", field, reason),
        }
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Collaborator {
            kind: CollaboratorErrorKind::Filesystem {
                path: path.into(),
                message: err.to_string(),
            },
        }
    }

    /// Attach the failing pipeline step. Already-wrapped errors keep the
    /// innermost step.
    pub fn in_step(self, step: Step) -> Self {
        match self {
            wrapped @ Self::Step { .. } => wrapped,
            other => Self::Step {
                step,
                source: Box::new(other),
            },
        }
    }

    /// The step this error was raised in, if any.
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// The underlying error with step context stripped.
    pub fn root_cause(&self) -> &ConvergeError {
        match self {
            Self::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::Configuration { .. } | Self::Template { .. }
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.root_cause(), Self::Validation { .. })
    }

    pub fn is_collaborator(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::Collaborator { .. } | Self::Io(_)
        )
    }

    /// Short machine-readable code used in the audit journal.
    pub fn code(&self) -> &'static str {
        match self.root_cause() {
            Self::Configuration { .. } | Self::Template { .. } => "CONFIGURATION_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Collaborator { .. } | Self::Io(_) => "COLLABORATOR_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Step { .. } => "STEP_ERROR",
        }
    }
}

/// Result type alias for convergence operations.
pub type ConvergeResult<T> = Result<T, ConvergeError>;
