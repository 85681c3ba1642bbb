//! Audit journal for convergence runs.
//!
//! Each install, delete, status or restart run appends one JSON line
//! describing what was requested, what changed and how it ended.
//!
//! ## Features
//!
//! - Structured JSON entries keyed by a per-run id
//! - Redaction of credentials found in user and config attributes
//! - Truncation of large inline config snippets

mod entry;
mod logger;
mod sanitize;

pub use entry::{AuditEntry, AuditResult};
pub use logger::{AuditLogger, NullAuditLogger};
pub use sanitize::run_params;
