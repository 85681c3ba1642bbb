//! ClickHouse Converge Library
//!
//! Declarative convergence engine that installs, configures and supervises
//! ClickHouse server instances on a host. Runs are idempotent: re-applying
//! the same attributes changes nothing.

pub mod attributes;
pub mod audit;
pub mod config;
pub mod error;
pub mod executor;
pub mod host;
pub mod paths;
pub mod resources;
pub mod templates;
pub mod validation;
