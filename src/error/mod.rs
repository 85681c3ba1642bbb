//! Error types for the convergence engine.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
