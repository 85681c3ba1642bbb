//! Input validation module.
//!
//! Provides validators for coordination-service endpoints, service names and
//! path attributes.

mod endpoints;
mod path;
mod service_name;

pub use endpoints::{validate_endpoints, Endpoint};
pub use path::{validate_absolute_path, validate_file_name};
pub use service_name::validate_service_name;
