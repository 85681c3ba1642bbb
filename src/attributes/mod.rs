//! Attribute resolution.
//!
//! Turns a partially-specified service description plus an environment
//! defaults tree into a fully-populated [`ServiceSpec`].

mod resolver;
mod spec;
pub mod value;

pub use resolver::AttributeResolver;
pub use spec::{ServiceSpec, ServiceSpecInput, TemplateSource, BUILTIN_ORIGIN};
pub use value::{lookup, lookup_str, LookupError};
