//! Filesystem layout of a service instance.
//!
//! Every path is recomputed from the resolved spec; nothing is stored.

mod derive;

pub use derive::{normalize_dir, DerivedPaths};
