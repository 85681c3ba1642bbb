//! Convergence pipelines.
//!
//! [`ServiceConvergence`] drives the install and delete lifecycle of one
//! ClickHouse server instance. [`ZookeeperConfig`] and [`CompressionConfig`]
//! are independent sub-resources with the same two actions.

mod compression;
mod files;
mod report;
mod server;
mod traits;
mod zookeeper;

pub use compression::{CompressionConfig, CompressionInput};
pub use files::converge_file;
pub use report::{Action, ConvergenceReport, Step, StepRecord};
pub use server::{package_name, ServiceConvergence, LEGACY_FILES};
pub use traits::Convergence;
pub use zookeeper::{SubConfigRequest, ZookeeperConfig};
