//! Drover core types, traits, configuration, and errors.
//!
//! This crate provides the foundational building blocks shared by the
//! storage, tabular, and cluster crates: the `s3://` path parser,
//! typed cluster/step identifiers and states, the
//! [`ClusterControlPlane`] trait, configuration, and the unified error type.

pub mod config;
pub mod control_plane;
pub mod error;
pub mod location;
pub mod types;

pub use config::{ClusterTemplate, DroverConfig, RetryPolicy, SparkSubmit};
pub use control_plane::ClusterControlPlane;
pub use error::DroverError;
pub use location::{parse_path, Location, SCHEME};
pub use types::*;

/// Convenience Result type using [`DroverError`].
pub type Result<T> = std::result::Result<T, DroverError>;
