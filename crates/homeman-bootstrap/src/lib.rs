//! Dependency bootstrap for HomeManager.
//!
//! Brings each external dependency from `Disconnected` to `Connected`, or to
//! `Degraded` once its attempt budget is spent. Degraded dependencies never
//! abort startup and are never retried in the background.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use homeman_bootstrap::{BackoffPolicy, Dependency, DependencyBootstrapper};
//!
//! let db = Arc::new(Dependency::new(PostgresConnector::new(url, 10)));
//! let boot = DependencyBootstrapper::new(BackoffPolicy::default())
//!     .with_dependency(db.clone());
//!
//! let report = boot.start().await;
//! let pool = db.handle().await?; // ServiceUnavailable when degraded
//! ```

#![doc = include_str!("../README.md")]

mod backoff;
mod bootstrapper;
mod dependency;
pub mod mock;
mod timer;

pub use backoff::BackoffPolicy;
pub use bootstrapper::{
    BootstrapReport, DependencyBootstrapper, DependencyStatus, ReadinessCheck, ReadinessReport,
};
pub use dependency::{Connector, Dependency, DependencyState, ManagedDependency};
pub use mock::{MockConnector, RecordingTimer};
pub use timer::{Timer, TokioTimer};
