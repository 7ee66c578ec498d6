//! HomeManager Core: shared types, errors, and time.
//!
//! This crate provides the foundational types used across all HomeManager
//! crates. It has no internal dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`types`]: Principal and resource addressing
//! - [`clock`]: Injectable wall clock

#![doc = include_str!("../README.md")]

pub mod clock;
pub mod error;
pub mod types;

// Re-export key types at crate root for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use types::{Principal, ResourceKind, ResourceRef};
