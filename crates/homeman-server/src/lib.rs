//! HomeManager server: command line, configuration and process lifecycle.
//!
//! # Modules
//!
//! - [`cli`]: clap argument definitions
//! - [`config`]: [`HomemanConfig`] loading and validation
//! - [`app`]: logging setup and command dispatch

#![doc = include_str!("../README.md")]

pub mod app;
pub mod cli;
pub mod config;
mod config_handlers;

pub use app::{init_logging, run};
pub use cli::{CliArgs, Command};
pub use config::HomemanConfig;
