//! HomeManager Auth: credentials and ownership.
//!
//! # Modules
//!
//! - [`token`]: [`TokenService`] issues and verifies bearer tokens
//! - [`ownership`]: [`OwnershipResolver`] walks the ownership chain
//! - [`gate`]: [`AccessGate`], the single per-request decision point
//! - [`password`]: Argon2 password hashing

#![doc = include_str!("../README.md")]

pub mod gate;
pub mod ownership;
pub mod password;
pub mod token;

pub use gate::AccessGate;
pub use ownership::{MAX_HOPS, OwnershipResolver};
pub use password::{hash_password, verify_password};
pub use token::{AccessToken, MAX_TOKEN_TTL_DAYS, TokenService, TokenSettings};
