//! HomeManager Storage: records, the `Store` trait, and its backends.
//!
//! The ownership resolver only ever calls [`Store::get`]; request handlers
//! use the rest of the trait once access has been granted.
//!
//! # Backends
//!
//! - [`MemoryStore`]: process-local maps, for tests and `serve --in-memory`
//! - [`PostgresStore`]: sqlx over a bootstrapped [`PostgresConnector`]

#![doc = include_str!("../README.md")]

pub mod memory;
pub mod postgres;
pub mod store;
pub mod types;

pub use memory::MemoryStore;
pub use postgres::{PostgresConnector, PostgresStore};
pub use store::Store;
pub use types::{
    Device, DeviceType, DeviceUpdate, NewDevice, NewSensor, NewUser, Page, Pagination,
    ReadingQuery, Record, Sensor, SensorReading, SensorType, SensorUpdate, User, UserUpdate,
};
