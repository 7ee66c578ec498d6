//! HomeManager Redis: the broker behind background tasks.
//!
//! [`RedisConnector`] is bootstrapped like any other dependency; the
//! [`TaskQueue`] implementations are what request handlers see.

#![doc = include_str!("../README.md")]

mod connector;
mod queue;

pub use connector::RedisConnector;
pub use queue::{HEALTH_CHECK_TASK, MemoryTaskQueue, RedisTaskQueue, TaskMessage, TaskQueue};
