//! Route handlers, one module per resource.

pub mod devices;
pub mod health;
pub mod login;
pub mod sensors;
pub mod users;
pub mod utils;

use homeman_core::Error;
use serde::Serialize;

use crate::error::ApiResult;

/// Body returned by delete endpoints.
#[derive(Debug, Serialize)]
pub struct Deleted {
    /// Always true.
    pub ok: bool,
}

impl Deleted {
    pub(crate) fn ok() -> Self {
        Self { ok: true }
    }
}

/// Runs CPU-bound work (password hashing) off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::backend(format!("blocking task failed: {e}")).into())
}
