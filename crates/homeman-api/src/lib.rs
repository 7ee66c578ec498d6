//! HomeManager API: the axum router and its handlers.
//!
//! # Example
//!
//! ```rust,ignore
//! let state = AppState::new(tokens, store, tasks, bootstrap);
//! let app = homeman_api::router(state, "/api/v1");
//! axum::serve(listener, app).await?;
//! ```

#![doc = include_str!("../README.md")]

pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod testing;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};
pub use extract::{BearerToken, CurrentPrincipal};
pub use state::AppState;

/// Builds the full application router.
///
/// API routes live under `prefix` (an empty prefix or `/` mounts them at the
/// root); the health checks are always at `/health/*`.
pub fn router(state: AppState, prefix: &str) -> Router {
    let api = Router::new()
        .merge(routes::login::routes())
        .merge(routes::users::routes())
        .merge(routes::devices::routes())
        .merge(routes::sensors::routes())
        .merge(routes::utils::routes());

    let prefix = prefix.trim_matches('/');
    let app = if prefix.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(&format!("/{prefix}"), api)
    };

    app.merge(routes::health::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
