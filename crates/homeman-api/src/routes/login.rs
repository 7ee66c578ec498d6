//! Password login.

use axum::extract::State;
use axum::routing::post;
use axum::{Form, Json, Router};
use homeman_auth::verify_password;
use homeman_core::{Error, Principal};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::blocking;
use crate::error::ApiResult;
use crate::state::AppState;

/// OAuth2 password-grant form.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    /// The user's email.
    pub username: String,
    /// Plain-text password.
    pub password: String,
}

/// Issued credential.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Encoded bearer token.
    pub access_token: String,
    /// Always `bearer`.
    pub token_type: String,
}

/// Login routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/login/access-token", post(login_access_token))
}

async fn login_access_token(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> ApiResult<Json<TokenResponse>> {
    let not_found = || Error::not_found("User not found");

    let user = state
        .store
        .get_user_by_email(&form.username)
        .await?
        .ok_or_else(not_found)?;

    let hashed = user.hashed_password.clone();
    let matches = blocking(move || verify_password(&form.password, &hashed)).await?;
    if !matches {
        return Err(not_found().into());
    }

    let principal = Principal {
        subject_id: user.id,
        is_privileged: user.is_superuser,
    };
    let token = state.tokens().issue_default(&principal)?;
    info!(user = %user.id, "access token issued");

    Ok(Json(TokenResponse {
        access_token: token.into_string(),
        token_type: "bearer".to_string(),
    }))
}
