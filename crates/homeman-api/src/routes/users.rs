//! User accounts.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use homeman_auth::hash_password;
use homeman_core::Error;
use homeman_storage::{NewUser, Page, Pagination, User, UserUpdate};
use serde::Deserialize;

use super::blocking;
use crate::error::ApiResult;
use crate::extract::CurrentPrincipal;
use crate::state::AppState;

/// Self-registration body.
#[derive(Debug, Deserialize)]
pub struct UserRegister {
    /// Login email.
    pub email: String,
    /// Plain-text password.
    pub password: String,
    /// Display name.
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Admin user-creation body.
#[derive(Debug, Deserialize)]
pub struct UserCreate {
    /// Login email.
    pub email: String,
    /// Plain-text password.
    pub password: String,
    /// Display name.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Privilege flag.
    #[serde(default)]
    pub is_superuser: bool,
}

/// Partial update of the caller's own account.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserUpdateMe {
    /// New email.
    pub email: Option<String>,
    /// New display name.
    pub full_name: Option<String>,
    /// New password.
    pub password: Option<String>,
    /// New privilege flag; only privileged callers may set it.
    pub is_superuser: Option<bool>,
}

/// User routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/signup", post(register_user))
        .route("/users/me", get(read_user_me).patch(update_user_me))
}

async fn new_user(
    email: String,
    password: String,
    full_name: Option<String>,
    is_superuser: bool,
) -> ApiResult<NewUser> {
    let hashed_password = blocking(move || hash_password(&password)).await??;
    Ok(NewUser {
        email,
        full_name,
        is_superuser,
        hashed_password,
    })
}

async fn list_users(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Page<User>>> {
    principal.require_privileged()?;
    Ok(Json(state.store.list_users(page).await?))
}

async fn create_user(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(body): Json<UserCreate>,
) -> ApiResult<(StatusCode, Json<User>)> {
    principal.require_privileged()?;
    let new = new_user(body.email, body.password, body.full_name, body.is_superuser).await?;
    let user = state.store.create_user(new).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn register_user(
    State(state): State<AppState>,
    Json(body): Json<UserRegister>,
) -> ApiResult<(StatusCode, Json<User>)> {
    if state.store.get_user_by_email(&body.email).await?.is_some() {
        return Err(
            Error::conflict("The user with this email already exists in the system").into(),
        );
    }
    let new = new_user(body.email, body.password, body.full_name, false).await?;
    let user = state.store.create_user(new).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn read_user_me(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> ApiResult<Json<User>> {
    let user = state
        .store
        .get_user(principal.subject_id)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))?;
    Ok(Json(user))
}

async fn update_user_me(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(body): Json<UserUpdateMe>,
) -> ApiResult<Json<User>> {
    if body.is_superuser == Some(true) && !principal.is_privileged {
        return Err(Error::forbidden("You should be superuser to change is_superuser.").into());
    }
    let hashed_password = match body.password {
        Some(password) => Some(blocking(move || hash_password(&password)).await??),
        None => None,
    };
    let update = UserUpdate {
        email: body.email,
        full_name: body.full_name,
        is_superuser: body.is_superuser,
        hashed_password,
    };
    Ok(Json(state.store.update_user(principal.subject_id, update).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::testing::TestApp;

    #[tokio::test]
    async fn test_signup_then_duplicate() {
        let app = TestApp::new().await;
        let body = json!({"email": "new@example.com", "password": "pw", "full_name": "New"});

        let (status, user) = app.post("/api/v1/users/signup", None, body.clone()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["email"], "new@example.com");
        assert_eq!(user["is_superuser"], false);
        assert!(user.get("hashed_password").is_none());

        let (status, err) = app.post("/api/v1/users/signup", None, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            err["detail"],
            "The user with this email already exists in the system"
        );
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        let app = TestApp::new().await;
        let (status, body) = app.get("/api/v1/users/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Could not validate credentials");
    }

    #[tokio::test]
    async fn test_cannot_promote_self() {
        let app = TestApp::new().await;
        let (_, token) = app.user("a@example.com", false).await;

        let (status, body) = app
            .patch("/api/v1/users/me", Some(&token), json!({"is_superuser": true}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "You should be superuser to change is_superuser.");

        let (status, body) = app
            .patch("/api/v1/users/me", Some(&token), json!({"full_name": "Ada"}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["full_name"], "Ada");
    }

    #[tokio::test]
    async fn test_user_admin_is_privileged_only() {
        let app = TestApp::new().await;
        let (_, plain) = app.user("a@example.com", false).await;
        let (_, admin) = app.user("root@example.com", true).await;

        let (status, body) = app.get("/api/v1/users", Some(&plain)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "You don't have enough privileges");

        let (status, body) = app
            .post(
                "/api/v1/users",
                Some(&admin),
                json!({"email": "b@example.com", "password": "pw"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["email"], "b@example.com");

        let (status, body) = app.get("/api/v1/users?limit=2", Some(&admin)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }
}
