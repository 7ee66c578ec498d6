//! Request extractors for credentials.

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use homeman_core::{Error, Principal};

use crate::error::ApiError;
use crate::state::AppState;

/// The raw credential from an `Authorization: Bearer <token>` header.
///
/// A missing header, another scheme, or an empty token is `Unauthorized`.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError(Error::Unauthorized))?;
        let (scheme, token) = value
            .split_once(' ')
            .ok_or(ApiError(Error::Unauthorized))?;
        let token = token.trim();
        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return Err(ApiError(Error::Unauthorized));
        }
        Ok(Self(token.to_string()))
    }
}

/// The verified principal, for identity-only endpoints.
#[derive(Debug, Clone, Copy)]
pub struct CurrentPrincipal(pub Principal);

impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let principal = state.gate.authorize(&token, None).await?;
        Ok(Self(principal))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(value: Option<&str>) -> Result<BearerToken, ApiError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        BearerToken::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_bearer_extracted() {
        assert_eq!(extract(Some("Bearer abc.def")).await.unwrap().0, "abc.def");
        assert_eq!(extract(Some("bearer  abc ")).await.unwrap().0, "abc");
    }

    #[tokio::test]
    async fn test_missing_or_wrong_scheme() {
        for value in [None, Some("Basic abc"), Some("Bearer"), Some("Bearer   ")] {
            let err = extract(value).await.unwrap_err();
            assert!(matches!(err.0, Error::Unauthorized), "{value:?}");
        }
    }
}
