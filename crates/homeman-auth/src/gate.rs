//! Per-request authorization entry point.

use std::sync::Arc;

use homeman_core::{Principal, ResourceRef, Result};

use crate::ownership::OwnershipResolver;
use crate::token::TokenService;

/// Composes token verification and ownership resolution.
///
/// Holds only shared, read-only collaborators, so one gate serves every
/// request concurrently.
#[derive(Clone)]
pub struct AccessGate {
    tokens: Arc<TokenService>,
    ownership: OwnershipResolver,
}

impl AccessGate {
    /// Creates a gate.
    pub fn new(tokens: Arc<TokenService>, ownership: OwnershipResolver) -> Self {
        Self { tokens, ownership }
    }

    /// The token service behind this gate.
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Verifies `raw_token` and, when `required` is given, that the
    /// principal owns it.
    ///
    /// `Unauthorized` comes from verification; `NotFound` and `Forbidden`
    /// from ownership resolution. Nothing is retried.
    pub async fn authorize(
        &self,
        raw_token: &str,
        required: Option<&ResourceRef>,
    ) -> Result<Principal> {
        let principal = self.tokens.verify(raw_token)?;
        if let Some(target) = required {
            self.ownership.authorize_resource(&principal, target).await?;
        }
        Ok(principal)
    }
}
