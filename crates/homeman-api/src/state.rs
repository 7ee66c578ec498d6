//! Shared handler state.

use std::sync::Arc;

use homeman_auth::{AccessGate, OwnershipResolver, TokenService};
use homeman_bootstrap::DependencyBootstrapper;
use homeman_redis::TaskQueue;
use homeman_storage::Store;

/// Everything a handler can reach. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Per-request authorization.
    pub gate: AccessGate,
    /// Persistence.
    pub store: Arc<dyn Store>,
    /// Background task hand-off.
    pub tasks: Arc<dyn TaskQueue>,
    /// Owner of the external dependencies, for readiness.
    pub bootstrap: Arc<DependencyBootstrapper>,
}

impl AppState {
    /// Wires the gate to `store` and bundles the collaborators.
    pub fn new(
        tokens: Arc<TokenService>,
        store: Arc<dyn Store>,
        tasks: Arc<dyn TaskQueue>,
        bootstrap: Arc<DependencyBootstrapper>,
    ) -> Self {
        let gate = AccessGate::new(tokens, OwnershipResolver::new(Arc::clone(&store)));
        Self {
            gate,
            store,
            tasks,
            bootstrap,
        }
    }

    /// The token service behind the gate.
    pub fn tokens(&self) -> &TokenService {
        self.gate.tokens()
    }
}
