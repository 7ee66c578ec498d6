//! Per-dependency connection state machine.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use homeman_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::timer::Timer;

/// How to open, check, and release one external dependency.
///
/// `connect` must both establish and validate the connection (for example
/// open a pool and run a trivial query) so that a returned handle is known
/// to have worked at least once.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Live connection handle shared with request handlers.
    type Handle: Send + Sync + 'static;

    /// Name used in logs and readiness reports.
    fn name(&self) -> &str;

    /// Opens and validates a connection.
    async fn connect(&self) -> Result<Self::Handle>;

    /// Cheap liveness round-trip against an open handle.
    async fn ping(&self, handle: &Self::Handle) -> Result<()>;

    /// Releases the handle.
    async fn close(&self, handle: &Self::Handle);
}

/// Lifecycle state of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyState {
    /// Not started, or shut down.
    Disconnected,
    /// Bootstrap in progress.
    Connecting,
    /// A validated handle is available.
    Connected,
    /// Every attempt failed; the dependency stays unavailable.
    Degraded,
}

impl fmt::Display for DependencyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
        };
        f.write_str(s)
    }
}

enum Slot<H> {
    Disconnected,
    Connecting,
    Connected(Arc<H>),
    Degraded,
}

impl<H> Slot<H> {
    fn state(&self) -> DependencyState {
        match self {
            Self::Disconnected => DependencyState::Disconnected,
            Self::Connecting => DependencyState::Connecting,
            Self::Connected(_) => DependencyState::Connected,
            Self::Degraded => DependencyState::Degraded,
        }
    }
}

/// Type-erased view of a dependency, as driven by the bootstrapper.
#[async_trait]
pub trait ManagedDependency: Send + Sync {
    /// Name used in logs and readiness reports.
    fn name(&self) -> &str;

    /// Current state.
    async fn state(&self) -> DependencyState;

    /// Runs the connection attempts and returns the resolved state.
    ///
    /// Never fails: exhausting the attempt budget yields
    /// [`DependencyState::Degraded`].
    async fn start(&self, policy: &BackoffPolicy, timer: Arc<dyn Timer>) -> DependencyState;

    /// Liveness check. Only touches the dependency when connected.
    async fn ready(&self) -> Result<()>;

    /// Releases the handle if connected.
    async fn shutdown(&self);
}

/// A single external dependency and its connection state.
pub struct Dependency<C: Connector> {
    connector: C,
    slot: RwLock<Slot<C::Handle>>,
}

impl<C: Connector> Dependency<C> {
    /// Wraps a connector in the `Disconnected` state.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            slot: RwLock::new(Slot::Disconnected),
        }
    }

    /// The live handle, or `ServiceUnavailable` without touching the
    /// dependency when it is not connected.
    pub async fn handle(&self) -> Result<Arc<C::Handle>> {
        match &*self.slot.read().await {
            Slot::Connected(handle) => Ok(Arc::clone(handle)),
            other => Err(Error::unavailable(format!(
                "{} is {}",
                self.connector.name(),
                other.state()
            ))),
        }
    }

    /// Runs up to `max_attempts` connects, sleeping `policy.delay(n)` after
    /// the n-th failure. Nothing is slept after the last attempt.
    async fn connect_with_retries(
        &self,
        policy: &BackoffPolicy,
        timer: &dyn Timer,
    ) -> Result<C::Handle> {
        let name = self.connector.name();
        let max_attempts = policy.max_attempts().max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(dependency = %name, attempt, max_attempts, "connecting");
            match self.connector.connect().await {
                Ok(handle) => return Ok(handle),
                Err(err) if attempt >= max_attempts => return Err(err),
                Err(err) => {
                    let delay = policy.delay(attempt - 1);
                    warn!(
                        dependency = %name,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "connection attempt failed, retrying"
                    );
                    timer.sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl<C: Connector> ManagedDependency for Dependency<C> {
    fn name(&self) -> &str {
        self.connector.name()
    }

    async fn state(&self) -> DependencyState {
        self.slot.read().await.state()
    }

    async fn start(&self, policy: &BackoffPolicy, timer: Arc<dyn Timer>) -> DependencyState {
        let name = self.connector.name();
        {
            let mut slot = self.slot.write().await;
            if !matches!(*slot, Slot::Disconnected) {
                debug!(dependency = %name, state = %slot.state(), "already started");
                return slot.state();
            }
            *slot = Slot::Connecting;
        }

        info!(dependency = %name, "connecting");
        let outcome = self.connect_with_retries(policy, timer.as_ref()).await;

        let mut slot = self.slot.write().await;
        match outcome {
            Ok(handle) => {
                info!(dependency = %name, "connected");
                *slot = Slot::Connected(Arc::new(handle));
            }
            Err(e) => {
                error!(
                    dependency = %name,
                    attempts = policy.max_attempts(),
                    error = %e,
                    "giving up, dependency degraded"
                );
                *slot = Slot::Degraded;
            }
        }
        slot.state()
    }

    async fn ready(&self) -> Result<()> {
        let handle = self.handle().await?;
        self.connector.ping(&handle).await
    }

    async fn shutdown(&self) {
        let previous = {
            let mut slot = self.slot.write().await;
            match *slot {
                Slot::Connected(_) => std::mem::replace(&mut *slot, Slot::Disconnected),
                _ => return,
            }
        };
        if let Slot::Connected(handle) = previous {
            self.connector.close(&handle).await;
            info!(dependency = %self.connector.name(), "connection closed");
        }
    }
}
