//! Process-wide dependency bootstrap.
//!
//! Dependencies are independent, so they are started concurrently; each one
//! runs its own attempts strictly in sequence. The order in which they reach
//! `Connected` is remembered and shutdown walks it backwards.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::backoff::BackoffPolicy;
use crate::dependency::{DependencyState, ManagedDependency};
use crate::timer::{Timer, TokioTimer};

/// State of one dependency after bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyStatus {
    /// Dependency name.
    pub name: String,
    /// Resolved state.
    pub state: DependencyState,
}

/// Outcome of [`DependencyBootstrapper::start`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// One entry per registered dependency, in registration order.
    pub dependencies: Vec<DependencyStatus>,
}

impl BootstrapReport {
    /// True when every dependency connected.
    pub fn all_connected(&self) -> bool {
        self.dependencies
            .iter()
            .all(|d| d.state == DependencyState::Connected)
    }

    /// Names of dependencies that ended up degraded.
    pub fn degraded(&self) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|d| d.state == DependencyState::Degraded)
            .map(|d| d.name.as_str())
            .collect()
    }
}

/// Readiness of one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessCheck {
    /// Dependency name.
    pub name: String,
    /// State when checked.
    pub state: DependencyState,
    /// Whether the check succeeded.
    pub ready: bool,
    /// Check failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Readiness of the whole process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    /// One check per registered dependency.
    pub checks: Vec<ReadinessCheck>,
}

impl ReadinessReport {
    /// True when every dependency passed its check.
    pub fn is_ready(&self) -> bool {
        self.checks.iter().all(|c| c.ready)
    }
}

/// Owns the process's external dependencies for its whole lifetime.
pub struct DependencyBootstrapper {
    policy: BackoffPolicy,
    timer: Arc<dyn Timer>,
    dependencies: Vec<Arc<dyn ManagedDependency>>,
    connected_order: Mutex<Vec<usize>>,
}

impl DependencyBootstrapper {
    /// Creates a bootstrapper that sleeps on the tokio runtime.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            timer: Arc::new(TokioTimer),
            dependencies: Vec::new(),
            connected_order: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the timer used between attempts.
    pub fn with_timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    /// Registers a dependency. Registration order is reporting order.
    pub fn with_dependency(mut self, dependency: Arc<dyn ManagedDependency>) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// The retry policy applied to every dependency.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Starts every dependency and waits until each is connected or degraded.
    ///
    /// Never fails; degraded dependencies are reported, not raised.
    pub async fn start(&self) -> BootstrapReport {
        let starts = self.dependencies.iter().enumerate().map(|(idx, dep)| {
            let timer = Arc::clone(&self.timer);
            async move {
                let state = dep.start(&self.policy, timer).await;
                if state == DependencyState::Connected {
                    self.connected_order.lock().await.push(idx);
                }
                DependencyStatus {
                    name: dep.name().to_string(),
                    state,
                }
            }
        });

        let report = BootstrapReport {
            dependencies: join_all(starts).await,
        };

        let degraded = report.degraded();
        if degraded.is_empty() {
            info!(count = report.dependencies.len(), "all dependencies connected");
        } else {
            warn!(degraded = ?degraded, "starting with degraded dependencies");
        }
        report
    }

    /// Current state of every dependency.
    pub async fn states(&self) -> Vec<DependencyStatus> {
        let mut out = Vec::with_capacity(self.dependencies.len());
        for dep in &self.dependencies {
            out.push(DependencyStatus {
                name: dep.name().to_string(),
                state: dep.state().await,
            });
        }
        out
    }

    /// Checks every dependency.
    pub async fn ready(&self) -> ReadinessReport {
        let checks = self.dependencies.iter().map(|dep| async move {
            let state = dep.state().await;
            let result = dep.ready().await;
            ReadinessCheck {
                name: dep.name().to_string(),
                state,
                ready: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            }
        });
        ReadinessReport {
            checks: join_all(checks).await,
        }
    }

    /// Releases connected dependencies, last connected first.
    pub async fn shutdown(&self) {
        let order = std::mem::take(&mut *self.connected_order.lock().await);
        for idx in order.into_iter().rev() {
            if let Some(dep) = self.dependencies.get(idx) {
                dep.shutdown().await;
            }
        }
        info!("dependencies shut down");
    }
}
