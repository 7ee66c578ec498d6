//! Deterministic test doubles for the bootstrap machinery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use homeman_core::{Error, Result};

use crate::dependency::Connector;
use crate::timer::Timer;

/// Shared, ordered log of connector events (`"connect:db"`, `"close:db"`, ...).
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Handle returned by [`MockConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockHandle {
    /// Name of the connector that produced it.
    pub name: String,
}

#[derive(Default)]
struct Counters {
    connect: AtomicUsize,
    ping: AtomicUsize,
    close: AtomicUsize,
}

/// Connector that fails a configurable number of times and counts calls.
///
/// Clones share their counters, so a test can keep one clone for assertions
/// while the dependency owns another.
///
/// # Examples
///
/// ```
/// use homeman_bootstrap::MockConnector;
///
/// let flaky = MockConnector::new("db").failing_first(2);
/// assert_eq!(flaky.connect_calls(), 0);
/// ```
#[derive(Clone)]
pub struct MockConnector {
    name: String,
    fail_first: usize,
    counters: Arc<Counters>,
    events: Option<EventLog>,
}

impl MockConnector {
    /// Creates a connector that always succeeds.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail_first: 0,
            counters: Arc::new(Counters::default()),
            events: None,
        }
    }

    /// Fails the first `n` connection attempts.
    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    /// Fails every connection attempt.
    pub fn always_failing(self) -> Self {
        self.failing_first(usize::MAX)
    }

    /// Records events into a shared log.
    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// Number of `connect` calls so far.
    pub fn connect_calls(&self) -> usize {
        self.counters.connect.load(Ordering::SeqCst)
    }

    /// Number of `ping` calls so far.
    pub fn ping_calls(&self) -> usize {
        self.counters.ping.load(Ordering::SeqCst)
    }

    /// Number of `close` calls so far.
    pub fn close_calls(&self) -> usize {
        self.counters.close.load(Ordering::SeqCst)
    }

    fn record(&self, event: &str) {
        if let Some(events) = &self.events {
            events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(format!("{event}:{}", self.name));
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Handle = MockHandle;

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<MockHandle> {
        let previous = self.counters.connect.fetch_add(1, Ordering::SeqCst);
        if previous < self.fail_first {
            self.record("connect-failed");
            return Err(Error::backend(format!("{} refused connection", self.name)));
        }
        self.record("connect");
        Ok(MockHandle {
            name: self.name.clone(),
        })
    }

    async fn ping(&self, _handle: &MockHandle) -> Result<()> {
        self.counters.ping.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self, _handle: &MockHandle) {
        self.counters.close.fetch_add(1, Ordering::SeqCst);
        self.record("close");
    }
}

/// Timer that returns immediately and remembers what it was asked to wait.
#[derive(Debug, Default)]
pub struct RecordingTimer {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingTimer {
    /// Requested sleeps, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Timer for RecordingTimer {
    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}
