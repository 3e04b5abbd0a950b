//! Concurrency cap for agent calls shared across workflow runs.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use agent_primitives::AgentSpec;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::agent::{AgentResult, AgentRunner};

const DEFAULT_MAX_IN_FLIGHT: NonZeroUsize = NonZeroUsize::new(8).unwrap();

/// Maximum number of agent calls allowed in flight at once.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionConfig {
    max_in_flight: NonZeroUsize,
}

impl AdmissionConfig {
    /// Creates a new configuration with the supplied limit.
    #[must_use]
    pub const fn new(max_in_flight: NonZeroUsize) -> Self {
        Self { max_in_flight }
    }

    /// Returns the configured limit.
    #[must_use]
    pub const fn max_in_flight(self) -> NonZeroUsize {
        self.max_in_flight
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}

/// Semaphore gate placed in front of agent calls.
///
/// Clones share the same permits, so one limit can guard every agent of every
/// concurrent workflow run.
#[derive(Debug, Clone)]
pub struct AdmissionLimit {
    semaphore: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
    config: AdmissionConfig,
}

impl AdmissionLimit {
    /// Constructs a limit using the provided configuration.
    #[must_use]
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_in_flight().get())),
            closed: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Returns the associated configuration.
    #[must_use]
    pub const fn config(&self) -> AdmissionConfig {
        self.config
    }

    /// Returns the number of calls that could start right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Returns `true` once [`AdmissionLimit::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the gate: waiting and future calls fail with
    /// [`AdmissionError::Closed`], calls already admitted finish normally.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.semaphore.close();
    }

    /// Waits for a permit.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Closed`] when the gate is closed.
    pub async fn acquire(&self) -> AdmissionResult<OwnedSemaphorePermit> {
        if self.is_closed() {
            return Err(AdmissionError::Closed);
        }
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| AdmissionError::Closed)
    }

    /// Wraps `agent` so each of its calls holds a permit while it runs.
    #[must_use]
    pub fn wrap(&self, agent: Arc<dyn AgentRunner>) -> Arc<dyn AgentRunner> {
        Arc::new(Admitted {
            inner: agent,
            limit: self.clone(),
        })
    }
}

impl Default for AdmissionLimit {
    fn default() -> Self {
        Self::new(AdmissionConfig::default())
    }
}

struct Admitted {
    inner: Arc<dyn AgentRunner>,
    limit: AdmissionLimit,
}

impl fmt::Debug for Admitted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admitted")
            .field("agent", &self.inner.spec().name())
            .field("limit", &self.limit.config().max_in_flight())
            .finish()
    }
}

#[async_trait]
impl AgentRunner for Admitted {
    fn spec(&self) -> &AgentSpec {
        self.inner.spec()
    }

    async fn run(&self, prompt: &str) -> AgentResult<String> {
        let permit = self.limit.acquire().await?;
        debug!(
            agent = self.inner.spec().name(),
            available = self.limit.available(),
            "agent call admitted"
        );
        let output = self.inner.run(prompt).await;
        drop(permit);
        output
    }
}

/// Errors produced by the admission gate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    /// The gate is closed and admits no further calls.
    #[error("admission gate closed")]
    Closed,
}

/// Result alias for admission operations.
pub type AdmissionResult<T> = Result<T, AdmissionError>;
