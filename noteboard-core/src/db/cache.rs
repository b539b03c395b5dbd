//! Process-scoped connection cache with single-flight establishment
//!
//! The first caller starts an establishment attempt; everyone arriving
//! before it settles awaits that same attempt. A failed attempt (after all
//! retries) clears the slot so the next caller starts from scratch. A cached
//! handle is handed out as-is; liveness is the caller's business.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{error, info, warn};

use crate::error::ConnectionError;

/// Establishes and tears down the underlying connection handle
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;
    type Error: std::fmt::Display + Send;

    async fn connect(&self) -> Result<Self::Handle, Self::Error>;

    async fn close(&self, _handle: Self::Handle) {}
}

/// Bounded exponential backoff for establishment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): 250ms, 500ms, 1s, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << shift)
    }
}

type Attempt<H> = Shared<BoxFuture<'static, Result<H, ConnectionError>>>;

enum Slot<H> {
    Empty,
    Connecting { generation: u64, attempt: Attempt<H> },
    Ready(H),
}

struct State<H> {
    slot: Slot<H>,
    generation: u64,
    /// Attempt abandoned by `shutdown`; its handle must not be handed out
    abandoned: Option<u64>,
    /// Whether the abandoned attempt's handle still needs closing
    close_pending: bool,
}

pub struct ConnectionCache<C: Connector> {
    connector: Arc<C>,
    policy: RetryPolicy,
    state: Mutex<State<C::Handle>>,
}

impl<C: Connector> ConnectionCache<C> {
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self {
            connector: Arc::new(connector),
            policy,
            state: Mutex::new(State {
                slot: Slot::Empty,
                generation: 0,
                abandoned: None,
                close_pending: false,
            }),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Return the cached handle, joining or starting an establishment
    /// attempt if there is none yet.
    pub async fn get_connection(&self) -> Result<C::Handle, ConnectionError> {
        let (generation, attempt) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            match &state.slot {
                Slot::Ready(handle) => return Ok(handle.clone()),
                Slot::Connecting {
                    generation,
                    attempt,
                } => (*generation, attempt.clone()),
                Slot::Empty => {
                    state.generation += 1;
                    let generation = state.generation;
                    let attempt = establish(Arc::clone(&self.connector), self.policy)
                        .boxed()
                        .shared();
                    state.slot = Slot::Connecting {
                        generation,
                        attempt: attempt.clone(),
                    };
                    (generation, attempt)
                }
            }
        };

        let outcome = attempt.await;

        // Every joined caller gets here; only the first one for this
        // generation moves the slot on.
        let orphan = {
            let mut guard = self.lock();
            let state = &mut *guard;
            match &state.slot {
                Slot::Connecting { generation: g, .. } if *g == generation => {
                    state.slot = match &outcome {
                        Ok(handle) => Slot::Ready(handle.clone()),
                        Err(_) => Slot::Empty,
                    };
                    None
                }
                _ if state.abandoned == Some(generation) => {
                    let close = std::mem::take(&mut state.close_pending);
                    Some(outcome.as_ref().ok().filter(|_| close).cloned())
                }
                _ => None,
            }
        };

        match orphan {
            None => outcome,
            Some(handle) => {
                if let Some(handle) = handle {
                    self.connector.close(handle).await;
                    warn!("connection finished after shutdown, closed");
                }
                Err(ConnectionError::new(0, "connection cache shut down"))
            }
        }
    }

    /// The cached handle, if establishment has already succeeded.
    pub fn peek(&self) -> Option<C::Handle> {
        match &self.lock().slot {
            Slot::Ready(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self.lock().slot, Slot::Connecting { .. })
    }

    /// Drop the cached handle (closing it) or abandon an in-flight attempt.
    ///
    /// An abandoned attempt that still succeeds is closed by the first
    /// caller to observe it, and its callers get an error.
    pub async fn shutdown(&self) {
        let previous = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let previous = std::mem::replace(&mut state.slot, Slot::Empty);
            if let Slot::Connecting { generation, .. } = &previous {
                state.abandoned = Some(*generation);
                state.close_pending = true;
            }
            state.generation += 1;
            previous
        };
        match previous {
            Slot::Ready(handle) => {
                self.connector.close(handle).await;
                info!("primary database connection closed");
            }
            Slot::Connecting { .. } => info!("in-flight connection attempt abandoned"),
            Slot::Empty => {}
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<C::Handle>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn establish<C: Connector>(
    connector: Arc<C>,
    policy: RetryPolicy,
) -> Result<C::Handle, ConnectionError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match connector.connect().await {
            Ok(handle) => {
                info!(attempt, "primary database connected");
                return Ok(handle);
            }
            Err(e) if attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(attempt, error = %e, ?delay, "connection attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!(attempts = attempt, error = %e, "connection failed, all attempts exhausted");
                return Err(ConnectionError::new(attempt, e.to_string()));
            }
        }
    }
}
