//! # Keystone Core Readiness
//!
//! [`ReadinessCell`] is a one-time, multi-waiter "ready" latch. A module owns
//! one and flips it when its asynchronous initialisation is done; the
//! dependency loader and any number of `wait_for` callers await it.
//!
//! The cell settles exactly once, either ready (carrying a value) or failed
//! (carrying a reason). Later settle attempts are ignored and report `false`.
//! Waiters are parked on a `tokio::sync::watch` channel and never poll.
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

/// Why a wait on a [`ReadinessCell`] did not produce a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessError {
    #[error("readiness failed: {reason}")]
    Failed { reason: String },

    #[error("readiness cell was dropped before it settled")]
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CellState<T> {
    Pending,
    Ready(T),
    Failed(String),
}

impl<T> CellState<T> {
    fn is_pending(&self) -> bool {
        matches!(self, CellState::Pending)
    }
}

/// One-shot readiness latch shared between a module and its waiters.
///
/// Clones share the same state.
pub struct ReadinessCell<T> {
    state: Arc<watch::Sender<CellState<T>>>,
}

impl<T> Clone for ReadinessCell<T> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state) }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadinessCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessCell")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> ReadinessCell<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CellState::Pending);
        Self { state: Arc::new(tx) }
    }

    fn settle(&self, next: CellState<T>) -> bool {
        let mut next = Some(next);
        self.state.send_if_modified(|state| {
            if !state.is_pending() {
                return false;
            }
            if let Some(next) = next.take() {
                *state = next;
            }
            true
        })
    }

    /// Transition to ready and wake every waiter.
    ///
    /// Returns `false` (and changes nothing) if the cell already settled.
    pub fn mark_ready(&self, value: T) -> bool {
        self.settle(CellState::Ready(value))
    }

    /// Transition to failed and wake every waiter with `reason`.
    pub fn mark_failed(&self, reason: impl Into<String>) -> bool {
        self.settle(CellState::Failed(reason.into()))
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), CellState::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(*self.state.borrow(), CellState::Failed(_))
    }

    pub fn is_settled(&self) -> bool {
        !self.state.borrow().is_pending()
    }

    /// The ready value, if any. Never blocks.
    pub fn get(&self) -> Option<T> {
        match &*self.state.borrow() {
            CellState::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Resolve once the cell settles; immediately if it already has.
    pub async fn wait(&self) -> Result<T, ReadinessError> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|state| !state.is_pending())
            .await
            .map_err(|_| ReadinessError::Abandoned)?;
        match &*state {
            CellState::Ready(value) => Ok(value.clone()),
            CellState::Failed(reason) => Err(ReadinessError::Failed { reason: reason.clone() }),
            CellState::Pending => Err(ReadinessError::Abandoned),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for ReadinessCell<T> {
    fn default() -> Self {
        Self::new()
    }
}
