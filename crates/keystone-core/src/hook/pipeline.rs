use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;

use crate::event::channel::panic_message;
use crate::hook::{HookError, HookMode, HookObserver};

/// Identifier returned by [`HookPipeline::register`]
pub type ObserverId = u64;

struct RegisteredObserver<P: Send + 'static> {
    id: ObserverId,
    observer: Arc<dyn HookObserver<P>>,
}

impl<P: Send + 'static> Clone for RegisteredObserver<P> {
    fn clone(&self) -> Self {
        Self { id: self.id, observer: Arc::clone(&self.observer) }
    }
}

/// Result of a successful [`HookPipeline::invoke`]
#[derive(Debug, Clone, PartialEq)]
pub struct HookOutcome<P> {
    /// Final payload for series hooks, the untouched original for parallel ones
    pub payload: P,
    /// What every observer returned, in registration order
    pub results: Vec<Option<P>>,
}

/// An ordered list of observers invoked around one operation.
pub struct HookPipeline<P: Send + 'static> {
    mode: HookMode,
    mutable: bool,
    observer_timeout: Option<Duration>,
    observers: RwLock<Vec<RegisteredObserver<P>>>,
    next_id: AtomicU64,
}

impl<P: Send + 'static> fmt::Debug for HookPipeline<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookPipeline")
            .field("mode", &self.mode)
            .field("mutable", &self.mutable)
            .field("observer_timeout", &self.observer_timeout)
            .field("observers", &self.observers.read().unwrap_or_else(PoisonError::into_inner).len())
            .finish()
    }
}

impl<P: Clone + Send + Sync + 'static> HookPipeline<P> {
    pub fn new(mode: HookMode, mutable: bool) -> Self {
        Self {
            mode,
            mutable,
            observer_timeout: None,
            observers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Parallel hooks never propagate mutation.
    pub fn parallel() -> Self {
        Self::new(HookMode::Parallel, false)
    }

    pub fn series(mutable: bool) -> Self {
        Self::new(HookMode::Series, mutable)
    }

    /// Bound every observer call; an observer exceeding it fails the invocation.
    pub fn with_observer_timeout(mut self, timeout: Duration) -> Self {
        self.observer_timeout = Some(timeout);
        self
    }

    pub fn mode(&self) -> HookMode {
        self.mode
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Append an observer. The same observer may be registered more than once.
    pub fn register<O>(&self, observer: O) -> ObserverId
    where
        O: HookObserver<P> + 'static,
    {
        self.register_arc(Arc::new(observer))
    }

    pub fn register_arc(&self, observer: Arc<dyn HookObserver<P>>) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        log::debug!("Registered hook observer '{}' as #{}", observer.name(), id);
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RegisteredObserver { id, observer });
        id
    }

    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let len_before = observers.len();
        observers.retain(|o| o.id != id);
        observers.len() < len_before
    }

    pub fn len(&self) -> usize {
        self.observers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every registered observer against `payload`.
    ///
    /// Observers registered while an invocation is in flight join the next one.
    pub async fn invoke(&self, payload: P) -> Result<HookOutcome<P>, HookError> {
        let snapshot: Vec<RegisteredObserver<P>> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if snapshot.is_empty() {
            return Ok(HookOutcome { payload, results: Vec::new() });
        }

        match self.mode {
            HookMode::Series => self.invoke_series(&snapshot, payload).await,
            HookMode::Parallel => self.invoke_parallel(&snapshot, payload).await,
        }
    }

    async fn invoke_series(&self, snapshot: &[RegisteredObserver<P>], payload: P) -> Result<HookOutcome<P>, HookError> {
        let mut current = payload;
        let mut results = Vec::with_capacity(snapshot.len());
        for (index, registered) in snapshot.iter().enumerate() {
            // Stop at the first failure; later observers never see the payload.
            let returned = self.run_observer(index, &registered.observer, current.clone()).await?;
            if self.mutable {
                if let Some(next) = &returned {
                    current = next.clone();
                }
            }
            results.push(returned);
        }
        Ok(HookOutcome { payload: current, results })
    }

    async fn invoke_parallel(&self, snapshot: &[RegisteredObserver<P>], payload: P) -> Result<HookOutcome<P>, HookError> {
        let settled = join_all(
            snapshot
                .iter()
                .enumerate()
                .map(|(index, registered)| self.run_observer(index, &registered.observer, payload.clone())),
        )
        .await;

        let mut results = Vec::with_capacity(settled.len());
        let mut failures = Vec::new();
        let mut completed = Vec::new();
        for (index, outcome) in settled.into_iter().enumerate() {
            match outcome {
                Ok(returned) => {
                    completed.push((index, snapshot[index].observer.name().to_string()));
                    results.push(returned);
                }
                Err(err) => failures.push(err),
            }
        }

        if failures.is_empty() {
            Ok(HookOutcome { payload, results })
        } else {
            Err(HookError::ParallelObserversFailed { total: snapshot.len(), failures, completed })
        }
    }

    async fn run_observer(&self, index: usize, observer: &Arc<dyn HookObserver<P>>, payload: P) -> Result<Option<P>, HookError> {
        let call = AssertUnwindSafe(observer.observe(payload)).catch_unwind();
        let returned = match self.observer_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(returned) => returned,
                Err(_) => {
                    log::warn!("Hook observer #{} ('{}') timed out after {:?}", index, observer.name(), timeout);
                    return Err(HookError::ObserverTimedOut {
                        index,
                        observer: observer.name().to_string(),
                        timeout,
                    });
                }
            },
            None => call.await,
        };
        let returned = returned.map_err(|payload| {
            let message = panic_message(payload.as_ref());
            log::error!("Hook observer #{} ('{}') panicked: {}", index, observer.name(), message);
            HookError::ObserverPanicked { index, observer: observer.name().to_string(), message }
        })?;
        returned.map_err(|source| {
            log::warn!("Hook observer #{} ('{}') failed: {}", index, observer.name(), source);
            HookError::ObserverFailed { index, observer: observer.name().to_string(), source }
        })
    }
}
