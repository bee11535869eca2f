//! # Keystone Core Hooks
//!
//! Generic asynchronous interception points.
//!
//! A module that wants other modules to observe or rewrite one of its
//! operations owns a [`HookPipeline<P>`](pipeline::HookPipeline) and invokes
//! it with the in-flight payload. Observers implement [`HookObserver`] (or
//! are built from closures with [`observer_fn`] / [`observer_sync`]).
//!
//! Two execution modes exist:
//! - [`HookMode::Parallel`]: all observers run concurrently on clones of the
//!   original payload; mutation never propagates.
//! - [`HookMode::Series`]: observers run one at a time in registration order;
//!   a mutable series pipeline threads each returned payload into the next.
pub mod error;
pub mod pipeline;

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::kernel::error::BoxError;

pub use error::HookError;
pub use pipeline::{HookOutcome, HookPipeline, ObserverId};

/// Execution strategy for a [`HookPipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    Parallel,
    Series,
}

impl fmt::Display for HookMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookMode::Parallel => write!(f, "parallel"),
            HookMode::Series => write!(f, "series"),
        }
    }
}

/// An observer attached to a hook.
///
/// Returning `Ok(Some(payload))` from a mutable series hook replaces the
/// running payload; `Ok(None)` leaves it untouched.
#[async_trait]
pub trait HookObserver<P: Send + 'static>: Send + Sync {
    /// Name used in logs and error reports
    fn name(&self) -> &str {
        "anonymous"
    }

    async fn observe(&self, payload: P) -> Result<Option<P>, BoxError>;
}

/// Observer backed by an async closure
pub struct FnObserver<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for FnObserver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObserver").field("name", &self.name).finish_non_exhaustive()
    }
}

#[async_trait]
impl<P, F, Fut> HookObserver<P> for FnObserver<F>
where
    P: Send + 'static,
    F: Fn(P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<P>, BoxError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn observe(&self, payload: P) -> Result<Option<P>, BoxError> {
        (self.f)(payload).await
    }
}

/// Build an observer from an async closure.
pub fn observer_fn<P, F, Fut>(name: impl Into<String>, f: F) -> FnObserver<F>
where
    P: Send + 'static,
    F: Fn(P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<P>, BoxError>> + Send,
{
    FnObserver { name: name.into(), f }
}

/// Helper function to create observers from synchronous closures
pub fn observer_sync<P, F>(
    name: impl Into<String>,
    f: F,
) -> FnObserver<impl Fn(P) -> futures::future::Ready<Result<Option<P>, BoxError>> + Send + Sync>
where
    P: Send + 'static,
    F: Fn(P) -> Result<Option<P>, BoxError> + Send + Sync,
{
    FnObserver {
        name: name.into(),
        f: move |payload| futures::future::ready(f(payload)),
    }
}
