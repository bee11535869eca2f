use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::kernel::context::AppContext;
use crate::kernel::error::BoxError;
use crate::readiness::ReadinessCell;

/// Shared handle to a constructed module
pub type ModuleHandle = Arc<dyn Module>;

/// Conversion used by typed module lookups; implemented for every module type.
pub trait AsAnyArc {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAnyArc for T {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A unit of initialisation managed by the dependency loader.
///
/// The loader constructs a module through its factory, calls
/// [`initialize`](Module::initialize) once, and then waits on
/// [`readiness`](Module::readiness). A module may mark itself ready inside
/// `initialize` or later from a task it spawned; until it does, modules that
/// `wait_for` it stay parked.
#[async_trait]
pub trait Module: AsAnyArc + Send + Sync + fmt::Debug {
    /// Fully-qualified module name, as declared by its descriptor
    fn name(&self) -> &str;

    /// The cell this module flips once it is usable
    fn readiness(&self) -> &ReadinessCell<()>;

    /// Asynchronous set-up. The default marks the module ready immediately.
    ///
    /// Returning an error fails the module (and therefore its phase).
    async fn initialize(&self, ctx: &AppContext) -> Result<(), BoxError> {
        let _ = ctx;
        self.readiness().mark_ready(());
        Ok(())
    }
}

/// Where a known module currently is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    /// Discovered but its phase has not reached it yet
    Discovered,
    Constructed,
    Initializing,
    Ready,
    Failed,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleState::Discovered => write!(f, "discovered"),
            ModuleState::Constructed => write!(f, "constructed"),
            ModuleState::Initializing => write!(f, "initializing"),
            ModuleState::Ready => write!(f, "ready"),
            ModuleState::Failed => write!(f, "failed"),
        }
    }
}
