use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{join_all, pending};
use semver::Version;
use tokio::sync::oneshot;

use crate::event::channel::panic_message;
use crate::event::types::{MODULE_FAILED, MODULE_READY};
use crate::event::{LifecycleEvent, SharedEventChannel, SubscriptionGuard};
use crate::kernel::constants::{API_VERSION, MODULE_PREFIX};
use crate::kernel::context::AppContext;
use crate::module_system::descriptor::ModuleDescriptor;
use crate::module_system::discovery::ModuleDiscovery;
use crate::module_system::error::{
    DiscoveryError, InstantiationError, LoaderError, LookupError, ModuleError, PhaseFailure,
};
use crate::module_system::factory::ModuleFactory;
use crate::module_system::graph::{DependencyGraph, LoadPhase};
use crate::module_system::registry::ModuleRegistry;
use crate::module_system::traits::{Module, ModuleHandle, ModuleState};
use crate::module_system::version::parse_version;
use crate::readiness::{ReadinessCell, ReadinessError};

/// Progress of a [`DependencyLoader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderState {
    Idle,
    Discovering,
    LoadingCoreApis,
    LoadingRest,
    Loaded,
    Failed,
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderState::Idle => write!(f, "idle"),
            LoaderState::Discovering => write!(f, "discovering"),
            LoaderState::LoadingCoreApis => write!(f, "loading-core-apis"),
            LoaderState::LoadingRest => write!(f, "loading-rest"),
            LoaderState::Loaded => write!(f, "loaded"),
            LoaderState::Failed => write!(f, "failed"),
        }
    }
}

impl From<LoadPhase> for LoaderState {
    fn from(phase: LoadPhase) -> Self {
        match phase {
            LoadPhase::CoreApis => LoaderState::LoadingCoreApis,
            LoadPhase::Rest => LoaderState::LoadingRest,
        }
    }
}

/// Loader settings
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Prefix that turns an alias into a package name (`server` -> `keystone-server`)
    pub module_prefix: String,
    /// Upper bound for a module's initialise-and-become-ready step; `None` waits forever
    pub ready_timeout: Option<Duration>,
    /// Version checked against every descriptor's `keystone_versions`
    pub api_version: Version,
}

impl LoaderConfig {
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            module_prefix: MODULE_PREFIX.to_string(),
            ready_timeout: None,
            api_version: parse_version(API_VERSION).unwrap_or_else(|_| Version::new(0, 0, 0)),
        }
    }
}

struct LoaderInner {
    config: LoaderConfig,
    events: SharedEventChannel<LifecycleEvent>,
    state: Mutex<LoaderState>,
    registry: RwLock<ModuleRegistry>,
    /// Settles when the full descriptor list is known
    discovered: ReadinessCell<()>,
    /// Settles when every phase finished
    loaded: ReadinessCell<()>,
}

/// Discovers, instantiates and readies modules in two phases.
///
/// Phase one loads every core-API module concurrently and waits for the whole
/// phase to settle; phase two then does the same for everything else. Any
/// failure inside a phase is collected, and once the phase has settled a
/// single [`LoaderError::PhaseFailed`] listing every failed module is
/// returned. The next phase never starts after a failed one.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct DependencyLoader {
    inner: Arc<LoaderInner>,
}

impl fmt::Debug for DependencyLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyLoader")
            .field("state", &self.state())
            .field("config", &self.inner.config)
            .field("loaded", &self.read_registry().loaded_names())
            .finish_non_exhaustive()
    }
}

impl DependencyLoader {
    pub fn new(config: LoaderConfig, events: SharedEventChannel<LifecycleEvent>) -> Self {
        let registry = ModuleRegistry::new(&config.module_prefix);
        Self {
            inner: Arc::new(LoaderInner {
                config,
                events,
                state: Mutex::new(LoaderState::Idle),
                registry: RwLock::new(registry),
                discovered: ReadinessCell::new(),
                loaded: ReadinessCell::new(),
            }),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &SharedEventChannel<LifecycleEvent> {
        &self.inner.events
    }

    pub fn state(&self) -> LoaderState {
        *self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Registry critical sections are short and never span an `.await`.
    fn read_registry(&self) -> RwLockReadGuard<'_, ModuleRegistry> {
        self.inner.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, ModuleRegistry> {
        self.inner.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, to: LoaderState) {
        let from = {
            let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, to)
        };
        log::debug!("Loader state {} -> {}", from, to);
        self.inner.events.publish(&LifecycleEvent::LoaderStateChanged { from, to });
    }

    fn begin(&self) -> Result<(), LoaderError> {
        {
            let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != LoaderState::Idle {
                return Err(LoaderError::AlreadyStarted { state: *state });
            }
            *state = LoaderState::Discovering;
        }
        self.inner.events.publish(&LifecycleEvent::LoaderStateChanged {
            from: LoaderState::Idle,
            to: LoaderState::Discovering,
        });
        Ok(())
    }

    fn fail(&self, reason: String) {
        self.transition(LoaderState::Failed);
        self.inner.discovered.mark_failed(reason.clone());
        self.inner.loaded.mark_failed(reason);
    }

    //--------------------------------------------------
    // Loading
    //--------------------------------------------------

    /// Discover every module and bring all of them to ready, phase by phase.
    ///
    /// May be called once per loader.
    pub async fn load(
        &self,
        discovery: &dyn ModuleDiscovery,
        factory: &dyn ModuleFactory,
        ctx: &AppContext,
    ) -> Result<(), LoaderError> {
        self.begin()?;

        let graph = match self.discover(discovery).await {
            Ok(graph) => graph,
            Err(e) => {
                log::error!("Module discovery failed: {}", e);
                self.fail(e.to_string());
                return Err(e.into());
            }
        };
        log::info!(
            "Discovered {} module(s): {} core API, {} other",
            graph.len(),
            graph.core_api_phase().len(),
            graph.rest_phase().len()
        );

        for phase in LoadPhase::ORDER {
            self.transition(phase.into());
            let failures = self.load_phase(phase, graph.phase(phase), factory, ctx).await;
            if !failures.is_empty() {
                let err = LoaderError::PhaseFailed { phase, failures };
                log::error!("{}", err);
                self.fail(err.to_string());
                return Err(err);
            }
        }

        self.transition(LoaderState::Loaded);
        self.inner.loaded.mark_ready(());
        log::info!("All {} module(s) loaded", self.loaded_modules().len());
        Ok(())
    }

    async fn discover(&self, discovery: &dyn ModuleDiscovery) -> Result<DependencyGraph, DiscoveryError> {
        let descriptors = discovery.discover().await?;

        let api_version = &self.inner.config.api_version;
        if let Some(incompatible) = descriptors.iter().find(|d| !d.is_compatible_with(api_version)) {
            return Err(DiscoveryError::IncompatibleVersion {
                name: incompatible.name.clone(),
                required: incompatible.keystone_versions.to_string(),
                running: api_version.to_string(),
            });
        }

        let graph = DependencyGraph::build(descriptors, &self.inner.config.module_prefix)?;
        self.write_registry().set_descriptors(graph.descriptors().cloned());
        self.inner.discovered.mark_ready(());
        Ok(graph)
    }

    /// Load every module of one phase concurrently and wait until all settled.
    async fn load_phase(
        &self,
        phase: LoadPhase,
        descriptors: &[ModuleDescriptor],
        factory: &dyn ModuleFactory,
        ctx: &AppContext,
    ) -> Vec<PhaseFailure> {
        let (modules, libraries): (Vec<_>, Vec<_>) = descriptors.iter().partition(|d| d.is_module);
        for library in &libraries {
            log::debug!("'{}' is a library package, not instantiating it", library.name);
        }
        log::info!("Loading {} phase ({} module(s))", phase, modules.len());
        let outcomes = join_all(modules.into_iter().map(|descriptor| async move {
            match self.load_module(descriptor, factory, ctx).await {
                Ok(_) => None,
                Err(LoaderError::DependencyFailed { name, source }) => Some(PhaseFailure { module: name, error: source }),
                Err(other) => Some(PhaseFailure {
                    module: descriptor.name.clone(),
                    error: Arc::new(ModuleError::Rejected {
                        name: descriptor.name.clone(),
                        reason: other.to_string(),
                    }),
                }),
            }
        }))
        .await;
        outcomes.into_iter().flatten().collect()
    }

    /// Construct, initialise and await a single module.
    ///
    /// A name is instantiated at most once per loader; a second request is
    /// rejected with [`LoaderError::ModuleAlreadyLoaded`] and leaves the
    /// first instance untouched.
    pub async fn load_module(
        &self,
        descriptor: &ModuleDescriptor,
        factory: &dyn ModuleFactory,
        ctx: &AppContext,
    ) -> Result<ModuleHandle, LoaderError> {
        {
            let mut registry = self.write_registry();
            if !registry.claim(&descriptor.name) {
                return Err(LoaderError::ModuleAlreadyLoaded { name: descriptor.name.clone() });
            }
            registry.add_descriptor(descriptor.clone());
        }
        self.instantiate(descriptor, factory, ctx)
            .await
            .map_err(|source| LoaderError::DependencyFailed { name: descriptor.name.clone(), source })
    }

    async fn instantiate(
        &self,
        descriptor: &ModuleDescriptor,
        factory: &dyn ModuleFactory,
        ctx: &AppContext,
    ) -> Result<ModuleHandle, Arc<ModuleError>> {
        let name = descriptor.name.as_str();
        log::debug!("Constructing module '{}'", name);

        let module = match panic::catch_unwind(AssertUnwindSafe(|| factory.construct(descriptor, ctx))) {
            Ok(Ok(module)) => module,
            Ok(Err(e)) => return Err(self.record_failure(name, e.into())),
            Err(payload) => {
                let e = InstantiationError::ConstructorPanicked {
                    name: name.to_string(),
                    message: panic_message(payload.as_ref()),
                };
                return Err(self.record_failure(name, e.into()));
            }
        };
        self.write_registry().mark_constructed(name, Arc::clone(&module));

        self.write_registry().mark_initializing(name, Arc::clone(&module));
        let settle = async {
            module
                .initialize(ctx)
                .await
                .map_err(|source| ModuleError::InitializationFailed { name: name.to_string(), source })?;
            module.readiness().wait().await.map_err(|e| ModuleError::ReadinessFailed {
                name: name.to_string(),
                reason: match e {
                    ReadinessError::Failed { reason } => reason,
                    other => other.to_string(),
                },
            })
        };
        // A panicking module fails like any other; its siblings still settle.
        let settle = async {
            AssertUnwindSafe(settle).catch_unwind().await.unwrap_or_else(|payload| {
                Err(ModuleError::InitializationPanicked {
                    name: name.to_string(),
                    message: panic_message(payload.as_ref()),
                })
            })
        };
        let settled = match self.inner.config.ready_timeout {
            Some(timeout) => tokio::time::timeout(timeout, settle)
                .await
                .unwrap_or_else(|_| Err(ModuleError::ReadinessTimeout { name: name.to_string(), timeout })),
            None => settle.await,
        };

        if let Err(e) = settled {
            // Wake anyone awaiting the module's own cell directly.
            module.readiness().mark_failed(e.to_string());
            return Err(self.record_failure(name, e));
        }

        self.write_registry().mark_ready(name, Arc::clone(&module));
        log::info!("Module '{}' is ready", name);
        self.inner.events.publish(&LifecycleEvent::ModuleReady {
            name: name.to_string(),
            instance: Arc::clone(&module),
        });
        Ok(module)
    }

    fn record_failure(&self, name: &str, error: ModuleError) -> Arc<ModuleError> {
        let error = Arc::new(error);
        self.write_registry().mark_failed(name, Arc::clone(&error));
        log::error!("Module '{}' failed: {}", name, error);
        self.inner.events.publish(&LifecycleEvent::ModuleFailed {
            name: name.to_string(),
            error: Arc::clone(&error),
        });
        error
    }

    //--------------------------------------------------
    // Waiting & lookup
    //--------------------------------------------------

    /// Resolve once the named module is ready.
    ///
    /// `name` may be the short alias or the prefixed package name. Names no
    /// discovered descriptor carries fail immediately; if called before
    /// discovery finished, discovery is awaited first so the check runs
    /// against the full list. A module that fails (or a load that aborts
    /// before reaching it) rejects the wait.
    pub async fn wait_for(&self, name: &str) -> Result<ModuleHandle, LoaderError> {
        if self.inner.discovered.wait().await.is_err() {
            return Err(LoaderError::LoadAborted { name: name.to_string() });
        }

        let installed = self
            .read_registry()
            .resolve(name)
            .map(str::to_string)
            .ok_or_else(|| LoaderError::UnknownDependency { name: name.to_string() })?;

        if self.read_registry().descriptor(&installed).is_some_and(|d| !d.is_module) {
            return Err(LoaderError::NotAModule { name: installed });
        }

        if let Some(settled) = self.settled(&installed) {
            return settled;
        }

        let (tx, rx) = oneshot::channel::<Result<ModuleHandle, Arc<ModuleError>>>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let events = &self.inner.events;
        let mut guard = SubscriptionGuard::new(Arc::clone(events));

        let (target, ready_tx) = (installed.clone(), Arc::clone(&tx));
        guard.hold(events.subscribe_once_when(
            MODULE_READY,
            move |e| e.module_name() == Some(target.as_str()),
            move |e| {
                if let LifecycleEvent::ModuleReady { instance, .. } = e {
                    deliver(&ready_tx, Ok(Arc::clone(instance)));
                }
            },
        ));
        let (target, failed_tx) = (installed.clone(), tx);
        guard.hold(events.subscribe_once_when(
            MODULE_FAILED,
            move |e| e.module_name() == Some(target.as_str()),
            move |e| {
                if let LifecycleEvent::ModuleFailed { error, .. } = e {
                    deliver(&failed_tx, Err(Arc::clone(error)));
                }
            },
        ));

        // The module may have settled between the first check and subscribing.
        if let Some(settled) = self.settled(&installed) {
            return settled;
        }

        tokio::select! {
            outcome = rx => match outcome {
                Ok(Ok(handle)) => Ok(handle),
                Ok(Err(source)) => Err(LoaderError::DependencyFailed { name: installed, source }),
                Err(_) => Err(LoaderError::LoadAborted { name: installed }),
            },
            _ = self.aborted() => self
                .settled(&installed)
                .unwrap_or(Err(LoaderError::LoadAborted { name: installed.clone() })),
        }
    }

    fn settled(&self, installed: &str) -> Option<Result<ModuleHandle, LoaderError>> {
        let outcome = self.read_registry().settled(installed)?;
        Some(outcome.map_err(|source| LoaderError::DependencyFailed { name: installed.to_string(), source }))
    }

    // Completes only if loading fails.
    async fn aborted(&self) {
        if self.inner.loaded.wait().await.is_ok() {
            pending::<()>().await;
        }
    }

    /// Resolve once both phases have succeeded.
    pub async fn wait_until_loaded(&self) -> Result<(), LoaderError> {
        self.inner.loaded.wait().await.map_err(|e| LoaderError::LoadFailed {
            reason: match e {
                ReadinessError::Failed { reason } => reason,
                other => other.to_string(),
            },
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.loaded.is_ready()
    }

    /// The application-level readiness signal
    pub fn loaded_signal(&self) -> ReadinessCell<()> {
        self.inner.loaded.clone()
    }

    /// Synchronous lookup; never blocks.
    pub fn get_module(&self, name: &str) -> Result<ModuleHandle, LookupError> {
        self.read_registry().get(name)
    }

    pub fn get_module_as<T: Module + 'static>(&self, name: &str) -> Result<Arc<T>, LookupError> {
        self.read_registry().get_as::<T>(name)
    }

    pub fn core_api(&self, api_name: &str) -> Option<ModuleHandle> {
        self.read_registry().core_api(api_name)
    }

    pub fn module_state(&self, name: &str) -> Option<ModuleState> {
        self.read_registry().state(name)
    }

    pub fn descriptors(&self) -> Vec<ModuleDescriptor> {
        self.read_registry().descriptors()
    }

    pub fn loaded_modules(&self) -> Vec<String> {
        self.read_registry().loaded_names()
    }

    pub fn failures(&self) -> Vec<PhaseFailure> {
        self.read_registry().failures()
    }
}

fn deliver<T>(slot: &Mutex<Option<oneshot::Sender<T>>>, value: T) {
    if let Some(tx) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
        let _ = tx.send(value);
    }
}
