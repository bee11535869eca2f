use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::kernel::constants;
use crate::kernel::context::AppContext;
use crate::kernel::error::{Error, KernelLifecyclePhase, Result};
use crate::lang::{LangTable, Translator};
use crate::module_system::{
    DirectoryDiscovery, FactoryRegistry, LoaderConfig, ModuleDiscovery, ModuleFactory,
};
use crate::storage::ConfigData;

/// Boots an application: discovers modules, loads them in phases and
/// reports what went wrong if anything did.
pub struct Application {
    context: AppContext,
    discovery: Box<dyn ModuleDiscovery>,
    factories: Box<dyn ModuleFactory>,
    /// Whether phrases are collected from `lang/` directories after loading
    load_phrases: bool,
    started: bool,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Load every module. Can only be called once.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::KernelLifecycleError {
                phase: KernelLifecyclePhase::RunPreCheck,
                message: "Application already started".to_string(),
                source: None,
            });
        }
        self.started = true;
        log::info!("Starting {} v{}", constants::APP_NAME, constants::APP_VERSION);

        let loaded = self
            .context
            .loader()
            .load(self.discovery.as_ref(), self.factories.as_ref(), &self.context)
            .await;

        // Phrases are needed for the failure report too.
        if self.load_phrases {
            self.collect_phrases().await;
        }

        loaded?;
        log::info!(
            "{}",
            self.context.translate(
                "info.startapp",
                &json!({ "app": self.context.name(), "dir": self.context.root_dir().display().to_string() })
            )
        );
        Ok(())
    }

    async fn collect_phrases(&self) {
        let mut table = LangTable::builtin();
        if let Some(locale) = self.context.config().get::<String>("locale") {
            table.set_locale(&locale);
        }

        let mut roots = vec![self.context.root_dir().to_path_buf()];
        roots.extend(self.context.loader().descriptors().into_iter().map(|d| d.root_dir));
        for root in roots {
            if let Err(e) = table.load_dir(&root).await {
                log::warn!("Skipping phrases under {}: {}", root.display(), e);
            }
        }
        self.context.set_translator(Arc::new(table));
    }

    /// Render `error` for humans: one line per failed module, each with its cause.
    ///
    /// Lines are logged at error level and returned so a CLI can print them.
    pub fn report_failure(&self, error: &Error) -> Vec<String> {
        let ctx = &self.context;
        let failures = match error {
            Error::Loader(loader_error) => loader_error.module_failures(),
            _ => Vec::new(),
        };

        let mut lines = Vec::new();
        if failures.is_empty() {
            lines.push(ctx.translate(
                "error.startfailed",
                &json!({ "app": ctx.name(), "error": error.to_string() }),
            ));
        } else {
            lines.push(ctx.translate("error.loadmodules", &json!({ "count": failures.len() })));
            for failure in &failures {
                lines.push(ctx.translate(
                    "error.modulefailed",
                    &json!({ "module": failure.module, "error": failure.error.to_string() }),
                ));
            }
        }

        for line in &lines {
            log::error!("{}", line);
        }
        lines
    }
}

/// Builder for [`Application`]
pub struct ApplicationBuilder {
    name: String,
    root_dir: PathBuf,
    config: ConfigData,
    loader_config: LoaderConfig,
    discovery: Option<Box<dyn ModuleDiscovery>>,
    factories: FactoryRegistry,
    translator: Option<Arc<dyn Translator>>,
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            name: constants::APP_NAME.to_string(),
            root_dir: PathBuf::from("."),
            config: ConfigData::new(),
            loader_config: LoaderConfig::default(),
            discovery: None,
            factories: FactoryRegistry::new(),
            translator: None,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    pub fn config(mut self, config: ConfigData) -> Self {
        self.config = config;
        self
    }

    pub fn loader_config(mut self, loader_config: LoaderConfig) -> Self {
        self.loader_config = loader_config;
        self
    }

    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.loader_config.ready_timeout = Some(timeout);
        self
    }

    /// Defaults to scanning `<root_dir>/modules`
    pub fn discovery(mut self, discovery: impl ModuleDiscovery + 'static) -> Self {
        self.discovery = Some(Box::new(discovery));
        self
    }

    pub fn factories(mut self, factories: FactoryRegistry) -> Self {
        self.factories = factories;
        self
    }

    /// Use `translator` instead of phrases collected from `lang/` directories
    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn build(self) -> Application {
        let context = AppContext::new(&self.name, self.root_dir.clone(), self.config, self.loader_config);
        let load_phrases = match self.translator {
            Some(translator) => {
                context.set_translator(translator);
                false
            }
            None => true,
        };
        let discovery = self
            .discovery
            .unwrap_or_else(|| Box::new(DirectoryDiscovery::new(self.root_dir.join("modules"))));

        Application {
            context,
            discovery,
            factories: Box::new(self.factories),
            load_phrases,
            started: false,
        }
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
