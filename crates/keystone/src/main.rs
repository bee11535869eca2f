mod cli;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use keystone_core::module_system::{DirectoryDiscovery, ModuleDescriptor, ModuleDiscovery};
use keystone_core::storage::ConfigData;
use keystone_core::{Application, FactoryRegistry, StaticDiscovery};
use log::{info, warn};
use serde_json::json;

use cli::{BootArgs, CliArgs, Command};

/// Constructors for every module linked into this binary
fn static_factories() -> FactoryRegistry {
    let mut factories = FactoryRegistry::new();
    core_logging::register(&mut factories);
    core_server::register(&mut factories);
    request_audit::register(&mut factories);
    factories
}

async fn discover(modules_dir: &Path) -> Result<Vec<ModuleDescriptor>, String> {
    DirectoryDiscovery::new(modules_dir)
        .discover()
        .await
        .map_err(|e| format!("Failed to discover modules in {}: {}", modules_dir.display(), e))
}

async fn load_config(path: Option<&Path>) -> Result<ConfigData, String> {
    match path {
        Some(path) => ConfigData::load_from_path(path)
            .await
            .map_err(|e| format!("Failed to load config {}: {}", path.display(), e)),
        None => Ok(ConfigData::new()),
    }
}

/// Install the logger module's subscriber ourselves when no logger module was discovered.
fn install_fallback_logging(config: &ConfigData, descriptors: &[ModuleDescriptor]) {
    if descriptors.iter().any(|d| d.name == core_logging::MODULE_NAME) {
        return;
    }
    let section = config.section(core_logging::MODULE_NAME);
    let settings: core_logging::LoggingSettings = section.parse().unwrap_or_else(|e| {
        eprintln!("Ignoring invalid logging settings: {}", e);
        core_logging::LoggingSettings::default()
    });
    core_logging::init_subscriber(&settings);
}

async fn boot(args: BootArgs) -> ExitCode {
    let config = match load_config(args.config.as_deref()).await {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::FAILURE;
        }
    };
    let descriptors = match discover(&args.modules_dir).await {
        Ok(descriptors) => descriptors,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::FAILURE;
        }
    };
    install_fallback_logging(&config, &descriptors);
    info!("Discovered {} module(s) in {}", descriptors.len(), args.modules_dir.display());

    let mut builder = Application::builder()
        .root_dir(args.root_dir())
        .config(config)
        .discovery(StaticDiscovery::new(descriptors))
        .factories(static_factories());
    if let Some(timeout) = args.ready_timeout() {
        builder = builder.ready_timeout(timeout);
    }
    let mut app = builder.build();

    if let Err(e) = app.start().await {
        for line in app.report_failure(&e) {
            eprintln!("{}", line);
        }
        return ExitCode::FAILURE;
    }

    let ctx = app.context();
    let mut loaded = ctx.loader().loaded_modules();
    loaded.sort();
    println!("{}", ctx.translate("info.loaded", &json!({ "count": loaded.len() })));
    for name in &loaded {
        println!("  - {}", name);
    }

    if let Ok(server) = ctx.get_module_as::<core_server::ServerModule>(core_server::CORE_API_NAME) {
        match server.wait_listening().await {
            Ok(address) => println!("Server ready on {}", address),
            Err(e) => warn!("Server did not start: {}", e),
        }
    }
    ExitCode::SUCCESS
}

async fn list(modules_dir: &Path) -> ExitCode {
    let descriptors = match discover(modules_dir).await {
        Ok(descriptors) => descriptors,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    if descriptors.is_empty() {
        println!("No modules found in {}", modules_dir.display());
        return ExitCode::SUCCESS;
    }
    let factories = static_factories();
    for d in &descriptors {
        let api = d.core_api_name.as_deref().map(|n| format!(" [core API: {}]", n)).unwrap_or_default();
        let linked = if !d.is_module {
            " (library)"
        } else if factories.has(&d.name) {
            ""
        } else {
            " (no constructor linked)"
        };
        println!("{} {}{}{}", d.name, d.version, api, linked);
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    if args.ping {
        println!("pong");
        return ExitCode::SUCCESS;
    }

    match args.command {
        Some(Command::Boot(boot_args)) => boot(boot_args).await,
        Some(Command::List { modules_dir }) => list(&modules_dir).await,
        None => {
            eprintln!("No command given, see --help");
            ExitCode::FAILURE
        }
    }
}
