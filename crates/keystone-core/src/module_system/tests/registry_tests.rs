use std::sync::Arc;

use crate::module_system::error::{InstantiationError, LookupError, ModuleError};
use crate::module_system::registry::{ModuleRegistry, downcast_module};
use crate::module_system::traits::{ModuleHandle, ModuleState};
use crate::tests::integration::common::{Behavior, StubModule, core_api, new_log, plain};

fn stub(name: &str) -> ModuleHandle {
    Arc::new(StubModule::new(name, Behavior::Ready, new_log()))
}

fn registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new("keystone-");
    registry.set_descriptors(vec![core_api("keystone-server", "server"), plain("keystone-audit"), plain("raw")]);
    registry
}

#[test]
fn test_resolve_alias_and_prefixed() {
    let registry = registry();
    assert_eq!(registry.resolve("server"), Some("keystone-server"));
    assert_eq!(registry.resolve("keystone-server"), Some("keystone-server"));
    assert_eq!(registry.resolve("raw"), Some("raw"));
    assert_eq!(registry.resolve("keystone-raw"), Some("raw"));
    assert_eq!(registry.resolve("db"), None);
    assert_eq!(registry.descriptor("audit").map(|d| d.name.as_str()), Some("keystone-audit"));
}

#[test]
fn test_state_transitions() {
    let mut registry = registry();
    assert_eq!(registry.state("server"), Some(ModuleState::Discovered));
    assert_eq!(registry.state("db"), None);

    assert!(registry.claim("keystone-server"));
    assert!(!registry.claim("keystone-server"), "a name is claimed once");
    let handle = stub("keystone-server");
    registry.mark_constructed("keystone-server", Arc::clone(&handle));
    assert_eq!(registry.state("server"), Some(ModuleState::Constructed));
    registry.mark_initializing("keystone-server", Arc::clone(&handle));
    assert_eq!(registry.state("server"), Some(ModuleState::Initializing));
    assert!(registry.core_api("server").is_none(), "core API is only published once ready");
    assert_eq!(
        registry.get("server").unwrap_err(),
        LookupError::NotLoaded { name: "keystone-server".into(), state: ModuleState::Initializing }
    );

    registry.mark_ready("keystone-server", Arc::clone(&handle));
    assert_eq!(registry.state("server"), Some(ModuleState::Ready));
    assert!(Arc::ptr_eq(&registry.get("server").unwrap(), &handle));
    assert!(Arc::ptr_eq(&registry.core_api("server").unwrap(), &handle));
    assert!(registry.settled("keystone-server").unwrap().is_ok());
    assert_eq!(registry.loaded_names(), vec!["keystone-server"]);
}

#[test]
fn test_failures_are_recorded() {
    let mut registry = registry();
    assert!(registry.settled("keystone-audit").is_none());
    registry.claim("keystone-audit");
    let error = Arc::new(ModuleError::from(InstantiationError::NoFactory { name: "keystone-audit".into() }));
    registry.mark_failed("keystone-audit", Arc::clone(&error));

    assert_eq!(registry.state("audit"), Some(ModuleState::Failed));
    assert!(registry.settled("keystone-audit").unwrap().is_err());
    let failures = registry.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].module, "keystone-audit");
    assert!(registry.loaded_names().is_empty());
    assert_eq!(registry.get("db").unwrap_err(), LookupError::NotFound { name: "db".into() });
}

#[test]
fn test_typed_lookup() {
    let mut registry = registry();
    registry.mark_ready("raw", stub("raw"));
    let typed = registry.get_as::<StubModule>("keystone-raw").expect("typed lookup");
    assert_eq!(crate::module_system::Module::name(typed.as_ref()), "raw");
    assert!(downcast_module::<StubModule>(stub("x")).is_ok());
}
