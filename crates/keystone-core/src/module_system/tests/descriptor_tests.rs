use std::path::{Path, PathBuf};

use semver::Version;

use crate::module_system::descriptor::ModuleDescriptor;
use crate::module_system::error::DiscoveryError;
use crate::module_system::version::VersionRange;

fn parse(content: &str) -> Result<ModuleDescriptor, DiscoveryError> {
    ModuleDescriptor::from_manifest_str(content, Path::new("/mods/x/keystone.json"), Path::new("/mods/x"))
}

#[test]
fn test_manifest_minimal_defaults() {
    let descriptor = parse(r#"{ "name": "keystone-x", "version": "0.3.1" }"#).unwrap();
    assert_eq!(descriptor.name, "keystone-x");
    assert_eq!(descriptor.version, Version::new(0, 3, 1));
    assert_eq!(descriptor.description, "");
    assert!(!descriptor.is_core_api);
    assert!(descriptor.core_api_name.is_none());
    assert_eq!(descriptor.root_dir, PathBuf::from("/mods/x"));
    assert!(descriptor.config_schema_path().is_none());
    assert_eq!(descriptor.keystone_versions, VersionRange::any());
    assert!(descriptor.is_module);
}

#[test]
fn test_manifest_library_package() {
    let descriptor = parse(r#"{ "name": "keystone-shared", "version": "1.0.0", "module": false }"#).unwrap();
    assert!(!descriptor.is_module);
    assert!(!ModuleDescriptor::builder("keystone-shared", "1.0.0").library().build().is_module);
}

#[test]
fn test_manifest_full() {
    let descriptor = parse(
        r#"{
            "name": "keystone-server",
            "version": "1.0.0",
            "description": "HTTP front",
            "core_api_name": "server",
            "keystone_versions": "^0.1",
            "config_schema": "schema.json"
        }"#,
    )
    .unwrap();
    assert!(descriptor.is_core_api, "a core API name implies a core API module");
    assert_eq!(descriptor.core_api_name.as_deref(), Some("server"));
    assert_eq!(descriptor.config_schema_path(), Some(PathBuf::from("/mods/x/schema.json")));
    assert!(descriptor.is_compatible_with(&Version::new(0, 1, 7)));
    assert!(!descriptor.is_compatible_with(&Version::new(0, 2, 0)));
    assert_eq!(descriptor.short_name("keystone-"), "server");
}

#[test]
fn test_manifest_errors() {
    assert!(matches!(parse("not json"), Err(DiscoveryError::InvalidManifest { source: Some(_), .. })));
    assert!(matches!(
        parse(r#"{ "name": "  ", "version": "1.0.0" }"#),
        Err(DiscoveryError::InvalidManifest { source: None, .. })
    ));
    assert!(matches!(parse(r#"{ "name": "x", "version": "1.0" }"#), Err(DiscoveryError::InvalidManifest { .. })));
    assert!(matches!(
        parse(r#"{ "name": "x", "version": "1.0.0", "keystone_versions": "><" }"#),
        Err(DiscoveryError::InvalidManifest { .. })
    ));
}

#[test]
fn test_builder() {
    let descriptor = ModuleDescriptor::builder("keystone-logger", "2.1.0")
        .description("logs")
        .core_api("logger")
        .root_dir("/opt/logger")
        .config_schema("schema.json")
        .keystone_versions(VersionRange::from_constraint(">=0.1").unwrap())
        .build();
    assert_eq!(descriptor.version, Version::new(2, 1, 0));
    assert!(descriptor.is_core_api);
    assert_eq!(descriptor.core_api_name.as_deref(), Some("logger"));
    assert_eq!(descriptor.config_schema_path(), Some(PathBuf::from("/opt/logger/schema.json")));
    assert_eq!(descriptor.short_name("other-"), "keystone-logger");
}
