/// Application name
pub const APP_NAME: &str = "Keystone";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current module API version; manifests declare a `keystone_versions` range against it
pub const API_VERSION: &str = "0.1.0";

/// Prefix of fully-qualified module package names (`keystone-server` for alias `server`)
pub const MODULE_PREFIX: &str = "keystone-";

/// Manifest file looked up in every module directory
pub const MANIFEST_FILE_NAME: &str = "keystone.json";

/// Directory (relative to the app root and each module root) holding phrase files
pub const LANG_DIR: &str = "lang";

/// Locale used when the config does not name one
pub const DEFAULT_LOCALE: &str = "en";
