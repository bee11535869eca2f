//! # Keystone Core Localisation
//!
//! The core only needs `translate(key, data) -> String`; that is the
//! [`Translator`] trait. [`LangTable`] is the stock implementation: phrases
//! come from `lang/<locale>.json` files under the application root and every
//! module root, nested objects are flattened to dotted keys, and every phrase
//! is stored as `<locale>.<key>`. Placeholders use the `%{name}` syntax and
//! are filled from a JSON object.
pub mod error;

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tokio::fs;

pub use error::LangError;

use crate::kernel::constants::{DEFAULT_LOCALE, LANG_DIR};

/// Turns a phrase key and its data into display text.
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str, data: &Value) -> String;
}

/// Text written when no phrase exists: the key plus the raw data.
pub fn fallback_message(key: &str, data: &Value) -> String {
    match data {
        Value::Null => key.to_string(),
        Value::Object(map) if map.is_empty() => key.to_string(),
        other => format!("{} {}", key, other),
    }
}

/// Replace every `%{name}` in `phrase` with the matching field of `data`.
///
/// Unknown placeholders are left as they are.
pub fn interpolate(phrase: &str, data: &Value) -> String {
    let mut out = String::with_capacity(phrase.len());
    let mut rest = phrase;
    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match data.get(name) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(value) => out.push_str(&value.to_string()),
                    None => {
                        out.push_str("%{");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Phrase table keyed by `<locale>.<key>`
#[derive(Debug, Clone)]
pub struct LangTable {
    locale: String,
    phrases: HashMap<String, String>,
}

impl LangTable {
    pub fn new(locale: &str) -> Self {
        Self { locale: locale.to_string(), phrases: HashMap::new() }
    }

    /// Table preloaded with the core's own English phrases
    pub fn builtin() -> Self {
        let mut table = Self::new(DEFAULT_LOCALE);
        for (key, phrase) in BUILTIN_PHRASES {
            table.insert(DEFAULT_LOCALE, key, phrase);
        }
        table
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn set_locale(&mut self, locale: &str) {
        self.locale = locale.to_string();
    }

    pub fn insert(&mut self, locale: &str, key: &str, phrase: &str) {
        self.phrases.insert(format!("{}.{}", locale, key), phrase.to_string());
    }

    pub fn phrase(&self, key: &str) -> Option<&str> {
        self.phrases
            .get(&format!("{}.{}", self.locale, key))
            .or_else(|| self.phrases.get(&format!("{}.{}", DEFAULT_LOCALE, key)))
            .map(String::as_str)
    }

    /// Locales that have at least one phrase
    pub fn locales(&self) -> Vec<String> {
        let mut locales: Vec<String> = self
            .phrases
            .keys()
            .filter_map(|k| k.split_once('.').map(|(locale, _)| locale.to_string()))
            .collect();
        locales.sort();
        locales.dedup();
        locales
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Load every `<root>/lang/<locale>.json`. A missing `lang` directory is not an error.
    pub async fn load_dir(&mut self, root: &Path) -> Result<usize, LangError> {
        let dir = root.join(LANG_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(LangError::Io { path: dir, operation: "read_dir".into(), source }),
        };

        let mut loaded = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| LangError::Io { path: dir.clone(), operation: "next_entry".into(), source })?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(locale) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let content = fs::read_to_string(&path)
                .await
                .map_err(|source| LangError::Io { path: path.clone(), operation: "read_phrases".into(), source })?;
            let value: Value = serde_json::from_str(&content)
                .map_err(|source| LangError::InvalidPhraseFile { path: path.clone(), source })?;
            loaded += self.insert_tree(&locale, "", &value);
        }
        log::debug!("Loaded {} phrase(s) from {}", loaded, dir.display());
        Ok(loaded)
    }

    fn insert_tree(&mut self, locale: &str, prefix: &str, value: &Value) -> usize {
        match value {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| {
                    let key = if prefix.is_empty() { k.clone() } else { format!("{}.{}", prefix, k) };
                    self.insert_tree(locale, &key, v)
                })
                .sum(),
            Value::String(phrase) if !prefix.is_empty() => {
                self.insert(locale, prefix, phrase);
                1
            }
            _ => 0,
        }
    }
}

impl Translator for LangTable {
    fn translate(&self, key: &str, data: &Value) -> String {
        match self.phrase(key) {
            Some(phrase) => interpolate(phrase, data),
            None => fallback_message(key, data),
        }
    }
}

const BUILTIN_PHRASES: &[(&str, &str)] = &[
    ("info.startapp", "Started %{app} from %{dir}"),
    ("info.loaded", "%{count} module(s) loaded"),
    ("error.loadmodules", "Failed to load modules: %{count} module(s) failed"),
    ("error.modulefailed", "%{module}: %{error}"),
    ("error.unknowndependency", "'%{name}' is not a known dependency"),
    ("error.startfailed", "Failed to start %{app}: %{error}"),
];
