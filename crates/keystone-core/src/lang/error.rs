use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LangError {
    #[error("I/O error during operation '{operation}' on path '{path}': {source}")]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid phrase file '{path}': {source}")]
    InvalidPhraseFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
