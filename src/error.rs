//! Error taxonomy shared by the platform layer, storage and the command surface.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A named-object or window call failed for a reason other than "already exists".
///
/// Never fatal: callers log it and run without the dependent feature.
#[derive(Error, Debug)]
#[error("{op} failed for {name}: {source}")]
pub struct PlatformError {
    pub op: &'static str,
    pub name: String,
    #[source]
    pub source: io::Error,
}

impl PlatformError {
    pub fn new(op: &'static str, name: impl Into<String>, source: io::Error) -> Self {
        Self {
            op,
            name: name.into(),
            source,
        }
    }
}

/// Window or monitor rectangle could not be read this tick.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("window or monitor geometry unavailable")]
pub struct GeometryUnavailable;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("todo {0} not found")]
    NotFound(String),
}

/// Failure of a UI-issued command. Carries a message the UI can show as-is.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to save: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid due date {value:?}: {source}")]
    InvalidDueDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("failed to update start-on-boot: {0}")]
    LoginItem(String),
}
