//! Typed failures of the local side: collecting, staging and packing.
//!
//! Remote operations report through `anyhow` instead; their failures are
//! mostly stderr text from a shell.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    /// The configuration directory to migrate does not exist.
    #[error("Claude config directory not found at {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("archive: {0}")]
    Archive(String),
}

impl Error {
    pub fn archive(message: impl fmt::Display) -> Self {
        Error::Archive(message.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
