//! Error types for consrv.

use std::io;

/// Errors produced by the consrv framework.
#[derive(Debug, thiserror::Error)]
pub enum ConsrvError {
    #[error("registry error: {0}")]
    Registry(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("editor error: {0}")]
    Editor(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("command error: {0}")]
    Command(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ConsrvError>;
