//! Error types for nvsetup

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NvsetupError {
    #[error("Another detection or installation run is already in progress")]
    Busy,

    #[error("Select at least one of the NVIDIA driver or the CUDA toolkit")]
    EmptySelection,

    #[error("Invalid password or insufficient privileges")]
    PrivilegeDenied,

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User cancelled operation")]
    UserCancelled,

    #[error("Worker thread panicked")]
    WorkerPanicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, NvsetupError>;
