use std::env;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrontdeskError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] env::VarError),
    #[error("Handoff missing required field: {0}")]
    MissingFieldError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Lock error: {0}")]
    LockError(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, FrontdeskError>;
