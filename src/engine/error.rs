//! Engine error taxonomy

use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("a field named '{0}' already exists in this template")]
    DuplicateFieldName(String),

    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),

    #[error("validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    /// Unknown username and wrong password are deliberately the same variant.
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("credential error: {0}")]
    Credential(String),

    #[error("file storage error: {0}")]
    File(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateFieldName(name) => EngineError::DuplicateFieldName(name),
            StoreError::DuplicateUsername(name) => EngineError::DuplicateUsername(name),
            StoreError::NotFound => EngineError::NotFound("record"),
            other => EngineError::Storage(other),
        }
    }
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::ValidationFailed(vec![message.into()])
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
