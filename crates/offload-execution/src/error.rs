use offload_common::error::CommonError;
use thiserror::Error;

pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("error in serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("error in configuration: {0}")]
    Config(#[from] CommonError),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ExecutionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ExecutionError::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ExecutionError::InternalError(message.into())
    }
}
