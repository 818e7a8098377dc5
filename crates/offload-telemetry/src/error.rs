use thiserror::Error;

pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("internal error: {0}")]
    InternalError(String),
}

impl TelemetryError {
    pub fn internal(message: impl Into<String>) -> Self {
        TelemetryError::InternalError(message.into())
    }
}

impl From<log::SetLoggerError> for TelemetryError {
    fn from(error: log::SetLoggerError) -> Self {
        TelemetryError::InternalError(error.to_string())
    }
}
