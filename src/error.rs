use crate::schema::SchemaError;
use crate::transport::TransportError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SuprsendError>;

/// Errors surfaced by the client outside of bulk aggregation.
///
/// Bulk flows never return these for per-record or per-chunk failures; those are
/// folded into the [`BulkResponse`](crate::bulk::BulkResponse) instead.
#[derive(Debug, Error)]
pub enum SuprsendError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to build request: {0}")]
    RequestBuild(String),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Validation(#[from] RecordError),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// A single record failed validation before any network call was attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RecordError {
    message: String,
}

impl RecordError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for RecordError {
    fn from(err: serde_json::Error) -> Self {
        RecordError::new(format!("body is not JSON serializable: {err}"))
    }
}

impl From<SchemaError> for RecordError {
    fn from(err: SchemaError) -> Self {
        RecordError::new(err.to_string())
    }
}
