//! Engine error taxonomy

use thiserror::Error;

use crate::risk::RejectReason;

/// Errors that can occur in the grid engine
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("Insufficient data: need {required} candles, got {got}")]
    InsufficientData { required: usize, got: usize },

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Grid level not found: id {0}")]
    LevelNotFound(u32),

    #[error("Position not found: {0}")]
    PositionNotFound(uuid::Uuid),

    #[error("Risk rejected: {0}")]
    RiskRejected(RejectReason),

    #[error("Oracle timed out after {0}ms")]
    OracleTimeout(u64),

    #[error("Oracle error: {0}")]
    OracleError(String),

    #[error("Exchange order failed: {0}")]
    ExternalOrderFailure(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Ledger integrity violation: {0}")]
    Integrity(String),

    #[error("State persistence error: {0}")]
    StatePersistence(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::JsonParse(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::StatePersistence(err.to_string())
    }
}

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;
