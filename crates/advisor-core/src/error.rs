use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Insufficient signals: no usable signal category supplied")]
    InsufficientSignals,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Watch entry {0} not found")]
    EntryNotFound(i64),
}
