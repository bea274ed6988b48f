use thiserror::Error;

/// Error taxonomy for the fraud engine. Only `Persistence` is allowed to
/// fail a job; everything else is recovered close to where it happens.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Image bytes could not be decoded into anything hashable. The affected
    /// image is skipped; never fatal to an evaluation.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// A rule checker blew up. Logged by the engine and treated as
    /// "no finding" for that rule so the remaining rules still run.
    #[error("checker '{checker}' failed: {message}")]
    Checker { checker: String, message: String },

    /// Listing or seller vanished between enqueue and processing. Expected
    /// race with deletion; the processor aborts quietly.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Store write failed. Propagates so the job fails and the queue
    /// retry policy takes over.
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Notification/email delivery failed. Logged, never rolls back state
    /// written before it.
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("invalid rule parameters: {0}")]
    BadParameters(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// True for errors the caller should swallow after logging.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::Persistence(_))
    }
}
