//! Error types for the Circles indexing pipeline.

use thiserror::Error;

/// Errors that can occur while building schemas, decoding logs, or indexing.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Malformed event or table definition — fatal at startup.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A log whose topic matched a registered schema could not be decoded.
    /// This implies a schema/encoding mismatch and needs operator attention.
    #[error("Decode error in '{event}': {reason}")]
    Decode { event: String, reason: String },

    /// Block/receipt fetch or other pipeline I/O failure — recoverable,
    /// the state machine retries from the last recorded height.
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Store read/write failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid table or column identifier — never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The pipeline was cancelled before completing.
    #[error("Indexing aborted")]
    Aborted,
}

impl IndexError {
    /// Shorthand for a decode failure on a named event kind.
    pub fn decode(event: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            event: event.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the state machine may retry after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Pipeline(_) | Self::Storage(_) | Self::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(IndexError::Pipeline("rpc down".into()).is_recoverable());
        assert!(IndexError::Storage("connection reset".into()).is_recoverable());
        assert!(!IndexError::Validation("bad column".into()).is_recoverable());
        assert!(!IndexError::Schema("dup topic".into()).is_recoverable());
    }
}
