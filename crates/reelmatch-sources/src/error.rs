use reelmatch_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{source_name} temporarily unavailable: {reason}")]
    Transient { source_name: String, reason: String },

    #[error("{0} is unavailable")]
    Unavailable(String),

    #[error("rating for {external_ref} has no timestamp")]
    MissingTimestamp { external_ref: String },

    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid input: {0}")]
    Core(#[from] CoreError),
}

impl SourceError {
    /// Whether a retry wrapper should try the call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_retry() {
        let transient = SourceError::Transient {
            source_name: "imdb".into(),
            reason: "503".into(),
        };
        assert!(transient.is_retryable());
        assert!(!SourceError::Unavailable("imdb".into()).is_retryable());
        assert!(!SourceError::Core(CoreError::MissingTitle).is_retryable());
    }

    #[test]
    fn display_names_the_source() {
        let err = SourceError::Transient {
            source_name: "rotten_tomatoes".into(),
            reason: "timeout".into(),
        };
        assert_eq!(err.to_string(), "rotten_tomatoes temporarily unavailable: timeout");
    }
}
