use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Invalid pattern payload: {0}")]
    Validation(String),

    #[error("Invalid cell color: {0:?}")]
    InvalidColor(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode output: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PatternError {
    /// Validation failures are expected user-facing conditions; everything else is exceptional.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PatternError::Validation(_) | PatternError::InvalidColor(_) | PatternError::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PatternError>;
