use thiserror::Error;

/// Errors raised while exposing metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The output sink rejected a write.
    #[error("Failed to write exposition: {0}")]
    Write(#[from] std::io::Error),
}

/// Result type alias using [`MetricsError`].
pub type Result<T> = std::result::Result<T, MetricsError>;
