use thiserror::Error;

/// Recoverable failures: sink I/O, corrupt bytes read back from a page file, bad config.
///
/// Structural invariant violations inside the writer and builder are not represented
/// here. They panic, so a broken tree can never be mistaken for a retryable condition.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("page error: {0}")]
    Page(#[from] PageError),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("corrupt page file: {0}")]
    Corrupt(String),

    #[error("page sink error: {0}")]
    Sink(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("page corrupt: {0}")]
    Corrupt(String),
}
