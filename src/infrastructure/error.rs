use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid work period: {0}")]
    InvalidPeriod(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("backend rejected request: {message}")]
    BackendRejected {
        message: String,
        status: Option<u16>,
    },
    #[error("task {0} not found in work period")]
    UnknownTask(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
