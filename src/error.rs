use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A broken upstream invariant; fatal to the run.
    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Bound source builder error: {0}")]
    Builder(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Task canceled")]
    Canceled,

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("Dispatcher has shut down")]
    DispatcherShutdown,
}

impl IngestError {
    /// Whether the error reflects a broken invariant rather than a local
    /// failure.
    pub fn is_structural(&self) -> bool {
        matches!(self, IngestError::Structural(_))
    }
}

impl From<serde_yaml::Error> for IngestError {
    fn from(err: serde_yaml::Error) -> Self {
        IngestError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
