use thiserror::Error;

/// A convenience `Result` alias using [`ScoutlineError`].
pub type ScoutlineResult<T> = Result<T, ScoutlineError>;

/// Top-level error type for the Scoutline engine.
///
/// The first five variants form the execution taxonomy surfaced to callers
/// of the orchestrator; the rest come from the surrounding subsystems.
#[derive(Error, Debug)]
pub enum ScoutlineError {
    /// The referenced agent (or run) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The agent exists but is not in a state that allows the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// No executor is registered for the agent's category.
    #[error(
        "No executor registered for category '{category}' (available: {})",
        .available.join(", ")
    )]
    NoExecutor {
        /// The category that was looked up.
        category: String,
        /// Every category that does have an executor.
        available: Vec<String>,
    },

    /// A dependency of the executor could not be reached. The agent stays schedulable.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The executor failed for a reason that needs attention.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// A persistence backend failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration could not be parsed or is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// An outbound HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A notification channel failed.
    #[error("Channel error: {0}")]
    Channel(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScoutlineError {
    /// HTTP-equivalent status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ScoutlineError::NotFound(_) => 404,
            ScoutlineError::InvalidState(_) => 409,
            ScoutlineError::NoExecutor { .. } => 501,
            ScoutlineError::UpstreamUnavailable(_) => 503,
            ScoutlineError::ExecutionFailed(_) => 400,
            ScoutlineError::Http(_) => 502,
            ScoutlineError::Store(_)
            | ScoutlineError::Config(_)
            | ScoutlineError::Channel(_)
            | ScoutlineError::Json(_)
            | ScoutlineError::Io(_) => 500,
        }
    }

    /// True when the agent itself is fine and the caller should simply try later.
    pub fn is_retryable_later(&self) -> bool {
        matches!(self, ScoutlineError::UpstreamUnavailable(_))
    }
}

/// Error returned by an executor at the execution boundary.
///
/// The orchestrator only distinguishes two outcomes: the upstream service
/// could not be reached, or the work itself failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// Connection refused, service down, or similar connectivity failure.
    #[error("{0}")]
    Unavailable(String),

    /// Any other failure raised while executing.
    #[error("{0}")]
    Failed(String),
}

const UNAVAILABLE_MARKERS: &[&str] = &["econnrefused", "connection refused", "service is unavailable"];

impl ExecutorError {
    /// Classify a raw error message using the connectivity markers.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if UNAVAILABLE_MARKERS.iter().any(|m| lower.contains(m)) {
            ExecutorError::Unavailable(message)
        } else {
            ExecutorError::Failed(message)
        }
    }

    /// Whether this is a connectivity failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ExecutorError::Unavailable(_))
    }

    /// The raw message, without classification.
    pub fn message(&self) -> &str {
        match self {
            ExecutorError::Unavailable(m) | ExecutorError::Failed(m) => m,
        }
    }
}

impl From<ExecutorError> for ScoutlineError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Unavailable(m) => ScoutlineError::UpstreamUnavailable(m),
            ExecutorError::Failed(m) => ScoutlineError::ExecutionFailed(m),
        }
    }
}
