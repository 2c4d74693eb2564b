use thiserror::Error;

/// Stable error taxonomy surfaced by the claim engine.
///
/// Each variant carries a machine-readable `kind()` tag that transports map
/// onto their own status codes. The engine never retries internally; the
/// only retryable kind is `Conflict`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not permitted: {0}")]
    Authorization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Authorization(_) => "authorization",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Upstream(_) => "upstream",
        }
    }

    /// Whether the caller may safely resubmit the same request.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
