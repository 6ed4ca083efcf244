use thiserror::Error;

/// Caller-side contract violations. Bad upstream data never produces one of
/// these; it degrades to a fallback payload or is ignored instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("session already started")]
    SessionAlreadyStarted,
    #[error("tool enhancer `{0}` is already registered")]
    DuplicateEnhancer(String),
    #[error("tool enhancers must be registered before the first message is processed")]
    RegistrationAfterStart,
}

/// Failure inside a single tool enhancer callback.
#[derive(Debug, Error)]
pub enum EnhancerError {
    #[error("{0}")]
    Message(String),
    #[error("invalid tool payload: {0}")]
    Json(#[from] serde_json::Error),
}
