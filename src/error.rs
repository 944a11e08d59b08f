use thiserror::Error;

/// Service-level error taxonomy. Validation and NotFound map to 4xx at the
/// HTTP boundary; Provider covers transient upstream failures (weather API,
/// push/SMS gateways) that are degraded or logged, never escalated across
/// subscriptions. Timeout is the elapsed form of the per-call deadline
/// every external await carries.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("provider error: {0}")]
    Provider(String),

    #[error("operation timed out")]
    Timeout,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
