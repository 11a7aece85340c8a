use axum::http::StatusCode;

use super::gateway::DirectoryError;

/// Error taxonomy shared by the store, the services, and the router.
///
/// Every rejected operation names the invariant it violated; the router
/// surfaces these verbatim so "no spots left" stays distinguishable from
/// "already booked" or "too late to cancel".
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("no spots left for this viewing")]
    CapacityExceeded,
    #[error("{0}")]
    BadRequest(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl SchedulingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SchedulingError::NotFound(_) => StatusCode::NOT_FOUND,
            SchedulingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SchedulingError::Conflict(_) | SchedulingError::CapacityExceeded => {
                StatusCode::CONFLICT
            }
            SchedulingError::Forbidden(_) => StatusCode::FORBIDDEN,
            SchedulingError::BadRequest(_) => StatusCode::BAD_REQUEST,
            SchedulingError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DirectoryError> for SchedulingError {
    fn from(value: DirectoryError) -> Self {
        SchedulingError::Unavailable(value.to_string())
    }
}
