use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::store::StoreError;

/// Why a presence request was refused. The snake_case name is the code
/// returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Rejection {
    NotAssigned,
    TooEarly,
    AlreadyCompleted,
    ShiftNotActive,
    AlreadyRecorded,
    InvalidReason,
}

impl Rejection {
    pub fn message(self) -> &'static str {
        match self {
            Rejection::NotAssigned => "Shift is not assigned to you",
            Rejection::TooEarly => "Check-in window has not opened yet",
            Rejection::AlreadyCompleted => "Check-in for this slot was already recorded",
            Rejection::ShiftNotActive => "Shift is not active",
            Rejection::AlreadyRecorded => "Attendance already recorded for this shift",
            Rejection::InvalidReason => "This alert reason cannot be reported",
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Rejected(Rejection),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Unavailable(&'static str),
    #[error(transparent)]
    Store(StoreError),
}

impl From<Rejection> for ServiceError {
    fn from(rejection: Rejection) -> Self {
        ServiceError::Rejected(rejection)
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            other => ServiceError::Store(other),
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Rejected(Rejection::NotAssigned) => StatusCode::FORBIDDEN,
            ServiceError::Rejected(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ServiceError::Rejected(rejection) => json!({
                "error": rejection.as_ref(),
                "message": rejection.message(),
            }),
            ServiceError::NotFound(what) => json!({
                "error": "not_found",
                "message": format!("{what} not found"),
            }),
            ServiceError::Unavailable(what) => json!({
                "error": "unavailable",
                "message": what,
            }),
            ServiceError::Store(e) => {
                tracing::error!(error = %e, "Storage failure");
                json!({
                    "error": "internal",
                    "message": "Internal Server Error",
                })
            }
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use actix_web::body::to_bytes;

    use super::*;

    async fn body_of(e: ServiceError) -> (StatusCode, serde_json::Value) {
        let resp = e.error_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn rejections_carry_their_code() {
        let (status, body) = body_of(Rejection::TooEarly.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "too_early");

        let (status, body) = body_of(Rejection::NotAssigned.into()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "not_assigned");

        let (_, body) = body_of(Rejection::AlreadyCompleted.into()).await;
        assert_eq!(body["error"], "already_completed");
    }

    #[actix_web::test]
    async fn store_not_found_becomes_404() {
        let (status, body) = body_of(StoreError::NotFound("shift").into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "shift not found");
    }

    #[actix_web::test]
    async fn database_errors_are_not_leaked() {
        let e: ServiceError = StoreError::Database(sqlx::Error::PoolTimedOut).into();
        let (status, body) = body_of(e).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal Server Error");
    }
}
