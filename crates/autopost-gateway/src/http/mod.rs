pub mod auth;
pub mod health;
pub mod jobs;
pub mod tick;

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

use autopost_scheduler::ScheduleError;

pub type ApiError = (StatusCode, Json<Value>);

/// Map a scheduler error to an HTTP reply carrying its error code.
pub fn error_reply(e: &ScheduleError) -> ApiError {
    let status = match e {
        ScheduleError::JobNotFound { .. } => StatusCode::NOT_FOUND,
        ScheduleError::InvalidRule(_) | ScheduleError::VariantUnavailable(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ScheduleError::ClaimConflict { .. } => StatusCode::CONFLICT,
        ScheduleError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": e.to_string(), "code": e.code()})))
}
