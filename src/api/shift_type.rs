use crate::auth::auth::AuthUser;
use crate::error::ServiceError;
use crate::jobs::{EnqueueError, Job, JobQueue};
use actix_web::{HttpResponse, Responder, web};
use serde_json::json;

/// Recompute the times of upcoming shifts of a type
///
/// Runs in the background; the response only confirms the job was queued.
#[utoipa::path(
    post,
    path = "/api/shift-types/{id}/recalculate",
    params(("id", Path, description = "Shift type ID")),
    responses(
        (status = 202, description = "Recalculation queued", body = Object, example = json!({
            "message": "Recalculation queued"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 503, description = "Job queue is full")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Shift type"
)]
pub async fn recalculate(
    auth: AuthUser,
    queue: web::Data<JobQueue>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let shift_type_id = path.into_inner();
    queue
        .enqueue(Job::RecalculateShiftTimes { shift_type_id })
        .map_err(|e| match e {
            EnqueueError::Full => ServiceError::Unavailable("Job queue is full, try again later"),
            EnqueueError::Closed => ServiceError::Unavailable("Job runner is not running"),
        })?;

    Ok(HttpResponse::Accepted().json(json!({
        "message": "Recalculation queued"
    })))
}
