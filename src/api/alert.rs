use crate::auth::auth::AuthUser;
use crate::monitor::checkin::CheckInHandler;
use actix_web::{HttpResponse, Responder, web};

/// Acknowledge an alert
#[utoipa::path(
    put,
    path = "/api/alerts/{id}/acknowledge",
    params(("id", Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Alert as stored; acknowledging twice keeps the first acknowledgement", body = Alert),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Supervisor/Admin only"),
        (status = 404, description = "Alert not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Alert"
)]
pub async fn acknowledge(
    auth: AuthUser,
    handler: web::Data<CheckInHandler>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_supervisor_or_admin()?;

    let ack = handler.acknowledge(path.into_inner(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(ack.alert))
}
