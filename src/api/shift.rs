use crate::auth::auth::AuthUser;
use crate::model::alert::AlertReason;
use crate::model::checkin::CheckinSource;
use crate::model::location::Location;
use crate::monitor::checkin::CheckInHandler;
use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckinRequest {
    /// Where the check-in was submitted from. Defaults to `mobile`.
    #[schema(example = "mobile")]
    pub source: Option<CheckinSource>,
    pub location: Option<Location>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AttendanceRequest {
    pub location: Option<Location>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportAlertRequest {
    #[schema(example = "geofence_breach")]
    pub reason: AlertReason,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveAlertRequest {
    #[schema(example = "geofence_breach")]
    pub reason: AlertReason,
    #[schema(example = "Back inside the perimeter")]
    pub note: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportAlertResponse {
    #[schema(example = 42)]
    pub alert_id: u64,
    /// False when an open alert for the same reason already existed
    pub created: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolveAlertResponse {
    #[schema(example = 1)]
    pub resolved_count: usize,
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/shifts/{id}/checkin",
    params(("id", Path, description = "Shift ID")),
    request_body = CheckinRequest,
    responses(
        (status = 200, description = "Check-in recorded", body = CheckinReceipt),
        (status = 400, description = "too_early, already_completed or shift_not_active", body = Object, example = json!({
            "error": "too_early",
            "message": "Check-in window has not opened yet"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "not_assigned"),
        (status = 404, description = "Shift not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Shift"
)]
pub async fn checkin(
    auth: AuthUser,
    handler: web::Data<CheckInHandler>,
    path: web::Path<u64>,
    payload: web::Json<CheckinRequest>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;
    let shift_id = path.into_inner();
    let CheckinRequest { source, location } = payload.into_inner();

    let source = source.unwrap_or(CheckinSource::Mobile);
    if source == CheckinSource::Backfill {
        return Err(actix_web::error::ErrorBadRequest(
            "backfill entries are created by the server",
        ));
    }

    let receipt = handler
        .checkin(shift_id, employee_id, source, location)
        .await?;
    Ok(HttpResponse::Ok().json(receipt))
}

/// Clock-in for a shift
#[utoipa::path(
    post,
    path = "/api/shifts/{id}/attendance",
    params(("id", Path, description = "Shift ID")),
    request_body = AttendanceRequest,
    responses(
        (status = 200, description = "Attendance recorded", body = AttendanceReceipt),
        (status = 400, description = "already_recorded or shift_not_active"),
        (status = 403, description = "not_assigned"),
        (status = 404, description = "Shift not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Shift"
)]
pub async fn attendance(
    auth: AuthUser,
    handler: web::Data<CheckInHandler>,
    path: web::Path<u64>,
    payload: Option<web::Json<AttendanceRequest>>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;
    let location = payload.and_then(|p| p.into_inner().location);

    let receipt = handler
        .attendance(path.into_inner(), employee_id, location)
        .await?;
    Ok(HttpResponse::Ok().json(receipt))
}

/// Location heartbeat
#[utoipa::path(
    post,
    path = "/api/shifts/{id}/heartbeat",
    params(("id", Path, description = "Shift ID")),
    responses(
        (status = 200, description = "Heartbeat recorded", body = HeartbeatReceipt),
        (status = 400, description = "shift_not_active"),
        (status = 403, description = "not_assigned"),
        (status = 404, description = "Shift not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Shift"
)]
pub async fn heartbeat(
    auth: AuthUser,
    handler: web::Data<CheckInHandler>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;
    let receipt = handler.heartbeat(path.into_inner(), employee_id).await?;
    Ok(HttpResponse::Ok().json(receipt))
}

/// Report an alert for a shift
#[utoipa::path(
    post,
    path = "/api/shifts/{id}/alerts",
    params(("id", Path, description = "Shift ID")),
    request_body = ReportAlertRequest,
    responses(
        (status = 200, description = "Alert raised, or the open one returned", body = ReportAlertResponse),
        (status = 400, description = "invalid_reason or shift_not_active"),
        (status = 403, description = "not_assigned"),
        (status = 404, description = "Shift not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Alert"
)]
pub async fn report_alert(
    auth: AuthUser,
    handler: web::Data<CheckInHandler>,
    path: web::Path<u64>,
    payload: web::Json<ReportAlertRequest>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;
    let outcome = handler
        .report_alert(path.into_inner(), employee_id, payload.reason)
        .await?;

    Ok(HttpResponse::Ok().json(ReportAlertResponse {
        alert_id: outcome.alert().id,
        created: outcome.is_created(),
    }))
}

/// Resolve the caller's open alerts for a reason
#[utoipa::path(
    put,
    path = "/api/shifts/{id}/alerts/resolve",
    params(("id", Path, description = "Shift ID")),
    request_body = ResolveAlertRequest,
    responses(
        (status = 200, description = "Open alerts resolved", body = ResolveAlertResponse),
        (status = 403, description = "not_assigned"),
        (status = 404, description = "Shift not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Alert"
)]
pub async fn resolve_alert(
    auth: AuthUser,
    handler: web::Data<CheckInHandler>,
    path: web::Path<u64>,
    payload: web::Json<ResolveAlertRequest>,
) -> actix_web::Result<impl Responder> {
    let employee_id = auth.require_employee()?;
    let ResolveAlertRequest { reason, note } = payload.into_inner();

    let resolved = handler
        .resolve_alert(path.into_inner(), employee_id, reason, note)
        .await?;
    Ok(HttpResponse::Ok().json(ResolveAlertResponse {
        resolved_count: resolved.len(),
    }))
}
