use crate::api::shift::{
    AttendanceRequest, CheckinRequest, ReportAlertRequest, ReportAlertResponse,
    ResolveAlertRequest, ResolveAlertResponse,
};
use crate::model::alert::{Alert, AlertReason, AlertSeverity, ResolutionType};
use crate::model::attendance::AttendanceStatus;
use crate::model::checkin::{CheckinSource, CheckinStatus};
use crate::model::location::Location;
use crate::monitor::checkin::{AttendanceReceipt, CheckinReceipt, HeartbeatReceipt};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sitewatch API",
        version = "0.1.0",
        description = r#"
## Shift presence monitoring

Assignees on a shift check in at a fixed interval. A background loop raises
`missed_checkin` alerts for slots that pass without one and streams per-site
dashboard snapshots to supervisors.

### Security
Every endpoint expects a **JWT Bearer** access token. Presence endpoints act
for the employee linked to the token; acknowledging alerts needs a
supervisor or admin, recalculating shift times needs an admin.

### Errors
Rejected requests return `{"error": <code>, "message": <text>}` where
`code` is one of `not_assigned`, `too_early`, `already_completed`,
`shift_not_active`, `already_recorded`, `invalid_reason`.
"#,
    ),
    paths(
        crate::api::shift::checkin,
        crate::api::shift::attendance,
        crate::api::shift::heartbeat,
        crate::api::shift::report_alert,
        crate::api::shift::resolve_alert,

        crate::api::alert::acknowledge,

        crate::api::shift_type::recalculate,

        crate::api::dashboard::stream
    ),
    components(
        schemas(
            CheckinRequest,
            AttendanceRequest,
            ReportAlertRequest,
            ResolveAlertRequest,
            ReportAlertResponse,
            ResolveAlertResponse,
            CheckinReceipt,
            AttendanceReceipt,
            HeartbeatReceipt,
            Alert,
            AlertReason,
            AlertSeverity,
            ResolutionType,
            AttendanceStatus,
            CheckinSource,
            CheckinStatus,
            Location
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Shift", description = "Check-in, attendance and heartbeat APIs"),
        (name = "Alert", description = "Alert reporting and handling APIs"),
        (name = "Shift type", description = "Shift type maintenance APIs"),
        (name = "Dashboard", description = "Live site dashboards"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
