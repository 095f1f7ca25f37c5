use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertReason {
    MissedCheckin,
    MissedAttendance,
    GeofenceBreach,
    LocationServicesDisabled,
}

impl AlertReason {
    pub fn severity(self) -> AlertSeverity {
        match self {
            AlertReason::GeofenceBreach => AlertSeverity::Critical,
            AlertReason::MissedCheckin | AlertReason::MissedAttendance => AlertSeverity::High,
            AlertReason::LocationServicesDisabled => AlertSeverity::Medium,
        }
    }

    /// Reasons an assignee may raise themselves. Missed check-ins are only
    /// ever raised by the reconciliation loop.
    pub fn is_reportable(self) -> bool {
        !matches!(self, AlertReason::MissedCheckin)
    }

    /// Reasons cleared by a fresh location fix from the assignee.
    pub const CLEARED_BY_PRESENCE: [AlertReason; 2] = [
        AlertReason::GeofenceBreach,
        AlertReason::LocationServicesDisabled,
    ];
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResolutionType {
    /// Cleared by the system when the condition went away
    Auto,
    /// Cleared by the assignee
    SelfResolved,
    /// Cleared by a supervisor
    Supervisor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Alert {
    #[schema(example = 42)]
    pub id: u64,
    pub shift_id: u64,
    pub site_id: u64,
    pub reason: AlertReason,
    pub severity: AlertSeverity,
    /// Due slot for missed check-ins, report time for reported reasons
    #[schema(value_type = String, format = "date-time")]
    pub window_start: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub ack_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<u64>,
    pub resolution_type: Option<ResolutionType>,
    pub resolution_note: Option<String>,
}

impl Alert {
    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub shift_id: u64,
    pub site_id: u64,
    pub reason: AlertReason,
    pub window_start: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NewAlert {
    pub fn severity(&self) -> AlertSeverity {
        self.reason.severity()
    }
}

/// Stamp applied to every alert closed by one resolve call.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub resolved_at: DateTime<Utc>,
    pub resolved_by: Option<u64>,
    pub resolution_type: ResolutionType,
    pub note: Option<String>,
}
