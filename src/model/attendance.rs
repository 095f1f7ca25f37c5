use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::model::location::Location;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
}

/// Initial clock-in for a shift, at most one per shift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attendance {
    pub id: u64,
    pub shift_id: u64,
    pub employee_id: u64,
    pub recorded_at: DateTime<Utc>,
    pub status: AttendanceStatus,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAttendance {
    pub shift_id: u64,
    pub employee_id: u64,
    pub recorded_at: DateTime<Utc>,
    pub status: AttendanceStatus,
    pub location: Option<Location>,
}
