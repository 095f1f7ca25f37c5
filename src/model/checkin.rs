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
pub enum CheckinStatus {
    OnTime,
    Late,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckinSource {
    /// Submitted from the assignee's device
    Mobile,
    Web,
    /// Synthesized for a slot that passed without a check-in
    Backfill,
}

/// One entry of the append-only check-in log. `at` is the slot the entry
/// satisfies; for backfilled entries that is the missed slot, not the
/// submission time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checkin {
    pub id: u64,
    pub shift_id: u64,
    pub at: DateTime<Utc>,
    pub status: CheckinStatus,
    pub source: CheckinSource,
    pub location: Option<Location>,
    pub lateness_mins: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCheckin {
    pub shift_id: u64,
    pub at: DateTime<Utc>,
    pub status: CheckinStatus,
    pub source: CheckinSource,
    pub location: Option<Location>,
    pub lateness_mins: i64,
}
