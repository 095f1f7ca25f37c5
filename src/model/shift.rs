use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::model::checkin::CheckinStatus;
use crate::schedule::window::ShiftTiming;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShiftStatus {
    Scheduled,
    InProgress,
    Completed,
    Missed,
    Cancelled,
}

impl ShiftStatus {
    /// Statuses the monitor still watches.
    pub fn is_monitored(self) -> bool {
        matches!(self, ShiftStatus::Scheduled | ShiftStatus::InProgress)
    }
}

/// A scheduled presence assignment. Lifecycle status and the tombstone are
/// kept apart: a cancelled shift is still a live row, a deleted one is not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub id: u64,
    pub site_id: u64,
    pub shift_type_id: u64,
    pub assignee_id: Option<u64>,
    pub shift_date: NaiveDate,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub required_checkin_interval_mins: u32,
    pub grace_minutes: u32,
    pub status: ShiftStatus,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub missed_count: u32,
    pub check_in_status: Option<CheckinStatus>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Shift {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Monitoring predicate: live status, assigned, not tombstoned and
    /// `now` inside `[starts_at, ends_at]`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status.is_monitored()
            && self.assignee_id.is_some()
            && !self.is_deleted()
            && self.starts_at <= now
            && now <= self.ends_at
    }

    pub fn is_assigned_to(&self, employee_id: u64) -> bool {
        self.assignee_id == Some(employee_id)
    }

    pub fn timing(&self) -> ShiftTiming {
        ShiftTiming {
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            interval_mins: self.required_checkin_interval_mins,
            grace_mins: self.grace_minutes,
        }
    }
}

/// Id and display name of a related row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NamedRef {
    pub id: u64,
    pub name: String,
}

/// An active shift together with the relations the dashboard shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveShift {
    pub shift: Shift,
    pub site: NamedRef,
    pub shift_type: NamedRef,
    pub assignee: NamedRef,
}

/// The fields re-read on an incremental cache refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftProgress {
    pub id: u64,
    pub status: ShiftStatus,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub missed_count: u32,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Changes written together with a batch of check-in rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckinProgress {
    pub last_heartbeat_at: DateTime<Utc>,
    pub check_in_status: CheckinStatus,
    pub status: ShiftStatus,
}

/// Wall-clock schedule of a shift type, used to derive absolute shift bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftTypeSchedule {
    pub id: u64,
    pub start_time: chrono::NaiveTime,
    pub end_time: chrono::NaiveTime,
    pub checkin_interval_mins: u32,
    pub grace_minutes: u32,
}

/// New absolute bounds for one shift after its type changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftBounds {
    pub shift_id: u64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub required_checkin_interval_mins: u32,
    pub grace_minutes: u32,
}
