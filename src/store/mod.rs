//! Storage collaborators.
//!
//! Every write that must be atomic is a single trait method; the MySQL
//! implementation wraps it in a transaction. Uniqueness of alerts is left
//! to the database and surfaces as [`StoreError::UniqueViolation`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::model::alert::{Alert, AlertReason, NewAlert, Resolution};
use crate::model::attendance::{Attendance, NewAttendance};
use crate::model::checkin::{Checkin, NewCheckin};
use crate::model::shift::{
    ActiveShift, CheckinProgress, Shift, ShiftBounds, ShiftProgress, ShiftTypeSchedule,
};

#[cfg(test)]
pub mod memory;
pub mod mysql;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    UniqueViolation,
    /// A conditional write found the row changed since it was read.
    #[error("row changed concurrently")]
    Conflict,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation;
            }
        }
        StoreError::Database(e)
    }
}

#[async_trait]
pub trait ShiftStore: Send + Sync {
    /// Shifts satisfying the monitoring predicate at `now`, with relations.
    async fn active_shifts(&self, now: DateTime<Utc>) -> Result<Vec<ActiveShift>, StoreError>;

    /// Fresh progress fields for the given shifts. Ids that no longer exist
    /// are simply absent.
    async fn shift_progress(&self, ids: &[u64]) -> Result<Vec<ShiftProgress>, StoreError>;

    async fn find_shift(&self, id: u64) -> Result<Option<Shift>, StoreError>;

    /// Appends `entries` and applies `progress` in one transaction. Fails
    /// with [`StoreError::Conflict`] if the shift's heartbeat is no longer
    /// `expected_heartbeat`.
    async fn record_checkins(
        &self,
        shift_id: u64,
        expected_heartbeat: Option<DateTime<Utc>>,
        entries: Vec<NewCheckin>,
        progress: CheckinProgress,
    ) -> Result<Vec<Checkin>, StoreError>;

    /// Inserts the clock-in, stamps the heartbeat and moves a scheduled
    /// shift to in progress. [`StoreError::UniqueViolation`] if one exists.
    async fn record_attendance(&self, entry: NewAttendance) -> Result<Attendance, StoreError>;

    async fn record_heartbeat(&self, shift_id: u64, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn shift_type_schedule(
        &self,
        shift_type_id: u64,
    ) -> Result<Option<ShiftTypeSchedule>, StoreError>;

    /// Scheduled, live shifts of a type that have not started by `after`.
    async fn upcoming_shifts_of_type(
        &self,
        shift_type_id: u64,
        after: DateTime<Utc>,
    ) -> Result<Vec<(u64, NaiveDate)>, StoreError>;

    async fn update_shift_bounds(&self, bounds: &[ShiftBounds]) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Inserts a missed check-in and bumps the shift's `missed_count` in the
    /// same transaction.
    async fn insert_missed_checkin(&self, alert: NewAlert) -> Result<Alert, StoreError>;

    async fn insert_alert(&self, alert: NewAlert) -> Result<Alert, StoreError>;

    async fn find_alert(&self, id: u64) -> Result<Option<Alert>, StoreError>;

    async fn find_alert_by_key(
        &self,
        shift_id: u64,
        reason: AlertReason,
        window_start: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError>;

    async fn find_open_alert(
        &self,
        shift_id: u64,
        reason: AlertReason,
    ) -> Result<Option<Alert>, StoreError>;

    /// Stamps every unresolved alert for `(shift_id, reason)` and returns
    /// the rows it closed.
    async fn resolve_open_alerts(
        &self,
        shift_id: u64,
        reason: AlertReason,
        resolution: &Resolution,
    ) -> Result<Vec<Alert>, StoreError>;

    /// Sets the acknowledgement if unset and returns the row as stored.
    async fn acknowledge_alert(
        &self,
        id: u64,
        ack_by: u64,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError>;
}
