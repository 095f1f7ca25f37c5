//! In-process store for tests. Enforces the same unique keys as the MySQL
//! schema so the ledger's duplicate handling is exercised for real.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{AlertStore, ShiftStore, StoreError};
use crate::model::alert::{Alert, AlertReason, NewAlert, Resolution};
use crate::model::attendance::{Attendance, NewAttendance};
use crate::model::checkin::{Checkin, NewCheckin};
use crate::model::shift::{
    ActiveShift, CheckinProgress, NamedRef, Shift, ShiftBounds, ShiftProgress, ShiftStatus,
    ShiftTypeSchedule,
};

#[derive(Default)]
struct State {
    shifts: BTreeMap<u64, ActiveShift>,
    shift_types: HashMap<u64, ShiftTypeSchedule>,
    attendance: Vec<Attendance>,
    checkins: Vec<Checkin>,
    alerts: Vec<Alert>,
    next_id: u64,
    fail_reads: bool,
    failing_alert_shifts: HashSet<u64>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn has_attendance(&self, shift_id: u64) -> bool {
        self.attendance.iter().any(|a| a.shift_id == shift_id)
    }

    fn check_alert_write(&self, alert: &NewAlert) -> Result<(), StoreError> {
        if self.failing_alert_shifts.contains(&alert.shift_id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let window_taken = self.alerts.iter().any(|a| {
            a.shift_id == alert.shift_id
                && a.reason == alert.reason
                && a.window_start == alert.window_start
        });
        let open_taken = alert.reason.is_reportable()
            && self
                .alerts
                .iter()
                .any(|a| a.shift_id == alert.shift_id && a.reason == alert.reason && a.is_open());
        if window_taken || open_taken {
            return Err(StoreError::UniqueViolation);
        }
        Ok(())
    }

    fn push_alert(&mut self, alert: NewAlert) -> Alert {
        let row = Alert {
            id: self.next_id(),
            shift_id: alert.shift_id,
            site_id: alert.site_id,
            reason: alert.reason,
            severity: alert.severity(),
            window_start: alert.window_start,
            created_at: alert.created_at,
            acknowledged_at: None,
            ack_by: None,
            resolved_at: None,
            resolved_by: None,
            resolution_type: None,
            resolution_note: None,
        };
        self.alerts.push(row.clone());
        row
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_shift(&self, shift: ActiveShift) {
        let mut state = self.state.lock().unwrap();
        state.next_id = state.next_id.max(shift.shift.id);
        state.shifts.insert(shift.shift.id, shift);
    }

    pub fn insert_shift_type(&self, schedule: ShiftTypeSchedule) {
        self.state
            .lock()
            .unwrap()
            .shift_types
            .insert(schedule.id, schedule);
    }

    pub fn update_shift(&self, id: u64, change: impl FnOnce(&mut Shift)) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.shifts.get_mut(&id) {
            change(&mut entry.shift);
        }
    }

    pub fn shift(&self, id: u64) -> Option<Shift> {
        self.state
            .lock()
            .unwrap()
            .shifts
            .get(&id)
            .map(|entry| entry.shift.clone())
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.state.lock().unwrap().alerts.clone()
    }

    pub fn checkins(&self, shift_id: u64) -> Vec<Checkin> {
        self.state
            .lock()
            .unwrap()
            .checkins
            .iter()
            .filter(|c| c.shift_id == shift_id)
            .cloned()
            .collect()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    pub fn fail_alerts_for(&self, shift_id: u64) {
        self.state
            .lock()
            .unwrap()
            .failing_alert_shifts
            .insert(shift_id);
    }

    fn read_guard(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(state)
    }
}

/// An assigned shift at site `site_id` with the given timing.
pub fn active_shift(
    id: u64,
    site_id: u64,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    interval_mins: u32,
    grace_minutes: u32,
) -> ActiveShift {
    ActiveShift {
        shift: Shift {
            id,
            site_id,
            shift_type_id: 1,
            assignee_id: Some(100 + id),
            shift_date: starts_at.date_naive(),
            starts_at,
            ends_at,
            required_checkin_interval_mins: interval_mins,
            grace_minutes,
            status: ShiftStatus::Scheduled,
            last_heartbeat_at: None,
            missed_count: 0,
            check_in_status: None,
            deleted_at: None,
        },
        site: NamedRef {
            id: site_id,
            name: format!("Site {site_id}"),
        },
        shift_type: NamedRef {
            id: 1,
            name: "Patrol".to_string(),
        },
        assignee: NamedRef {
            id: 100 + id,
            name: format!("Guard {id}"),
        },
    }
}

#[async_trait]
impl ShiftStore for MemoryStore {
    async fn active_shifts(&self, now: DateTime<Utc>) -> Result<Vec<ActiveShift>, StoreError> {
        let state = self.read_guard()?;
        Ok(state
            .shifts
            .values()
            .filter(|entry| entry.shift.is_active_at(now))
            .cloned()
            .collect())
    }

    async fn shift_progress(&self, ids: &[u64]) -> Result<Vec<ShiftProgress>, StoreError> {
        let state = self.read_guard()?;
        Ok(ids
            .iter()
            .filter_map(|id| state.shifts.get(id))
            .map(|entry| ShiftProgress {
                id: entry.shift.id,
                status: entry.shift.status,
                last_heartbeat_at: entry.shift.last_heartbeat_at,
                missed_count: entry.shift.missed_count,
                deleted_at: entry.shift.deleted_at,
            })
            .collect())
    }

    async fn find_shift(&self, id: u64) -> Result<Option<Shift>, StoreError> {
        let state = self.read_guard()?;
        Ok(state.shifts.get(&id).map(|entry| entry.shift.clone()))
    }

    async fn record_checkins(
        &self,
        shift_id: u64,
        expected_heartbeat: Option<DateTime<Utc>>,
        entries: Vec<NewCheckin>,
        progress: CheckinProgress,
    ) -> Result<Vec<Checkin>, StoreError> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .shifts
            .get_mut(&shift_id)
            .ok_or(StoreError::NotFound("shift"))?;
        if entry.shift.last_heartbeat_at != expected_heartbeat {
            return Err(StoreError::Conflict);
        }
        entry.shift.last_heartbeat_at = Some(progress.last_heartbeat_at);
        entry.shift.check_in_status = Some(progress.check_in_status);
        entry.shift.status = progress.status;

        let mut written = Vec::with_capacity(entries.len());
        for new in entries {
            let row = Checkin {
                id: state.next_id(),
                shift_id: new.shift_id,
                at: new.at,
                status: new.status,
                source: new.source,
                location: new.location,
                lateness_mins: new.lateness_mins,
                created_at: progress.last_heartbeat_at,
            };
            state.checkins.push(row.clone());
            written.push(row);
        }
        Ok(written)
    }

    async fn record_attendance(&self, new: NewAttendance) -> Result<Attendance, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.has_attendance(new.shift_id) {
            return Err(StoreError::UniqueViolation);
        }
        let row = Attendance {
            id: state.next_id(),
            shift_id: new.shift_id,
            employee_id: new.employee_id,
            recorded_at: new.recorded_at,
            status: new.status,
            location: new.location,
        };
        state.attendance.push(row.clone());
        if let Some(entry) = state.shifts.get_mut(&new.shift_id) {
            let shift = &mut entry.shift;
            shift.last_heartbeat_at = shift.last_heartbeat_at.max(Some(new.recorded_at));
            if shift.status == ShiftStatus::Scheduled {
                shift.status = ShiftStatus::InProgress;
            }
        }
        Ok(row)
    }

    async fn record_heartbeat(&self, shift_id: u64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.shifts.get_mut(&shift_id) {
            entry.shift.last_heartbeat_at = entry.shift.last_heartbeat_at.max(Some(at));
        }
        Ok(())
    }

    async fn shift_type_schedule(
        &self,
        shift_type_id: u64,
    ) -> Result<Option<ShiftTypeSchedule>, StoreError> {
        let state = self.read_guard()?;
        Ok(state.shift_types.get(&shift_type_id).cloned())
    }

    async fn upcoming_shifts_of_type(
        &self,
        shift_type_id: u64,
        after: DateTime<Utc>,
    ) -> Result<Vec<(u64, NaiveDate)>, StoreError> {
        let state = self.read_guard()?;
        Ok(state
            .shifts
            .values()
            .map(|entry| &entry.shift)
            .filter(|s| {
                s.shift_type_id == shift_type_id
                    && s.status == ShiftStatus::Scheduled
                    && !s.is_deleted()
                    && s.starts_at > after
            })
            .map(|s| (s.id, s.shift_date))
            .collect())
    }

    async fn update_shift_bounds(&self, bounds: &[ShiftBounds]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut updated = 0;
        for b in bounds {
            if let Some(entry) = state.shifts.get_mut(&b.shift_id) {
                let shift = &mut entry.shift;
                if shift.status == ShiftStatus::Scheduled && !shift.is_deleted() {
                    shift.starts_at = b.starts_at;
                    shift.ends_at = b.ends_at;
                    shift.required_checkin_interval_mins = b.required_checkin_interval_mins;
                    shift.grace_minutes = b.grace_minutes;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn insert_missed_checkin(&self, alert: NewAlert) -> Result<Alert, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check_alert_write(&alert)?;
        let shift_id = alert.shift_id;
        let row = state.push_alert(alert);
        if let Some(entry) = state.shifts.get_mut(&shift_id) {
            entry.shift.missed_count += 1;
        }
        Ok(row)
    }

    async fn insert_alert(&self, alert: NewAlert) -> Result<Alert, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.check_alert_write(&alert)?;
        Ok(state.push_alert(alert))
    }

    async fn find_alert(&self, id: u64) -> Result<Option<Alert>, StoreError> {
        let state = self.read_guard()?;
        Ok(state.alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn find_alert_by_key(
        &self,
        shift_id: u64,
        reason: AlertReason,
        window_start: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        let state = self.read_guard()?;
        Ok(state
            .alerts
            .iter()
            .find(|a| a.shift_id == shift_id && a.reason == reason && a.window_start == window_start)
            .cloned())
    }

    async fn find_open_alert(
        &self,
        shift_id: u64,
        reason: AlertReason,
    ) -> Result<Option<Alert>, StoreError> {
        let state = self.read_guard()?;
        Ok(state
            .alerts
            .iter()
            .rev()
            .find(|a| a.shift_id == shift_id && a.reason == reason && a.is_open())
            .cloned())
    }

    async fn resolve_open_alerts(
        &self,
        shift_id: u64,
        reason: AlertReason,
        resolution: &Resolution,
    ) -> Result<Vec<Alert>, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_alert_shifts.contains(&shift_id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut resolved = Vec::new();
        for alert in state
            .alerts
            .iter_mut()
            .filter(|a| a.shift_id == shift_id && a.reason == reason && a.is_open())
        {
            alert.resolved_at = Some(resolution.resolved_at);
            alert.resolved_by = resolution.resolved_by;
            alert.resolution_type = Some(resolution.resolution_type);
            alert.resolution_note = resolution.note.clone();
            resolved.push(alert.clone());
        }
        Ok(resolved)
    }

    async fn acknowledge_alert(
        &self,
        id: u64,
        ack_by: u64,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        let mut state = self.state.lock().unwrap();
        let Some(alert) = state.alerts.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        if alert.acknowledged_at.is_none() {
            alert.acknowledged_at = Some(at);
            alert.ack_by = Some(ack_by);
        }
        Ok(Some(alert.clone()))
    }
}
