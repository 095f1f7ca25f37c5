//! Request-side presence transitions: check-ins with backfill, attendance,
//! location heartbeats and assignee-driven alert report/resolve.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::ledger::{Acknowledgement, AlertLedger, CreateOutcome};
use crate::clock::Clock;
use crate::error::{Rejection, ServiceError};
use crate::model::alert::{Alert, AlertReason, ResolutionType};
use crate::model::attendance::{AttendanceStatus, NewAttendance};
use crate::model::checkin::{CheckinSource, CheckinStatus, NewCheckin};
use crate::model::location::Location;
use crate::model::shift::{CheckinProgress, Shift, ShiftStatus};
use crate::publish::{AlertEvent, Publisher, publish_alert_events};
use crate::schedule::window::{WindowStatus, compute_window, unsatisfied_slots_before};
use crate::store::{ShiftStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckinReceipt {
    pub status: CheckinStatus,
    /// When the next slot starts accepting check-ins; absent after the last one
    pub next_due_at: Option<DateTime<Utc>>,
    pub is_last_slot: bool,
    /// Late entries synthesized for slots that passed without a check-in
    pub backfilled: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AttendanceReceipt {
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatReceipt {
    pub last_heartbeat_at: DateTime<Utc>,
    pub resolved_alerts: Vec<Alert>,
}

#[derive(Clone)]
pub struct CheckInHandler {
    store: Arc<dyn ShiftStore>,
    ledger: AlertLedger,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
}

impl CheckInHandler {
    pub fn new(
        store: Arc<dyn ShiftStore>,
        ledger: AlertLedger,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            ledger,
            publisher,
            clock,
        }
    }

    async fn assigned_shift(&self, shift_id: u64, employee_id: u64) -> Result<Shift, ServiceError> {
        let shift = self
            .store
            .find_shift(shift_id)
            .await?
            .ok_or(ServiceError::NotFound("shift"))?;
        if !shift.is_assigned_to(employee_id) {
            return Err(Rejection::NotAssigned.into());
        }
        if shift.is_deleted() || !shift.status.is_monitored() {
            return Err(Rejection::ShiftNotActive.into());
        }
        Ok(shift)
    }

    /// Records a check-in for the current slot, backfilling a late entry
    /// for every earlier slot the last heartbeat does not cover. A check-in
    /// that loses a race with another one for the same shift is re-evaluated
    /// once against the fresh row.
    pub async fn checkin(
        &self,
        shift_id: u64,
        employee_id: u64,
        source: CheckinSource,
        location: Option<Location>,
    ) -> Result<CheckinReceipt, ServiceError> {
        let receipt = match self.try_checkin(shift_id, employee_id, source, location).await {
            Err(ServiceError::Store(StoreError::Conflict)) => {
                debug!(shift_id, "Concurrent check-in, re-evaluating");
                self.try_checkin(shift_id, employee_id, source, location).await?
            }
            other => other?,
        };

        if location.is_some() {
            self.resolve_presence_alerts(shift_id).await;
        }
        Ok(receipt)
    }

    async fn try_checkin(
        &self,
        shift_id: u64,
        employee_id: u64,
        source: CheckinSource,
        location: Option<Location>,
    ) -> Result<CheckinReceipt, ServiceError> {
        let shift = self.assigned_shift(shift_id, employee_id).await?;
        let now = self.clock.now();
        if now < shift.starts_at {
            return Err(Rejection::TooEarly.into());
        }

        let timing = shift.timing();
        let window = compute_window(&timing, now, shift.last_heartbeat_at);
        let status = match window.status {
            WindowStatus::Completed => return Err(Rejection::AlreadyCompleted.into()),
            WindowStatus::Early => return Err(Rejection::TooEarly.into()),
            WindowStatus::Open => CheckinStatus::OnTime,
            WindowStatus::Late => CheckinStatus::Late,
        };

        let mut entries: Vec<NewCheckin> =
            unsatisfied_slots_before(&timing, window.slot_index, shift.last_heartbeat_at)
                .into_iter()
                .map(|slot| NewCheckin {
                    shift_id,
                    at: slot.slot_start,
                    status: CheckinStatus::Late,
                    source: CheckinSource::Backfill,
                    location: None,
                    lateness_mins: minutes_past(now, slot.deadline),
                })
                .collect();
        let backfilled = entries.len();

        entries.push(NewCheckin {
            shift_id,
            at: now,
            status,
            source,
            location,
            lateness_mins: match status {
                CheckinStatus::Late => minutes_past(now, window.current_slot_end),
                CheckinStatus::OnTime => 0,
            },
        });

        let next_status = if window.is_last_slot {
            ShiftStatus::Completed
        } else if shift.status == ShiftStatus::Scheduled {
            ShiftStatus::InProgress
        } else {
            shift.status
        };

        self.store
            .record_checkins(
                shift_id,
                shift.last_heartbeat_at,
                entries,
                CheckinProgress {
                    last_heartbeat_at: now,
                    check_in_status: status,
                    status: next_status,
                },
            )
            .await?;

        info!(
            shift_id,
            employee_id,
            slot = window.slot_index,
            %status,
            backfilled,
            shift_status = %next_status,
            "Check-in recorded"
        );

        Ok(CheckinReceipt {
            status,
            next_due_at: window.next_slot_start,
            is_last_slot: window.is_last_slot,
            backfilled,
        })
    }

    /// Records the clock-in for a shift. Late once the start grace has run out.
    pub async fn attendance(
        &self,
        shift_id: u64,
        employee_id: u64,
        location: Option<Location>,
    ) -> Result<AttendanceReceipt, ServiceError> {
        let shift = self.assigned_shift(shift_id, employee_id).await?;
        let now = self.clock.now();
        let grace = chrono::Duration::minutes(i64::from(shift.grace_minutes));
        let status = if now > shift.starts_at + grace {
            AttendanceStatus::Late
        } else {
            AttendanceStatus::Present
        };

        let recorded = self
            .store
            .record_attendance(NewAttendance {
                shift_id,
                employee_id,
                recorded_at: now,
                status,
                location,
            })
            .await;
        match recorded {
            Ok(_) => {}
            Err(StoreError::UniqueViolation) => return Err(Rejection::AlreadyRecorded.into()),
            Err(e) => return Err(e.into()),
        }
        info!(shift_id, employee_id, %status, "Attendance recorded");

        match self
            .ledger
            .resolve_all(
                shift_id,
                AlertReason::MissedAttendance,
                Some(employee_id),
                ResolutionType::Auto,
                None,
            )
            .await
        {
            Ok(resolved) => {
                publish_alert_events(self.publisher.as_ref(), AlertEvent::Resolved, &resolved).await
            }
            Err(e) => warn!(error = %e, shift_id, "Failed to resolve missed attendance alerts"),
        }

        Ok(AttendanceReceipt { status })
    }

    /// Location ping from the assignee's device. Renewed presence clears
    /// geofence and location-services alerts.
    pub async fn heartbeat(
        &self,
        shift_id: u64,
        employee_id: u64,
    ) -> Result<HeartbeatReceipt, ServiceError> {
        self.assigned_shift(shift_id, employee_id).await?;
        let now = self.clock.now();
        self.store.record_heartbeat(shift_id, now).await?;
        let resolved_alerts = self.resolve_presence_alerts(shift_id).await;

        Ok(HeartbeatReceipt {
            last_heartbeat_at: now,
            resolved_alerts,
        })
    }

    /// Resolves open geofence and location-services alerts. The presence is
    /// already stored, so a failure here is logged rather than returned.
    async fn resolve_presence_alerts(&self, shift_id: u64) -> Vec<Alert> {
        let mut resolved = Vec::new();
        for reason in AlertReason::CLEARED_BY_PRESENCE {
            match self
                .ledger
                .resolve_all(shift_id, reason, None, ResolutionType::Auto, None)
                .await
            {
                Ok(alerts) => resolved.extend(alerts),
                Err(e) => warn!(error = %e, shift_id, %reason, "Failed to resolve presence alerts"),
            }
        }
        publish_alert_events(self.publisher.as_ref(), AlertEvent::Resolved, &resolved).await;
        resolved
    }

    pub async fn report_alert(
        &self,
        shift_id: u64,
        employee_id: u64,
        reason: AlertReason,
    ) -> Result<CreateOutcome, ServiceError> {
        if !reason.is_reportable() {
            return Err(Rejection::InvalidReason.into());
        }
        let shift = self.assigned_shift(shift_id, employee_id).await?;
        let outcome = self
            .ledger
            .report_alert(shift_id, shift.site_id, reason, self.clock.now())
            .await?;
        if outcome.is_created() {
            publish_alert_events(
                self.publisher.as_ref(),
                AlertEvent::Created,
                std::slice::from_ref(outcome.alert()),
            )
            .await;
        }
        Ok(outcome)
    }

    pub async fn resolve_alert(
        &self,
        shift_id: u64,
        employee_id: u64,
        reason: AlertReason,
        note: Option<String>,
    ) -> Result<Vec<Alert>, ServiceError> {
        let shift = self
            .store
            .find_shift(shift_id)
            .await?
            .ok_or(ServiceError::NotFound("shift"))?;
        if !shift.is_assigned_to(employee_id) {
            return Err(Rejection::NotAssigned.into());
        }

        let resolved = self
            .ledger
            .resolve_all(
                shift_id,
                reason,
                Some(employee_id),
                ResolutionType::SelfResolved,
                note,
            )
            .await?;
        publish_alert_events(self.publisher.as_ref(), AlertEvent::Resolved, &resolved).await;
        Ok(resolved)
    }

    pub async fn acknowledge(
        &self,
        alert_id: u64,
        ack_by: u64,
    ) -> Result<Acknowledgement, ServiceError> {
        let ack = self.ledger.acknowledge(alert_id, ack_by).await?;
        if ack.changed {
            info!(alert_id, ack_by, "Alert acknowledged");
            publish_alert_events(
                self.publisher.as_ref(),
                AlertEvent::Acknowledged,
                std::slice::from_ref(&ack.alert),
            )
            .await;
        }
        Ok(ack)
    }
}

fn minutes_past(now: DateTime<Utc>, deadline: DateTime<Utc>) -> i64 {
    (now - deadline).num_minutes().max(0)
}
