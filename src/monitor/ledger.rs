//! Sole writer of alert rows.
//!
//! Creation is idempotent through the store's unique keys: a duplicate-key
//! failure means another writer got there first, and the existing row is
//! returned as if this call had created it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::model::alert::{Alert, AlertReason, NewAlert, Resolution, ResolutionType};
use crate::store::{AlertStore, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(Alert),
    AlreadyExists(Alert),
}

impl CreateOutcome {
    pub fn alert(&self) -> &Alert {
        match self {
            CreateOutcome::Created(alert) | CreateOutcome::AlreadyExists(alert) => alert,
        }
    }

    pub fn into_alert(self) -> Alert {
        match self {
            CreateOutcome::Created(alert) | CreateOutcome::AlreadyExists(alert) => alert,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Acknowledgement {
    pub alert: Alert,
    /// False when the alert had already been acknowledged
    pub changed: bool,
}

#[derive(Clone)]
pub struct AlertLedger {
    store: Arc<dyn AlertStore>,
    clock: Arc<dyn Clock>,
}

impl AlertLedger {
    pub fn new(store: Arc<dyn AlertStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn new_alert(
        &self,
        shift_id: u64,
        site_id: u64,
        reason: AlertReason,
        window_start: DateTime<Utc>,
    ) -> NewAlert {
        NewAlert {
            shift_id,
            site_id,
            reason,
            window_start,
            created_at: self.clock.now(),
        }
    }

    /// Raises the alert for one missed slot and bumps the shift's
    /// `missed_count`, at most once per `(shift, window_start)`.
    pub async fn create_missed_checkin(
        &self,
        shift_id: u64,
        site_id: u64,
        window_start: DateTime<Utc>,
    ) -> Result<CreateOutcome, StoreError> {
        let alert = self.new_alert(shift_id, site_id, AlertReason::MissedCheckin, window_start);
        match self.store.insert_missed_checkin(alert).await {
            Ok(alert) => {
                info!(alert_id = alert.id, shift_id, site_id, %window_start, "Missed check-in alert raised");
                Ok(CreateOutcome::Created(alert))
            }
            Err(StoreError::UniqueViolation) => {
                debug!(shift_id, %window_start, "Missed check-in alert already exists");
                self.existing(shift_id, AlertReason::MissedCheckin, window_start)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Raises an assignee-reported alert unless one for the same reason is
    /// still open, in which case that one is returned untouched.
    pub async fn report_alert(
        &self,
        shift_id: u64,
        site_id: u64,
        reason: AlertReason,
        reported_at: DateTime<Utc>,
    ) -> Result<CreateOutcome, StoreError> {
        if let Some(open) = self.store.find_open_alert(shift_id, reason).await? {
            return Ok(CreateOutcome::AlreadyExists(open));
        }

        let alert = self.new_alert(shift_id, site_id, reason, reported_at);
        match self.store.insert_alert(alert).await {
            Ok(alert) => {
                info!(alert_id = alert.id, shift_id, site_id, %reason, "Alert reported");
                Ok(CreateOutcome::Created(alert))
            }
            Err(StoreError::UniqueViolation) => self.existing(shift_id, reason, reported_at).await,
            Err(e) => Err(e),
        }
    }

    /// Looks up the row that beat us to a unique key: the exact window
    /// first, then whichever alert for the reason is still open.
    async fn existing(
        &self,
        shift_id: u64,
        reason: AlertReason,
        window_start: DateTime<Utc>,
    ) -> Result<CreateOutcome, StoreError> {
        if let Some(alert) = self
            .store
            .find_alert_by_key(shift_id, reason, window_start)
            .await?
        {
            return Ok(CreateOutcome::AlreadyExists(alert));
        }
        self.store
            .find_open_alert(shift_id, reason)
            .await?
            .map(CreateOutcome::AlreadyExists)
            .ok_or(StoreError::NotFound("conflicting alert"))
    }

    /// Resolves every open alert for `(shift_id, reason)`. An empty result
    /// means nothing was open.
    pub async fn resolve_all(
        &self,
        shift_id: u64,
        reason: AlertReason,
        resolved_by: Option<u64>,
        resolution_type: ResolutionType,
        note: Option<String>,
    ) -> Result<Vec<Alert>, StoreError> {
        let resolution = Resolution {
            resolved_at: self.clock.now(),
            resolved_by,
            resolution_type,
            note,
        };
        let resolved = self
            .store
            .resolve_open_alerts(shift_id, reason, &resolution)
            .await?;
        if !resolved.is_empty() {
            info!(shift_id, %reason, count = resolved.len(), %resolution_type, "Alerts resolved");
        }
        Ok(resolved)
    }

    pub async fn acknowledge(
        &self,
        alert_id: u64,
        ack_by: u64,
    ) -> Result<Acknowledgement, StoreError> {
        let current = self
            .store
            .find_alert(alert_id)
            .await?
            .ok_or(StoreError::NotFound("alert"))?;
        if current.acknowledged_at.is_some() {
            return Ok(Acknowledgement {
                alert: current,
                changed: false,
            });
        }

        let alert = self
            .store
            .acknowledge_alert(alert_id, ack_by, self.clock.now())
            .await?
            .ok_or(StoreError::NotFound("alert"))?;
        let changed = alert.ack_by == Some(ack_by);
        Ok(Acknowledgement { alert, changed })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::clock::ManualClock;
    use crate::store::memory::{MemoryStore, active_shift};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, AlertLedger) {
        let store = Arc::new(MemoryStore::new());
        store.insert_shift(active_shift(1, 10, t0(), t0() + Duration::hours(2), 60, 15));
        let clock = Arc::new(ManualClock::new(t0() + Duration::minutes(20)));
        let ledger = AlertLedger::new(store.clone(), clock.clone());
        (store, clock, ledger)
    }

    #[actix_web::test]
    async fn missed_checkin_is_created_once() {
        let (store, _, ledger) = setup();

        let first = ledger.create_missed_checkin(1, 10, t0()).await.unwrap();
        let second = ledger.create_missed_checkin(1, 10, t0()).await.unwrap();

        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.alert().id, second.alert().id);
        assert_eq!(store.alerts().len(), 1);
        assert_eq!(store.shift(1).unwrap().missed_count, 1);
    }

    #[actix_web::test]
    async fn concurrent_missed_checkins_leave_one_row() {
        let (store, _, ledger) = setup();
        let other = ledger.clone();

        let (a, b) = futures::join!(
            ledger.create_missed_checkin(1, 10, t0()),
            other.create_missed_checkin(1, 10, t0()),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.alert().id, b.alert().id);
        assert_eq!([a.is_created(), b.is_created()].iter().filter(|c| **c).count(), 1);
        assert_eq!(store.alerts().len(), 1);
        assert_eq!(store.shift(1).unwrap().missed_count, 1);
    }

    #[actix_web::test]
    async fn distinct_windows_are_distinct_alerts() {
        let (store, _, ledger) = setup();
        ledger.create_missed_checkin(1, 10, t0()).await.unwrap();
        ledger
            .create_missed_checkin(1, 10, t0() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(store.alerts().len(), 2);
        assert_eq!(store.shift(1).unwrap().missed_count, 2);
    }

    #[actix_web::test]
    async fn report_is_idempotent_while_open() {
        let (store, clock, ledger) = setup();

        let first = ledger
            .report_alert(1, 10, AlertReason::GeofenceBreach, clock.now())
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        let second = ledger
            .report_alert(1, 10, AlertReason::GeofenceBreach, clock.now())
            .await
            .unwrap();

        assert_eq!(first.alert().id, second.alert().id);
        assert!(!second.is_created());
        assert_eq!(store.alerts().len(), 1);
        assert_eq!(store.shift(1).unwrap().missed_count, 0);
    }

    #[actix_web::test]
    async fn report_after_resolution_opens_a_new_alert() {
        let (store, clock, ledger) = setup();
        let first = ledger
            .report_alert(1, 10, AlertReason::GeofenceBreach, clock.now())
            .await
            .unwrap();
        ledger
            .resolve_all(1, AlertReason::GeofenceBreach, Some(101), ResolutionType::SelfResolved, None)
            .await
            .unwrap();

        clock.advance(Duration::minutes(3));
        let second = ledger
            .report_alert(1, 10, AlertReason::GeofenceBreach, clock.now())
            .await
            .unwrap();

        assert!(second.is_created());
        assert_ne!(first.alert().id, second.alert().id);
        assert_eq!(store.alerts().len(), 2);
    }

    #[actix_web::test]
    async fn resolve_all_twice_returns_empty_second_time() {
        let (_, clock, ledger) = setup();
        ledger
            .report_alert(1, 10, AlertReason::LocationServicesDisabled, clock.now())
            .await
            .unwrap();

        let resolved = ledger
            .resolve_all(
                1,
                AlertReason::LocationServicesDisabled,
                Some(7),
                ResolutionType::Supervisor,
                Some("called the guard".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].resolved_by, Some(7));
        assert_eq!(resolved[0].resolution_note.as_deref(), Some("called the guard"));

        let again = ledger
            .resolve_all(1, AlertReason::LocationServicesDisabled, Some(7), ResolutionType::Supervisor, None)
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[actix_web::test]
    async fn acknowledge_only_stamps_once() {
        let (_, clock, ledger) = setup();
        let alert = ledger.create_missed_checkin(1, 10, t0()).await.unwrap().into_alert();

        let first = ledger.acknowledge(alert.id, 7).await.unwrap();
        assert!(first.changed);
        assert_eq!(first.alert.acknowledged_at, Some(clock.now()));

        clock.advance(Duration::minutes(5));
        let second = ledger.acknowledge(alert.id, 8).await.unwrap();
        assert!(!second.changed);
        assert_eq!(second.alert.ack_by, Some(7));
        assert_eq!(second.alert.acknowledged_at, first.alert.acknowledged_at);
    }

    #[actix_web::test]
    async fn acknowledging_unknown_alert_is_not_found() {
        let (_, _, ledger) = setup();
        assert!(matches!(
            ledger.acknowledge(999, 7).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
