//! Periodic reconciliation.
//!
//! ```text
//! tick ─▶ try lock ──(held elsewhere)──▶ skip
//!            │
//!            ▼
//!      refresh cache ──(error)──▶ release, skip
//!            │
//!            ▼
//!      evaluate each shift ─▶ AlertLedger (idempotent)
//!            │
//!            ▼
//!      publish site snapshots ─▶ release
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, warn};

use super::cache::{CachedShift, ShiftCache, SyncKind};
use super::dashboard::{SiteSnapshot, build_snapshots};
use super::ledger::AlertLedger;
use crate::clock::Clock;
use crate::lock::DistributedLock;
use crate::model::alert::Alert;
use crate::model::shift::NamedRef;
use crate::publish::{AlertEvent, Publisher, dashboard_channel, publish_alert_events};
use crate::schedule::window::passed_due_slot;
use crate::store::{ShiftStore, StoreError};

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub tick: Duration,
    pub full_sync_every: Duration,
    pub lock_name: String,
    pub lock_timeout: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
            full_sync_every: Duration::from_secs(30),
            lock_name: "sitewatch:reconcile".to_string(),
            lock_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub evaluated: usize,
    pub alerts_created: usize,
    pub failures: usize,
    pub snapshots_published: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another instance holds the lock, or the lock backend did not answer
    Skipped,
    /// The cache could not be refreshed; nothing was evaluated
    SyncFailed,
    Completed { sync: SyncKind, summary: TickSummary },
}

pub struct ReconciliationLoop {
    store: Arc<dyn ShiftStore>,
    ledger: AlertLedger,
    lock: Arc<dyn DistributedLock>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    settings: LoopSettings,
    cache: ShiftCache,
    /// Sites whose last published snapshot was non-empty
    published_sites: HashMap<u64, NamedRef>,
}

impl ReconciliationLoop {
    pub fn new(
        store: Arc<dyn ShiftStore>,
        ledger: AlertLedger,
        lock: Arc<dyn DistributedLock>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
        settings: LoopSettings,
    ) -> Self {
        let full_sync_every = chrono::Duration::from_std(settings.full_sync_every)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        Self {
            store,
            ledger,
            lock,
            publisher,
            clock,
            cache: ShiftCache::new(full_sync_every),
            settings,
            published_sites: HashMap::new(),
        }
    }

    /// Ticks forever. A tick that overruns makes the next one fire late
    /// rather than twice.
    pub async fn run(mut self) {
        info!(
            tick_secs = self.settings.tick.as_secs_f64(),
            lock = %self.settings.lock_name,
            "Reconciliation loop started"
        );
        let mut ticker = interval(self.settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    pub async fn tick(&mut self) -> TickOutcome {
        let name = self.settings.lock_name.clone();
        let acquired = match timeout(self.settings.lock_timeout, self.lock.try_acquire(&name)).await
        {
            Ok(Ok(acquired)) => acquired,
            Ok(Err(e)) => {
                warn!(error = %e, lock = %name, "Lock backend unavailable, skipping tick");
                false
            }
            Err(_) => {
                // The cancelled attempt gives up its own session.
                warn!(lock = %name, "Lock acquire timed out, skipping tick");
                false
            }
        };

        if !acquired {
            debug!(lock = %name, "Reconciliation tick skipped");
            return TickOutcome::Skipped;
        }

        let outcome = self.run_locked().await;

        if let Err(e) = self.lock.release(&name).await {
            warn!(error = %e, lock = %name, "Failed to release lock");
        }
        outcome
    }

    async fn run_locked(&mut self) -> TickOutcome {
        let now = self.clock.now();

        let sync = match self.cache.refresh(self.store.as_ref(), now).await {
            Ok(sync) => sync,
            Err(e) => {
                error!(error = %e, "Shift cache refresh failed, keeping stale cache");
                return TickOutcome::SyncFailed;
            }
        };

        let mut summary = TickSummary::default();
        let mut created = Vec::new();

        for entry in self.cache.entries_mut() {
            let shift_id = entry.active.shift.id;
            match evaluate_shift(&self.ledger, entry, now).await {
                Ok(Evaluation::Inactive) => {}
                Ok(Evaluation::Evaluated(alert)) => {
                    summary.evaluated += 1;
                    if let Some(alert) = alert {
                        summary.alerts_created += 1;
                        created.push(alert);
                    }
                }
                Err(e) => {
                    summary.failures += 1;
                    error!(error = %e, shift_id, "Shift evaluation failed");
                }
            }
        }

        publish_alert_events(self.publisher.as_ref(), AlertEvent::Created, &created).await;
        summary.snapshots_published = self.publish_dashboards(now).await;

        TickOutcome::Completed { sync, summary }
    }

    /// Publishes one snapshot per site with active shifts, plus an empty
    /// snapshot for each site that had shifts last time and has none now.
    async fn publish_dashboards(&mut self, now: DateTime<Utc>) -> usize {
        let mut snapshots = build_snapshots(
            self.cache
                .entries()
                .iter()
                .map(|e| &e.active)
                .filter(|active| active.shift.is_active_at(now)),
        );

        let current: HashSet<u64> = snapshots.iter().map(|s| s.site.id).collect();
        let vacated: Vec<NamedRef> = self
            .published_sites
            .values()
            .filter(|site| !current.contains(&site.id))
            .cloned()
            .collect();
        snapshots.extend(vacated.into_iter().map(SiteSnapshot::empty));

        let mut published = 0;
        for snapshot in &snapshots {
            let channel = dashboard_channel(snapshot.site.id);
            let result = match serde_json::to_value(snapshot) {
                Ok(payload) => self.publisher.publish(&channel, payload).await,
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(()) => published += 1,
                Err(e) => warn!(error = %e, site_id = snapshot.site.id, "Failed to publish dashboard snapshot"),
            }
        }

        self.published_sites = snapshots
            .into_iter()
            .filter(|s| !s.shifts.is_empty())
            .map(|s| (s.site.id, s.site))
            .collect();
        published
    }
}

enum Evaluation {
    Inactive,
    /// Carries the alert if this evaluation created one
    Evaluated(Option<Alert>),
}

async fn evaluate_shift(
    ledger: &AlertLedger,
    entry: &mut CachedShift,
    now: DateTime<Utc>,
) -> Result<Evaluation, StoreError> {
    let shift = &entry.active.shift;
    if !shift.is_active_at(now) {
        return Ok(Evaluation::Inactive);
    }

    let Some(due) = passed_due_slot(&shift.timing(), now) else {
        return Ok(Evaluation::Evaluated(None));
    };

    let satisfied = due.is_satisfied_by(shift.last_heartbeat_at);
    if satisfied || entry.last_alerted_due == Some(due.due_at) {
        return Ok(Evaluation::Evaluated(None));
    }

    let outcome = ledger
        .create_missed_checkin(shift.id, shift.site_id, due.due_at)
        .await?;
    entry.last_alerted_due = Some(due.due_at);

    if outcome.is_created() {
        entry.active.shift.missed_count += 1;
        Ok(Evaluation::Evaluated(Some(outcome.into_alert())))
    } else {
        Ok(Evaluation::Evaluated(None))
    }
}
