//! Process-local snapshot of the shifts being monitored.
//!
//! A full sync reloads every active shift with its relations; in between,
//! an incremental refresh re-reads only the fields check-ins and the ledger
//! change. Entries are never dropped by an incremental refresh: a shift that
//! left the active set keeps its slot with the fresh status until the next
//! full sync, and the loop skips it on that status.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::model::shift::{ActiveShift, ShiftProgress};
use crate::store::{ShiftStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Full,
    Incremental,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedShift {
    pub active: ActiveShift,
    /// Latest due slot whose missed check-in alert is known to exist
    pub last_alerted_due: Option<DateTime<Utc>>,
}

impl CachedShift {
    fn apply(&mut self, progress: &ShiftProgress) {
        let shift = &mut self.active.shift;
        shift.status = progress.status;
        shift.last_heartbeat_at = progress.last_heartbeat_at;
        shift.missed_count = progress.missed_count;
        shift.deleted_at = progress.deleted_at;
    }
}

pub struct ShiftCache {
    entries: Vec<CachedShift>,
    last_full_sync: Option<DateTime<Utc>>,
    full_sync_every: Duration,
}

impl ShiftCache {
    pub fn new(full_sync_every: Duration) -> Self {
        Self {
            entries: Vec::new(),
            last_full_sync: None,
            full_sync_every,
        }
    }

    pub fn entries(&self) -> &[CachedShift] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [CachedShift] {
        &mut self.entries
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn needs_full_sync(&self, now: DateTime<Utc>) -> bool {
        match self.last_full_sync {
            _ if self.entries.is_empty() => true,
            None => true,
            Some(last) => now - last >= self.full_sync_every,
        }
    }

    /// Runs whichever sync is due. On error the previous contents stay.
    pub async fn refresh(
        &mut self,
        store: &dyn ShiftStore,
        now: DateTime<Utc>,
    ) -> Result<SyncKind, StoreError> {
        if self.needs_full_sync(now) {
            self.full_sync(store, now).await?;
            Ok(SyncKind::Full)
        } else {
            self.incremental_refresh(store).await?;
            Ok(SyncKind::Incremental)
        }
    }

    pub async fn full_sync(
        &mut self,
        store: &dyn ShiftStore,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let fresh = store.active_shifts(now).await?;

        let mut memo: HashMap<u64, DateTime<Utc>> = self
            .entries
            .iter()
            .filter_map(|e| Some((e.active.shift.id, e.last_alerted_due?)))
            .collect();

        self.entries = fresh
            .into_iter()
            .map(|active| CachedShift {
                last_alerted_due: memo.remove(&active.shift.id),
                active,
            })
            .collect();
        self.last_full_sync = Some(now);

        info!(shifts = self.entries.len(), "Shift cache fully synced");
        Ok(())
    }

    pub async fn incremental_refresh(&mut self, store: &dyn ShiftStore) -> Result<(), StoreError> {
        let ids: Vec<u64> = self.entries.iter().map(|e| e.active.shift.id).collect();
        let progress: HashMap<u64, ShiftProgress> = store
            .shift_progress(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        for entry in &mut self.entries {
            if let Some(p) = progress.get(&entry.active.shift.id) {
                entry.apply(p);
            }
        }

        debug!(shifts = self.entries.len(), "Shift cache refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::model::shift::ShiftStatus;
    use crate::store::memory::{MemoryStore, active_shift};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    fn store_with_two_shifts() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_shift(active_shift(1, 10, t0(), t0() + Duration::hours(4), 60, 15));
        store.insert_shift(active_shift(2, 20, t0(), t0() + Duration::hours(4), 60, 15));
        store
    }

    #[actix_web::test]
    async fn empty_cache_always_does_full_sync() {
        let store = MemoryStore::new();
        let mut cache = ShiftCache::new(Duration::seconds(30));
        let now = t0() + Duration::minutes(5);

        assert_eq!(cache.refresh(&store, now).await.unwrap(), SyncKind::Full);
        assert!(cache.is_empty());
        assert_eq!(
            cache.refresh(&store, now + Duration::seconds(5)).await.unwrap(),
            SyncKind::Full
        );
    }

    #[actix_web::test]
    async fn alternates_between_full_and_incremental() {
        let store = store_with_two_shifts();
        let mut cache = ShiftCache::new(Duration::seconds(30));
        let now = t0() + Duration::minutes(5);

        assert_eq!(cache.refresh(&store, now).await.unwrap(), SyncKind::Full);
        for tick in 1..6 {
            let at = now + Duration::seconds(5 * tick);
            assert_eq!(cache.refresh(&store, at).await.unwrap(), SyncKind::Incremental);
        }
        assert_eq!(
            cache.refresh(&store, now + Duration::seconds(30)).await.unwrap(),
            SyncKind::Full
        );
    }

    #[actix_web::test]
    async fn incremental_refresh_merges_progress_fields() {
        let store = store_with_two_shifts();
        let mut cache = ShiftCache::new(Duration::seconds(30));
        let now = t0() + Duration::minutes(5);
        cache.full_sync(&store, now).await.unwrap();

        let beat = now + Duration::seconds(2);
        store.update_shift(1, |s| {
            s.last_heartbeat_at = Some(beat);
            s.missed_count = 3;
            s.status = ShiftStatus::InProgress;
        });
        cache.incremental_refresh(&store).await.unwrap();

        let first = &cache.entries()[0].active;
        assert_eq!(first.shift.last_heartbeat_at, Some(beat));
        assert_eq!(first.shift.missed_count, 3);
        assert_eq!(first.shift.status, ShiftStatus::InProgress);
        assert_eq!(first.site.name, "Site 10");
    }

    #[actix_web::test]
    async fn completed_shift_stays_cached_with_fresh_status() {
        let store = store_with_two_shifts();
        let mut cache = ShiftCache::new(Duration::seconds(30));
        let now = t0() + Duration::minutes(5);
        cache.full_sync(&store, now).await.unwrap();

        store.update_shift(2, |s| s.status = ShiftStatus::Completed);
        cache.incremental_refresh(&store).await.unwrap();

        assert_eq!(cache.entries().len(), 2);
        let second = &cache.entries()[1].active.shift;
        assert_eq!(second.status, ShiftStatus::Completed);
        assert!(!second.is_active_at(now));

        cache.full_sync(&store, now + Duration::seconds(30)).await.unwrap();
        assert_eq!(cache.entries().len(), 1);
    }

    #[actix_web::test]
    async fn failed_sync_keeps_previous_contents() {
        let store = store_with_two_shifts();
        let mut cache = ShiftCache::new(Duration::seconds(30));
        let now = t0() + Duration::minutes(5);
        cache.full_sync(&store, now).await.unwrap();

        store.set_fail_reads(true);
        assert!(cache.incremental_refresh(&store).await.is_err());
        assert!(cache.full_sync(&store, now + Duration::minutes(1)).await.is_err());
        assert_eq!(cache.entries().len(), 2);
    }

    #[actix_web::test]
    async fn full_sync_keeps_alert_memo_for_surviving_shifts() {
        let store = store_with_two_shifts();
        let mut cache = ShiftCache::new(Duration::seconds(30));
        let now = t0() + Duration::minutes(5);
        cache.full_sync(&store, now).await.unwrap();
        cache.entries_mut()[0].last_alerted_due = Some(t0());

        cache.full_sync(&store, now + Duration::seconds(30)).await.unwrap();
        assert_eq!(cache.entries()[0].last_alerted_due, Some(t0()));
        assert_eq!(cache.entries()[1].last_alerted_due, None);
    }
}
