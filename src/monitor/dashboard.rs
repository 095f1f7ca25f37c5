use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::shift::{ActiveShift, NamedRef, ShiftStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardShift {
    pub id: u64,
    pub assignee: NamedRef,
    pub shift_type: NamedRef,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: ShiftStatus,
    pub missed_count: u32,
}

/// Full state of one site. Each publish replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSnapshot {
    pub site: NamedRef,
    pub shifts: Vec<DashboardShift>,
}

impl SiteSnapshot {
    pub fn empty(site: NamedRef) -> Self {
        Self {
            site,
            shifts: Vec::new(),
        }
    }
}

/// Groups shifts by site, ordered by site id then start time.
pub fn build_snapshots<'a>(shifts: impl IntoIterator<Item = &'a ActiveShift>) -> Vec<SiteSnapshot> {
    let mut by_site: BTreeMap<u64, SiteSnapshot> = BTreeMap::new();
    for active in shifts {
        let snapshot = by_site
            .entry(active.site.id)
            .or_insert_with(|| SiteSnapshot::empty(active.site.clone()));
        snapshot.shifts.push(DashboardShift {
            id: active.shift.id,
            assignee: active.assignee.clone(),
            shift_type: active.shift_type.clone(),
            starts_at: active.shift.starts_at,
            ends_at: active.shift.ends_at,
            status: active.shift.status,
            missed_count: active.shift.missed_count,
        });
    }

    let mut snapshots: Vec<SiteSnapshot> = by_site.into_values().collect();
    for snapshot in &mut snapshots {
        snapshot.shifts.sort_by_key(|s| (s.starts_at, s.id));
    }
    snapshots
}
