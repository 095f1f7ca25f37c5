//! Check-in window arithmetic.
//!
//! A shift `[starts_at, ends_at]` with interval `I` and grace `G` has due
//! slots at `starts_at + I`, `starts_at + 2I`, ... up to the last one not
//! after `ends_at`. A slot accepts check-ins in `[slot, slot + G]`; the last
//! slot also opens `G` early (never before `starts_at`), so the final
//! check-in can be made before the shift ends.
//!
//! All instants are absolute UTC. Overnight shifts need no special casing
//! as long as `ends_at` was rolled to the next day when it was computed.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftTiming {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub interval_mins: u32,
    pub grace_mins: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WindowStatus {
    /// Before the current slot accepts check-ins
    Early,
    /// Inside the acceptance window and not yet satisfied
    Open,
    /// The current slot already has a heartbeat
    Completed,
    /// Past the acceptance window and not satisfied
    Late,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowResult {
    pub status: WindowStatus,
    pub slot_index: usize,
    /// Nominal due time of the current slot
    pub current_slot_start: DateTime<Utc>,
    /// Last instant the current slot accepts an on-time check-in
    pub current_slot_end: DateTime<Utc>,
    /// First instant the current slot accepts a check-in
    pub effective_start: DateTime<Utc>,
    pub next_slot_start: Option<DateTime<Utc>>,
    pub is_last_slot: bool,
}

/// A slot that passed without a heartbeat, as seen by the reconciliation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueSlot {
    pub due_at: DateTime<Utc>,
    /// Earliest heartbeat that covers the slot; `None` for the clock-in slot,
    /// which any heartbeat covers since attendance may be taken early.
    pub effective_start: Option<DateTime<Utc>>,
}

impl DueSlot {
    pub fn is_satisfied_by(&self, last_heartbeat: Option<DateTime<Utc>>) -> bool {
        match (last_heartbeat, self.effective_start) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(beat), Some(start)) => beat >= start,
        }
    }
}

/// A slot to synthesize a late check-in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillSlot {
    pub slot_start: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

struct SlotGrid {
    starts_at: DateTime<Utc>,
    first: DateTime<Utc>,
    interval_ms: i64,
    grace: Duration,
    last_index: usize,
}

impl SlotGrid {
    fn new(timing: &ShiftTiming) -> Self {
        let interval_ms = i64::from(timing.interval_mins.max(1)) * 60_000;
        let grace = Duration::minutes(i64::from(timing.grace_mins));
        let first = timing.starts_at + Duration::milliseconds(interval_ms);

        if timing.ends_at < first {
            // Shorter than one interval: the only slot is the shift end.
            return Self {
                starts_at: timing.starts_at,
                first: timing.ends_at.max(timing.starts_at),
                interval_ms,
                grace,
                last_index: 0,
            };
        }

        let span_ms = (timing.ends_at - first).num_milliseconds();
        Self {
            starts_at: timing.starts_at,
            first,
            interval_ms,
            grace,
            last_index: (span_ms / interval_ms) as usize,
        }
    }

    fn slot(&self, index: usize) -> DateTime<Utc> {
        self.first + Duration::milliseconds(self.interval_ms * index as i64)
    }

    fn last_slot(&self) -> DateTime<Utc> {
        self.slot(self.last_index)
    }

    fn effective_start(&self, index: usize) -> DateTime<Utc> {
        let slot = self.slot(index);
        if index == self.last_index {
            (slot - self.grace).max(self.starts_at)
        } else {
            slot
        }
    }

    fn index_at(&self, now: DateTime<Utc>) -> usize {
        let nominal = if now < self.first {
            0
        } else {
            let elapsed = (now - self.first).num_milliseconds();
            ((elapsed / self.interval_ms) as usize).min(self.last_index)
        };
        if nominal < self.last_index && now >= self.effective_start(self.last_index) {
            self.last_index
        } else {
            nominal
        }
    }
}

pub fn compute_window(
    timing: &ShiftTiming,
    now: DateTime<Utc>,
    last_heartbeat: Option<DateTime<Utc>>,
) -> WindowResult {
    let grid = SlotGrid::new(timing);
    let index = grid.index_at(now);
    let slot = grid.slot(index);
    let effective_start = grid.effective_start(index);
    let deadline = slot + grid.grace;

    let status = if last_heartbeat.is_some_and(|beat| beat >= effective_start) {
        WindowStatus::Completed
    } else if now < effective_start {
        WindowStatus::Early
    } else if now <= deadline {
        WindowStatus::Open
    } else {
        WindowStatus::Late
    };

    let next_slot_start = (index < grid.last_index).then(|| grid.effective_start(index + 1));

    WindowResult {
        status,
        slot_index: index,
        current_slot_start: slot,
        current_slot_end: deadline,
        effective_start,
        next_slot_start,
        is_last_slot: index == grid.last_index,
    }
}

/// Most recent slot whose grace period has fully elapsed at `now`, counting
/// the shift start itself as slot zero. `None` until `starts_at + grace`.
pub fn passed_due_slot(timing: &ShiftTiming, now: DateTime<Utc>) -> Option<DueSlot> {
    let grid = SlotGrid::new(timing);
    let elapsed_ms = (now - timing.starts_at - grid.grace).num_milliseconds();
    if elapsed_ms < 0 {
        return None;
    }

    let passed_index = elapsed_ms / grid.interval_ms;
    let due_at = timing.starts_at + Duration::milliseconds(passed_index * grid.interval_ms);
    let effective_start = if passed_index == 0 {
        None
    } else if due_at == grid.last_slot() {
        Some((due_at - grid.grace).max(timing.starts_at))
    } else {
        Some(due_at)
    };

    Some(DueSlot {
        due_at,
        effective_start,
    })
}

/// Slots before `current_index` that the last heartbeat does not cover.
pub fn unsatisfied_slots_before(
    timing: &ShiftTiming,
    current_index: usize,
    last_heartbeat: Option<DateTime<Utc>>,
) -> Vec<BackfillSlot> {
    let grid = SlotGrid::new(timing);
    (0..current_index.min(grid.last_index))
        .filter(|&index| last_heartbeat.is_none_or(|beat| grid.effective_start(index) > beat))
        .map(|index| {
            let slot_start = grid.slot(index);
            BackfillSlot {
                slot_start,
                deadline: slot_start + grid.grace,
            }
        })
        .collect()
}
