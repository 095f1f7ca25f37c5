//! Background work handed off from request handlers.
//!
//! Handlers enqueue a [`Job`] and return; a single task drains the queue
//! and logs every failure with the job that caused it.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::model::shift::ShiftBounds;
use crate::schedule::bounds::shift_bounds;
use crate::store::{ShiftStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Re-derive the bounds of upcoming scheduled shifts after their
    /// shift type's times, interval or grace changed.
    RecalculateShiftTimes { shift_type_id: u64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("job queue is full")]
    Full,
    #[error("job runner has stopped")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, job: Job) -> Result<(), EnqueueError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => {
                warn!(?job, "Job queue full, rejecting job");
                EnqueueError::Full
            }
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

pub struct JobRunner {
    store: Arc<dyn ShiftStore>,
    clock: Arc<dyn Clock>,
}

impl JobRunner {
    pub fn new(store: Arc<dyn ShiftStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Drains the queue until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<Job>) {
        while let Some(job) = rx.recv().await {
            self.handle(&job).await;
        }
        info!("Job runner stopped");
    }

    pub async fn handle(&self, job: &Job) {
        match job {
            Job::RecalculateShiftTimes { shift_type_id } => {
                match self.recalculate_shift_times(*shift_type_id).await {
                    Ok(updated) => info!(shift_type_id, updated, "Shift times recalculated"),
                    Err(e) => error!(error = %e, ?job, "Shift time recalculation failed"),
                }
            }
        }
    }

    pub async fn recalculate_shift_times(&self, shift_type_id: u64) -> Result<u64, StoreError> {
        let schedule = self
            .store
            .shift_type_schedule(shift_type_id)
            .await?
            .ok_or(StoreError::NotFound("shift type"))?;

        let upcoming = self
            .store
            .upcoming_shifts_of_type(shift_type_id, self.clock.now())
            .await?;
        if upcoming.is_empty() {
            return Ok(0);
        }

        let bounds: Vec<ShiftBounds> = upcoming
            .into_iter()
            .map(|(shift_id, date)| {
                let (starts_at, ends_at) = shift_bounds(date, schedule.start_time, schedule.end_time);
                ShiftBounds {
                    shift_id,
                    starts_at,
                    ends_at,
                    required_checkin_interval_mins: schedule.checkin_interval_mins,
                    grace_minutes: schedule.grace_minutes,
                }
            })
            .collect();

        self.store.update_shift_bounds(&bounds).await
    }
}
