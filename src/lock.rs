//! Cluster-wide mutual exclusion for the reconciliation tick.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{MySql, MySqlPool};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock backend unavailable: {0}")]
    Backend(#[from] sqlx::Error),
}

/// Non-blocking named lock. `try_acquire` returns `false` immediately when
/// someone else holds the lock. Dropping an unfinished `try_acquire` must not
/// leave the lock held.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    async fn try_acquire(&self, name: &str) -> Result<bool, LockError>;
    async fn release(&self, name: &str) -> Result<(), LockError>;
}

/// MySQL `GET_LOCK` advisory lock. The lock lives on the connection that
/// took it, so that connection is held out of the pool until release.
pub struct MySqlAdvisoryLock {
    pool: MySqlPool,
    held: tokio::sync::Mutex<HashMap<String, PoolConnection<MySql>>>,
}

impl MySqlAdvisoryLock {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            held: tokio::sync::Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl DistributedLock for MySqlAdvisoryLock {
    async fn try_acquire(&self, name: &str) -> Result<bool, LockError> {
        let mut held = self.held.lock().await;
        if held.contains_key(name) {
            return Ok(false);
        }

        let conn = self.pool.acquire().await?;
        // If this future is dropped before GET_LOCK answers, the session may
        // own the lock; close it instead of returning it to the pool.
        let mut pending = DropGuard::new(conn, |conn: PoolConnection<MySql>| {
            warn!(lock = name, "Lock attempt abandoned, closing connection");
            drop(conn.detach());
        });
        let Some(conn) = pending.get_mut() else {
            return Ok(false);
        };
        // Timeout 0: fail at once instead of queueing behind the holder.
        let got: Option<i64> = sqlx::query_scalar("SELECT GET_LOCK(?, 0)")
            .bind(name)
            .fetch_one(&mut **conn)
            .await?;

        match pending.keep() {
            Some(conn) if got == Some(1) => {
                held.insert(name.to_string(), conn);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, name: &str) -> Result<(), LockError> {
        let Some(mut conn) = self.held.lock().await.remove(name) else {
            return Ok(());
        };

        let released = sqlx::query_scalar::<_, Option<i64>>("SELECT RELEASE_LOCK(?)")
            .bind(name)
            .fetch_one(&mut *conn)
            .await;

        if let Err(e) = released {
            // Closing the session is the only other way to drop the lock.
            warn!(error = %e, lock = name, "RELEASE_LOCK failed, closing connection");
            drop(conn.detach());
            return Err(e.into());
        }
        Ok(())
    }
}

/// Hands `value` to `on_drop` unless it is taken back with `keep`.
struct DropGuard<T, F: FnOnce(T)> {
    inner: Option<(T, F)>,
}

impl<T, F: FnOnce(T)> DropGuard<T, F> {
    fn new(value: T, on_drop: F) -> Self {
        Self {
            inner: Some((value, on_drop)),
        }
    }

    fn get_mut(&mut self) -> Option<&mut T> {
        self.inner.as_mut().map(|(value, _)| value)
    }

    fn keep(mut self) -> Option<T> {
        self.inner.take().map(|(value, _)| value)
    }
}

impl<T, F: FnOnce(T)> Drop for DropGuard<T, F> {
    fn drop(&mut self) {
        if let Some((value, on_drop)) = self.inner.take() {
            on_drop(value);
        }
    }
}

/// Process-local lock for single-instance deployments.
#[derive(Default)]
pub struct MemoryLock {
    held: Mutex<HashSet<String>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for MemoryLock {
    async fn try_acquire(&self, name: &str) -> Result<bool, LockError> {
        let mut held = self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(held.insert(name.to_string()))
    }

    async fn release(&self, name: &str) -> Result<(), LockError> {
        let mut held = self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        held.remove(name);
        Ok(())
    }
}
