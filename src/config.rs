use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dotenvy::dotenv;

use crate::monitor::worker::LoopSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockBackend {
    /// MySQL `GET_LOCK`, shared by every replica on the same database
    MySql,
    /// Process-local, for single-instance deployments
    Memory,
}

impl FromStr for LockBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(LockBackend::MySql),
            "memory" => Ok(LockBackend::Memory),
            other => bail!("unknown lock backend `{other}`, expected mysql or memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub db_max_connections: u32,

    // Rate limiting
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    pub log_dir: String,

    // Reconciliation loop
    pub worker_enabled: bool,
    pub tick_interval_secs: u64,
    pub full_sync_interval_secs: u64,
    pub lock_name: String,
    pub lock_backend: LockBackend,
    pub lock_timeout_ms: u64,

    pub pubsub_capacity: usize,
    pub job_queue_capacity: usize,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}: invalid value `{raw}`: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let config = Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 10)?,

            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),

            worker_enabled: parsed("WORKER_ENABLED", true)?,
            tick_interval_secs: parsed("TICK_INTERVAL_SECS", 5)?,
            full_sync_interval_secs: parsed("FULL_SYNC_INTERVAL_SECS", 30)?,
            lock_name: env::var("LOCK_NAME").unwrap_or_else(|_| "sitewatch:reconcile".to_string()),
            lock_backend: parsed("LOCK_BACKEND", LockBackend::MySql)?,
            lock_timeout_ms: parsed("LOCK_TIMEOUT_MS", 1000)?,

            pubsub_capacity: parsed("PUBSUB_CAPACITY", 256)?,
            job_queue_capacity: parsed("JOB_QUEUE_CAPACITY", 64)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tick_interval_secs == 0 {
            bail!("TICK_INTERVAL_SECS must be positive");
        }
        if self.full_sync_interval_secs < self.tick_interval_secs {
            bail!("FULL_SYNC_INTERVAL_SECS must not be shorter than TICK_INTERVAL_SECS");
        }
        Ok(())
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            tick: Duration::from_secs(self.tick_interval_secs),
            full_sync_every: Duration::from_secs(self.full_sync_interval_secs),
            lock_name: self.lock_name.clone(),
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
        }
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: String::new(),
            jwt_secret: jwt_secret.to_string(),
            server_addr: "127.0.0.1:0".into(),
            db_max_connections: 1,
            rate_protected_per_min: 1000,
            api_prefix: "/api".into(),
            log_dir: "logs".into(),
            worker_enabled: false,
            tick_interval_secs: 5,
            full_sync_interval_secs: 30,
            lock_name: "sitewatch:reconcile".into(),
            lock_backend: LockBackend::Memory,
            lock_timeout_ms: 250,
            pubsub_capacity: 16,
            job_queue_capacity: 4,
        }
    }
}
