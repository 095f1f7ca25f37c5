use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;

mod api;
mod auth;
mod clock;
mod config;
mod db;
mod docs;
mod error;
mod jobs;
mod lock;
mod model;
mod models;
mod monitor;
mod publish;
mod routes;
mod schedule;
mod store;

use clock::{Clock, SystemClock};
use config::{Config, LockBackend};
use db::init_db;
use jobs::{JobQueue, JobRunner};
use lock::{DistributedLock, MemoryLock, MySqlAdvisoryLock};
use monitor::checkin::CheckInHandler;
use monitor::ledger::AlertLedger;
use monitor::worker::ReconciliationLoop;
use publish::BroadcastPublisher;
use store::mysql::MySqlStore;

use crate::docs::ApiDoc;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "sitewatch"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "sitewatch.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url, config.db_max_connections).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(MySqlStore::new(pool.clone()));
    let publisher = BroadcastPublisher::new(config.pubsub_capacity);
    let ledger = AlertLedger::new(store.clone(), clock.clone());
    let handler = CheckInHandler::new(
        store.clone(),
        ledger.clone(),
        Arc::new(publisher.clone()),
        clock.clone(),
    );

    let (queue, jobs_rx) = JobQueue::new(config.job_queue_capacity);
    actix_web::rt::spawn(JobRunner::new(store.clone(), clock.clone()).run(jobs_rx));

    if config.worker_enabled {
        let lock: Arc<dyn DistributedLock> = match config.lock_backend {
            LockBackend::MySql => Arc::new(MySqlAdvisoryLock::new(pool.clone())),
            LockBackend::Memory => {
                warn!("Using process-local lock; run a single replica");
                Arc::new(MemoryLock::new())
            }
        };
        let worker = ReconciliationLoop::new(
            store.clone(),
            ledger,
            lock,
            Arc::new(publisher.clone()),
            clock.clone(),
            config.loop_settings(),
        );
        actix_web::rt::spawn(worker.run());
    } else {
        info!("Reconciliation loop disabled");
    }

    let limiter = routes::build_limiter(config.rate_protected_per_min)?;
    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config);
    let handler = Data::new(handler);
    let queue = Data::new(queue);
    let publisher = Data::new(publisher);

    HttpServer::new(move || {
        let config = config_data.clone();
        let limiter = limiter.clone();
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(config.clone())
            .app_data(handler.clone())
            .app_data(queue.clone())
            .app_data(publisher.clone())
            .service(index)
            // Protected routes with rate limiting
            .configure(move |cfg| routes::configure(cfg, &config, limiter))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
