use crate::{
    api::{alert, dashboard, shift, shift_type},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::{Context, Result};
use std::sync::Arc;

pub type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-IP limiter shared by every worker.
pub fn build_limiter(requests_per_min: u32) -> Result<Limiter> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        (60_000 / requests_per_min as u64).max(1)
    };
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms)
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .context("invalid rate limiter configuration")?;
    Ok(Arc::new(Governor::new(&cfg)))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, protected_limiter: Limiter) {
    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/shifts/{id}")
                    .route("/checkin", web::post().to(shift::checkin))
                    .route("/attendance", web::post().to(shift::attendance))
                    .route("/heartbeat", web::post().to(shift::heartbeat))
                    .route("/alerts", web::post().to(shift::report_alert))
                    .route("/alerts/resolve", web::put().to(shift::resolve_alert)),
            )
            .route("/alerts/{id}/acknowledge", web::put().to(alert::acknowledge))
            .route(
                "/shift-types/{id}/recalculate",
                web::post().to(shift_type::recalculate),
            )
            .route("/dashboard/stream", web::get().to(dashboard::stream)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_builds_for_any_configured_rate() {
        for per_min in [0, 1, 1000, 120_000] {
            assert!(build_limiter(per_min).is_ok(), "rate {per_min}");
        }
    }
}
