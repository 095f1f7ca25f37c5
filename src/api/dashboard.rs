use crate::auth::auth::AuthUser;
use crate::publish::{BroadcastPublisher, Envelope, alerts_channel, dashboard_channel};
use actix_web::{HttpResponse, Responder, web};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct StreamQuery {
    /// Only stream this site's snapshots and alert events
    pub site_id: Option<u64>,
}

#[derive(Debug, Clone)]
struct ChannelFilter {
    channels: Option<[String; 2]>,
}

impl ChannelFilter {
    fn new(site_id: Option<u64>) -> Self {
        Self {
            channels: site_id.map(|id| [dashboard_channel(id), alerts_channel(id)]),
        }
    }

    fn matches(&self, channel: &str) -> bool {
        match &self.channels {
            Some(channels) => channels.iter().any(|c| c == channel),
            None => true,
        }
    }
}

/// Envelopes matching `filter`, ending when the publisher is dropped. A slow
/// reader skips what it missed instead of stalling publishers.
fn matching_envelopes(
    rx: broadcast::Receiver<Envelope>,
    filter: ChannelFilter,
) -> impl Stream<Item = Envelope> {
    futures::stream::unfold((rx, filter), |(mut rx, filter)| async move {
        loop {
            match rx.recv().await {
                Ok(envelope) if filter.matches(&envelope.channel) => {
                    return Some((envelope, (rx, filter)));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Dashboard stream lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

fn sse_frame(envelope: &Envelope) -> web::Bytes {
    web::Bytes::from(format!(
        "event: {}\ndata: {}\n\n",
        envelope.channel, envelope.payload
    ))
}

/// Live dashboard feed
///
/// Server-sent events; the event name is the channel
/// (`dashboard:site:<id>` or `alerts:site:<id>`), the data its JSON payload.
#[utoipa::path(
    get,
    path = "/api/dashboard/stream",
    params(StreamQuery),
    responses(
        (status = 200, description = "text/event-stream of snapshots and alert events"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Supervisor/Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Dashboard"
)]
pub async fn stream(
    auth: AuthUser,
    publisher: web::Data<BroadcastPublisher>,
    query: web::Query<StreamQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_supervisor_or_admin()?;

    let filter = ChannelFilter::new(query.site_id);
    let rx = publisher.subscribe();
    tracing::debug!(username = %auth.username, role = %auth.role, site_id = ?query.site_id, "Dashboard stream opened");

    let events = matching_envelopes(rx, filter)
        .map(|envelope| Ok::<_, std::convert::Infallible>(sse_frame(&envelope)));

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(events))
}
