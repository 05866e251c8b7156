//! Server-Sent Events endpoint for library and sharing changes.
//!
//! Endpoint: GET /events/
//!
//! ```text
//! event: sharing_changed
//! data: {"type":"sharing_changed","share_id":4,"action":"accepted","timestamp":"..."}
//!
//! event: heartbeat
//! data: {"type":"heartbeat","timestamp":"..."}
//! ```
//!
//! Clients that cannot hold a stream poll `/notebooks/` and `/sharing/list/`.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use chrono::Utc;
use futures::stream::{self, Stream};
use nbrepo_core::Username;
use tokio::sync::broadcast::error::RecvError;

use crate::error::ApiError;
use crate::events::{HEARTBEAT_INTERVAL_SECS, RepoEvent};
use crate::extract::Caller;
use crate::state::AppState;

fn to_sse(event: &RepoEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(data) => Some(Event::default().event(event.name()).data(data)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize event");
            None
        }
    }
}

/// GET /events/ - Subscribe to changes relevant to the caller.
///
/// # Response
///
/// - 200 OK: SSE stream (Content-Type: text/event-stream)
/// - 401 Unauthorized: No identity
///
/// # Backpressure
///
/// A subscriber that falls behind receives one `catchup` event and should
/// refetch its library and sharing views.
async fn subscribe_events(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let user: Username = identity.username;
    let receiver = state.broadcaster().subscribe(&user).await;
    tracing::info!(user = %user, "Client subscribed to SSE events");

    let stream = stream::unfold((receiver, user), |(mut rx, user)| async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(count)) => {
                    tracing::warn!(user = %user, events_missed = count, "SSE client lagged, sending catchup event");
                    RepoEvent::Catchup {
                        events_missed: count,
                        timestamp: Utc::now(),
                    }
                }
                Err(RecvError::Closed) => {
                    tracing::debug!(user = %user, "Event channel closed, ending SSE stream");
                    return None;
                }
            };
            if let Some(sse_event) = to_sse(&event) {
                return Some((Ok(sse_event), (rx, user)));
            }
        }
    });

    let heartbeat = RepoEvent::Heartbeat {
        timestamp: Utc::now(),
    };
    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS))
        .event(to_sse(&heartbeat).unwrap_or_else(|| Event::default().event("heartbeat")));

    Ok(Sse::new(stream).keep_alive(keep_alive))
}

/// Build SSE event routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/events/", get(subscribe_events))
}
