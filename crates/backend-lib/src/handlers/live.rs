// ============================
// crates/backend-lib/src/handlers/live.rs
// ============================
//! Live update endpoints.
//!
//! A stream emits one server-sent event, named after its topic, every time
//! the topic is signalled. Clients re-fetch current state on each event;
//! bursts of changes arrive as a single event.
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream};
use metrics::gauge;
use std::convert::Infallible;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::broadcast::Listener;
use crate::error::AppError;
use crate::metrics::STREAM_ACTIVE;
use crate::middleware::CurrentUser;
use crate::AppState;

/// Longest accepted topic name
pub const MAX_TOPIC_LENGTH: usize = 64;

/// Topics are short identifiers, safe to use verbatim as SSE event names
pub fn is_valid_topic(topic: &str) -> bool {
    !topic.is_empty()
        && topic.len() <= MAX_TOPIC_LENGTH
        && topic
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Keeps the active stream gauge honest however the stream ends
struct ActiveStream;

impl ActiveStream {
    fn start() -> Self {
        gauge!(STREAM_ACTIVE).increment(1.0);
        Self
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        gauge!(STREAM_ACTIVE).decrement(1.0);
    }
}

/// `GET /admin/stream/{topic}`
pub async fn stream_topic(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(topic): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if !is_valid_topic(&topic) {
        return Err(AppError::InvalidTopic);
    }
    debug!(user_id = user.id, %topic, "stream opened");
    let listener = state.broadcaster.listen(&topic);

    let events = topic_events(listener, state.shutdown.child_token());
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Events for `listener` until the server shuts down. Dropping the stream
/// (client gone) drops the listener, which unregisters it.
pub fn topic_events(
    listener: Listener,
    shutdown: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(
        (listener, shutdown, ActiveStream::start()),
        |(mut listener, shutdown, active)| async move {
            let woke = tokio::select! {
                () = shutdown.cancelled() => false,
                signal = listener.recv() => signal.is_some(),
            };
            if !woke {
                debug!(topic = listener.topic(), id = listener.id(), "stream closed");
                return None;
            }

            let event = Event::default().event(listener.topic()).data("changed");
            Some((Ok(event), (listener, shutdown, active)))
        },
    )
}

/// `POST /admin/topics/{topic}/touch`
///
/// Wakes the topic's listeners after a change made outside this process.
pub async fn touch_topic(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(topic): Path<String>,
) -> Result<StatusCode, AppError> {
    if !is_valid_topic(&topic) {
        return Err(AppError::InvalidTopic);
    }
    match state.broadcaster.send(&topic) {
        Ok(delivered) => debug!(user_id = user.id, %topic, delivered, "topic touched"),
        // Those listeners already have a wake-up pending
        Err(e) => debug!(user_id = user.id, error = %e, "partial broadcast"),
    }
    Ok(StatusCode::NO_CONTENT)
}
