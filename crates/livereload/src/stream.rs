//! Server-sent event stream for live reload clients.
//!
//! Each connection owns a [`Subscription`]. The stream waits for the next
//! reload message up to the keep-alive interval and writes either a
//! `data: reload` frame or a comment frame. When the client goes away axum
//! drops the stream, and with it the subscription.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::http::header::HeaderName;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use futures::stream;

use crate::broadcaster::{Broadcaster, Subscription};

/// Path of the event stream endpoint.
pub const STREAM_PATH: &str = "/_livereload";

/// Comment written when no reload happened within the keep-alive interval.
const KEEP_ALIVE_COMMENT: &str = "keep-alive";

/// Open a new client stream.
pub(crate) fn sse_response(broadcaster: &Arc<Broadcaster>, keep_alive: Duration) -> Response {
    let subscription = broadcaster.subscribe();
    tracing::info!(
        subscriber = %subscription.id(),
        clients = broadcaster.subscriber_count(),
        "Live reload client connected"
    );

    let mut response = Sse::new(event_stream(subscription, keep_alive)).into_response();
    // Reverse proxies must not buffer the stream
    response.headers_mut().insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    response
}

/// Turn a subscription into a stream of SSE events.
///
/// The stream ends once the broadcaster drops the subscriber (shutdown).
pub(crate) fn event_stream(
    subscription: Subscription,
    keep_alive: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    stream::unfold(subscription, move |mut subscription| async move {
        let event = match tokio::time::timeout(keep_alive, subscription.recv()).await {
            Ok(Some(message)) => Event::default().data(message.as_str()),
            Ok(None) => {
                tracing::debug!(subscriber = %subscription.id(), "Live reload stream closed");
                return None;
            }
            Err(_) => Event::default().comment(KEEP_ALIVE_COMMENT),
        };
        Some((Ok(event), subscription))
    })
}
