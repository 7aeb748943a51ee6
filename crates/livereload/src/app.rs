//! Router wiring.
//!
//! Adds the event stream route and the script injection layer to a host
//! router.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware;
use axum::routing::get;

use crate::broadcaster::Broadcaster;
use crate::inject;
use crate::stream::{self, STREAM_PATH};

/// Install live reload into `router`.
///
/// The injection layer wraps every route already present, so this must run
/// after the host registered its routes.
///
/// # Panics
///
/// Panics if `router` already has a route at [`STREAM_PATH`].
pub(crate) fn install<S>(
    router: Router<S>,
    broadcaster: Arc<Broadcaster>,
    keep_alive: Duration,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .route(
            STREAM_PATH,
            get(move || future::ready(stream::sse_response(&broadcaster, keep_alive))),
        )
        .layer(middleware::from_fn(inject::inject_script))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::StatusCode;
    use axum::response::Html;
    use futures::StreamExt;
    use tower::ServiceExt;

    fn router(broadcaster: &Arc<Broadcaster>, keep_alive: Duration) -> Router {
        let router = Router::new().route("/", get(|| async { Html("<h1>Home</h1>") }));
        install(router, Arc::clone(broadcaster), keep_alive)
    }

    fn get_request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_stream_route_delivers_reload_frame() {
        let broadcaster = Arc::new(Broadcaster::new(4));
        let response = router(&broadcaster, Duration::from_secs(10))
            .oneshot(get_request(STREAM_PATH))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.notify();

        let mut body = response.into_body().into_data_stream();
        let frame = tokio::time::timeout(Duration::from_secs(1), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(&frame[..], b"data: reload\n\n");

        drop(body);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_route_sends_keep_alive() {
        let broadcaster = Arc::new(Broadcaster::new(4));
        let response = router(&broadcaster, Duration::from_millis(20))
            .oneshot(get_request(STREAM_PATH))
            .await
            .unwrap();

        let mut body = response.into_body().into_data_stream();
        let frame = tokio::time::timeout(Duration::from_secs(1), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(&frame[..], b": keep-alive\n\n");
    }

    #[tokio::test]
    async fn test_html_routes_get_script() {
        let broadcaster = Arc::new(Broadcaster::new(4));
        let response = router(&broadcaster, Duration::from_secs(10))
            .oneshot(get_request("/"))
            .await
            .unwrap();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.starts_with("<h1>Home</h1>"));
        assert!(body.contains(STREAM_PATH));
    }

    #[test]
    #[should_panic(expected = "Overlapping method route")]
    fn test_install_over_existing_stream_route_panics() {
        let broadcaster = Arc::new(Broadcaster::new(4));
        let router: Router = Router::new().route(STREAM_PATH, get(|| async { "taken" }));
        let _ = install(router, broadcaster, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_install_keeps_router_state() {
        #[derive(Clone)]
        struct Title(&'static str);

        let broadcaster = Arc::new(Broadcaster::new(4));
        let router = Router::new().route(
            "/",
            get(|axum::extract::State(title): axum::extract::State<Title>| async move {
                Html(title.0)
            }),
        );
        let app = install(router, broadcaster, Duration::from_secs(10)).with_state(Title("Docs"));

        let response = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
