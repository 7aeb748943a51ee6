//! Client script injection.
//!
//! HTML responses get a small script appended that opens an `EventSource` on
//! the stream endpoint and reloads the page on a `reload` message. The body is
//! streamed through with the script chained after it, so nothing is buffered.

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use futures::{StreamExt, future, stream};

/// Snippet appended to every HTML response.
pub const LIVE_RELOAD_SCRIPT: &str = r#"
<script>
    var source = new EventSource("/_livereload");
    source.onmessage = function(event) {
        if (event.data == "reload") {
            window.location.reload();
        }
    };
</script>
"#;

/// Responses declaring a larger body are passed through untouched.
const MAX_INJECT_BYTES: u64 = 16 * 1024 * 1024;

/// Middleware appending [`LIVE_RELOAD_SCRIPT`] to `text/html` responses.
pub async fn inject_script(request: Request, next: Next) -> Response {
    let is_head = request.method() == Method::HEAD;
    let response = next.run(request).await;

    if is_head || !should_inject(&response) {
        return response;
    }
    append_script(response)
}

fn should_inject(response: &Response) -> bool {
    let status = response.status();
    if status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return false;
    }

    let headers = response.headers();
    // Compressed bodies cannot be appended to
    if headers.contains_key(CONTENT_ENCODING) {
        return false;
    }

    let is_html = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"));

    is_html && content_length(headers).is_none_or(|len| len <= MAX_INJECT_BYTES)
}

fn append_script(response: Response) -> Response {
    let (mut parts, body) = response.into_parts();

    let declared = content_length(&parts.headers);
    parts.headers.remove(CONTENT_LENGTH);
    if let Some(len) = declared {
        parts.headers.insert(
            CONTENT_LENGTH,
            HeaderValue::from(len + LIVE_RELOAD_SCRIPT.len() as u64),
        );
    }

    let script = stream::once(future::ready(Ok::<_, axum::Error>(Bytes::from_static(
        LIVE_RELOAD_SCRIPT.as_bytes(),
    ))));
    let body = Body::from_stream(body.into_data_stream().chain(script));

    Response::from_parts(parts, body)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}
