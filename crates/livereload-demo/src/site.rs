//! Demo site routes.
//!
//! Serves `template_dir/<name>.html` at `/<name>` (`/` is `index.html`) and
//! the static directory under `/static`.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use livereload_config::AppConfig;
use tower_http::services::ServeDir;

/// Shared state of the page handlers.
#[derive(Clone)]
struct SiteState {
    template_dir: Arc<PathBuf>,
}

/// Build the demo site router.
pub(crate) fn router(app: &AppConfig) -> Router {
    let state = SiteState {
        template_dir: Arc::new(app.template_dir.clone()),
    };

    Router::new()
        .route("/", get(index))
        .route("/{page}", get(page))
        .nest_service("/static", ServeDir::new(&app.static_dir))
        .with_state(state)
}

async fn index(State(state): State<SiteState>) -> Response {
    render(&state, "index").await
}

async fn page(State(state): State<SiteState>, Path(name): Path<String>) -> Response {
    let name = name.strip_suffix(".html").unwrap_or(&name);
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return not_found();
    }
    render(&state, name).await
}

async fn render(state: &SiteState, name: &str) -> Response {
    let path = state.template_dir.join(format!("{name}.html"));

    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Html(content).into_response(),
        Err(e) if e.kind() == ErrorKind::NotFound => not_found(),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read template");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html("<h1>Internal Server Error</h1>"),
            )
                .into_response()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html("<h1>Not Found</h1>")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::Request;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tower::ServiceExt;

    fn site() -> (tempfile::TempDir, Router) {
        let temp_dir = tempfile::tempdir().unwrap();
        let templates = temp_dir.path().join("templates");
        let statics = temp_dir.path().join("static");
        fs::create_dir_all(&templates).unwrap();
        fs::create_dir_all(statics.join("css")).unwrap();
        fs::write(templates.join("index.html"), "<h1>Home</h1>").unwrap();
        fs::write(templates.join("about.html"), "<h1>About</h1>").unwrap();
        fs::write(statics.join("css").join("site.css"), "body { color: red; }").unwrap();

        let app = AppConfig {
            debug: true,
            template_dir: templates,
            static_dir: statics,
        };
        let router = router(&app);
        (temp_dir, router)
    }

    async fn get_page(router: Router, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_index_page() {
        let (_temp_dir, router) = site();
        assert_eq!(
            get_page(router, "/").await,
            (StatusCode::OK, "<h1>Home</h1>".to_owned())
        );
    }

    #[tokio::test]
    async fn test_named_page() {
        let (_temp_dir, router) = site();
        assert_eq!(
            get_page(router.clone(), "/about").await,
            (StatusCode::OK, "<h1>About</h1>".to_owned())
        );
        assert_eq!(get_page(router, "/about.html").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_page() {
        let (_temp_dir, router) = site();
        assert_eq!(get_page(router, "/missing").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_hidden_page_rejected() {
        let (_temp_dir, router) = site();
        assert_eq!(get_page(router, "/.secret").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_static_file() {
        let (_temp_dir, router) = site();
        assert_eq!(
            get_page(router, "/static/css/site.css").await,
            (StatusCode::OK, "body { color: red; }".to_owned())
        );
    }
}
