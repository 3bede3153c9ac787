mod error;
mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use state::{AppState, SharedState};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port: u16 = std::env::args()
        .position(|a| a == "--port")
        .and_then(|i| std::env::args().nth(i + 1))
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let bind: String = std::env::args()
        .position(|a| a == "--bind")
        .and_then(|i| std::env::args().nth(i + 1))
        .unwrap_or_else(|| "127.0.0.1".to_string());

    let state: SharedState = Arc::new(AppState::new());

    let app = Router::new()
        .route("/status", get(routes::status))
        .route(
            "/scan",
            post(routes::start_scan).delete(routes::cancel_scan),
        )
        .route("/scan/status", get(routes::scan_status))
        .route("/images", get(routes::list_images))
        .route("/images/thumbnail", get(routes::thumbnail))
        .route("/images/preview", get(routes::preview))
        .route(
            "/metadata",
            get(routes::read_metadata).put(routes::write_metadata),
        )
        .route("/tags/search", get(routes::search_tags))
        .route("/fields", get(routes::fields))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", bind, port);
    eprintln!("photometa-service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
