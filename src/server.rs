//! HTTP front end: `GET /?url=...` and `GET /feed?url=...`.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::api::{self, ApiResponse, FeedQuery};
use crate::error::{Error, ValidationError};
use crate::feed::Fetcher;

#[derive(Clone)]
pub struct AppState {
    pub fetcher: Fetcher,
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, "application/json")], self.body).into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(convert_feed))
        .route("/feed", get(convert_feed))
        .with_state(state)
}

/// Converts the feed named by the `url` query parameter.
///
/// If the client disconnects, axum drops this future and with it the
/// in-flight upstream request. An unreadable query string is answered with
/// the same JSON error body as a missing `url`.
async fn convert_feed(
    State(state): State<AppState>,
    query: Result<Query<FeedQuery>, QueryRejection>,
) -> ApiResponse {
    match query {
        Ok(Query(query)) => api::handle(&state.fetcher, &query).await,
        Err(rejection) => {
            let err = Error::from(ValidationError::MalformedQuery(rejection.body_text()));
            tracing::debug!(error = %err, "Rejected request");
            api::render_error(&err)
        }
    }
}

/// Serves on an already-bound listener until Ctrl-C.
pub async fn serve(listener: TcpListener, fetcher: Fetcher) -> std::io::Result<()> {
    let app = create_router(AppState { fetcher });

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Server running on http://{}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn run(addr: SocketAddr, fetcher: Fetcher) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, fetcher).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C, graceful shutdown disabled");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
