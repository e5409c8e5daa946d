//! Elasticsearch-style HTTP surface over the search core.

mod handlers;

use std::future::Future;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use tokio::net::TcpListener;

use crate::config::StorageConfig;
use crate::domain::ErrorBody;
use crate::error::{HelixSearchError, Result};
use crate::services::SearchCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: SearchCoordinator,
    pub storage: StorageConfig,
}

impl AppState {
    pub const fn new(coordinator: SearchCoordinator, storage: StorageConfig) -> Self {
        Self {
            coordinator,
            storage,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/_search", get(handlers::search_all).post(handlers::search_all))
        .route("/_msearch", post(handlers::msearch_all))
        .route("/_cat/indices", get(handlers::cat_indices))
        .route(
            "/:index",
            put(handlers::create_index)
                .get(handlers::get_index)
                .delete(handlers::delete_index),
        )
        .route(
            "/:index/_search",
            get(handlers::search_index).post(handlers::search_index),
        )
        .route("/:index/_msearch", post(handlers::msearch_index))
        .route("/:index/_count", get(handlers::count))
        .route("/:index/_doc", post(handlers::add_document))
        .route(
            "/:index/_doc/:id",
            put(handlers::put_document).delete(handlers::delete_document),
        )
        .with_state(state)
}

/// Serves until `shutdown` resolves, then drains in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Error response: `{"error": ..., "status": ...}` with the matching status.
#[derive(Debug)]
pub struct ApiError(pub HelixSearchError);

impl<E> From<E> for ApiError
where
    E: Into<HelixSearchError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        if !err.is_client_error() {
            tracing::error!(error = %err, "request failed");
        }
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody::from(&err))).into_response()
    }
}
