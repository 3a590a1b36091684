//! Read-only HTTP API over the last published layout.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::store::{LayoutStore, PublishedLayout, StationView};

/// Build the API router.
pub fn build_router(store: LayoutStore) -> Router {
    // CORS layer for the dashboard
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/stations", get(list_stations))
        .route("/api/v1/stations/:id", get(get_station))
        .layer(cors)
        .with_state(store)
}

async fn health() -> &'static str {
    "OK"
}

async fn list_stations(State(store): State<LayoutStore>) -> Json<PublishedLayout> {
    Json(PublishedLayout::clone(&*store.dump().await))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

async fn get_station(
    State(store): State<LayoutStore>,
    Path(id): Path<String>,
) -> Result<Json<StationView>, (StatusCode, Json<ErrorBody>)> {
    store.lookup(&id).await.map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("station {id} not found"),
            }),
        )
    })
}
