//! HTTP surface: read-only listing and per-station query routes.

use crate::error::{AppError, Result};
use crate::query::{QueryEngine, StationParams};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<QueryEngine>,
}

impl ApiState {
    pub fn new(engine: QueryEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

pub fn router(state: ApiState, cors_permissive: bool) -> Router {
    let router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/states", get(list_states))
        .route("/districts/:state", get(list_districts))
        .route("/stations", get(list_stations))
        .route("/station/:station_id", get(station_data))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_permissive {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Serve until `shutdown_rx` flips, then drain in-flight requests
pub async fn run_server(
    listener: TcpListener,
    app: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
            info!("Shutdown signal received, draining connections");
        })
        .await?;

    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Groundwater Monitoring API running" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn list_states(State(st): State<ApiState>) -> Json<Value> {
    Json(json!({ "states": st.engine.list_states() }))
}

async fn list_districts(State(st): State<ApiState>, Path(state): Path<String>) -> Json<Value> {
    let districts = st.engine.list_districts(&state);
    Json(json!({ "state": state, "districts": districts }))
}

#[derive(Debug, Deserialize)]
pub struct StationsQuery {
    pub state: Option<String>,
    pub district: Option<String>,
}

async fn list_stations(
    State(st): State<ApiState>,
    query: std::result::Result<Query<StationsQuery>, QueryRejection>,
) -> Result<Json<Value>> {
    let Query(q) = query.map_err(bad_query)?;
    let state = non_empty(q.state.as_deref());
    let district = non_empty(q.district.as_deref());

    let stations = st.engine.stations_matching(state, district);
    Ok(Json(json!({ "stations": stations })))
}

async fn station_data(
    State(st): State<ApiState>,
    Path(station_id): Path<String>,
    query: std::result::Result<Query<StationParams>, QueryRejection>,
) -> Result<Response> {
    let Query(params) = query.map_err(bad_query)?;
    let report = st.engine.station_data(&station_id, &params)?;
    Ok(Json(report).into_response())
}

fn bad_query(rejection: QueryRejection) -> AppError {
    AppError::BadRequest(rejection.body_text())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
