pub mod drivers;
pub mod requests;
pub mod signups;
pub mod ws;

use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::models::driver::Identity;
use crate::state::AppState;

/// Header carrying the authenticated identity of whoever performs the action.
pub const ACTOR_HEADER: &str = "x-actor-id";

#[derive(Debug, Clone)]
pub struct Actor(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or_else(|| AppError::NotAuthorized(format!("missing {ACTOR_HEADER} header")))?;

        let identity = raw
            .to_str()
            .map_err(|_| AppError::NotAuthorized(format!("{ACTOR_HEADER} is not valid text")))?
            .trim();
        if identity.is_empty() {
            return Err(AppError::NotAuthorized(format!("{ACTOR_HEADER} is empty")));
        }

        Ok(Actor(Identity::from(identity)))
    }
}

/// Runs an engine action on the blocking pool, since commits write snapshots to disk.
pub(crate) async fn run_blocking<T, F>(state: Arc<AppState>, action: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || action(&state))
        .await
        .map_err(|err| AppError::Internal(format!("engine task failed: {err}")))?
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(drivers::router())
        .merge(requests::router())
        .merge(signups::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    drivers: usize,
    drivers_on_duty: usize,
    requests: usize,
    pending_signups: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        drivers: state.drivers.len(),
        drivers_on_duty: state.drivers.on_duty_count(),
        requests: state.requests.len(),
        pending_signups: state.signups.list().len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
