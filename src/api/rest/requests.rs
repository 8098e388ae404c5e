use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::api::rest::{run_blocking, Actor};
use crate::engine::dispatcher::{self, Dispatched, NewRequest};
use crate::error::AppError;
use crate::models::driver::ServiceCategory;
use crate::models::request::{RequestId, ServiceRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(create_request))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/claim", post(claim))
        .route("/requests/:id/confirm", post(confirm))
        .route("/requests/:id/driver-cancel", post(driver_cancel))
        .route("/requests/:id/client-cancel", post(client_cancel))
        .route("/requests/:id/complete", post(complete))
        .route("/adverts", get(list_adverts))
}

#[derive(Deserialize)]
pub struct AdvertQuery {
    pub category: Option<ServiceCategory>,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Json(payload): Json<NewRequest>,
) -> Result<Json<Dispatched>, AppError> {
    run_blocking(state, move |state| {
        dispatcher::create_request(state, &actor, payload)
    })
    .await
    .map(Json)
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Actor(actor): Actor,
) -> Result<Json<ServiceRequest>, AppError> {
    dispatcher::view_request(&state, RequestId(id), &actor).map(Json)
}

async fn list_adverts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdvertQuery>,
    Actor(actor): Actor,
) -> Result<Json<Vec<ServiceRequest>>, AppError> {
    dispatcher::open_requests(&state, &actor, query.category).map(Json)
}

async fn claim(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Actor(actor): Actor,
) -> Result<Json<ServiceRequest>, AppError> {
    run_blocking(state, move |state| {
        dispatcher::claim(state, RequestId(id), &actor)
    })
    .await
    .map(Json)
}

async fn confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Actor(actor): Actor,
) -> Result<Json<ServiceRequest>, AppError> {
    run_blocking(state, move |state| {
        dispatcher::confirm_reservation(state, RequestId(id), &actor)
    })
    .await
    .map(Json)
}

async fn driver_cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Actor(actor): Actor,
) -> Result<Json<ServiceRequest>, AppError> {
    run_blocking(state, move |state| {
        dispatcher::driver_cancel(state, RequestId(id), &actor)
    })
    .await
    .map(Json)
}

async fn client_cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Actor(actor): Actor,
) -> Result<Json<ServiceRequest>, AppError> {
    run_blocking(state, move |state| {
        dispatcher::client_cancel(state, RequestId(id), &actor)
    })
    .await
    .map(Json)
}

async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Actor(actor): Actor,
) -> Result<Json<ServiceRequest>, AppError> {
    run_blocking(state, move |state| {
        dispatcher::complete(state, RequestId(id), &actor)
    })
    .await
    .map(Json)
}
