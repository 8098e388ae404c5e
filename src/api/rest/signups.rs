use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::api::rest::{run_blocking, Actor};
use crate::engine::fleet::{self, SignupForm};
use crate::error::AppError;
use crate::models::driver::{Driver, ServiceCategory};
use crate::models::signup::PendingSignup;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signups", post(submit_signup).get(list_signups))
        .route("/signups/:phone/register", post(register_signup))
}

#[derive(Deserialize)]
pub struct RegisterSignupRequest {
    pub category: ServiceCategory,
}

async fn submit_signup(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Json(payload): Json<SignupForm>,
) -> Result<Json<PendingSignup>, AppError> {
    run_blocking(state, move |state| {
        fleet::submit_signup(state, &actor, payload)
    })
    .await
    .map(Json)
}

async fn list_signups(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
) -> Result<Json<Vec<PendingSignup>>, AppError> {
    fleet::list_signups(&state, &actor).map(Json)
}

async fn register_signup(
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
    Actor(actor): Actor,
    Json(payload): Json<RegisterSignupRequest>,
) -> Result<Json<Driver>, AppError> {
    run_blocking(state, move |state| {
        fleet::register_from_signup(state, &actor, &phone, payload.category)
    })
    .await
    .map(Json)
}
