use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::api::rest::{run_blocking, Actor};
use crate::engine::eligibility::Eligibility;
use crate::engine::fleet::{self, RegistrationForm};
use crate::error::AppError;
use crate::models::driver::{Driver, DriverCode, GeoPoint};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(register_driver).get(list_drivers))
        .route("/drivers/:code", get(get_driver))
        .route("/drivers/:code/eligibility", get(get_eligibility))
        .route("/drivers/:code/duty", put(update_duty))
        .route("/drivers/:code/location", put(update_location))
        .route("/drivers/:code/payment/report", post(report_payment))
        .route(
            "/drivers/:code/payment",
            put(approve_payment).delete(revoke_payment),
        )
        .route("/drivers/:code/enabled", put(update_enabled))
}

#[derive(Deserialize)]
pub struct UpdateDutyRequest {
    pub on_duty: bool,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct UpdateEnabledRequest {
    pub enabled: bool,
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Json(payload): Json<RegistrationForm>,
) -> Result<Json<Driver>, AppError> {
    run_blocking(state, move |state| {
        fleet::register_driver(state, &actor, payload)
    })
    .await
    .map(Json)
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
) -> Result<Json<Vec<Driver>>, AppError> {
    fleet::list_drivers(&state, &actor).map(Json)
}

async fn get_driver(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Actor(actor): Actor,
) -> Result<Json<Driver>, AppError> {
    fleet::get_driver(&state, &actor, &DriverCode::from(code.as_str())).map(Json)
}

async fn get_eligibility(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Actor(actor): Actor,
) -> Result<Json<Eligibility>, AppError> {
    fleet::eligibility(&state, &actor, &DriverCode::from(code.as_str())).map(Json)
}

async fn update_duty(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Actor(actor): Actor,
    Json(payload): Json<UpdateDutyRequest>,
) -> Result<Json<Driver>, AppError> {
    let code = DriverCode::from(code.as_str());
    run_blocking(state, move |state| {
        if payload.on_duty {
            fleet::start_shift(state, &actor, &code)
        } else {
            fleet::end_shift(state, &actor, &code)
        }
    })
    .await
    .map(Json)
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Actor(actor): Actor,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    let code = DriverCode::from(code.as_str());
    run_blocking(state, move |state| {
        fleet::update_location(state, &actor, &code, payload.location)
    })
    .await
    .map(Json)
}

async fn report_payment(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Actor(actor): Actor,
) -> Result<StatusCode, AppError> {
    fleet::report_payment(&state, &actor, &DriverCode::from(code.as_str()))?;
    Ok(StatusCode::ACCEPTED)
}

async fn approve_payment(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Actor(actor): Actor,
) -> Result<Json<Driver>, AppError> {
    let code = DriverCode::from(code.as_str());
    run_blocking(state, move |state| {
        fleet::approve_payment(state, &actor, &code)
    })
    .await
    .map(Json)
}

async fn revoke_payment(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Actor(actor): Actor,
) -> Result<Json<Driver>, AppError> {
    let code = DriverCode::from(code.as_str());
    run_blocking(state, move |state| {
        fleet::revoke_payment(state, &actor, &code)
    })
    .await
    .map(Json)
}

async fn update_enabled(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Actor(actor): Actor,
    Json(payload): Json<UpdateEnabledRequest>,
) -> Result<Json<Driver>, AppError> {
    let code = DriverCode::from(code.as_str());
    run_blocking(state, move |state| {
        fleet::set_enabled(state, &actor, &code, payload.enabled)
    })
    .await
    .map(Json)
}
