use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::lifecycle::{self, Transition};
use crate::engine::selector::select;
use crate::error::AppError;
use crate::models::driver::{Driver, DriverCode, GeoPoint, Identity, ServiceCategory};
use crate::models::request::{RequestId, RequestStatus, ServiceRequest};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct NewRequest {
    pub category: ServiceCategory,
    pub client_name: String,
    pub client_contact: String,
    pub origin: String,
    #[serde(default)]
    pub destination: String,
    pub client_location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Direct {
        driver: DriverCode,
        distance_km: Option<f64>,
    },
    Broadcast,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dispatched {
    pub request: ServiceRequest,
    pub outcome: DispatchOutcome,
}

/// Creates a pending request for `client` and immediately tries to place it.
pub fn create_request(
    state: &AppState,
    client: &Identity,
    new: NewRequest,
) -> Result<Dispatched, AppError> {
    if new.client_name.trim().is_empty() {
        return Err(AppError::BadRequest("client_name cannot be empty".to_string()));
    }
    if new.origin.trim().is_empty() {
        return Err(AppError::BadRequest("origin cannot be empty".to_string()));
    }
    if let Some(location) = &new.client_location {
        if !location.is_valid() {
            return Err(AppError::BadRequest(
                "client_location is out of range".to_string(),
            ));
        }
    }

    let now = state.now();
    let request = state.requests.create(|id| ServiceRequest {
        id,
        category: new.category,
        client_reference: client.clone(),
        client_name: new.client_name.trim().to_string(),
        client_contact: new.client_contact.trim().to_string(),
        origin: new.origin.trim().to_string(),
        destination: new.destination.trim().to_string(),
        client_location: new.client_location,
        status: RequestStatus::Pending,
        assigned_driver: None,
        created_at: now,
        assigned_at: None,
        reserved_at: None,
        closed_at: None,
        history: Vec::new(),
    })?;

    state
        .metrics
        .dispatch_requests_total
        .with_label_values(&[request.category.label()])
        .inc();
    info!(request_id = %request.id, category = %request.category, "request created");

    dispatch(state, request)
}

/// Assigns `request` to the nearest eligible driver, or advertises it when there is none.
pub fn dispatch(state: &AppState, request: ServiceRequest) -> Result<Dispatched, AppError> {
    let now = state.now();
    let (driver, distance_km) = match nearest_candidate(state, &request, now) {
        Ok(found) => found,
        Err(AppError::NoCandidate) => return broadcast_fallback(state, request),
        Err(err) => return Err(err),
    };

    let transition = Transition::DirectAssign {
        driver: driver.code.clone(),
    };
    // The request is already durably pending, so a lost assignment commit still advertises it.
    let (request, _, _) = match run_transition(state, request.id, &transition, None, now) {
        Ok(committed) => committed,
        Err(err @ AppError::Persistence(_)) => {
            warn!(
                error = %err,
                request_id = %request.id,
                driver_code = %driver.code,
                "direct assignment not saved; broadcasting instead"
            );
            return broadcast_fallback(state, request);
        }
        Err(err) => return Err(err),
    };
    attach_driver(state, &driver.code, request.id, now);

    let distance = distance_km
        .map(|km| format!("{km:.1} km"))
        .unwrap_or_else(|| "unknown".to_string());
    state.outbox.notify(
        &driver.identity,
        format!(
            "New {} request {}\nClient: {} ({})\nFrom: {}\nTo: {}\nApprox. distance: {distance}\nConfirm to reserve it or cancel to release it.",
            request.category,
            request.id,
            request.client_name,
            request.client_contact,
            request.origin,
            request.destination,
        ),
    );
    state.outbox.notify(
        &request.client_reference,
        format!(
            "Driver assigned: {} ({})\nPhone: {}\nRequest {}",
            driver.name, driver.code, driver.phone, request.id
        ),
    );

    state
        .metrics
        .dispatch_outcomes_total
        .with_label_values(&["direct"])
        .inc();
    info!(request_id = %request.id, driver_code = %driver.code, ?distance_km, "request assigned directly");

    Ok(Dispatched {
        outcome: DispatchOutcome::Direct {
            driver: driver.code,
            distance_km,
        },
        request,
    })
}

fn nearest_candidate(
    state: &AppState,
    request: &ServiceRequest,
    now: DateTime<Utc>,
) -> Result<(Driver, Option<f64>), AppError> {
    let drivers = state.drivers.of_category(request.category);

    let start = Instant::now();
    let selected = {
        let mut rng = rand::thread_rng();
        select(request, &drivers, &state.policy, now, &mut rng)
            .map(|selection| (selection.driver.clone(), selection.distance_km))
    };
    state
        .metrics
        .selection_latency_seconds
        .observe(start.elapsed().as_secs_f64());

    selected.ok_or(AppError::NoCandidate)
}

fn broadcast_fallback(state: &AppState, request: ServiceRequest) -> Result<Dispatched, AppError> {
    state.broadcaster.advertise(&state.outbox, &request);
    state.outbox.notify(
        &request.client_reference,
        format!(
            "No {} driver is free nearby. Request {} was published to all {} drivers; you will be told when one takes it.",
            request.category, request.id, request.category
        ),
    );

    state
        .metrics
        .dispatch_outcomes_total
        .with_label_values(&["broadcast"])
        .inc();
    info!(request_id = %request.id, category = %request.category, "no candidate; request broadcast");

    Ok(Dispatched {
        request,
        outcome: DispatchOutcome::Broadcast,
    })
}

/// First claim on a pending advertised request wins; later claims are stale.
pub fn claim(state: &AppState, id: RequestId, actor: &Identity) -> Result<ServiceRequest, AppError> {
    let driver = resolve_driver(state, actor)?;
    let now = state.now();

    let current = state.requests.get(id)?;
    if driver.category != current.category {
        return Err(AppError::NotAuthorized(format!(
            "driver {} serves {} requests, request {id} is {}",
            driver.code, driver.category, current.category
        )));
    }
    let eligibility = state.policy.can_work(&driver, now);
    if !eligibility.eligible {
        return Err(AppError::Ineligible(eligibility.reason));
    }

    let transition = Transition::Claim {
        driver: driver.code.clone(),
    };
    let (request, _, _) = run_transition(state, id, &transition, Some(actor), now)?;
    attach_driver(state, &driver.code, id, now);

    state.broadcaster.close(
        &state.outbox,
        id,
        request.category,
        format!("Request {id} was taken by {}", driver.code),
    );
    state.outbox.notify(
        &driver.identity,
        format!(
            "You took request {id}\nClient: {} ({})\nFrom: {}\nTo: {}\nConfirm to reserve it.",
            request.client_name, request.client_contact, request.origin, request.destination
        ),
    );
    state.outbox.notify(
        &request.client_reference,
        format!(
            "Driver {} ({}) took your request {id}\nPhone: {}",
            driver.name, driver.code, driver.phone
        ),
    );

    Ok(request)
}

pub fn confirm_reservation(
    state: &AppState,
    id: RequestId,
    actor: &Identity,
) -> Result<ServiceRequest, AppError> {
    let driver = resolve_driver(state, actor)?;
    let now = state.now();

    let transition = Transition::ConfirmReservation {
        driver: driver.code.clone(),
    };
    let (request, _, _) = run_transition(state, id, &transition, Some(actor), now)?;

    state.outbox.notify(
        &request.client_reference,
        format!(
            "Driver {} ({}) confirmed request {id} and is on the way.",
            driver.name, driver.code
        ),
    );

    Ok(request)
}

/// The assigned driver gives the request back; it is re-advertised as new.
pub fn driver_cancel(
    state: &AppState,
    id: RequestId,
    actor: &Identity,
) -> Result<ServiceRequest, AppError> {
    let driver = resolve_driver(state, actor)?;
    let now = state.now();

    let transition = Transition::DriverCancel {
        driver: driver.code.clone(),
    };
    let (request, _, released) = run_transition(state, id, &transition, Some(actor), now)?;
    if let Some(code) = released {
        detach_driver(state, &code, id, now);
    }

    state.outbox.notify(
        &request.client_reference,
        format!("The driver cancelled request {id}. Another driver may take it."),
    );
    state.broadcaster.advertise(&state.outbox, &request);

    Ok(request)
}

pub fn client_cancel(
    state: &AppState,
    id: RequestId,
    actor: &Identity,
) -> Result<ServiceRequest, AppError> {
    let now = state.now();

    let transition = Transition::ClientCancel {
        client: actor.clone(),
    };
    let (request, before, released) = run_transition(state, id, &transition, Some(actor), now)?;

    if let Some(code) = released {
        detach_driver(state, &code, id, now);
        match state.drivers.get(&code) {
            Ok(driver) => state.outbox.notify(
                &driver.identity,
                format!("The client cancelled request {id}. It is void."),
            ),
            Err(err) => warn!(error = %err, request_id = %id, "cannot notify released driver"),
        }
    }
    if before == RequestStatus::Pending {
        state.broadcaster.close(
            &state.outbox,
            id,
            request.category,
            format!("Request {id} was cancelled by the client"),
        );
    }
    state.outbox.notify(
        &request.client_reference,
        format!("Request {id} cancelled."),
    );

    Ok(request)
}

/// Signalled by the assigned driver, or by an administrator on their behalf.
pub fn complete(
    state: &AppState,
    id: RequestId,
    actor: &Identity,
) -> Result<ServiceRequest, AppError> {
    let now = state.now();
    let driver = if state.is_admin(actor) {
        None
    } else {
        Some(resolve_driver(state, actor)?.code)
    };

    let transition = Transition::Complete { driver };
    let (request, _, released) = run_transition(state, id, &transition, Some(actor), now)?;
    if let Some(code) = released {
        detach_driver(state, &code, id, now);
    }

    state.outbox.notify(
        &request.client_reference,
        format!("Request {id} completed. Thank you!"),
    );

    Ok(request)
}

/// Visible to the requesting client, the assigned driver and administrators.
pub fn view_request(
    state: &AppState,
    id: RequestId,
    actor: &Identity,
) -> Result<ServiceRequest, AppError> {
    let request = state.requests.get(id)?;
    if &request.client_reference == actor || state.is_admin(actor) {
        return Ok(request);
    }

    let is_assigned_driver = state
        .drivers
        .find_by_identity(actor)
        .is_some_and(|driver| request.is_assigned_to(&driver.code));
    if is_assigned_driver {
        Ok(request)
    } else {
        Err(AppError::NotAuthorized(format!(
            "{actor} may not view request {id}"
        )))
    }
}

/// Pending requests of a category: the standing view of the broadcast audience.
pub fn open_requests(
    state: &AppState,
    actor: &Identity,
    category: Option<ServiceCategory>,
) -> Result<Vec<ServiceRequest>, AppError> {
    let category = if state.is_admin(actor) {
        category
    } else {
        let driver = resolve_driver(state, actor)?;
        if category.is_some_and(|category| category != driver.category) {
            return Err(AppError::NotAuthorized(format!(
                "driver {} only sees {} requests",
                driver.code, driver.category
            )));
        }
        Some(driver.category)
    };

    Ok(state
        .requests
        .with_status(RequestStatus::Pending)
        .into_iter()
        .filter(|request| category.is_none_or(|category| request.category == category))
        .collect())
}

/// Re-advertises requests that were still pending when the process stopped.
pub fn readvertise_pending(state: &AppState) -> usize {
    let pending = state.requests.with_status(RequestStatus::Pending);
    for request in &pending {
        state.broadcaster.advertise(&state.outbox, request);
    }
    if !pending.is_empty() {
        info!(requests = pending.len(), "pending requests re-advertised");
    }
    pending.len()
}

fn resolve_driver(state: &AppState, actor: &Identity) -> Result<Driver, AppError> {
    state
        .drivers
        .find_by_identity(actor)
        .ok_or_else(|| AppError::NotAuthorized(format!("{actor} is not a registered driver")))
}

/// Applies one lifecycle transition under the request lock and records the outcome.
///
/// Returns the updated request, the status it left, and the driver it released.
fn run_transition(
    state: &AppState,
    id: RequestId,
    transition: &Transition,
    actor: Option<&Identity>,
    now: DateTime<Utc>,
) -> Result<(ServiceRequest, RequestStatus, Option<DriverCode>), AppError> {
    let result = state.requests.transition(id, |request| {
        let before = request.status;
        let released = lifecycle::apply(request, transition, actor, now)?;
        Ok((before, released))
    });

    match result {
        Ok((request, (before, released))) => {
            state
                .metrics
                .transitions_total
                .with_label_values(&[transition.name(), "ok"])
                .inc();
            info!(
                request_id = %id,
                transition = transition.name(),
                from = %before,
                to = %request.status,
                "request transitioned"
            );
            Ok((request, before, released))
        }
        Err(err) => {
            state
                .metrics
                .transitions_total
                .with_label_values(&[transition.name(), err.kind()])
                .inc();
            info!(request_id = %id, transition = transition.name(), error = %err, "transition rejected");
            Err(err)
        }
    }
}

fn attach_driver(state: &AppState, code: &DriverCode, id: RequestId, now: DateTime<Utc>) {
    let result = state.drivers.update(code, now, |driver| {
        driver.current_request = Some(id);
        Ok(())
    });
    if let Err(err) = result {
        warn!(error = %err, driver_code = %code, request_id = %id, "failed to record driver's current request");
    }
}

fn detach_driver(state: &AppState, code: &DriverCode, id: RequestId, now: DateTime<Utc>) {
    let result = state.drivers.update(code, now, |driver| {
        if driver.current_request == Some(id) {
            driver.current_request = None;
        }
        Ok(())
    });
    if let Err(err) = result {
        warn!(error = %err, driver_code = %code, request_id = %id, "failed to clear driver's current request");
    }
}
