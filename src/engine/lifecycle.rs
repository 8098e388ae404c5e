//! The request state machine.
//!
//! ```text
//! pending ──assign/claim──▶ assigned ──confirm──▶ reserved ──complete──▶ completed
//!    ▲                         │                     │
//!    └──── cancelled_by_driver ◀─────driver_cancel───┘
//!
//! pending | assigned | reserved ──client_cancel──▶ cancelled_by_client
//! ```
//!
//! Transitions are applied to a request value and either mutate it completely
//! or return an error without touching it. Callers are responsible for doing
//! this under the request's lock.

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::driver::{DriverCode, Identity};
use crate::models::request::{RequestStatus, ServiceRequest, StatusChange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    DirectAssign { driver: DriverCode },
    Claim { driver: DriverCode },
    ConfirmReservation { driver: DriverCode },
    DriverCancel { driver: DriverCode },
    ClientCancel { client: Identity },
    /// `driver` is `None` when an administrator signals completion.
    Complete { driver: Option<DriverCode> },
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::DirectAssign { .. } => "direct_assign",
            Transition::Claim { .. } => "claim",
            Transition::ConfirmReservation { .. } => "confirm_reservation",
            Transition::DriverCancel { .. } => "driver_cancel",
            Transition::ClientCancel { .. } => "client_cancel",
            Transition::Complete { .. } => "complete",
        }
    }
}

/// Applies `transition` to `request`.
///
/// Returns the driver whose hold on the request ended, if any (driver or client
/// cancellation of a held request, completion).
pub fn apply(
    request: &mut ServiceRequest,
    transition: &Transition,
    actor: Option<&Identity>,
    at: DateTime<Utc>,
) -> Result<Option<DriverCode>, AppError> {
    let released = match transition {
        Transition::DirectAssign { driver } | Transition::Claim { driver } => {
            if request.status != RequestStatus::Pending {
                return Err(AppError::StaleRequest(format!(
                    "request {} is already taken ({})",
                    request.id, request.status
                )));
            }
            record(request, RequestStatus::Assigned, actor, at);
            request.assigned_driver = Some(driver.clone());
            request.assigned_at = Some(at);
            request.reserved_at = None;
            None
        }
        Transition::ConfirmReservation { driver } => {
            if request.status != RequestStatus::Assigned {
                return Err(AppError::StaleRequest(format!(
                    "request {} cannot be confirmed while {}",
                    request.id, request.status
                )));
            }
            ensure_assigned_to(request, driver)?;
            record(request, RequestStatus::Reserved, actor, at);
            request.reserved_at = Some(at);
            None
        }
        Transition::DriverCancel { driver } => {
            if !request.status.holds_driver() {
                return Err(AppError::StaleRequest(format!(
                    "request {} cannot be released while {}",
                    request.id, request.status
                )));
            }
            ensure_assigned_to(request, driver)?;
            record(request, RequestStatus::CancelledByDriver, actor, at);
            record(request, RequestStatus::Pending, actor, at);
            request.assigned_at = None;
            request.reserved_at = None;
            request.assigned_driver.take()
        }
        Transition::ClientCancel { client } => {
            if request.status.is_terminal() {
                return Err(AppError::StaleRequest(format!(
                    "request {} is already {}",
                    request.id, request.status
                )));
            }
            if &request.client_reference != client {
                return Err(AppError::NotAuthorized(format!(
                    "only the requesting client may cancel request {}",
                    request.id
                )));
            }
            record(request, RequestStatus::CancelledByClient, actor, at);
            request.closed_at = Some(at);
            request.assigned_driver.take()
        }
        Transition::Complete { driver } => {
            if request.status != RequestStatus::Reserved {
                return Err(AppError::StaleRequest(format!(
                    "request {} cannot be completed while {}",
                    request.id, request.status
                )));
            }
            if let Some(driver) = driver {
                ensure_assigned_to(request, driver)?;
            }
            record(request, RequestStatus::Completed, actor, at);
            request.closed_at = Some(at);
            request.assigned_driver.take()
        }
    };

    debug_assert!(driver_matches_status(request));
    Ok(released)
}

/// `assigned_driver` is set exactly while the request is assigned or reserved.
pub fn driver_matches_status(request: &ServiceRequest) -> bool {
    request.assigned_driver.is_some() == request.status.holds_driver()
}

fn ensure_assigned_to(request: &ServiceRequest, driver: &DriverCode) -> Result<(), AppError> {
    if request.is_assigned_to(driver) {
        Ok(())
    } else {
        Err(AppError::NotAuthorized(format!(
            "driver {driver} is not assigned to request {}",
            request.id
        )))
    }
}

fn record(
    request: &mut ServiceRequest,
    to: RequestStatus,
    actor: Option<&Identity>,
    at: DateTime<Utc>,
) {
    request.history.push(StatusChange {
        from: request.status,
        to,
        actor: actor.cloned(),
        at,
    });
    request.status = to;
}
