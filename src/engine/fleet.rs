//! Driver administration and self-service duty, location and payment actions.

use serde::Deserialize;
use tracing::{info, warn};

use crate::engine::eligibility::Eligibility;
use crate::error::AppError;
use crate::models::driver::{Driver, DriverCode, GeoPoint, Identity, ServiceCategory};
use crate::models::signup::PendingSignup;
use crate::state::AppState;
use crate::store::NewDriver;

#[derive(Debug, Clone, Deserialize)]
pub struct SignupForm {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationForm {
    pub identity: Identity,
    pub name: String,
    pub phone: String,
    pub category: ServiceCategory,
}

pub fn ensure_admin(state: &AppState, actor: &Identity) -> Result<(), AppError> {
    if state.is_admin(actor) {
        Ok(())
    } else {
        Err(AppError::NotAuthorized(format!(
            "{actor} is not an administrator"
        )))
    }
}

fn ensure_self(actor: &Identity, driver: &Driver) -> Result<(), AppError> {
    if &driver.identity == actor {
        Ok(())
    } else {
        Err(AppError::NotAuthorized(format!(
            "{actor} may not act for driver {}",
            driver.code
        )))
    }
}

fn ensure_self_or_admin(
    state: &AppState,
    actor: &Identity,
    driver: &Driver,
) -> Result<(), AppError> {
    if state.is_admin(actor) {
        Ok(())
    } else {
        ensure_self(actor, driver)
    }
}

fn notify_admins(state: &AppState, message: &str) {
    for admin in &state.admins {
        state.outbox.notify(admin, message);
    }
}

/// A prospective driver asks to be registered; administrators are told.
pub fn submit_signup(
    state: &AppState,
    actor: &Identity,
    form: SignupForm,
) -> Result<PendingSignup, AppError> {
    let name = form.name.trim().to_string();
    let phone = form.phone.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if phone.is_empty() {
        return Err(AppError::BadRequest("phone cannot be empty".to_string()));
    }
    if let Some(existing) = state.drivers.find_by_identity(actor) {
        return Err(AppError::Conflict(format!(
            "{actor} is already registered as driver {}",
            existing.code
        )));
    }

    let signup = PendingSignup {
        name,
        phone,
        identity: actor.clone(),
        submitted_at: state.now(),
    };
    state.signups.submit(signup.clone())?;

    notify_admins(
        state,
        &format!(
            "New driver signup\nName: {}\nPhone: {}\nIdentity: {}",
            signup.name, signup.phone, signup.identity
        ),
    );
    state.outbox.notify(
        actor,
        "Your signup was sent to the administrators. You can start a shift once registered.",
    );
    info!(phone = %signup.phone, "driver signup submitted");

    Ok(signup)
}

pub fn list_signups(state: &AppState, actor: &Identity) -> Result<Vec<PendingSignup>, AppError> {
    ensure_admin(state, actor)?;
    Ok(state.signups.list())
}

pub fn register_driver(
    state: &AppState,
    actor: &Identity,
    form: RegistrationForm,
) -> Result<Driver, AppError> {
    ensure_admin(state, actor)?;

    let driver = state.drivers.register(
        NewDriver {
            identity: form.identity,
            name: form.name,
            phone: form.phone,
            category: form.category,
        },
        state.now(),
    )?;

    state.outbox.notify(
        &driver.identity,
        format!(
            "You are registered as {} driver {}. Start a shift to receive requests.",
            driver.category, driver.code
        ),
    );
    Ok(driver)
}

/// Turns a pending signup into a driver of `category`.
pub fn register_from_signup(
    state: &AppState,
    actor: &Identity,
    phone: &str,
    category: ServiceCategory,
) -> Result<Driver, AppError> {
    ensure_admin(state, actor)?;
    let signup = state.signups.get(phone)?;

    let driver = register_driver(
        state,
        actor,
        RegistrationForm {
            identity: signup.identity,
            name: signup.name,
            phone: signup.phone,
            category,
        },
    )?;
    if let Err(err) = state.signups.remove(phone) {
        warn!(error = %err, phone, "registered driver but could not clear the signup");
    }

    Ok(driver)
}

pub fn get_driver(
    state: &AppState,
    actor: &Identity,
    code: &DriverCode,
) -> Result<Driver, AppError> {
    let driver = state.drivers.get(code)?;
    ensure_self_or_admin(state, actor, &driver)?;
    Ok(driver)
}

pub fn list_drivers(state: &AppState, actor: &Identity) -> Result<Vec<Driver>, AppError> {
    ensure_admin(state, actor)?;
    Ok(state.drivers.list())
}

pub fn eligibility(
    state: &AppState,
    actor: &Identity,
    code: &DriverCode,
) -> Result<Eligibility, AppError> {
    let driver = get_driver(state, actor, code)?;
    Ok(state.policy.can_work(&driver, state.now()))
}

/// Starting a shift is refused with the eligibility reason when the driver may not work.
pub fn start_shift(
    state: &AppState,
    actor: &Identity,
    code: &DriverCode,
) -> Result<Driver, AppError> {
    ensure_self(actor, &state.drivers.get(code)?)?;
    let now = state.now();

    let (driver, _) = state.drivers.update(code, now, |driver| {
        let eligibility = state.policy.can_work(driver, now);
        if !eligibility.eligible {
            return Err(AppError::Ineligible(eligibility.reason));
        }
        driver.on_duty = true;
        Ok(())
    })?;

    refresh_on_duty(state);
    info!(driver_code = %driver.code, "shift started");
    Ok(driver)
}

pub fn end_shift(
    state: &AppState,
    actor: &Identity,
    code: &DriverCode,
) -> Result<Driver, AppError> {
    ensure_self_or_admin(state, actor, &state.drivers.get(code)?)?;

    let (driver, _) = state.drivers.update(code, state.now(), |driver| {
        driver.on_duty = false;
        Ok(())
    })?;

    refresh_on_duty(state);
    info!(driver_code = %driver.code, "shift ended");
    Ok(driver)
}

pub fn update_location(
    state: &AppState,
    actor: &Identity,
    code: &DriverCode,
    location: GeoPoint,
) -> Result<Driver, AppError> {
    if !location.is_valid() {
        return Err(AppError::BadRequest("location is out of range".to_string()));
    }
    ensure_self(actor, &state.drivers.get(code)?)?;

    let (driver, _) = state.drivers.update(code, state.now(), |driver| {
        driver.location = Some(location);
        Ok(())
    })?;
    Ok(driver)
}

/// Driver reports a payment; administrators verify and approve it separately.
pub fn report_payment(
    state: &AppState,
    actor: &Identity,
    code: &DriverCode,
) -> Result<(), AppError> {
    let driver = state.drivers.get(code)?;
    ensure_self(actor, &driver)?;

    notify_admins(
        state,
        &format!(
            "Driver {} ({}) reports today's payment. Approve it to let them work after the cutoff.",
            driver.name, driver.code
        ),
    );
    state.outbox.notify(
        actor,
        "Payment reported. You will be told once an administrator approves it.",
    );
    Ok(())
}

/// Marks today's payment as approved, in the service time zone.
pub fn approve_payment(
    state: &AppState,
    actor: &Identity,
    code: &DriverCode,
) -> Result<Driver, AppError> {
    ensure_admin(state, actor)?;
    let now = state.now();
    let today = state.policy.today(now);

    let (driver, _) = state.drivers.update(code, now, |driver| {
        driver.payment_approved_on = Some(today);
        Ok(())
    })?;

    state.outbox.notify(
        &driver.identity,
        format!("Payment approved for {today}. You may work after the cutoff today."),
    );
    info!(driver_code = %driver.code, %today, "payment approved");
    Ok(driver)
}

pub fn revoke_payment(
    state: &AppState,
    actor: &Identity,
    code: &DriverCode,
) -> Result<Driver, AppError> {
    ensure_admin(state, actor)?;

    let (driver, _) = state.drivers.update(code, state.now(), |driver| {
        driver.payment_approved_on = None;
        Ok(())
    })?;
    info!(driver_code = %driver.code, "payment approval revoked");
    Ok(driver)
}

pub fn set_enabled(
    state: &AppState,
    actor: &Identity,
    code: &DriverCode,
    enabled: bool,
) -> Result<Driver, AppError> {
    ensure_admin(state, actor)?;

    let (driver, _) = state.drivers.update(code, state.now(), |driver| {
        driver.enabled = enabled;
        Ok(())
    })?;

    let message = if enabled {
        "Your account was enabled by an administrator."
    } else {
        "Your account was disabled by an administrator."
    };
    state.outbox.notify(&driver.identity, message);
    info!(driver_code = %driver.code, enabled, "driver enabled flag changed");
    Ok(driver)
}

fn refresh_on_duty(state: &AppState) {
    state
        .metrics
        .drivers_on_duty
        .set(state.drivers.on_duty_count() as i64);
}
