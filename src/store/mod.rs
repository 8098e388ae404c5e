//! Keyed stores for drivers, requests and signups.
//!
//! Live records sit in `DashMap`s; every mutation is first written to the
//! snapshot held by a [`Mirror`] and saved through [`Persistence`], and only
//! then published to the live map. Lock order is always live entry, then
//! mirror; nothing takes them the other way round.
//!
//! Each save rewrites a whole snapshot, so saves of one store are serialized
//! by the mirror mutex and a committing record keeps its shard locked until
//! its save returns. Decisions on independent records still run in parallel;
//! only their writes queue. Commits may block on disk, so async callers run
//! them on the blocking pool (`api::rest::run_blocking`).

pub mod drivers;
pub mod json;
pub mod requests;
pub mod signups;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::AppError;
use crate::models::driver::{Driver, DriverCode};
use crate::models::request::{RequestId, ServiceRequest};
use crate::models::signup::PendingSignup;

pub use drivers::{DriverRegistry, NewDriver};
pub use json::JsonFilePersistence;
pub use requests::RequestStore;
pub use signups::SignupQueue;

pub type DriverSnapshot = HashMap<DriverCode, Driver>;
pub type RequestSnapshot = HashMap<RequestId, ServiceRequest>;
/// Keyed by phone number.
pub type SignupSnapshot = HashMap<String, PendingSignup>;

/// Whole-snapshot load/replace storage.
pub trait Persistence: Send + Sync {
    fn load_drivers(&self) -> Result<DriverSnapshot, AppError>;
    fn save_drivers(&self, drivers: &DriverSnapshot) -> Result<(), AppError>;
    fn load_requests(&self) -> Result<RequestSnapshot, AppError>;
    fn save_requests(&self, requests: &RequestSnapshot) -> Result<(), AppError>;
    fn load_signups(&self) -> Result<SignupSnapshot, AppError>;
    fn save_signups(&self, signups: &SignupSnapshot) -> Result<(), AppError>;
}

/// In-process persistence. Writes can be made to fail to simulate an outage.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    drivers: Mutex<DriverSnapshot>,
    requests: Mutex<RequestSnapshot>,
    signups: Mutex<SignupSnapshot>,
    fail_writes: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write<T: Clone>(&self, slot: &Mutex<T>, value: &T) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("store unavailable".to_string()));
        }
        *lock(slot)? = value.clone();
        Ok(())
    }
}

impl Persistence for MemoryPersistence {
    fn load_drivers(&self) -> Result<DriverSnapshot, AppError> {
        Ok(lock(&self.drivers)?.clone())
    }

    fn save_drivers(&self, drivers: &DriverSnapshot) -> Result<(), AppError> {
        self.write(&self.drivers, drivers)
    }

    fn load_requests(&self) -> Result<RequestSnapshot, AppError> {
        Ok(lock(&self.requests)?.clone())
    }

    fn save_requests(&self, requests: &RequestSnapshot) -> Result<(), AppError> {
        self.write(&self.requests, requests)
    }

    fn load_signups(&self) -> Result<SignupSnapshot, AppError> {
        Ok(lock(&self.signups)?.clone())
    }

    fn save_signups(&self, signups: &SignupSnapshot) -> Result<(), AppError> {
        self.write(&self.signups, signups)
    }
}

/// The last successfully saved snapshot of one store.
pub(crate) struct Mirror<K, V> {
    saved: Mutex<HashMap<K, V>>,
}

impl<K, V> Mirror<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new(initial: HashMap<K, V>) -> Self {
        Self {
            saved: Mutex::new(initial),
        }
    }

    /// Saves the snapshot with `key` set to `value`; on failure the snapshot is left as it was.
    pub(crate) fn put<F>(&self, key: K, value: V, save: F) -> Result<(), AppError>
    where
        F: FnOnce(&HashMap<K, V>) -> Result<(), AppError>,
    {
        let mut saved = lock(&self.saved)?;
        let previous = saved.insert(key.clone(), value);

        if let Err(err) = save(&saved) {
            match previous {
                Some(previous) => {
                    saved.insert(key, previous);
                }
                None => {
                    saved.remove(&key);
                }
            }
            return Err(err);
        }

        Ok(())
    }

    pub(crate) fn remove<F>(&self, key: &K, save: F) -> Result<(), AppError>
    where
        F: FnOnce(&HashMap<K, V>) -> Result<(), AppError>,
    {
        let mut saved = lock(&self.saved)?;
        let Some(previous) = saved.remove(key) else {
            return Ok(());
        };

        if let Err(err) = save(&saved) {
            saved.insert(key.clone(), previous);
            return Err(err);
        }

        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, AppError> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal("snapshot lock poisoned".to_string()))
}
