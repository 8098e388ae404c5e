use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::driver::{Driver, DriverCode, Identity, ServiceCategory};
use crate::store::{Mirror, Persistence};

#[derive(Debug, Clone)]
pub struct NewDriver {
    pub identity: Identity,
    pub name: String,
    pub phone: String,
    pub category: ServiceCategory,
}

/// Drivers keyed by code, with an identity index and a code sequence per category.
pub struct DriverRegistry {
    drivers: DashMap<DriverCode, Driver>,
    by_identity: DashMap<Identity, DriverCode>,
    sequences: DashMap<ServiceCategory, u32>,
    mirror: Mirror<DriverCode, Driver>,
    persistence: Arc<dyn Persistence>,
}

impl DriverRegistry {
    pub fn load(persistence: Arc<dyn Persistence>) -> Result<Self, AppError> {
        let snapshot = persistence.load_drivers()?;

        let drivers = DashMap::new();
        let by_identity = DashMap::new();
        let sequences: DashMap<ServiceCategory, u32> = DashMap::new();

        for (code, driver) in &snapshot {
            match code.parts() {
                Some((category, sequence)) => {
                    let mut highest = sequences.entry(category).or_insert(0);
                    *highest = (*highest).max(sequence);
                }
                None => warn!(driver_code = %code, "driver code outside the category sequence"),
            }
            by_identity.insert(driver.identity.clone(), code.clone());
            drivers.insert(code.clone(), driver.clone());
        }

        info!(drivers = drivers.len(), "driver registry loaded");

        Ok(Self {
            drivers,
            by_identity,
            sequences,
            mirror: Mirror::new(snapshot),
            persistence,
        })
    }

    /// Registers a driver under a freshly allocated code. Identities are unique.
    pub fn register(&self, new: NewDriver, now: DateTime<Utc>) -> Result<Driver, AppError> {
        if new.name.trim().is_empty() {
            return Err(AppError::BadRequest("name cannot be empty".to_string()));
        }
        if new.phone.trim().is_empty() {
            return Err(AppError::BadRequest("phone cannot be empty".to_string()));
        }

        let slot = match self.by_identity.entry(new.identity.clone()) {
            Entry::Occupied(existing) => {
                return Err(AppError::Conflict(format!(
                    "identity {} already belongs to driver {}",
                    new.identity,
                    existing.get()
                )));
            }
            Entry::Vacant(slot) => slot,
        };

        let code = self.allocate_code(new.category);
        let driver = Driver {
            code: code.clone(),
            identity: new.identity,
            name: new.name.trim().to_string(),
            phone: new.phone.trim().to_string(),
            category: new.category,
            location: None,
            on_duty: false,
            enabled: true,
            payment_approved_on: None,
            current_request: None,
            registered_at: now,
            updated_at: now,
        };

        self.mirror.put(code.clone(), driver.clone(), |snapshot| {
            self.persistence.save_drivers(snapshot)
        })?;
        self.drivers.insert(code.clone(), driver.clone());
        slot.insert(code);

        info!(driver_code = %driver.code, category = %driver.category, "driver registered");
        Ok(driver)
    }

    fn allocate_code(&self, category: ServiceCategory) -> DriverCode {
        let mut sequence = self.sequences.entry(category).or_insert(0);
        *sequence += 1;
        DriverCode::new(category, *sequence)
    }

    pub fn get(&self, code: &DriverCode) -> Result<Driver, AppError> {
        self.drivers
            .get(code)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("driver {code} not found")))
    }

    pub fn find_by_identity(&self, identity: &Identity) -> Option<Driver> {
        let code = self.by_identity.get(identity)?.value().clone();
        self.drivers.get(&code).map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<Driver> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        drivers.sort_by(|a, b| a.code.cmp(&b.code));
        drivers
    }

    pub fn of_category(&self, category: ServiceCategory) -> Vec<Driver> {
        self.drivers
            .iter()
            .filter(|entry| entry.value().category == category)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn on_duty_count(&self) -> usize {
        self.drivers
            .iter()
            .filter(|entry| entry.value().on_duty)
            .count()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Mutates one driver under its entry lock; persisted before it becomes visible.
    pub fn update<T, F>(
        &self,
        code: &DriverCode,
        now: DateTime<Utc>,
        f: F,
    ) -> Result<(Driver, T), AppError>
    where
        F: FnOnce(&mut Driver) -> Result<T, AppError>,
    {
        let mut entry = self
            .drivers
            .get_mut(code)
            .ok_or_else(|| AppError::NotFound(format!("driver {code} not found")))?;

        let mut updated = entry.value().clone();
        let output = f(&mut updated)?;
        updated.updated_at = now;

        self.mirror.put(code.clone(), updated.clone(), |snapshot| {
            self.persistence.save_drivers(snapshot)
        })?;
        *entry = updated.clone();

        Ok((updated, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPersistence;

    fn new_driver(identity: &str, category: ServiceCategory) -> NewDriver {
        NewDriver {
            identity: Identity::from(identity),
            name: format!("Driver {identity}"),
            phone: "3000000000".to_string(),
            category,
        }
    }

    #[test]
    fn codes_are_sequential_per_category() {
        let registry = DriverRegistry::load(Arc::new(MemoryPersistence::new())).unwrap();
        let now = Utc::now();

        let t1 = registry.register(new_driver("1", ServiceCategory::Passenger), now).unwrap();
        let d1 = registry.register(new_driver("2", ServiceCategory::Parcel), now).unwrap();
        let t2 = registry.register(new_driver("3", ServiceCategory::Passenger), now).unwrap();

        assert_eq!(t1.code.as_str(), "T001");
        assert_eq!(d1.code.as_str(), "D001");
        assert_eq!(t2.code.as_str(), "T002");
        assert!(!t1.on_duty);
        assert!(t1.enabled);
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let registry = DriverRegistry::load(Arc::new(MemoryPersistence::new())).unwrap();
        let now = Utc::now();
        registry.register(new_driver("1", ServiceCategory::Passenger), now).unwrap();

        let err = registry
            .register(new_driver("1", ServiceCategory::Freight), now)
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sequences_resume_after_reload() {
        let persistence = Arc::new(MemoryPersistence::new());
        let now = Utc::now();
        {
            let registry = DriverRegistry::load(persistence.clone()).unwrap();
            registry.register(new_driver("1", ServiceCategory::Freight), now).unwrap();
            registry.register(new_driver("2", ServiceCategory::Freight), now).unwrap();
        }

        let registry = DriverRegistry::load(persistence).unwrap();
        let next = registry.register(new_driver("3", ServiceCategory::Freight), now).unwrap();
        assert_eq!(next.code.as_str(), "C003");
        assert_eq!(
            registry.find_by_identity(&Identity::from("1")).unwrap().code.as_str(),
            "C001"
        );
    }

    #[test]
    fn failed_save_aborts_registration_and_update() {
        let persistence = Arc::new(MemoryPersistence::new());
        let registry = DriverRegistry::load(persistence.clone()).unwrap();
        let now = Utc::now();
        let driver = registry.register(new_driver("1", ServiceCategory::Parcel), now).unwrap();

        persistence.set_fail_writes(true);
        let err = registry
            .register(new_driver("2", ServiceCategory::Parcel), now)
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert!(registry.find_by_identity(&Identity::from("2")).is_none());

        let err = registry
            .update(&driver.code, now, |d| {
                d.on_duty = true;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert!(!registry.get(&driver.code).unwrap().on_duty);

        persistence.set_fail_writes(false);
        // A burned sequence number is never reused.
        let next = registry.register(new_driver("2", ServiceCategory::Parcel), now).unwrap();
        assert_eq!(next.code.as_str(), "D003");
    }

    #[test]
    fn update_of_unknown_driver_is_not_found() {
        let registry = DriverRegistry::load(Arc::new(MemoryPersistence::new())).unwrap();
        let err = registry
            .update(&DriverCode::from("T404"), Utc::now(), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
