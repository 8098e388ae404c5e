use std::sync::Arc;

use dashmap::DashMap;

use crate::error::AppError;
use crate::models::signup::PendingSignup;
use crate::store::{Mirror, Persistence};

/// Driver signups awaiting an administrator, keyed by phone number.
pub struct SignupQueue {
    signups: DashMap<String, PendingSignup>,
    mirror: Mirror<String, PendingSignup>,
    persistence: Arc<dyn Persistence>,
}

impl SignupQueue {
    pub fn load(persistence: Arc<dyn Persistence>) -> Result<Self, AppError> {
        let snapshot = persistence.load_signups()?;
        let signups = snapshot
            .iter()
            .map(|(phone, signup)| (phone.clone(), signup.clone()))
            .collect();

        Ok(Self {
            signups,
            mirror: Mirror::new(snapshot),
            persistence,
        })
    }

    /// Stores the signup, replacing an earlier one with the same phone.
    pub fn submit(&self, signup: PendingSignup) -> Result<(), AppError> {
        let phone = signup.phone.clone();
        let entry = self.signups.entry(phone.clone());

        self.mirror.put(phone, signup.clone(), |snapshot| {
            self.persistence.save_signups(snapshot)
        })?;
        entry.insert(signup);
        Ok(())
    }

    pub fn get(&self, phone: &str) -> Result<PendingSignup, AppError> {
        self.signups
            .get(phone)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("no pending signup for phone {phone}")))
    }

    pub fn remove(&self, phone: &str) -> Result<(), AppError> {
        let key = phone.to_string();
        self.mirror
            .remove(&key, |snapshot| self.persistence.save_signups(snapshot))?;
        self.signups.remove(phone);
        Ok(())
    }

    pub fn list(&self) -> Vec<PendingSignup> {
        let mut signups: Vec<PendingSignup> = self
            .signups
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        signups.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        signups
    }
}
