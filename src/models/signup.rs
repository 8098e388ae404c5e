use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::driver::Identity;

/// A prospective driver waiting for an administrator to register them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSignup {
    pub name: String,
    pub phone: String,
    pub identity: Identity,
    pub submitted_at: DateTime<Utc>,
}
