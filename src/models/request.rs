use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::driver::{DriverCode, GeoPoint, Identity, ServiceCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Assigned,
    Reserved,
    Completed,
    CancelledByClient,
    /// Transient: a driver cancellation passes through here and lands back in `Pending`.
    CancelledByDriver,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::CancelledByClient)
    }

    pub fn holds_driver(self) -> bool {
        matches!(self, RequestStatus::Assigned | RequestStatus::Reserved)
    }

    pub fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Assigned => "assigned",
            RequestStatus::Reserved => "reserved",
            RequestStatus::Completed => "completed",
            RequestStatus::CancelledByClient => "cancelled_by_client",
            RequestStatus::CancelledByDriver => "cancelled_by_driver",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub actor: Option<Identity>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: RequestId,
    pub category: ServiceCategory,
    pub client_reference: Identity,
    pub client_name: String,
    pub client_contact: String,
    pub origin: String,
    pub destination: String,
    pub client_location: Option<GeoPoint>,
    pub status: RequestStatus,
    pub assigned_driver: Option<DriverCode>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<StatusChange>,
}

impl ServiceRequest {
    /// One-line summary used for advertisements.
    pub fn summary(&self) -> String {
        format!(
            "New {} request [{}] from {} ({}): {} -> {}",
            self.category,
            self.id,
            self.client_name,
            self.client_contact,
            self.origin,
            self.destination
        )
    }

    pub fn is_assigned_to(&self, driver: &DriverCode) -> bool {
        self.assigned_driver.as_ref() == Some(driver)
    }
}
