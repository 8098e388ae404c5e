use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::request::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Opaque external identity of an actor (driver, client or admin).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Passenger,
    Parcel,
    Freight,
    Accessible,
}

impl ServiceCategory {
    pub const ALL: [ServiceCategory; 4] = [
        ServiceCategory::Passenger,
        ServiceCategory::Parcel,
        ServiceCategory::Freight,
        ServiceCategory::Accessible,
    ];

    pub fn code_prefix(self) -> char {
        match self {
            ServiceCategory::Passenger => 'T',
            ServiceCategory::Parcel => 'D',
            ServiceCategory::Freight => 'C',
            ServiceCategory::Accessible => 'E',
        }
    }

    pub fn from_code_prefix(prefix: char) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.code_prefix() == prefix.to_ascii_uppercase())
    }

    pub fn label(self) -> &'static str {
        match self {
            ServiceCategory::Passenger => "passenger",
            ServiceCategory::Parcel => "parcel",
            ServiceCategory::Freight => "freight",
            ServiceCategory::Accessible => "accessible",
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ServiceCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown category: {s}, expected passenger/parcel/freight/accessible")
            })
    }
}

/// Human-facing driver code: category prefix plus a zero-padded sequence, e.g. `T001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverCode(String);

impl DriverCode {
    pub fn new(category: ServiceCategory, sequence: u32) -> Self {
        Self(format!("{}{sequence:03}", category.code_prefix()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits a well-formed code back into its category and sequence number.
    pub fn parts(&self) -> Option<(ServiceCategory, u32)> {
        let mut chars = self.0.chars();
        let category = ServiceCategory::from_code_prefix(chars.next()?)?;
        let sequence = chars.as_str().parse().ok()?;
        Some((category, sequence))
    }
}

impl From<&str> for DriverCode {
    fn from(value: &str) -> Self {
        Self(value.trim().to_ascii_uppercase())
    }
}

impl fmt::Display for DriverCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub code: DriverCode,
    pub identity: Identity,
    pub name: String,
    pub phone: String,
    pub category: ServiceCategory,
    pub location: Option<GeoPoint>,
    pub on_duty: bool,
    pub enabled: bool,
    /// Service-local date of the last payment approval.
    pub payment_approved_on: Option<NaiveDate>,
    pub current_request: Option<RequestId>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn payment_approved_for(&self, today: NaiveDate) -> bool {
        self.payment_approved_on == Some(today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_carries_category_prefix_and_padding() {
        let code = DriverCode::new(ServiceCategory::Accessible, 4);
        assert_eq!(code.as_str(), "E004");
        assert_eq!(code.parts(), Some((ServiceCategory::Accessible, 4)));
    }

    #[test]
    fn malformed_codes_have_no_parts() {
        assert_eq!(DriverCode::from("X001").parts(), None);
        assert_eq!(DriverCode::from("T").parts(), None);
        assert_eq!(DriverCode::from("Tabc").parts(), None);
        assert_eq!(
            DriverCode::from("t1200").parts(),
            Some((ServiceCategory::Passenger, 1200))
        );
    }

    #[test]
    fn category_parses_labels() {
        assert_eq!(
            "Parcel".parse::<ServiceCategory>(),
            Ok(ServiceCategory::Parcel)
        );
        assert!("taxi".parse::<ServiceCategory>().is_err());
    }

    #[test]
    fn geo_point_bounds() {
        assert!(GeoPoint { lat: 4.7, lng: -74.0 }.is_valid());
        assert!(!GeoPoint { lat: 91.0, lng: 0.0 }.is_valid());
        assert!(!GeoPoint {
            lat: f64::NAN,
            lng: 0.0
        }
        .is_valid());
    }
}
