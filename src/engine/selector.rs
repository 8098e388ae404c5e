use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::engine::eligibility::EligibilityPolicy;
use crate::geo::haversine_km;
use crate::models::driver::Driver;
use crate::models::request::ServiceRequest;

#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub driver: &'a Driver,
    /// `None` when either side has no reported location.
    pub distance_km: Option<f64>,
}

/// Picks the nearest eligible on-duty driver of the request's category.
///
/// Drivers without a location (or any driver when the request has none) rank at
/// infinite distance: still eligible, but behind every located driver. Ties on
/// the minimal distance are broken uniformly at random.
pub fn select<'a, R>(
    request: &ServiceRequest,
    drivers: &'a [Driver],
    policy: &EligibilityPolicy,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Option<Selection<'a>>
where
    R: Rng + ?Sized,
{
    let candidates: Vec<(&Driver, f64)> = drivers
        .iter()
        .filter(|driver| {
            driver.category == request.category
                && driver.on_duty
                && policy.can_work(driver, now).eligible
        })
        .map(|driver| (driver, candidate_distance(driver, request)))
        .collect();

    let nearest = candidates
        .iter()
        .map(|(_, distance)| *distance)
        .min_by(|a, b| a.total_cmp(b))?;

    let tied: Vec<&(&Driver, f64)> = candidates
        .iter()
        .filter(|(_, distance)| *distance == nearest)
        .collect();

    let &&(driver, distance) = tied.choose(rng)?;

    Some(Selection {
        driver,
        distance_km: distance.is_finite().then_some(distance),
    })
}

fn candidate_distance(driver: &Driver, request: &ServiceRequest) -> f64 {
    match (&driver.location, &request.client_location) {
        (Some(driver_at), Some(client_at)) => haversine_km(driver_at, client_at),
        _ => f64::INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{NaiveTime, TimeZone};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::models::driver::{DriverCode, GeoPoint, Identity, ServiceCategory};
    use crate::models::request::{RequestId, RequestStatus};

    fn policy() -> EligibilityPolicy {
        EligibilityPolicy::new(
            NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            chrono_tz::America::Bogota,
        )
    }

    fn morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap()
    }

    fn evening() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 22, 0, 0).unwrap()
    }

    fn driver(seq: u32, category: ServiceCategory, location: Option<(f64, f64)>) -> Driver {
        Driver {
            code: DriverCode::new(category, seq),
            identity: Identity::from(format!("driver-{seq}")),
            name: format!("Driver {seq}"),
            phone: format!("300000{seq:04}"),
            category,
            location: location.map(|(lat, lng)| GeoPoint { lat, lng }),
            on_duty: true,
            enabled: true,
            payment_approved_on: None,
            current_request: None,
            registered_at: morning(),
            updated_at: morning(),
        }
    }

    fn request(category: ServiceCategory, at: Option<(f64, f64)>) -> ServiceRequest {
        ServiceRequest {
            id: RequestId(1),
            category,
            client_reference: Identity::from("client-1"),
            client_name: "Client".to_string(),
            client_contact: "3100000000".to_string(),
            origin: "Calle 1".to_string(),
            destination: "Calle 2".to_string(),
            client_location: at.map(|(lat, lng)| GeoPoint { lat, lng }),
            status: RequestStatus::Pending,
            assigned_driver: None,
            created_at: morning(),
            assigned_at: None,
            reserved_at: None,
            closed_at: None,
            history: Vec::new(),
        }
    }

    #[test]
    fn nearest_driver_wins() {
        let drivers = vec![
            driver(1, ServiceCategory::Parcel, Some((0.0, 0.0))),
            driver(2, ServiceCategory::Parcel, Some((10.0, 10.0))),
        ];
        let request = request(ServiceCategory::Parcel, Some((0.0, 0.01)));
        let mut rng = StdRng::seed_from_u64(7);

        let selection = select(&request, &drivers, &policy(), morning(), &mut rng).unwrap();
        assert_eq!(selection.driver.code.as_str(), "D001");
        assert!(selection.distance_km.unwrap() < 2.0);
    }

    #[test]
    fn located_driver_beats_location_less_driver() {
        let drivers = vec![
            driver(1, ServiceCategory::Passenger, None),
            driver(2, ServiceCategory::Passenger, Some((5.0, 5.0))),
        ];
        let request = request(ServiceCategory::Passenger, Some((0.0, 0.0)));
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..50 {
            let selection = select(&request, &drivers, &policy(), morning(), &mut rng).unwrap();
            assert_eq!(selection.driver.code.as_str(), "T002");
        }
    }

    #[test]
    fn location_less_drivers_are_still_candidates() {
        let drivers = vec![driver(1, ServiceCategory::Freight, None)];
        let request = request(ServiceCategory::Freight, Some((0.0, 0.0)));
        let mut rng = StdRng::seed_from_u64(1);

        let selection = select(&request, &drivers, &policy(), morning(), &mut rng).unwrap();
        assert_eq!(selection.driver.code.as_str(), "C001");
        assert_eq!(selection.distance_km, None);
    }

    #[test]
    fn excluded_drivers_are_never_selected() {
        let mut disabled = driver(1, ServiceCategory::Parcel, Some((0.0, 0.0)));
        disabled.enabled = false;
        let mut off_duty = driver(2, ServiceCategory::Parcel, Some((0.0, 0.0)));
        off_duty.on_duty = false;
        let wrong_category = driver(3, ServiceCategory::Freight, Some((0.0, 0.0)));
        let unpaid = driver(4, ServiceCategory::Parcel, Some((0.0, 0.0)));

        let drivers = vec![disabled, off_duty, wrong_category, unpaid];
        let request = request(ServiceCategory::Parcel, Some((0.0, 0.0)));
        let mut rng = StdRng::seed_from_u64(3);

        // Before the cutoff only the unpaid driver qualifies.
        let selection = select(&request, &drivers, &policy(), morning(), &mut rng).unwrap();
        assert_eq!(selection.driver.code.as_str(), "D004");

        // After the cutoff nobody does.
        assert!(select(&request, &drivers, &policy(), evening(), &mut rng).is_none());
    }

    #[test]
    fn paid_driver_is_selected_after_cutoff() {
        let policy = policy();
        let mut paid = driver(1, ServiceCategory::Parcel, Some((1.0, 1.0)));
        paid.payment_approved_on = Some(policy.today(evening()));
        let unpaid = driver(2, ServiceCategory::Parcel, Some((0.0, 0.0)));

        let drivers = vec![paid, unpaid];
        let request = request(ServiceCategory::Parcel, Some((0.0, 0.0)));
        let mut rng = StdRng::seed_from_u64(5);

        let selection = select(&request, &drivers, &policy, evening(), &mut rng).unwrap();
        assert_eq!(selection.driver.code.as_str(), "D001");
    }

    #[test]
    fn empty_registry_yields_none() {
        let request = request(ServiceCategory::Accessible, None);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(select(&request, &[], &policy(), morning(), &mut rng).is_none());
    }

    #[test]
    fn ties_are_spread_evenly() {
        let drivers: Vec<Driver> = (1..=3)
            .map(|seq| driver(seq, ServiceCategory::Passenger, None))
            .collect();
        let request = request(ServiceCategory::Passenger, None);
        let mut rng = StdRng::seed_from_u64(2026);
        let trials = 3_000;

        let mut wins: HashMap<String, usize> = HashMap::new();
        for _ in 0..trials {
            let selection = select(&request, &drivers, &policy(), morning(), &mut rng).unwrap();
            *wins.entry(selection.driver.code.to_string()).or_default() += 1;
        }

        assert_eq!(wins.len(), 3);
        for (code, count) in wins {
            assert!(
                (800..=1_200).contains(&count),
                "{code} won {count} of {trials}"
            );
        }
    }

    #[test]
    fn equal_finite_distances_also_tie() {
        let drivers = vec![
            driver(1, ServiceCategory::Parcel, Some((1.0, 0.0))),
            driver(2, ServiceCategory::Parcel, Some((1.0, 0.0))),
            driver(3, ServiceCategory::Parcel, Some((2.0, 0.0))),
        ];
        let request = request(ServiceCategory::Parcel, Some((0.0, 0.0)));
        let mut rng = StdRng::seed_from_u64(11);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let selection = select(&request, &drivers, &policy(), morning(), &mut rng).unwrap();
            assert_ne!(selection.driver.code.as_str(), "D003");
            seen.insert(selection.driver.code.clone());
        }
        assert_eq!(seen.len(), 2);
    }
}
