use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::driver::Driver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityReason {
    Disabled,
    PaymentRequired,
    BeforeCutoff,
    PaymentApproved,
}

impl EligibilityReason {
    pub fn allows_work(self) -> bool {
        matches!(
            self,
            EligibilityReason::BeforeCutoff | EligibilityReason::PaymentApproved
        )
    }

    pub fn describe(self) -> &'static str {
        match self {
            EligibilityReason::Disabled => "driver disabled by an administrator",
            EligibilityReason::PaymentRequired => {
                "payment required: the daily cutoff has passed and today's payment is not approved"
            }
            EligibilityReason::BeforeCutoff => "eligible: work is allowed before the daily cutoff",
            EligibilityReason::PaymentApproved => "eligible: payment approved for today",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: EligibilityReason,
    pub message: &'static str,
}

impl From<EligibilityReason> for Eligibility {
    fn from(reason: EligibilityReason) -> Self {
        Self {
            eligible: reason.allows_work(),
            reason,
            message: reason.describe(),
        }
    }
}

/// Daily payment cutoff evaluated in the service time zone.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityPolicy {
    cutoff: NaiveTime,
    timezone: Tz,
}

impl EligibilityPolicy {
    pub fn new(cutoff: NaiveTime, timezone: Tz) -> Self {
        Self { cutoff, timezone }
    }

    pub fn cutoff(&self) -> NaiveTime {
        self.cutoff
    }

    /// The service-local calendar date at `now`.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    pub fn is_past_cutoff(&self, now: DateTime<Utc>) -> bool {
        now.with_timezone(&self.timezone).time() >= self.cutoff
    }

    pub fn can_work(&self, driver: &Driver, now: DateTime<Utc>) -> Eligibility {
        self.reason(driver, now).into()
    }

    fn reason(&self, driver: &Driver, now: DateTime<Utc>) -> EligibilityReason {
        if !driver.enabled {
            return EligibilityReason::Disabled;
        }

        if !self.is_past_cutoff(now) {
            return EligibilityReason::BeforeCutoff;
        }

        if driver.payment_approved_for(self.today(now)) {
            EligibilityReason::PaymentApproved
        } else {
            EligibilityReason::PaymentRequired
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::models::driver::{DriverCode, Identity, ServiceCategory};

    fn policy() -> EligibilityPolicy {
        EligibilityPolicy::new(
            NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            chrono_tz::America::Bogota,
        )
    }

    fn driver() -> Driver {
        Driver {
            code: DriverCode::new(ServiceCategory::Parcel, 5),
            identity: Identity::from("driver-5"),
            name: "D5".to_string(),
            phone: "3000000005".to_string(),
            category: ServiceCategory::Parcel,
            location: None,
            on_duty: true,
            enabled: true,
            payment_approved_on: None,
            current_request: None,
            registered_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Bogota is UTC-5 all year.
    fn bogota(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour + 5, minute, 0).unwrap()
    }

    #[test]
    fn unpaid_driver_works_before_cutoff() {
        let eligibility = policy().can_work(&driver(), bogota(14, 59));
        assert!(eligibility.eligible);
        assert_eq!(eligibility.reason, EligibilityReason::BeforeCutoff);
    }

    #[test]
    fn cutoff_instant_itself_requires_payment() {
        let eligibility = policy().can_work(&driver(), bogota(15, 0));
        assert!(!eligibility.eligible);
        assert_eq!(eligibility.reason, EligibilityReason::PaymentRequired);
    }

    #[test]
    fn approval_unlocks_work_at_the_same_instant() {
        let policy = policy();
        let now = bogota(17, 30);
        let mut d5 = driver();

        assert_eq!(
            policy.can_work(&d5, now).reason,
            EligibilityReason::PaymentRequired
        );

        d5.payment_approved_on = Some(policy.today(now));
        let eligibility = policy.can_work(&d5, now);
        assert!(eligibility.eligible);
        assert_eq!(eligibility.reason, EligibilityReason::PaymentApproved);

        let later = policy.can_work(&d5, bogota(18, 55));
        assert!(later.eligible);
    }

    #[test]
    fn yesterdays_approval_does_not_count() {
        let policy = policy();
        let now = bogota(16, 0);
        let mut driver = driver();
        driver.payment_approved_on = Some(policy.today(now - Duration::days(1)));

        assert!(!policy.can_work(&driver, now).eligible);
    }

    #[test]
    fn disabled_driver_never_works() {
        let policy = policy();
        let mut driver = driver();
        driver.enabled = false;
        driver.payment_approved_on = Some(policy.today(bogota(9, 0)));

        for hour in [0, 9, 14, 15, 18] {
            let eligibility = policy.can_work(&driver, bogota(hour, 0));
            assert!(!eligibility.eligible);
            assert_eq!(eligibility.reason, EligibilityReason::Disabled);
        }
    }

    #[test]
    fn eligibility_before_cutoff_holds_for_earlier_times() {
        let policy = policy();
        let driver = driver();
        let reference = bogota(14, 0);
        assert!(policy.can_work(&driver, reference).eligible);

        for minutes_earlier in (0..=14 * 60).step_by(37) {
            let earlier = reference - Duration::minutes(minutes_earlier);
            assert_eq!(policy.today(earlier), policy.today(reference));
            assert!(policy.can_work(&driver, earlier).eligible);
        }
    }

    #[test]
    fn service_date_follows_the_configured_zone() {
        // 02:00 UTC on the 11th is still the 10th in Bogota.
        let late_evening = Utc.with_ymd_and_hms(2026, 3, 11, 2, 0, 0).unwrap();
        assert_eq!(
            policy().today(late_evening),
            NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
        );
        assert!(policy().is_past_cutoff(late_evening));
    }

    #[test]
    fn reasons_are_distinct_and_readable() {
        let reasons = [
            EligibilityReason::Disabled,
            EligibilityReason::PaymentRequired,
            EligibilityReason::BeforeCutoff,
            EligibilityReason::PaymentApproved,
        ];
        for (i, a) in reasons.iter().enumerate() {
            for b in &reasons[i + 1..] {
                assert_ne!(a.describe(), b.describe());
            }
        }
        assert!(EligibilityReason::PaymentRequired
            .describe()
            .contains("payment required"));
    }
}
