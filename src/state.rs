use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};

use crate::clock::Clock;
use crate::config::Config;
use crate::engine::broadcaster::FallbackBroadcaster;
use crate::engine::eligibility::EligibilityPolicy;
use crate::engine::notifications::{Outbox, Outgoing};
use crate::error::AppError;
use crate::models::driver::Identity;
use crate::models::event::DispatchEvent;
use crate::observability::metrics::Metrics;
use crate::store::{DriverRegistry, Persistence, RequestStore, SignupQueue};

pub struct AppState {
    pub drivers: DriverRegistry,
    pub requests: RequestStore,
    pub signups: SignupQueue,
    pub policy: EligibilityPolicy,
    pub broadcaster: FallbackBroadcaster,
    pub admins: HashSet<Identity>,
    pub outbox: Outbox,
    pub events_tx: broadcast::Sender<DispatchEvent>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        config: &Config,
        persistence: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, mpsc::Receiver<Outgoing>), AppError> {
        let metrics = Metrics::new();
        let (outbox, outbox_rx) = Outbox::new(config.notification_queue_size, metrics.clone());
        let (events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size.max(1));

        let drivers = DriverRegistry::load(persistence.clone())?;
        metrics.drivers_on_duty.set(drivers.on_duty_count() as i64);

        Ok((
            Self {
                drivers,
                requests: RequestStore::load(persistence.clone())?,
                signups: SignupQueue::load(persistence)?,
                policy: EligibilityPolicy::new(config.payment_cutoff, config.service_timezone),
                broadcaster: FallbackBroadcaster::new(),
                admins: config.admin_ids.clone(),
                outbox,
                events_tx,
                clock,
                metrics,
            },
            outbox_rx,
        ))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_admin(&self, identity: &Identity) -> bool {
        self.admins.contains(identity)
    }
}
