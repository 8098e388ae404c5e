use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{Identity, ServiceCategory};
use crate::models::event::{BroadcastId, ClaimHandle, DispatchEvent};
use crate::models::request::RequestId;
use crate::observability::metrics::Metrics;
use crate::state::AppState;

/// Side effects of a committed transition, delivered after the fact.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Notify {
        target: Identity,
        message: String,
    },
    Advertise {
        request_id: RequestId,
        category: ServiceCategory,
        summary: String,
    },
    /// Closes the request's current advertisement with `text`.
    UpdateAdvertisement {
        request_id: RequestId,
        category: ServiceCategory,
        text: String,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, target: &Identity, message: &str) -> Result<(), AppError>;

    async fn advertise(
        &self,
        category: ServiceCategory,
        summary: &str,
        claim: &ClaimHandle,
    ) -> Result<BroadcastId, AppError>;

    async fn update_advertisement(
        &self,
        broadcast_id: BroadcastId,
        category: ServiceCategory,
        text: &str,
    ) -> Result<(), AppError>;
}

/// Bounded queue between transitions and the notification worker.
///
/// Sending never blocks: a full or closed queue drops the message.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Outgoing>,
    metrics: Metrics,
}

impl Outbox {
    pub fn new(capacity: usize, metrics: Metrics) -> (Self, mpsc::Receiver<Outgoing>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, metrics }, rx)
    }

    pub fn send(&self, outgoing: Outgoing) {
        match self.tx.try_send(outgoing) {
            Ok(()) => self.metrics.outbox_depth.inc(),
            Err(err) => {
                warn!(error = %err, "notification dropped before delivery");
                self.metrics
                    .notifications_total
                    .with_label_values(&["dropped"])
                    .inc();
            }
        }
    }

    pub fn notify(&self, target: &Identity, message: impl Into<String>) {
        self.send(Outgoing::Notify {
            target: target.clone(),
            message: message.into(),
        });
    }
}

/// Publishes everything on the dispatch event channel that websocket clients subscribe to.
pub struct EventBusNotifier {
    events_tx: broadcast::Sender<DispatchEvent>,
}

impl EventBusNotifier {
    pub fn new(events_tx: broadcast::Sender<DispatchEvent>) -> Self {
        Self { events_tx }
    }
}

#[async_trait]
impl Notifier for EventBusNotifier {
    async fn notify(&self, target: &Identity, message: &str) -> Result<(), AppError> {
        self.events_tx
            .send(DispatchEvent::Notification {
                target: target.clone(),
                message: message.to_string(),
                sent_at: Utc::now(),
            })
            .map(|_| ())
            .map_err(|_| AppError::Delivery(format!("nobody is listening for {target}")))
    }

    async fn advertise(
        &self,
        category: ServiceCategory,
        summary: &str,
        claim: &ClaimHandle,
    ) -> Result<BroadcastId, AppError> {
        let broadcast_id = BroadcastId(Uuid::new_v4());
        let event = DispatchEvent::Advertisement {
            broadcast_id,
            category,
            summary: summary.to_string(),
            claim: claim.clone(),
            published_at: Utc::now(),
        };

        // Pending requests stay listed at /adverts, so an advert nobody saw live is not lost.
        if self.events_tx.send(event).is_err() {
            debug!(%broadcast_id, %category, "advertisement published with no live subscribers");
        }
        Ok(broadcast_id)
    }

    async fn update_advertisement(
        &self,
        broadcast_id: BroadcastId,
        category: ServiceCategory,
        text: &str,
    ) -> Result<(), AppError> {
        let event = DispatchEvent::AdvertisementUpdated {
            broadcast_id,
            category,
            text: text.to_string(),
            updated_at: Utc::now(),
        };
        if self.events_tx.send(event).is_err() {
            debug!(%broadcast_id, "advertisement update with no live subscribers");
        }
        Ok(())
    }
}

pub async fn run_notification_worker(
    state: Arc<AppState>,
    notifier: Arc<dyn Notifier>,
    mut outbox_rx: mpsc::Receiver<Outgoing>,
) {
    info!("notification worker started");

    while let Some(outgoing) = outbox_rx.recv().await {
        state.metrics.outbox_depth.dec();

        let outcome = match deliver(&state, notifier.as_ref(), outgoing).await {
            Ok(()) => "delivered",
            Err(err) => {
                warn!(error = %err, "notification failed");
                "failed"
            }
        };
        state
            .metrics
            .notifications_total
            .with_label_values(&[outcome])
            .inc();
    }

    warn!("notification worker stopped: outbox closed");
}

pub async fn deliver(
    state: &AppState,
    notifier: &dyn Notifier,
    outgoing: Outgoing,
) -> Result<(), AppError> {
    match outgoing {
        Outgoing::Notify { target, message } => notifier.notify(&target, &message).await,
        Outgoing::Advertise {
            request_id,
            category,
            summary,
        } => {
            let claim = ClaimHandle::for_request(request_id);
            let broadcast_id = notifier.advertise(category, &summary, &claim).await?;
            state.broadcaster.record(request_id, broadcast_id);
            debug!(%request_id, %broadcast_id, "request advertised");
            Ok(())
        }
        Outgoing::UpdateAdvertisement {
            request_id,
            category,
            text,
        } => match state.broadcaster.forget(request_id) {
            Some(broadcast_id) => {
                notifier
                    .update_advertisement(broadcast_id, category, &text)
                    .await
            }
            None => {
                debug!(%request_id, "no live advertisement to update");
                Ok(())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_without_subscribers_is_a_delivery_failure() {
        let (events_tx, _) = broadcast::channel(8);
        let notifier = EventBusNotifier::new(events_tx);

        let err = notifier
            .notify(&Identity::from("nobody"), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Delivery(_)));
    }

    #[tokio::test]
    async fn advertise_reaches_subscribers_with_fresh_ids() {
        let (events_tx, mut events_rx) = broadcast::channel(8);
        let notifier = EventBusNotifier::new(events_tx);
        let claim = ClaimHandle::for_request(RequestId(3));

        let first = notifier
            .advertise(ServiceCategory::Freight, "truck needed", &claim)
            .await
            .unwrap();
        let second = notifier
            .advertise(ServiceCategory::Freight, "truck needed", &claim)
            .await
            .unwrap();
        assert_ne!(first, second);

        match events_rx.recv().await.unwrap() {
            DispatchEvent::Advertisement {
                broadcast_id,
                category,
                claim,
                ..
            } => {
                assert_eq!(broadcast_id, first);
                assert_eq!(category, ServiceCategory::Freight);
                assert_eq!(claim.request_id, RequestId(3));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_outbox_drops_without_blocking() {
        let (outbox, mut rx) = Outbox::new(1, Metrics::new());
        outbox.notify(&Identity::from("a"), "first");
        outbox.notify(&Identity::from("a"), "second");

        assert_eq!(
            rx.recv().await,
            Some(Outgoing::Notify {
                target: Identity::from("a"),
                message: "first".to_string()
            })
        );
        assert!(rx.try_recv().is_err());
    }
}
