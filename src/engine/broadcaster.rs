use dashmap::DashMap;
use tracing::info;

use crate::engine::notifications::{Outbox, Outgoing};
use crate::models::driver::ServiceCategory;
use crate::models::event::BroadcastId;
use crate::models::request::{RequestId, ServiceRequest};

/// Advertises unassigned requests to every driver of their category.
///
/// The claim itself is a lifecycle transition; this only tracks which broadcast
/// belongs to which request so it can be closed when the request is taken.
#[derive(Default)]
pub struct FallbackBroadcaster {
    adverts: DashMap<RequestId, BroadcastId>,
}

impl FallbackBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `request` as a fresh advertisement, closing any earlier one.
    pub fn advertise(&self, outbox: &Outbox, request: &ServiceRequest) {
        if self.adverts.contains_key(&request.id) {
            self.close(
                outbox,
                request.id,
                request.category,
                format!("Request {} has been republished", request.id),
            );
        }

        info!(request_id = %request.id, category = %request.category, "request advertised");
        outbox.send(Outgoing::Advertise {
            request_id: request.id,
            category: request.category,
            summary: request.summary(),
        });
    }

    pub fn close(
        &self,
        outbox: &Outbox,
        request_id: RequestId,
        category: ServiceCategory,
        text: impl Into<String>,
    ) {
        outbox.send(Outgoing::UpdateAdvertisement {
            request_id,
            category,
            text: text.into(),
        });
    }

    pub fn record(&self, request_id: RequestId, broadcast_id: BroadcastId) {
        self.adverts.insert(request_id, broadcast_id);
    }

    pub fn forget(&self, request_id: RequestId) -> Option<BroadcastId> {
        self.adverts.remove(&request_id).map(|(_, broadcast_id)| broadcast_id)
    }

    pub fn current(&self, request_id: RequestId) -> Option<BroadcastId> {
        self.adverts.get(&request_id).map(|entry| *entry.value())
    }
}
