use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::{Identity, ServiceCategory};
use crate::models::request::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BroadcastId(pub Uuid);

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a driver acts on to claim an advertised request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimHandle {
    pub request_id: RequestId,
    pub action: String,
}

impl ClaimHandle {
    pub fn for_request(request_id: RequestId) -> Self {
        Self {
            request_id,
            action: format!("/requests/{request_id}/claim"),
        }
    }
}

/// Events published to websocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    Notification {
        target: Identity,
        message: String,
        sent_at: DateTime<Utc>,
    },
    Advertisement {
        broadcast_id: BroadcastId,
        category: ServiceCategory,
        summary: String,
        claim: ClaimHandle,
        published_at: DateTime<Utc>,
    },
    AdvertisementUpdated {
        broadcast_id: BroadcastId,
        category: ServiceCategory,
        text: String,
        updated_at: DateTime<Utc>,
    },
}

impl DispatchEvent {
    /// Whether a subscriber filtering on `identity` and/or `category` should see this event.
    ///
    /// Adverts follow only the category filter. Notifications follow only the
    /// identity filter, and a category-only subscriber gets none of them.
    pub fn visible_to(
        &self,
        identity: Option<&Identity>,
        category: Option<ServiceCategory>,
    ) -> bool {
        match self {
            DispatchEvent::Notification { target, .. } => {
                match identity {
                    Some(identity) => identity == target,
                    None => category.is_none(),
                }
            }
            DispatchEvent::Advertisement {
                category: advertised,
                ..
            }
            | DispatchEvent::AdvertisementUpdated {
                category: advertised,
                ..
            } => category.is_none_or(|category| category == *advertised),
        }
    }
}
