use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::error::AppError;
use crate::models::request::{RequestId, RequestStatus, ServiceRequest};
use crate::store::{Mirror, Persistence};

/// Process-wide table of service requests. Ids come from a counter and are never reused.
pub struct RequestStore {
    requests: DashMap<RequestId, ServiceRequest>,
    next_id: AtomicU64,
    mirror: Mirror<RequestId, ServiceRequest>,
    persistence: Arc<dyn Persistence>,
}

impl RequestStore {
    pub fn load(persistence: Arc<dyn Persistence>) -> Result<Self, AppError> {
        let snapshot = persistence.load_requests()?;
        let next_id = snapshot.keys().map(|id| id.0).max().unwrap_or(0) + 1;

        let requests = DashMap::new();
        for (id, request) in &snapshot {
            requests.insert(*id, request.clone());
        }

        info!(requests = requests.len(), next_id, "request store loaded");

        Ok(Self {
            requests,
            next_id: AtomicU64::new(next_id),
            mirror: Mirror::new(snapshot),
            persistence,
        })
    }

    /// Allocates an id and stores the request built for it.
    pub fn create<F>(&self, build: F) -> Result<ServiceRequest, AppError>
    where
        F: FnOnce(RequestId) -> ServiceRequest,
    {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let request = build(id);

        self.mirror.put(id, request.clone(), |snapshot| {
            self.persistence.save_requests(snapshot)
        })?;
        self.requests.insert(id, request.clone());

        Ok(request)
    }

    pub fn get(&self, id: RequestId) -> Result<ServiceRequest, AppError> {
        self.requests
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))
    }

    /// Runs `f` against a copy of the request while holding its entry lock.
    ///
    /// The copy replaces the stored request only if `f` succeeds and the snapshot
    /// is saved, so concurrent callers observe either the old or the new state and
    /// each check-and-set decision sees the result of the previous one.
    pub fn transition<T, F>(&self, id: RequestId, f: F) -> Result<(ServiceRequest, T), AppError>
    where
        F: FnOnce(&mut ServiceRequest) -> Result<T, AppError>,
    {
        let mut entry = self
            .requests
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;

        let mut updated = entry.value().clone();
        let output = f(&mut updated)?;

        self.mirror.put(id, updated.clone(), |snapshot| {
            self.persistence.save_requests(snapshot)
        })?;
        *entry = updated.clone();

        Ok((updated, output))
    }

    pub fn with_status(&self, status: RequestStatus) -> Vec<ServiceRequest> {
        let mut matching: Vec<ServiceRequest> = self
            .requests
            .iter()
            .filter(|entry| entry.value().status == status)
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by_key(|request| request.id);
        matching
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::driver::{Identity, ServiceCategory};
    use crate::store::MemoryPersistence;

    fn draft(id: RequestId) -> ServiceRequest {
        ServiceRequest {
            id,
            category: ServiceCategory::Passenger,
            client_reference: Identity::from("client"),
            client_name: "Client".to_string(),
            client_contact: "310".to_string(),
            origin: "A".to_string(),
            destination: "B".to_string(),
            client_location: None,
            status: RequestStatus::Pending,
            assigned_driver: None,
            created_at: Utc::now(),
            assigned_at: None,
            reserved_at: None,
            closed_at: None,
            history: Vec::new(),
        }
    }

    #[test]
    fn ids_are_never_reused_across_reloads() {
        let persistence = Arc::new(MemoryPersistence::new());
        let first = RequestStore::load(persistence.clone()).unwrap();
        assert_eq!(first.create(draft).unwrap().id, RequestId(1));
        assert_eq!(first.create(draft).unwrap().id, RequestId(2));

        let second = RequestStore::load(persistence).unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second.create(draft).unwrap().id, RequestId(3));
    }

    #[test]
    fn failed_transition_leaves_request_untouched() {
        let store = RequestStore::load(Arc::new(MemoryPersistence::new())).unwrap();
        let request = store.create(draft).unwrap();

        let err = store
            .transition(request.id, |r| {
                r.status = RequestStatus::Completed;
                Err::<(), _>(AppError::StaleRequest("nope".to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, AppError::StaleRequest(_)));
        assert_eq!(store.get(request.id).unwrap().status, RequestStatus::Pending);
    }

    #[test]
    fn persistence_outage_aborts_before_commit() {
        let persistence = Arc::new(MemoryPersistence::new());
        let store = RequestStore::load(persistence.clone()).unwrap();
        let request = store.create(draft).unwrap();

        persistence.set_fail_writes(true);
        let err = store
            .transition(request.id, |r| {
                r.status = RequestStatus::CancelledByClient;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert_eq!(store.get(request.id).unwrap().status, RequestStatus::Pending);
        assert!(store.create(draft).is_err());
        assert_eq!(store.len(), 1);

        persistence.set_fail_writes(false);
        let reloaded = RequestStore::load(persistence).unwrap();
        assert_eq!(
            reloaded.get(request.id).unwrap().status,
            RequestStatus::Pending
        );
    }

    #[test]
    fn unknown_request_is_not_found() {
        let store = RequestStore::load(Arc::new(MemoryPersistence::new())).unwrap();
        assert!(matches!(
            store.get(RequestId(77)),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.transition(RequestId(77), |_| Ok(())),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn parallel_transitions_on_different_requests_all_persist() {
        let persistence = Arc::new(MemoryPersistence::new());
        let store = RequestStore::load(persistence.clone()).unwrap();
        let ids: Vec<RequestId> = (0..16).map(|_| store.create(draft).unwrap().id).collect();

        std::thread::scope(|scope| {
            for id in &ids {
                let store = &store;
                scope.spawn(move || {
                    store
                        .transition(*id, |r| {
                            r.status = RequestStatus::CancelledByClient;
                            Ok(())
                        })
                        .unwrap();
                });
            }
        });

        let reloaded = RequestStore::load(persistence).unwrap();
        assert!(ids.iter().all(|id| {
            reloaded.get(*id).unwrap().status == RequestStatus::CancelledByClient
        }));
    }
}
