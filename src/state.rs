//! Application state shared by every entity client

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::domain::cache::{Cache, CacheInfo, QueryDescriptor};
use crate::domain::entity::EntityKind;
use crate::domain::load::{LoadScope, LoadToken, RequestCoordinator};
use crate::domain::transport::Transport;
use crate::domain::DomainError;
use crate::infrastructure::cache::CacheJanitor;
use crate::infrastructure::entity::{EntityCacheClient, MutationInvalidator, DEFAULT_REQUEST_TIMEOUT};

/// One store, one transport and one coordinator, injected into every client
#[derive(Debug, Clone)]
pub struct AppState {
    pub cache: Arc<dyn Cache>,
    pub transport: Arc<dyn Transport>,
    pub coordinator: RequestCoordinator,
    pub invalidator: MutationInvalidator,
    request_timeout: Duration,
    janitor: Option<Arc<CacheJanitor>>,
}

impl AppState {
    pub fn new(cache: Arc<dyn Cache>, transport: Arc<dyn Transport>) -> Self {
        Self {
            invalidator: MutationInvalidator::new(cache.clone()),
            cache,
            transport,
            coordinator: RequestCoordinator::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            janitor: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Starts periodic expired-entry sweeps; they stop with the last clone
    pub fn with_janitor(mut self, period: Duration) -> Self {
        self.janitor = Some(Arc::new(CacheJanitor::spawn(self.cache.clone(), period)));
        self
    }

    pub fn has_janitor(&self) -> bool {
        self.janitor.is_some()
    }

    /// Client for one entity, sharing this state's store and transport
    pub fn client<T, S>(&self, kind: EntityKind) -> EntityCacheClient<T, S>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        S: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        EntityCacheClient::new(kind.descriptor(), self.cache.clone(), self.transport.clone())
            .with_timeout(self.request_timeout)
    }

    /// Load scope registered with this state's coordinator
    pub fn scope<T>(&self, name: impl Into<String>) -> LoadScope<T>
    where
        T: Send + Sync + 'static,
    {
        LoadScope::new(self.coordinator.clone(), name)
    }

    /// Loads the first page of each entity concurrently, filling the cache
    ///
    /// Returns the number of records per entity.
    pub async fn warm(&self, kinds: &[EntityKind]) -> Vec<(EntityKind, Result<usize, DomainError>)> {
        let loads = kinds.iter().map(|&kind| async move {
            let client: EntityCacheClient<Value> = self.client(kind);
            let result = client
                .get_all(&LoadToken::detached(), &QueryDescriptor::default())
                .await
                .map(|page| page.len());
            (kind, result)
        });

        join_all(loads).await
    }

    pub fn cache_info(&self) -> CacheInfo {
        self.cache.info()
    }
}
