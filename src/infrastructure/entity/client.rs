//! Read-through entity client

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use super::invalidator::MutationInvalidator;
use crate::domain::cache::{Cache, CacheExt, CacheKeyBuilder, CacheStats, QueryDescriptor};
use crate::domain::entity::{EntityDescriptor, Page};
use crate::domain::load::LoadToken;
use crate::domain::transport::{Transport, TransportRequest};
use crate::domain::DomainError;
use crate::infrastructure::metrics;

/// Default ceiling for one backend call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cached access to one backend entity
///
/// `T` is the full record, `S` the simplified projection served by the
/// `/all/simple` endpoint for select lists.
///
/// Caching policy:
/// - only the unfiltered first page of the list (any page size) and the
///   simplified projection are cached, under the entity's TTL;
/// - filtered or later pages and single records always go to the backend;
/// - a successful write evicts the whole namespace, a failed one touches
///   nothing, and reads that were in flight during the eviction are not
///   cached;
/// - a response whose token is no longer current is neither stored nor
///   returned; the call resolves as cancelled.
pub struct EntityCacheClient<T, S = T> {
    descriptor: EntityDescriptor,
    cache: Arc<dyn Cache>,
    transport: Arc<dyn Transport>,
    invalidator: MutationInvalidator,
    keys: CacheKeyBuilder,
    timeout: Duration,
    _marker: PhantomData<fn() -> (T, S)>,
}

impl<T, S> EntityCacheClient<T, S>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        descriptor: EntityDescriptor,
        cache: Arc<dyn Cache>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            descriptor,
            invalidator: MutationInvalidator::new(cache.clone()),
            cache,
            transport,
            keys: CacheKeyBuilder::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            _marker: PhantomData,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    pub fn namespace(&self) -> &str {
        &self.descriptor.namespace
    }

    /// Lists records, serving the unfiltered first page from cache
    pub async fn get_all(
        &self,
        token: &LoadToken,
        query: &QueryDescriptor,
    ) -> Result<Page<T>, DomainError> {
        let namespace = self.namespace();
        let key = query
            .is_cache_eligible()
            .then(|| self.keys.build_key(namespace, query));

        match &key {
            Some(key) => {
                if let Some(page) = self.cache.get::<Page<T>>(key) {
                    tracing::debug!(namespace = %namespace, key = %key, "Cache hit");
                    metrics::record_cache_hit(namespace);
                    return Ok(page);
                }
                tracing::debug!(namespace = %namespace, key = %key, "Cache miss");
                metrics::record_cache_miss(namespace);
            }
            None => {
                tracing::debug!(
                    namespace = %namespace,
                    page = query.page(),
                    filters = query.filters().len(),
                    "Bypassing cache for filtered or paged query"
                );
            }
        }

        let epoch = self.cache.epoch(namespace);
        let request =
            TransportRequest::get(self.descriptor.list_path()).with_params(query.to_params());
        let value = self.dispatch("get_all", request, token).await?;
        let page = Page::from_response(value)?;

        match &key {
            Some(key) => self.store(token, key, &page, epoch)?,
            None => self.accept(token)?,
        }

        Ok(page)
    }

    /// Simplified projection of every record, cached under one shared key
    pub async fn get_all_simple(&self, token: &LoadToken) -> Result<Vec<S>, DomainError> {
        let namespace = self.namespace();
        let key = self.keys.simple_key(namespace);

        if let Some(items) = self.cache.get::<Vec<S>>(&key) {
            tracing::debug!(namespace = %namespace, key = %key, "Cache hit");
            metrics::record_cache_hit(namespace);
            return Ok(items);
        }
        tracing::debug!(namespace = %namespace, key = %key, "Cache miss");
        metrics::record_cache_miss(namespace);

        let epoch = self.cache.epoch(namespace);
        let request = TransportRequest::get(self.descriptor.simple_path());
        let value = self.dispatch("get_all_simple", request, token).await?;
        let items: Vec<S> = decode(value, namespace)?;

        self.store(token, &key, &items, epoch)?;

        Ok(items)
    }

    /// Fetches one record; never cached
    pub async fn get_by_id(
        &self,
        id: impl fmt::Display,
        token: &LoadToken,
    ) -> Result<T, DomainError> {
        let request = TransportRequest::get(self.descriptor.item_path(&id.to_string())?);
        let value = self.dispatch("get_by_id", request, token).await?;
        let record = decode(value, self.namespace())?;

        self.accept(token)?;
        Ok(record)
    }

    pub async fn create<P>(&self, payload: &P) -> Result<T, DomainError>
    where
        P: Serialize + ?Sized,
    {
        let request = TransportRequest::post(self.descriptor.list_path(), encode(payload)?);
        let value = self.write("create", request).await?;

        decode(value, self.namespace())
    }

    pub async fn update<P>(&self, id: impl fmt::Display, payload: &P) -> Result<T, DomainError>
    where
        P: Serialize + ?Sized,
    {
        let request = TransportRequest::put(
            self.descriptor.item_path(&id.to_string())?,
            encode(payload)?,
        );
        let value = self.write("update", request).await?;

        decode(value, self.namespace())
    }

    pub async fn delete(&self, id: impl fmt::Display) -> Result<(), DomainError> {
        let request = TransportRequest::delete(self.descriptor.item_path(&id.to_string())?);
        self.write("delete", request).await?;

        Ok(())
    }

    /// Filters the cached unfiltered first page without any network call
    ///
    /// Returns `None` when nothing is cached; callers then fall back to
    /// [`get_all`](Self::get_all).
    pub fn search_cached<F>(&self, predicate: F) -> Option<Vec<T>>
    where
        F: Fn(&T) -> bool,
    {
        let key = self
            .keys
            .build_key(self.namespace(), &QueryDescriptor::default());
        let page = self.cache.get::<Page<T>>(&key)?;

        Some(page.items.into_iter().filter(|item| predicate(item)).collect())
    }

    /// Manual cache busting for this entity
    pub fn clear_cache(&self) -> usize {
        self.invalidator.invalidate(self.namespace())
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats(self.namespace())
    }

    /// Runs a write and evicts the namespace once the backend confirmed it
    async fn write(
        &self,
        operation: &'static str,
        request: TransportRequest,
    ) -> Result<Value, DomainError> {
        let value = self
            .dispatch(operation, request, &LoadToken::detached())
            .await?;

        self.invalidator.invalidate(self.namespace());
        Ok(value)
    }

    /// One backend call bounded by the token and the request timeout
    async fn dispatch(
        &self,
        operation: &'static str,
        request: TransportRequest,
        token: &LoadToken,
    ) -> Result<Value, DomainError> {
        let namespace = self.namespace();
        let target = request.to_string();
        let started = Instant::now();

        let result = tokio::select! {
            _ = token.cancelled() => Err(DomainError::cancelled()),
            outcome = tokio::time::timeout(self.timeout, self.transport.request(request, token)) => {
                outcome.unwrap_or_else(|_| {
                    Err(DomainError::timeout(format!(
                        "{} took longer than {}s",
                        target,
                        self.timeout.as_secs_f64()
                    )))
                })
            }
        };

        let elapsed = started.elapsed();
        metrics::record_entity_request(
            namespace,
            operation,
            metrics::outcome_label(result.as_ref().err()),
            elapsed,
        );

        match &result {
            Ok(_) => {
                tracing::debug!(
                    namespace = %namespace,
                    request = %target,
                    duration_ms = elapsed.as_millis() as u64,
                    "Backend call succeeded"
                );
            }
            Err(e) if e.is_cancellation() => {
                tracing::debug!(namespace = %namespace, request = %target, "Backend call cancelled");
            }
            Err(e) => {
                tracing::warn!(
                    namespace = %namespace,
                    request = %target,
                    error = %e,
                    "Backend call failed"
                );
            }
        }

        result
    }

    /// Rejects results whose load has been superseded or torn down
    fn accept(&self, token: &LoadToken) -> Result<(), DomainError> {
        if token.is_current() {
            return Ok(());
        }

        Err(self.superseded(token))
    }

    /// Caches a fresh read if its token is still current and the namespace
    /// has not been invalidated since `epoch`
    ///
    /// Both checks and the insert run as one step. A stale token fails the
    /// call as cancelled; an invalidated namespace only skips the insert.
    fn store<V>(
        &self,
        token: &LoadToken,
        key: &str,
        value: &V,
        epoch: u64,
    ) -> Result<(), DomainError>
    where
        V: Serialize + ?Sized,
    {
        let stored = token
            .apply_if_current(|| self.cache.set_if_epoch(key, value, self.descriptor.ttl, epoch))
            .ok_or_else(|| self.superseded(token))?;

        if stored {
            tracing::debug!(
                namespace = %self.namespace(),
                key = %key,
                ttl_secs = self.descriptor.ttl.as_secs(),
                "Stored in cache"
            );
            metrics::record_cache_set(self.namespace());
        }

        Ok(())
    }

    fn superseded(&self, token: &LoadToken) -> DomainError {
        tracing::debug!(
            namespace = %self.namespace(),
            scope = %token.scope(),
            generation = token.generation(),
            "Discarding superseded response"
        );
        DomainError::cancelled()
    }
}

fn encode<P>(payload: &P) -> Result<Value, DomainError>
where
    P: Serialize + ?Sized,
{
    serde_json::to_value(payload)
        .map_err(|e| DomainError::validation(format!("Invalid payload: {}", e)))
}

fn decode<V>(value: Value, namespace: &str) -> Result<V, DomainError>
where
    V: DeserializeOwned,
{
    serde_json::from_value(value)
        .map_err(|e| DomainError::decode(format!("Unexpected {} response: {}", namespace, e)))
}

impl<T, S> Clone for EntityCacheClient<T, S> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            cache: self.cache.clone(),
            transport: self.transport.clone(),
            invalidator: self.invalidator.clone(),
            keys: self.keys,
            timeout: self.timeout,
            _marker: PhantomData,
        }
    }
}

impl<T, S> fmt::Debug for EntityCacheClient<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCacheClient")
            .field("descriptor", &self.descriptor)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::EntityKind;
    use crate::domain::load::{LoadOutcome, LoadScope, LoadState, RequestCoordinator};
    use crate::domain::transport::mock::ScriptedTransport;
    use crate::domain::transport::{Method, MockTransport};
    use crate::infrastructure::cache::{InMemoryCache, InMemoryCacheConfig};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Client {
        ci: String,
        nombre: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ClientOption {
        ci: String,
    }

    const LIST: &str = "/clientes/";
    const SIMPLE: &str = "/clientes/all/simple";

    fn page_json(names: &[&str]) -> Value {
        let items: Vec<Value> = names
            .iter()
            .enumerate()
            .map(|(i, name)| json!({"ci": i.to_string(), "nombre": name}))
            .collect();

        json!({
            "items": items,
            "total": names.len(),
            "page": 1,
            "page_size": 20,
            "total_pages": 1,
            "has_next": false,
            "has_prev": false
        })
    }

    fn client_with(
        transport: Arc<dyn Transport>,
    ) -> (EntityCacheClient<Client, ClientOption>, Arc<InMemoryCache>) {
        let cache = Arc::new(InMemoryCache::new());
        let client = EntityCacheClient::new(EntityKind::Clients.descriptor(), cache.clone(), transport);
        (client, cache)
    }

    fn names(page: &Page<Client>) -> Vec<&str> {
        page.items.iter().map(|c| c.nombre.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_avoids_network() {
        let transport = Arc::new(ScriptedTransport::new().respond(LIST, page_json(&["Ana"])));
        let (client, _) = client_with(transport.clone());
        let query = QueryDescriptor::default();

        let first = client.get_all(&LoadToken::detached(), &query).await.unwrap();
        let second = client.get_all(&LoadToken::detached(), &query).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.calls_to(Method::Get, LIST), 1);
        assert_eq!(client.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_list_is_refetched() {
        let transport = Arc::new(ScriptedTransport::new().respond(LIST, page_json(&["Ana"])));
        let (client, _) = client_with(transport.clone());
        let query = QueryDescriptor::default();
        let ttl = client.descriptor().ttl;

        client.get_all(&LoadToken::detached(), &query).await.unwrap();
        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        client.get_all(&LoadToken::detached(), &query).await.unwrap();
        assert_eq!(transport.calls_to(Method::Get, LIST), 1);

        tokio::time::advance(Duration::from_millis(2)).await;
        client.get_all(&LoadToken::detached(), &query).await.unwrap();
        assert_eq!(transport.calls_to(Method::Get, LIST), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filtered_and_later_pages_bypass_cache() {
        let transport = Arc::new(ScriptedTransport::new().respond(LIST, page_json(&["Ana"])));
        let (client, cache) = client_with(transport.clone());

        let filtered = QueryDescriptor::default().with_filter("estado", "activo");
        let second_page = QueryDescriptor::default().with_page(2);

        for query in [&filtered, &filtered, &second_page, &second_page] {
            client.get_all(&LoadToken::detached(), query).await.unwrap();
        }

        assert_eq!(transport.calls_to(Method::Get, LIST), 4);
        assert_eq!(cache.size(), 0);
        assert!(client.search_cached(|_| true).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_size_is_part_of_the_key() {
        let transport = Arc::new(ScriptedTransport::new().respond(LIST, page_json(&["Ana"])));
        let (client, cache) = client_with(transport.clone());

        let small = QueryDescriptor::default();
        let large = QueryDescriptor::default().with_page_size(100);

        client.get_all(&LoadToken::detached(), &small).await.unwrap();
        client.get_all(&LoadToken::detached(), &large).await.unwrap();
        client.get_all(&LoadToken::detached(), &large).await.unwrap();

        assert_eq!(transport.calls_to(Method::Get, LIST), 2);
        assert_eq!(cache.size(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_writes_invalidate() {
        let created = json!({"ci": "9", "nombre": "Eva"});
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(LIST, page_json(&["Ana"]))
                .respond(SIMPLE, json!([{"ci": "0"}]))
                .on(Method::Post, LIST, Ok(created.clone()))
                .respond("/clientes/9", created.clone()),
        );
        let (client, cache) = client_with(transport.clone());
        let query = QueryDescriptor::default();

        client.get_all(&LoadToken::detached(), &query).await.unwrap();
        client.get_all_simple(&LoadToken::detached()).await.unwrap();
        assert_eq!(cache.size(), 2);

        let record = client.create(&created).await.unwrap();
        assert_eq!(record.nombre, "Eva");
        assert_eq!(cache.size(), 0);

        client.get_all(&LoadToken::detached(), &query).await.unwrap();
        assert_eq!(transport.calls_to(Method::Get, LIST), 2);

        client.update("9", &created).await.unwrap();
        client.get_all(&LoadToken::detached(), &query).await.unwrap();
        assert_eq!(transport.calls_to(Method::Get, LIST), 3);

        client.delete(9).await.unwrap();
        client.get_all(&LoadToken::detached(), &query).await.unwrap();
        assert_eq!(transport.calls_to(Method::Get, LIST), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inflight_read_does_not_repopulate_after_write() {
        let updated = json!({"ci": "7", "nombre": "after-write"});
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond_after(LIST, Duration::from_millis(500), Ok(page_json(&["before-write"])))
                .respond(LIST, page_json(&["after-write"]))
                .respond("/clientes/7", updated.clone()),
        );
        let (client, cache) = client_with(transport.clone());
        let client = Arc::new(client);
        let query = QueryDescriptor::default();

        let slow = {
            let (client, query) = (client.clone(), query.clone());
            tokio::spawn(async move { client.get_all(&LoadToken::detached(), &query).await })
        };
        tokio::task::yield_now().await;

        client.update(7, &updated).await.unwrap();

        // The caller still gets its answer, but it is not cached
        let stale = slow.await.unwrap().unwrap();
        assert_eq!(names(&stale), vec!["before-write"]);
        assert_eq!(cache.size(), 0);

        let fresh = client.get_all(&LoadToken::detached(), &query).await.unwrap();
        assert_eq!(names(&fresh), vec!["after-write"]);
        assert_eq!(transport.calls_to(Method::Get, LIST), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inflight_simple_read_does_not_repopulate_after_write() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond_after(SIMPLE, Duration::from_millis(500), Ok(json!([{"ci": "1"}, {"ci": "7"}])))
                .respond(SIMPLE, json!([{"ci": "1"}]))
                .on(Method::Delete, "/clientes/7", Ok(Value::Null)),
        );
        let (client, cache) = client_with(transport.clone());
        let client = Arc::new(client);

        let slow = {
            let client = client.clone();
            tokio::spawn(async move { client.get_all_simple(&LoadToken::detached()).await })
        };
        tokio::task::yield_now().await;

        client.delete(7).await.unwrap();

        assert_eq!(slow.await.unwrap().unwrap().len(), 2);
        assert_eq!(cache.size(), 0);

        let fresh = client.get_all_simple(&LoadToken::detached()).await.unwrap();
        assert_eq!(fresh, vec![ClientOption { ci: "1".to_string() }]);
        assert_eq!(transport.calls_to(Method::Get, SIMPLE), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_started_after_write_is_cached() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(LIST, page_json(&["Ana"]))
                .on(Method::Delete, "/clientes/7", Ok(Value::Null)),
        );
        let (client, cache) = client_with(transport.clone());
        let query = QueryDescriptor::default();

        client.delete(7).await.unwrap();
        client.get_all(&LoadToken::detached(), &query).await.unwrap();
        client.get_all(&LoadToken::detached(), &query).await.unwrap();

        assert_eq!(cache.size(), 1);
        assert_eq!(transport.calls_to(Method::Get, LIST), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsafe_ids_never_leave_the_entity_path() {
        let transport = Arc::new(
            ScriptedTransport::new().respond("/clientes/..%2Fusuarios", json!({"ci": "x", "nombre": "x"})),
        );
        let (client, _) = client_with(transport.clone());

        client
            .get_by_id("../usuarios", &LoadToken::detached())
            .await
            .unwrap();
        assert_eq!(transport.calls_to(Method::Get, "/clientes/..%2Fusuarios"), 1);

        let err = client.delete("..").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_leaves_cache_intact() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(LIST, page_json(&["Ana"]))
                .fail("/clientes/7", DomainError::server(422, "CI duplicada")),
        );
        let (client, cache) = client_with(transport.clone());
        let query = QueryDescriptor::default();

        client.get_all(&LoadToken::detached(), &query).await.unwrap();

        let err = client
            .update(7, &json!({"nombre": "Ana María"}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(422));

        client.get_all(&LoadToken::detached(), &query).await.unwrap();
        assert_eq!(transport.calls_to(Method::Get, LIST), 1);
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_with_undecodable_response_still_invalidates() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(LIST, page_json(&["Ana"]))
                .respond("/clientes/7", json!({"unexpected": true})),
        );
        let (client, cache) = client_with(transport.clone());

        client
            .get_all(&LoadToken::detached(), &QueryDescriptor::default())
            .await
            .unwrap();

        let err = client.update(7, &json!({"nombre": "x"})).await.unwrap_err();
        assert!(matches!(err, DomainError::Decode { .. }));
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_by_id_always_hits_network() {
        let transport = Arc::new(
            ScriptedTransport::new().respond("/clientes/3", json!({"ci": "3", "nombre": "Luis"})),
        );
        let (client, cache) = client_with(transport.clone());

        let first = client.get_by_id(3, &LoadToken::detached()).await.unwrap();
        let second = client.get_by_id("3", &LoadToken::detached()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.calls_to(Method::Get, "/clientes/3"), 2);
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simple_list_is_cached() {
        let transport =
            Arc::new(ScriptedTransport::new().respond(SIMPLE, json!([{"ci": "1"}, {"ci": "2"}])));
        let (client, _) = client_with(transport.clone());

        let first = client.get_all_simple(&LoadToken::detached()).await.unwrap();
        let second = client.get_all_simple(&LoadToken::detached()).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(transport.calls_to(Method::Get, SIMPLE), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_leaves_cache_untouched() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .fail(LIST, DomainError::network("connection refused"))
                .respond(LIST, page_json(&["Ana"])),
        );
        let (client, cache) = client_with(transport.clone());
        let query = QueryDescriptor::default();

        let err = client.get_all(&LoadToken::detached(), &query).await.unwrap_err();
        assert!(matches!(err, DomainError::Network { .. }));
        assert_eq!(cache.size(), 0);

        let page = client.get_all(&LoadToken::detached(), &query).await.unwrap();
        assert_eq!(names(&page), vec!["Ana"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_failure_is_not_cached() {
        let transport = Arc::new(ScriptedTransport::new().respond(LIST, json!({"detail": "?"})));
        let (client, cache) = client_with(transport.clone());

        let err = client
            .get_all(&LoadToken::detached(), &QueryDescriptor::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::Decode { .. }));
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_failure() {
        let transport = Arc::new(ScriptedTransport::new().respond_after(
            LIST,
            Duration::from_secs(60),
            Ok(page_json(&["Ana"])),
        ));
        let (client, cache) = client_with(transport.clone());
        let client = client.with_timeout(Duration::from_secs(5));

        let err = client
            .get_all(&LoadToken::detached(), &QueryDescriptor::default())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(!err.is_cancellation());
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_response_is_not_stored() {
        let transport = Arc::new(ScriptedTransport::new().respond_after(
            LIST,
            Duration::from_millis(500),
            Ok(page_json(&["stale"])),
        ));
        let (client, cache) = client_with(transport.clone());
        let client = Arc::new(client);
        let coordinator = RequestCoordinator::new();

        let first = coordinator.begin_load("clients:list");
        let pending = {
            let client = client.clone();
            let token = first.clone();
            tokio::spawn(async move { client.get_all(&token, &QueryDescriptor::default()).await })
        };
        tokio::task::yield_now().await;

        let _second = coordinator.begin_load("clients:list");

        let err = pending.await.unwrap().unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_superseded_after_response_is_discarded() {
        let coordinator = RequestCoordinator::new();
        let token = coordinator.begin_load("clients:list");

        let mut transport = MockTransport::new();
        let supersede = coordinator.clone();
        transport.expect_request().times(1).returning(move |_, _| {
            // A newer load starts while this response is in flight
            supersede.begin_load("clients:list");
            Ok(page_json(&["stale"]))
        });
        let (client, cache) = client_with(Arc::new(transport));

        let err = client
            .get_all(&token, &QueryDescriptor::default())
            .await
            .unwrap_err();

        assert!(err.is_cancellation());
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_carries_query_params() {
        let mut transport = MockTransport::new();
        transport
            .expect_request()
            .withf(|request, _| {
                request.path == LIST
                    && request.params
                        == vec![
                            ("page".to_string(), "2".to_string()),
                            ("page_size".to_string(), "50".to_string()),
                            ("activo".to_string(), "true".to_string()),
                            ("estado".to_string(), "pendiente".to_string()),
                        ]
            })
            .times(1)
            .returning(|_, _| Ok(json!([])));
        let (client, _) = client_with(Arc::new(transport));

        let query = QueryDescriptor::default()
            .with_page(2)
            .with_page_size(50)
            .with_filter("estado", "pendiente")
            .with_filter("activo", true);

        let page = client.get_all(&LoadToken::detached(), &query).await.unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_load_never_overwrites_fast_one() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond_after(LIST, Duration::from_millis(500), Ok(page_json(&["A"])))
                .respond_after(LIST, Duration::from_millis(50), Ok(page_json(&["B"]))),
        );
        let (client, cache) = client_with(transport.clone());
        let client = Arc::new(client);
        let scope = Arc::new(LoadScope::new(RequestCoordinator::new(), "appointments:list"));
        let query = QueryDescriptor::default();

        let slow = {
            let (client, scope, query) = (client.clone(), scope.clone(), query.clone());
            tokio::spawn(async move {
                scope
                    .load(|token| async move { client.get_all(&token, &query).await })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let fast = scope
            .load(|token| {
                let client = client.clone();
                let query = query.clone();
                async move { client.get_all(&token, &query).await }
            })
            .await;

        assert_eq!(fast, LoadOutcome::Applied);
        assert_eq!(slow.await.unwrap(), LoadOutcome::Discarded);

        match scope.snapshot() {
            LoadState::Ready(page) => assert_eq!(names(&page), vec!["B"]),
            other => panic!("unexpected state: {:?}", other),
        }
        let cached = client.search_cached(|_| true).unwrap();
        assert_eq!(cached[0].nombre, "B");
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_load_is_silent() {
        let transport = Arc::new(ScriptedTransport::new().respond_after(
            LIST,
            Duration::from_millis(500),
            Ok(page_json(&["Ana"])),
        ));
        let (client, cache) = client_with(transport.clone());
        let client = Arc::new(client);
        let scope = Arc::new(LoadScope::new(RequestCoordinator::new(), "clients:list"));

        let pending = {
            let (client, scope) = (client.clone(), scope.clone());
            tokio::spawn(async move {
                scope
                    .load(|token| async move {
                        client.get_all(&token, &QueryDescriptor::default()).await
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        scope.cancel();

        assert_eq!(pending.await.unwrap(), LoadOutcome::Discarded);
        assert_eq!(scope.snapshot(), LoadState::Idle);
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_cached() {
        let transport =
            Arc::new(ScriptedTransport::new().respond(LIST, page_json(&["Ana", "Luis", "Andrés"])));
        let (client, _) = client_with(transport.clone());

        assert!(client.search_cached(|_| true).is_none());

        client
            .get_all(&LoadToken::detached(), &QueryDescriptor::default())
            .await
            .unwrap();

        let found = client.search_cached(|c| c.nombre.starts_with("An")).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_page_is_returned_but_not_stored() {
        let transport = Arc::new(ScriptedTransport::new().respond(LIST, page_json(&["Ana"])));
        let cache = Arc::new(InMemoryCache::with_config(
            InMemoryCacheConfig::default().with_max_entry_bytes(8),
        ));
        let client: EntityCacheClient<Client> =
            EntityCacheClient::new(EntityKind::Clients.descriptor(), cache.clone(), transport.clone());

        let page = client
            .get_all(&LoadToken::detached(), &QueryDescriptor::default())
            .await
            .unwrap();

        assert_eq!(page.len(), 1);
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cache() {
        let transport = Arc::new(ScriptedTransport::new().respond(LIST, page_json(&["Ana"])));
        let (client, _) = client_with(transport.clone());

        client
            .get_all(&LoadToken::detached(), &QueryDescriptor::default())
            .await
            .unwrap();

        assert_eq!(client.clear_cache(), 1);
        assert_eq!(client.stats().clears, 1);
    }
}
