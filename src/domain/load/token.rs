//! Per-scope supersession and cancellation

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::watch;

/// Cancellation handle of one request attempt
///
/// Cloning yields another handle to the same attempt. A token is current
/// while it is the latest attempt of its scope, has not been cancelled and
/// its result has not been applied yet.
#[derive(Clone)]
pub struct LoadToken {
    state: Arc<TokenState>,
    coordinator: Weak<CoordinatorInner>,
}

struct TokenState {
    scope: Arc<str>,
    generation: u64,
    cancelled: watch::Sender<bool>,
}

impl LoadToken {
    fn issue(scope: Arc<str>, generation: u64, coordinator: Weak<CoordinatorInner>) -> Self {
        let (cancelled, _) = watch::channel(false);

        Self {
            state: Arc::new(TokenState {
                scope,
                generation,
                cancelled,
            }),
            coordinator,
        }
    }

    /// A token outside any scope: current until cancelled
    ///
    /// Used for writes and one-off reads that nothing can supersede.
    pub fn detached() -> Self {
        Self::issue(Arc::from(""), 0, Weak::new())
    }

    pub fn scope(&self) -> &str {
        &self.state.scope
    }

    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    /// Cancels this attempt; in-flight transport calls observing it abort
    pub fn cancel(&self) {
        if let Some(inner) = self.coordinator.upgrade() {
            let mut slots = inner.slots();

            if slots.get(self.scope()).is_some_and(|slot| slot.is_active(self)) {
                slots.remove(self.scope());
            }
        }

        self.signal();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.borrow()
    }

    /// Whether a result obtained with this token may still be applied
    pub fn is_current(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }

        if self.state.generation == 0 {
            return true;
        }

        match self.coordinator.upgrade() {
            Some(inner) => inner
                .slots()
                .get(self.scope())
                .is_some_and(|slot| slot.is_active(self)),
            None => false,
        }
    }

    /// Runs `apply` only while this token is current
    ///
    /// The scope's slot stays locked for the duration of `apply`, so no newer
    /// attempt can begin between the check and the side effect. Returns
    /// `None` when the token is stale. `apply` must not touch the coordinator.
    pub fn apply_if_current<R>(&self, apply: impl FnOnce() -> R) -> Option<R> {
        if self.is_cancelled() {
            return None;
        }

        if self.state.generation == 0 {
            return Some(apply());
        }

        let inner = self.coordinator.upgrade()?;
        let slots = inner.slots();

        if slots.get(self.scope()).is_some_and(|slot| slot.is_active(self)) {
            Some(apply())
        } else {
            None
        }
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.state.cancelled.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    fn signal(&self) {
        self.state.cancelled.send_replace(true);
    }

    fn same_attempt(&self, other: &LoadToken) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for LoadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadToken")
            .field("scope", &self.state.scope)
            .field("generation", &self.state.generation)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct ScopeSlot {
    active: Option<LoadToken>,
}

impl ScopeSlot {
    fn is_active(&self, token: &LoadToken) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.same_attempt(token))
    }
}

#[derive(Default)]
struct CoordinatorInner {
    slots: Mutex<HashMap<Arc<str>, ScopeSlot>>,
    next_generation: AtomicU64,
}

impl CoordinatorInner {
    fn slots(&self) -> MutexGuard<'_, HashMap<Arc<str>, ScopeSlot>> {
        // Slot bookkeeping never panics mid-update, so a poisoned map is still consistent
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Issues tokens so that each scope has at most one accepted request
///
/// Starting a load supersedes the previous one for the same scope: the old
/// token is cancelled and can never be applied, whatever order the network
/// answers in. Cheap to clone; clones share the same scopes.
#[derive(Clone, Default)]
pub struct RequestCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl RequestCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new attempt for `scope`, superseding any in-flight one
    pub fn begin_load(&self, scope: &str) -> LoadToken {
        // Generations start at 1; 0 marks detached tokens
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let scope: Arc<str> = Arc::from(scope);
        let token = LoadToken::issue(scope.clone(), generation, Arc::downgrade(&self.inner));

        let superseded = {
            let mut slots = self.inner.slots();
            let slot = slots.entry(scope).or_insert(ScopeSlot { active: None });
            slot.active.replace(token.clone())
        };

        if let Some(previous) = superseded {
            tracing::debug!(
                scope = %previous.scope(),
                superseded = previous.generation(),
                current = generation,
                "Superseding in-flight load"
            );
            previous.signal();
        }

        token
    }

    /// Marks `token` settled if it is still current
    ///
    /// Returns `true` exactly once per token, and only for the latest attempt
    /// of its scope; the caller may then apply the result. The scope goes
    /// back to idle.
    pub fn settle(&self, token: &LoadToken) -> bool {
        if token.is_cancelled() {
            return false;
        }

        let mut slots = self.inner.slots();

        match slots.get_mut(token.scope()) {
            Some(slot) if slot.is_active(token) => {
                slots.remove(token.scope());
                true
            }
            _ => false,
        }
    }

    /// Cancels whatever is in flight for `scope` and forgets the scope
    pub fn teardown(&self, scope: &str) {
        let removed = self.inner.slots().remove(scope);

        if let Some(active) = removed.and_then(|slot| slot.active) {
            tracing::debug!(
                scope = %scope,
                generation = active.generation(),
                "Cancelling load on teardown"
            );
            active.signal();
        }
    }

    /// Whether a load is in flight for `scope`
    pub fn is_loading(&self, scope: &str) -> bool {
        self.inner
            .slots()
            .get(scope)
            .is_some_and(|slot| slot.active.is_some())
    }

    /// Number of scopes with a load in flight
    pub fn active_scopes(&self) -> usize {
        self.inner
            .slots()
            .values()
            .filter(|slot| slot.active.is_some())
            .count()
    }
}

impl fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCoordinator")
            .field("active_scopes", &self.active_scopes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_token_is_current() {
        let coordinator = RequestCoordinator::new();
        let token = coordinator.begin_load("clients:list");

        assert!(token.is_current());
        assert!(!token.is_cancelled());
        assert!(coordinator.is_loading("clients:list"));
    }

    #[test]
    fn test_new_load_supersedes_previous() {
        let coordinator = RequestCoordinator::new();
        let first = coordinator.begin_load("clients:list");
        let second = coordinator.begin_load("clients:list");

        assert!(!first.is_current());
        assert!(first.is_cancelled());
        assert!(second.is_current());
        assert!(second.generation() > first.generation());
    }

    #[test]
    fn test_scopes_are_independent() {
        let coordinator = RequestCoordinator::new();
        let clients = coordinator.begin_load("clients:list");
        let owners = coordinator.begin_load("owners:list");

        assert!(clients.is_current());
        assert!(owners.is_current());
        assert_eq!(coordinator.active_scopes(), 2);
    }

    #[test]
    fn test_settle_only_once_and_only_for_latest() {
        let coordinator = RequestCoordinator::new();
        let stale = coordinator.begin_load("s");
        let latest = coordinator.begin_load("s");

        assert!(!coordinator.settle(&stale));
        assert!(coordinator.settle(&latest));
        assert!(!coordinator.settle(&latest));
        assert!(!latest.is_current());
        assert!(!coordinator.is_loading("s"));
    }

    #[test]
    fn test_teardown_cancels_in_flight() {
        let coordinator = RequestCoordinator::new();
        let token = coordinator.begin_load("s");

        coordinator.teardown("s");

        assert!(token.is_cancelled());
        assert!(!token.is_current());
        assert!(!coordinator.settle(&token));
    }

    #[test]
    fn test_token_from_torn_down_scope_stays_stale_after_reuse() {
        let coordinator = RequestCoordinator::new();
        let old = coordinator.begin_load("s");
        coordinator.teardown("s");

        let fresh = coordinator.begin_load("s");
        assert!(!old.is_current());
        assert!(fresh.is_current());
    }

    #[test]
    fn test_cancel_clears_active_slot() {
        let coordinator = RequestCoordinator::new();
        let token = coordinator.begin_load("s");

        token.cancel();

        assert!(token.is_cancelled());
        assert!(!coordinator.is_loading("s"));
        assert!(coordinator.inner.slots().is_empty());
    }

    #[test]
    fn test_cancelled_scopes_are_forgotten() {
        let coordinator = RequestCoordinator::new();

        for i in 0..50 {
            coordinator.begin_load(&format!("clients:search:{}", i)).cancel();
        }

        assert!(coordinator.inner.slots().is_empty());
        assert_eq!(coordinator.active_scopes(), 0);
    }

    #[test]
    fn test_apply_if_current() {
        let coordinator = RequestCoordinator::new();
        let stale = coordinator.begin_load("s");
        let latest = coordinator.begin_load("s");

        assert_eq!(stale.apply_if_current(|| 1), None);
        assert_eq!(latest.apply_if_current(|| 2), Some(2));

        coordinator.settle(&latest);
        assert_eq!(latest.apply_if_current(|| 3), None);

        let detached = LoadToken::detached();
        assert_eq!(detached.apply_if_current(|| 4), Some(4));
        detached.cancel();
        assert_eq!(detached.apply_if_current(|| 5), None);
    }

    #[test]
    fn test_cancelling_stale_token_keeps_current_one() {
        let coordinator = RequestCoordinator::new();
        let stale = coordinator.begin_load("s");
        let current = coordinator.begin_load("s");

        stale.cancel();

        assert!(current.is_current());
        assert!(coordinator.is_loading("s"));
    }

    #[test]
    fn test_detached_token() {
        let token = LoadToken::detached();
        assert!(token.is_current());

        token.cancel();
        assert!(!token.is_current());
    }

    #[test]
    fn test_token_outliving_coordinator_is_stale() {
        let token = RequestCoordinator::new().begin_load("s");
        assert!(!token.is_current());
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves_on_supersession() {
        let coordinator = RequestCoordinator::new();
        let token = coordinator.begin_load("s");
        let waiter = token.clone();

        let handle = tokio::spawn(async move { waiter.cancelled().await });
        coordinator.begin_load("s");

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancellation was not observed")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves_immediately_when_already_cancelled() {
        let token = LoadToken::detached();
        token.cancel();

        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already-cancelled token should resolve at once");
    }
}
