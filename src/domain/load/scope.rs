//! Consumer-facing load scopes

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use super::token::{LoadToken, RequestCoordinator};
use crate::domain::DomainError;

/// What a consumer currently displays for a scope
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    Idle,
    Loading,
    Ready(T),
    Failed(DomainError),
}

impl<T> LoadState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DomainError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Result of one [`LoadScope::load`] call
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The value was applied to the scope
    Applied,
    /// The failure was applied to the scope
    Failed(DomainError),
    /// Superseded, cancelled or torn down; nothing was applied
    Discarded,
}

/// One logical "thing a consumer wants displayed"
///
/// Every [`load`](Self::load) supersedes the previous one, and a result is
/// applied only if its attempt is still the latest, so the visible state
/// always comes from the most recently started request. Dropping the scope
/// cancels whatever is in flight.
pub struct LoadScope<T> {
    name: Arc<str>,
    coordinator: RequestCoordinator,
    state: watch::Sender<LoadState<T>>,
}

impl<T> LoadScope<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(coordinator: RequestCoordinator, name: impl Into<String>) -> Self {
        let (state, _) = watch::channel(LoadState::Idle);

        Self {
            name: Arc::from(name.into()),
            coordinator,
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `fetch` as the new current attempt of this scope
    ///
    /// `fetch` receives the attempt's token and must pass it to the network
    /// layer. Cancellation outcomes and stale results are dropped silently.
    pub async fn load<F, Fut>(&self, fetch: F) -> LoadOutcome
    where
        F: FnOnce(LoadToken) -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let token = self.coordinator.begin_load(&self.name);

        self.state.send_if_modified(|state| {
            if !token.is_current() {
                return false;
            }
            *state = LoadState::Loading;
            true
        });

        let result = fetch(token.clone()).await;

        if let Err(error) = &result {
            if error.is_cancellation() {
                tracing::debug!(
                    scope = %self.name,
                    generation = token.generation(),
                    "Load cancelled"
                );
                // Releases the slot even if the fetch gave up on its own
                token.cancel();
                self.reset_if_abandoned();
                return LoadOutcome::Discarded;
            }
        }

        let mut outcome = LoadOutcome::Discarded;
        let coordinator = &self.coordinator;

        // Settling under the state lock keeps the check and the write atomic
        self.state.send_if_modified(|state| {
            if !coordinator.settle(&token) {
                return false;
            }

            match result {
                Ok(value) => {
                    *state = LoadState::Ready(value);
                    outcome = LoadOutcome::Applied;
                }
                Err(error) => {
                    outcome = LoadOutcome::Failed(error.clone());
                    *state = LoadState::Failed(error);
                }
            }
            true
        });

        if outcome == LoadOutcome::Discarded {
            tracing::debug!(
                scope = %self.name,
                generation = token.generation(),
                "Discarding superseded result"
            );
        }

        outcome
    }

    /// Cancels the in-flight attempt, if any, and returns to idle
    pub fn cancel(&self) {
        self.coordinator.teardown(&self.name);
        self.reset_if_abandoned();
    }

    /// Loading with nothing in flight means the last attempt was cancelled
    fn reset_if_abandoned(&self) {
        let coordinator = &self.coordinator;
        let name = &self.name;

        self.state.send_if_modified(|state| {
            if !state.is_loading() || coordinator.is_loading(name) {
                return false;
            }
            *state = LoadState::Idle;
            true
        });
    }

    pub fn is_loading(&self) -> bool {
        self.coordinator.is_loading(&self.name)
    }

    /// Watches state changes
    pub fn subscribe(&self) -> watch::Receiver<LoadState<T>> {
        self.state.subscribe()
    }

    /// Explicit teardown; equivalent to dropping the scope
    pub fn dispose(self) {}
}

impl<T> LoadScope<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Current state
    pub fn snapshot(&self) -> LoadState<T> {
        self.state.borrow().clone()
    }
}

impl<T> Drop for LoadScope<T> {
    fn drop(&mut self) {
        self.coordinator.teardown(&self.name);
    }
}

impl<T> std::fmt::Debug for LoadScope<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadScope")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
