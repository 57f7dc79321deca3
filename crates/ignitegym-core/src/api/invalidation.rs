//! Registry of "session became invalid" handlers.
//!
//! The HTTP layer owns one registry. Whoever manages the session registers a
//! handler and keeps the returned [`Registration`]; dropping it (or calling
//! [`Registration::deregister`]) removes the handler, so a handler can never
//! outlive the component that installed it.
//!
//! The registry fires at most once per attached token: it starts disarmed,
//! attaching a token arms it, and [`invalidate`] or detaching the token
//! disarms it. Several requests failing with the
//! same expired token therefore produce a single forced sign-out.
//!
//! [`invalidate`]: InvalidationRegistry::invalidate

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info};

pub type InvalidationHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    handlers: Vec<(u64, InvalidationHandler)>,
    armed: bool,
}

/// Clone is cheap; clones share the same handler list.
#[derive(Clone, Default)]
pub struct InvalidationRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl InvalidationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install a handler. It stays active until the returned registration is
    /// deregistered or dropped.
    pub fn register<F, Fut>(&self, handler: F) -> Registration
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: InvalidationHandler = Arc::new(move || handler().boxed());
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.handlers.push((id, handler));
        debug!(id, active = state.handlers.len(), "Registered invalidation handler");

        Registration {
            id,
            registry: Arc::downgrade(&self.state),
        }
    }

    pub fn handler_count(&self) -> usize {
        self.lock().handlers.len()
    }

    /// Allow the next [`invalidate`](Self::invalidate) to fire.
    pub fn arm(&self) {
        self.lock().armed = true;
    }

    /// No token is attached; nothing to invalidate.
    pub fn disarm(&self) {
        self.lock().armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.lock().armed
    }

    /// Declare the current session unusable and run every active handler.
    ///
    /// Returns the number of handlers run; zero when the registry is not
    /// armed (no token attached, or it already fired for the current one). A handler deregistered while an earlier
    /// one is running is skipped.
    pub async fn invalidate(&self) -> usize {
        let ids: Vec<u64> = {
            let mut state = self.lock();
            if !state.armed {
                debug!("No armed session to invalidate, ignoring");
                return 0;
            }
            state.armed = false;
            state.handlers.iter().map(|(id, _)| *id).collect()
        };

        info!(handlers = ids.len(), "Session invalidated");

        let mut fired = 0;
        for id in ids {
            // Look the handler up again so a deregistered one never runs.
            let handler = self
                .lock()
                .handlers
                .iter()
                .find(|(hid, _)| *hid == id)
                .map(|(_, h)| Arc::clone(h));
            if let Some(handler) = handler {
                handler().await;
                fired += 1;
            }
        }
        fired
    }
}

/// Handle for an installed handler. Dropping it deregisters the handler.
#[must_use = "dropping a Registration deregisters its handler"]
pub struct Registration {
    id: u64,
    registry: Weak<Mutex<RegistryState>>,
}

impl Registration {
    pub fn deregister(self) {
        drop(self);
    }

    /// False once the handler was removed or the registry is gone.
    pub fn is_active(&self) -> bool {
        match self.registry.upgrade() {
            Some(state) => {
                let state = state.lock().unwrap_or_else(|e| e.into_inner());
                state.handlers.iter().any(|(id, _)| *id == self.id)
            }
            None => false,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(state) = self.registry.upgrade() {
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            state.handlers.retain(|(id, _)| *id != self.id);
            debug!(id = self.id, active = state.handlers.len(), "Deregistered invalidation handler");
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration").field("id", &self.id).finish()
    }
}
