use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

use crate::models::UserProfile;

/// Live session state as seen by the rest of the application.
///
/// `user` is [`UserProfile::default`] when signed out. `is_restoring` is
/// true during startup restoration and while any operation that changes the
/// persisted session is in flight; `user` is not final while it is set.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub user: UserProfile,
    pub is_restoring: bool,
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        !self.user.is_empty()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            user: UserProfile::default(),
            is_restoring: true,
        }
    }
}

#[derive(Debug)]
struct Activity {
    awaiting_restoration: bool,
    in_flight: usize,
}

impl Activity {
    fn busy(&self) -> bool {
        self.awaiting_restoration || self.in_flight > 0
    }
}

/// Owner of the session state. Only the session manager holds one.
pub(crate) struct SessionStateHolder {
    tx: watch::Sender<SessionState>,
    activity: Mutex<Activity>,
}

impl SessionStateHolder {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::default());
        Self {
            tx,
            activity: Mutex::new(Activity {
                awaiting_restoration: true,
                in_flight: 0,
            }),
        }
    }

    pub(crate) fn current(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub(crate) fn user(&self) -> UserProfile {
        self.tx.borrow().user.clone()
    }

    pub(crate) fn watch(&self) -> SessionWatcher {
        SessionWatcher {
            rx: self.tx.subscribe(),
        }
    }

    /// Replace the published user. Subscribers are only woken on change.
    pub(crate) fn publish_user(&self, user: UserProfile) {
        self.tx.send_if_modified(|state| {
            if state.user == user {
                false
            } else {
                state.user = user;
                true
            }
        });
    }

    /// Mark a mutating operation as in flight until the guard drops.
    pub(crate) fn begin_operation(&self) -> OperationGuard<'_> {
        self.update_activity(|a| a.in_flight += 1);
        OperationGuard {
            holder: self,
            ends_restoration: false,
        }
    }

    /// Like [`begin_operation`](Self::begin_operation), and also ends the
    /// startup restoration phase when the guard drops.
    pub(crate) fn begin_restoration(&self) -> OperationGuard<'_> {
        self.update_activity(|a| a.in_flight += 1);
        OperationGuard {
            holder: self,
            ends_restoration: true,
        }
    }

    fn lock_activity(&self) -> MutexGuard<'_, Activity> {
        self.activity.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update_activity(&self, f: impl FnOnce(&mut Activity)) {
        self.tx.send_if_modified(|state| {
            let mut activity = self.lock_activity();
            f(&mut activity);
            let busy = activity.busy();
            if state.is_restoring == busy {
                false
            } else {
                state.is_restoring = busy;
                true
            }
        });
    }
}

/// Clears the in-flight mark on every exit path, including unwinding.
pub(crate) struct OperationGuard<'a> {
    holder: &'a SessionStateHolder,
    ends_restoration: bool,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        let ends_restoration = self.ends_restoration;
        self.holder.update_activity(|a| {
            a.in_flight = a.in_flight.saturating_sub(1);
            if ends_restoration {
                a.awaiting_restoration = false;
            }
        });
    }
}

/// Read-only view of the session state with change notification.
#[derive(Debug, Clone)]
pub struct SessionWatcher {
    rx: watch::Receiver<SessionState>,
}

impl SessionWatcher {
    pub fn current(&self) -> SessionState {
        self.rx.borrow().clone()
    }

    /// Wait for the next change. `None` once the session manager is gone.
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until no restoration or mutating operation is in flight.
    pub async fn ready(&mut self) -> Option<SessionState> {
        self.rx
            .wait_for(|state| !state.is_restoring)
            .await
            .ok()
            .map(|state| state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_restoring_and_signed_out() {
        let holder = SessionStateHolder::new();
        let state = holder.current();
        assert!(state.is_restoring);
        assert!(!state.is_signed_in());
    }

    #[test]
    fn test_restoration_guard_ends_startup_phase() {
        let holder = SessionStateHolder::new();
        {
            let _guard = holder.begin_restoration();
            assert!(holder.current().is_restoring);
        }
        assert!(!holder.current().is_restoring);
    }

    #[test]
    fn test_overlapping_operations_keep_flag_until_last_finishes() {
        let holder = SessionStateHolder::new();
        drop(holder.begin_restoration());

        let first = holder.begin_operation();
        let second = holder.begin_operation();
        drop(first);
        assert!(holder.current().is_restoring);
        drop(second);
        assert!(!holder.current().is_restoring);
    }

    #[test]
    fn test_guard_clears_flag_on_panic() {
        let holder = SessionStateHolder::new();
        drop(holder.begin_restoration());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = holder.begin_operation();
            panic!("operation failed");
        }));
        assert!(result.is_err());
        assert!(!holder.current().is_restoring);
    }

    #[tokio::test]
    async fn test_watcher_sees_published_user() {
        let holder = SessionStateHolder::new();
        let mut watcher = holder.watch();
        drop(holder.begin_restoration());
        let _ = watcher.changed().await;

        holder.publish_user(UserProfile::new("1", "A", "a@x.com"));
        let state = watcher.changed().await.expect("holder alive");
        assert_eq!(state.user.name, "A");
        assert!(!state.is_restoring);
    }

    #[test]
    fn test_publishing_same_user_does_not_notify() {
        let holder = SessionStateHolder::new();
        let watcher = holder.watch();

        holder.publish_user(UserProfile::default());
        assert!(!watcher.rx.has_changed().expect("sender alive"));
    }
}
