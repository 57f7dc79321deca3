use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::credentials::CredentialStore;
use super::error::SessionError;
use super::state::{SessionState, SessionStateHolder, SessionWatcher};
use crate::api::{NetworkLayer, PasswordChange, ProfileUpdate, Registration, SessionResponse};
use crate::models::{CredentialPair, UserProfile};

struct Inner {
    store: CredentialStore,
    network: Arc<dyn NetworkLayer>,
    state: SessionStateHolder,
    /// Held across the persist/publish section of every mutating operation.
    write_lock: AsyncMutex<()>,
    registration: Mutex<Option<Registration>>,
}

/// Orchestrates the process's single session.
///
/// Clone is cheap; clones drive the same session. The forced sign-out
/// handler installed by [`mount`](Self::mount) is removed by
/// [`unmount`](Self::unmount) or when the last clone is dropped.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a manager without installing the invalidation handler.
    pub fn new(store: CredentialStore, network: Arc<dyn NetworkLayer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                network,
                state: SessionStateHolder::new(),
                write_lock: AsyncMutex::new(()),
                registration: Mutex::new(None),
            }),
        }
    }

    /// Create a manager and install its invalidation handler.
    pub fn mount(store: CredentialStore, network: Arc<dyn NetworkLayer>) -> Self {
        let manager = Self::new(store, network);
        manager.remount_invalidation_handler();
        manager
    }

    fn registration(&self) -> MutexGuard<'_, Option<Registration>> {
        self.inner
            .registration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Install the forced sign-out handler, replacing any previous one.
    ///
    /// The old handler is deregistered before the new one is attached, so at
    /// most one is ever active for this manager.
    pub fn remount_invalidation_handler(&self) {
        let mut slot = self.registration();
        if let Some(previous) = slot.take() {
            previous.deregister();
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let registration = self.inner.network.invalidation().register(move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    SessionManager { inner }.handle_forced_invalidation().await;
                }
            }
        });
        *slot = Some(registration);
    }

    /// Remove the forced sign-out handler.
    pub fn unmount(&self) {
        if let Some(registration) = self.registration().take() {
            registration.deregister();
            debug!("Session manager unmounted");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.registration()
            .as_ref()
            .map(Registration::is_active)
            .unwrap_or(false)
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.current()
    }

    pub fn user(&self) -> UserProfile {
        self.inner.state.user()
    }

    pub fn watch(&self) -> SessionWatcher {
        self.inner.state.watch()
    }

    /// Rebuild the session from durable storage. Called once at startup.
    ///
    /// Never fails: unreadable storage degrades to signed out. Returns
    /// whether a session was restored.
    pub async fn restore_session(&self) -> bool {
        let _busy = self.inner.state.begin_restoration();
        let _write = self.inner.write_lock.lock().await;

        let (user, tokens) =
            futures::future::join(self.inner.store.get_user(), self.inner.store.get_tokens())
                .await;

        match (user, tokens) {
            (Ok(user), Ok(tokens)) if !user.is_empty() && !tokens.is_empty() => {
                self.inner.network.set_bearer_token(Some(&tokens.token));
                info!(user_id = %user.id, "Session restored");
                self.inner.state.publish_user(user);
                true
            }
            (Ok(_), Ok(_)) => {
                debug!("No stored session");
                false
            }
            (user, tokens) => {
                for e in [user.err(), tokens.err()].into_iter().flatten() {
                    warn!(error = %e, "Failed to read stored session, starting signed out");
                }
                false
            }
        }
    }

    /// Authenticate and establish a session.
    ///
    /// The user and tokens are persisted before anything is published. A
    /// response missing any of user, token or refresh token changes nothing.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile, SessionError> {
        let _busy = self.inner.state.begin_operation();

        let response = self.inner.network.create_session(email, password).await?;
        let (user, tokens) = complete_session(response)?;

        let _write = self.inner.write_lock.lock().await;
        if let Err(e) = self.persist_session(&user, &tokens).await {
            warn!(error = %e, "Failed to persist session, rolling back");
            self.discard_session().await;
            return Err(e.into());
        }

        self.inner.network.set_bearer_token(Some(&tokens.token));
        self.inner.state.publish_user(user.clone());
        info!(user_id = %user.id, "Signed in");
        Ok(user)
    }

    /// Create an account, then sign in with it.
    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, SessionError> {
        self.inner.network.create_user(name, email, password).await?;
        info!("Account created");
        self.sign_in(email, password).await
    }

    /// End the session. Safe to call when already signed out.
    ///
    /// The in-memory user and bearer token are cleared first; both stored
    /// values are then removed, and the first removal failure is returned.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let _busy = self.inner.state.begin_operation();
        let _write = self.inner.write_lock.lock().await;

        let was_signed_in = !self.inner.state.user().is_empty();
        self.inner.state.publish_user(UserProfile::default());
        self.inner.network.set_bearer_token(None);

        let user_removed = self.inner.store.remove_user().await;
        let tokens_removed = self.inner.store.remove_tokens().await;
        user_removed?;
        tokens_removed?;

        if was_signed_in {
            info!("Signed out");
        }
        Ok(())
    }

    /// Replace the signed-in user's profile. Tokens are untouched.
    ///
    /// The new profile is published immediately. If it cannot be persisted
    /// the previous profile is published again and the error returned.
    pub async fn update_user_profile(&self, updated: UserProfile) -> Result<(), SessionError> {
        let _busy = self.inner.state.begin_operation();
        let _write = self.inner.write_lock.lock().await;

        let previous = self.inner.state.user();
        if previous.is_empty() {
            return Err(SessionError::NotSignedIn);
        }
        if updated.is_empty() {
            return Err(SessionError::InvalidProfile);
        }
        self.apply_profile(previous, updated).await
    }

    /// Rename the user (and optionally change the password) on the backend,
    /// then record the new name in the session.
    ///
    /// Fails with `SessionChanged` if a different user is signed in by the
    /// time the backend answers.
    pub async fn update_profile(
        &self,
        name: &str,
        password: Option<PasswordChange>,
    ) -> Result<UserProfile, SessionError> {
        let requested_by = self.user();
        if requested_by.is_empty() {
            return Err(SessionError::NotSignedIn);
        }

        let update = ProfileUpdate::new(name, password);
        self.inner.network.update_user(&update).await?;

        let _busy = self.inner.state.begin_operation();
        let _write = self.inner.write_lock.lock().await;

        let previous = self.inner.state.user();
        if previous.is_empty() {
            return Err(SessionError::NotSignedIn);
        }
        if previous.id != requested_by.id {
            warn!("Signed-in user changed during profile update, discarding");
            return Err(SessionError::SessionChanged);
        }

        let updated = previous.with_name(name);
        self.apply_profile(previous, updated.clone()).await?;
        Ok(updated)
    }

    /// Publish `updated`, persist it, and publish `previous` again if the
    /// write fails. Caller holds the write lock.
    async fn apply_profile(
        &self,
        previous: UserProfile,
        updated: UserProfile,
    ) -> Result<(), SessionError> {
        self.inner.state.publish_user(updated.clone());
        if let Err(e) = self.inner.store.save_user(&updated).await {
            warn!(error = %e, "Failed to persist profile, reverting");
            self.inner.state.publish_user(previous);
            return Err(e.into());
        }
        debug!(user_id = %updated.id, "Profile updated");
        Ok(())
    }

    /// Forced sign-out requested by the HTTP layer.
    async fn handle_forced_invalidation(&self) {
        info!("Session invalidated by server, signing out");
        if let Err(e) = self.sign_out().await {
            warn!(error = %e, "Failed to clear stored session after invalidation");
        }
    }

    async fn persist_session(
        &self,
        user: &UserProfile,
        tokens: &CredentialPair,
    ) -> Result<(), SessionError> {
        self.inner.store.save_tokens(tokens).await?;
        self.inner.store.save_user(user).await?;
        Ok(())
    }

    /// Return to a clean signed-out state after a partial write.
    async fn discard_session(&self) {
        self.inner.state.publish_user(UserProfile::default());
        self.inner.network.set_bearer_token(None);
        if let Err(e) = self.inner.store.remove_tokens().await {
            warn!(error = %e, "Failed to remove tokens during rollback");
        }
        if let Err(e) = self.inner.store.remove_user().await {
            warn!(error = %e, "Failed to remove user during rollback");
        }
    }
}

/// Split a sign-in response into user and tokens, or name what is missing.
fn complete_session(
    response: SessionResponse,
) -> Result<(UserProfile, CredentialPair), SessionError> {
    let user = response.user.filter(|u| !u.is_empty());
    let token = response.token.filter(|t| !t.is_empty());
    let refresh_token = response.refresh_token.filter(|t| !t.is_empty());

    match (user, token, refresh_token) {
        (Some(user), Some(token), Some(refresh_token)) => {
            Ok((user, CredentialPair::new(token, refresh_token)))
        }
        (user, token, refresh_token) => {
            let mut missing = Vec::new();
            if user.is_none() {
                missing.push("user");
            }
            if token.is_none() {
                missing.push("token");
            }
            if refresh_token.is_none() {
                missing.push("refresh_token");
            }
            warn!(?missing, "Incomplete sign-in response");
            Err(SessionError::IncompleteAuthResponse { missing })
        }
    }
}
