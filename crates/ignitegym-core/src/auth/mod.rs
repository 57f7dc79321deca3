//! Session management for the single signed-in user of this process.
//!
//! This module provides:
//! - `CredentialStore`: durable token pair and user profile persistence
//! - `SessionState` / `SessionWatcher`: live session state and subscription
//! - `SessionManager`: sign-in, sign-out, profile update, startup
//!   restoration, and the forced sign-out handshake with the HTTP layer
//!
//! The manager is the only writer of session state. Every operation that
//! changes both persisted and in-memory state holds one async lock across
//! its persist/publish section, so operations apply in the order they
//! acquire it.

pub mod credentials;
pub mod error;
pub mod session;
pub mod state;

pub use credentials::{CredentialStore, TOKEN_STORAGE_KEY, USER_STORAGE_KEY};
pub use error::SessionError;
pub use session::SessionManager;
pub use state::{SessionState, SessionWatcher};
