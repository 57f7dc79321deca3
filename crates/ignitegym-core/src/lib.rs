//! Core library for the Ignite Gym client.
//!
//! The interesting part of this crate is the session manager in [`auth`]:
//! it establishes, persists, restores and invalidates the single
//! authenticated session of the process, and stays consistent with an HTTP
//! layer ([`api::ApiClient`]) that can decide on its own that the session is
//! no longer usable.
//!
//! - [`models`]: user profile and token pair types
//! - [`storage`]: durable key-value backends (file, OS keychain, memory)
//! - [`auth`]: credential store, session state holder, session manager
//! - [`api`]: REST client and the invalidation handler registry
//! - [`config`]: application configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod storage;

pub use api::{ApiClient, ApiError, InvalidationRegistry, NetworkLayer, Registration};
pub use auth::{
    CredentialStore, SessionError, SessionManager, SessionState, SessionWatcher,
};
pub use config::{Config, StorageBackend};
pub use models::{CredentialPair, UserProfile};
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore, StorageError};
