//! REST client for the Ignite Gym backend, and the network-layer seam the
//! session manager is written against.
//!
//! Authenticated requests carry `Authorization: Bearer <token>` from a
//! header slot the session manager owns. When the backend rejects that
//! token the client fires the [`InvalidationRegistry`], which is how a
//! forced sign-out reaches the session manager.

pub mod client;
pub mod error;
pub mod invalidation;
pub mod types;

use async_trait::async_trait;

pub use client::ApiClient;
pub use error::ApiError;
pub use invalidation::{InvalidationHandler, InvalidationRegistry, Registration};
pub use types::{PasswordChange, ProfileUpdate, SessionResponse};

/// What the session manager needs from the HTTP layer.
#[async_trait]
pub trait NetworkLayer: Send + Sync {
    /// `POST /sessions`
    async fn create_session(&self, email: &str, password: &str)
        -> Result<SessionResponse, ApiError>;

    /// `POST /users`
    async fn create_user(&self, name: &str, email: &str, password: &str) -> Result<(), ApiError>;

    /// `PUT /users`, authenticated
    async fn update_user(&self, update: &ProfileUpdate) -> Result<(), ApiError>;

    /// Replace the bearer token attached to outgoing requests. `None` detaches it.
    fn set_bearer_token(&self, token: Option<&str>);

    fn invalidation(&self) -> &InvalidationRegistry;
}
