//! Data models shared by the session core and the API client.
//!
//! - `UserProfile`: the signed-in user as returned by the backend
//! - `CredentialPair`: opaque access/refresh token pair

pub mod credentials;
pub mod user;

pub use credentials::CredentialPair;
pub use user::UserProfile;
