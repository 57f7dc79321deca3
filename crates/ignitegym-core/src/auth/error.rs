use thiserror::Error;

use crate::api::ApiError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Sign-in response is missing {}", .missing.join(", "))]
    IncompleteAuthResponse { missing: Vec<&'static str> },

    #[error("Request failed: {0}")]
    AuthRequest(#[from] ApiError),

    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Profile has no user id")]
    InvalidProfile,

    #[error("A different user signed in while the update was in flight")]
    SessionChanged,
}

impl SessionError {
    /// Worth retrying the same operation later.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Storage(_) => true,
            SessionError::AuthRequest(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Caused by the input or the current session state; show the message.
    pub fn is_validation(&self) -> bool {
        match self {
            SessionError::AuthRequest(e) => e.is_client_error(),
            SessionError::Storage(_) => false,
            _ => true,
        }
    }
}
