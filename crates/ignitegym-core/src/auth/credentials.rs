use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::models::{CredentialPair, UserProfile};
use crate::storage::{KeyValueStore, StorageError};

/// Storage key for the serialized token pair
pub const TOKEN_STORAGE_KEY: &str = "ignitegym.token";

/// Storage key for the serialized user profile
pub const USER_STORAGE_KEY: &str = "ignitegym.user";

/// Durable persistence of the token pair and user profile.
///
/// Reads never fail on missing or corrupt data: both come back as the empty
/// value. Backend I/O failures are returned to the caller.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub async fn save_tokens(&self, pair: &CredentialPair) -> Result<(), StorageError> {
        self.save(TOKEN_STORAGE_KEY, pair).await
    }

    pub async fn get_tokens(&self) -> Result<CredentialPair, StorageError> {
        self.load(TOKEN_STORAGE_KEY).await
    }

    pub async fn remove_tokens(&self) -> Result<(), StorageError> {
        self.backend.remove(TOKEN_STORAGE_KEY).await
    }

    pub async fn save_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        self.save(USER_STORAGE_KEY, user).await
    }

    pub async fn get_user(&self) -> Result<UserProfile, StorageError> {
        self.load(USER_STORAGE_KEY).await
    }

    pub async fn remove_user(&self) -> Result<(), StorageError> {
        self.backend.remove(USER_STORAGE_KEY).await
    }

    async fn save<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let contents = serde_json::to_string(value)?;
        self.backend.set(key, &contents).await
    }

    async fn load<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, StorageError> {
        let Some(contents) = self.backend.get(key).await? else {
            return Ok(T::default());
        };
        match serde_json::from_str(&contents) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(key = key, error = %e, "Stored value is corrupt, treating as empty");
                Ok(T::default())
            }
        }
    }
}
