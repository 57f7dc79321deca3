//! Durable key-value storage backends.
//!
//! The session core persists two small JSON documents (the token pair and
//! the user profile). Where they live is decided by the `KeyValueStore`
//! implementation:
//! - `FileStore`: one JSON file per key in the app data directory
//! - `KeyringStore`: the OS credential store (Keychain, Credential Manager,
//!   Secret Service)
//! - `MemoryStore`: process-local, for tests and embedders

pub mod error;
pub mod file;
pub mod keychain;
pub mod memory;

use async_trait::async_trait;

pub use error::StorageError;
pub use file::FileStore;
pub use keychain::KeyringStore;
pub use memory::MemoryStore;

/// Asynchronous string key-value persistence.
///
/// `remove` must be idempotent: removing an absent key succeeds.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}
