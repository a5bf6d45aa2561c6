//! Storage abstraction for persistence.

mod autosave;
mod file;
mod memory;

pub use autosave::{AUTOSAVE_KEY, AutoSaveManager, DEFAULT_AUTOSAVE_DELAY};
pub use file::FileStorage;
pub use memory::MemoryStorage;

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Entry not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for storage operations, sendable to the runtime.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key/value backend for documents and palettes.
///
/// Values are opaque byte payloads; callers own the encoding.
pub trait Storage: Send + Sync {
    /// Store `data` under `key`, replacing any previous value.
    fn save(&self, key: &str, data: &[u8]) -> BoxFuture<'_, StorageResult<()>>;

    /// Load the value stored under `key`.
    fn load(&self, key: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// List all stored keys.
    fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>>;

    /// Check if a key exists.
    fn exists(&self, key: &str) -> BoxFuture<'_, StorageResult<bool>>;
}
