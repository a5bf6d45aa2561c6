//! Debounced auto-save for document persistence.
//!
//! Every scheduled change restarts a quiet-period timer; only when the timer
//! runs out without being reset is the latest document written. A burst of
//! edits (a drag producing dozens of moves) therefore costs one write.

use crate::document::Document;
use crate::events::{ChangeCause, DocumentChange, DocumentObserver};
use crate::storage::{Storage, StorageError, StorageResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Default quiet period before an auto-save fires.
pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_secs(3);

/// Well-known storage key of the auto-save slot.
pub const AUTOSAVE_KEY: &str = "Autosaved.emojiart";

/// Manages debounced document persistence.
pub struct AutoSaveManager<S: Storage + 'static> {
    /// Storage backend.
    storage: Arc<S>,
    /// Key the document is written under.
    key: String,
    /// Quiet period before a save.
    delay: Duration,
    /// Runtime the timer tasks are spawned on.
    runtime: Handle,
    /// Timer task for the most recent change, if still waiting.
    pending: Mutex<Option<JoinHandle<()>>>,
    /// Bumped on every schedule so an older save cannot clear the dirty flag.
    generation: Arc<AtomicU64>,
    /// Whether the latest change has not reached storage yet.
    dirty: Arc<AtomicBool>,
}

impl<S: Storage + 'static> AutoSaveManager<S> {
    /// Create an auto-save manager writing to [`AUTOSAVE_KEY`].
    pub fn new(storage: Arc<S>, runtime: Handle) -> Self {
        Self {
            storage,
            key: AUTOSAVE_KEY.to_string(),
            delay: DEFAULT_AUTOSAVE_DELAY,
            runtime,
            pending: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the quiet period.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the storage key of the auto-save slot.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Check if the document has unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Whether a timer is currently waiting to save.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Record a change and (re)start the timer.
    ///
    /// Any earlier timer is cancelled; only `document` will be written.
    pub fn schedule(&self, document: &Document) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.dirty.store(true, Ordering::SeqCst);

        let storage = Arc::clone(&self.storage);
        let key = self.key.clone();
        let delay = self.delay;
        let document = document.clone();
        let current = Arc::clone(&self.generation);
        let dirty = Arc::clone(&self.dirty);

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            match write_document(storage.as_ref(), &key, &document).await {
                Ok(()) => {
                    if current.load(Ordering::SeqCst) == generation {
                        dirty.store(false, Ordering::SeqCst);
                    }
                    log::info!("Auto-saved document ({} elements)", document.len());
                }
                // The in-memory document stays authoritative; the next edit re-arms the timer.
                Err(e) => log::warn!("Auto-save failed: {}", e),
            }
        });

        if let Some(previous) = self.pending.lock().replace(task) {
            previous.abort();
        }
    }

    /// Cancel the pending timer, if any, without saving.
    pub fn cancel(&self) {
        if let Some(previous) = self.pending.lock().take() {
            previous.abort();
        }
    }

    /// Save immediately, bypassing the timer.
    pub async fn flush(&self, document: &Document) -> StorageResult<()> {
        self.cancel();
        self.generation.fetch_add(1, Ordering::SeqCst);
        write_document(self.storage.as_ref(), &self.key, document).await?;
        self.dirty.store(false, Ordering::SeqCst);
        log::info!("Saved document ({} elements)", document.len());
        Ok(())
    }

    /// Try to load the auto-saved document.
    /// Returns None if nothing was saved or the slot is unreadable.
    pub async fn load_last(&self) -> Option<Document> {
        let bytes = match self.storage.load(&self.key).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => return None,
            Err(e) => {
                log::warn!("Could not read auto-save slot: {}", e);
                return None;
            }
        };
        match Document::from_bytes(&bytes) {
            Ok(document) => {
                log::info!("Restored auto-saved document ({} elements)", document.len());
                Some(document)
            }
            Err(e) => {
                log::warn!("Auto-save slot is corrupt: {}", e);
                None
            }
        }
    }

    /// Cancel any pending save and delete the auto-save slot.
    /// Returns whether there was anything to delete.
    pub async fn discard(&self) -> StorageResult<bool> {
        self.cancel();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.dirty.store(false, Ordering::SeqCst);
        if !self.storage.exists(&self.key).await? {
            return Ok(false);
        }
        self.storage.delete(&self.key).await?;
        log::info!("Discarded auto-saved document");
        Ok(true)
    }
}

impl<S: Storage + 'static> DocumentObserver for AutoSaveManager<S> {
    // A restored document already matches what is on disk.
    fn document_replaced(&self, change: &DocumentChange<'_>) {
        if change.cause != ChangeCause::Restore {
            self.schedule(change.document);
        }
    }
}

impl<S: Storage + 'static> Drop for AutoSaveManager<S> {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn write_document<S: Storage + ?Sized>(
    storage: &S,
    key: &str,
    document: &Document,
) -> StorageResult<()> {
    let bytes = document
        .to_bytes()
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    storage.save(key, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BoxFuture, MemoryStorage};

    const DELAY: Duration = Duration::from_secs(3);

    fn manager(storage: Arc<MemoryStorage>) -> AutoSaveManager<MemoryStorage> {
        AutoSaveManager::new(storage, Handle::current()).with_delay(DELAY)
    }

    fn doc_with(n: i64) -> Document {
        let mut doc = Document::new();
        for i in 0..n {
            doc.add_element("⭐", i, i, 10);
        }
        doc
    }

    /// Storage that rejects every write.
    struct BrokenStorage;

    impl Storage for BrokenStorage {
        fn save(&self, _key: &str, _data: &[u8]) -> BoxFuture<'_, StorageResult<()>> {
            Box::pin(async { Err(StorageError::Io("disk full".to_string())) })
        }
        fn load(&self, key: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>> {
            let key = key.to_string();
            Box::pin(async move { Err(StorageError::NotFound(key)) })
        }
        fn delete(&self, _key: &str) -> BoxFuture<'_, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }
        fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
            Box::pin(async { Ok(vec![]) })
        }
        fn exists(&self, _key: &str) -> BoxFuture<'_, StorageResult<bool>> {
            Box::pin(async { Ok(false) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_write() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(storage.clone());

        for n in 1..=5 {
            manager.schedule(&doc_with(n));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(manager.is_dirty());
        assert_eq!(storage.write_count(), 0);

        tokio::time::sleep(DELAY).await;
        tokio::task::yield_now().await;

        assert_eq!(storage.write_count(), 1);
        assert!(!manager.is_dirty());
        let saved = manager.load_last().await.unwrap();
        assert_eq!(saved.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_change_resets_timer() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(storage.clone());

        manager.schedule(&doc_with(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        manager.schedule(&doc_with(2));
        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(storage.write_count(), 0);
        assert!(manager.is_pending());

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(storage.write_count(), 1);
        assert_eq!(manager.load_last().await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_is_not_fatal() {
        let manager = AutoSaveManager::new(Arc::new(BrokenStorage), Handle::current())
            .with_delay(DELAY);

        manager.schedule(&doc_with(1));
        tokio::time::sleep(DELAY * 2).await;
        tokio::task::yield_now().await;

        assert!(manager.is_dirty());
        assert!(!manager.is_pending());
        assert!(manager.load_last().await.is_none());
    }

    /// Storage whose first write fails.
    #[derive(Default)]
    struct FlakyStorage {
        failed_once: AtomicBool,
        inner: MemoryStorage,
    }

    impl Storage for FlakyStorage {
        fn save(&self, key: &str, data: &[u8]) -> BoxFuture<'_, StorageResult<()>> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Box::pin(async { Err(StorageError::Io("disk busy".to_string())) });
            }
            self.inner.save(key, data)
        }
        fn load(&self, key: &str) -> BoxFuture<'_, StorageResult<Vec<u8>>> {
            self.inner.load(key)
        }
        fn delete(&self, key: &str) -> BoxFuture<'_, StorageResult<()>> {
            self.inner.delete(key)
        }
        fn list(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
            self.inner.list()
        }
        fn exists(&self, key: &str) -> BoxFuture<'_, StorageResult<bool>> {
            self.inner.exists(key)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_change_retries_after_failure() {
        let storage = Arc::new(FlakyStorage::default());
        let manager = AutoSaveManager::new(storage.clone(), Handle::current()).with_delay(DELAY);

        manager.schedule(&doc_with(1));
        tokio::time::sleep(DELAY * 2).await;
        tokio::task::yield_now().await;
        assert!(manager.is_dirty());
        assert_eq!(storage.inner.write_count(), 0);

        manager.schedule(&doc_with(2));
        tokio::time::sleep(DELAY).await;
        tokio::task::yield_now().await;

        assert_eq!(storage.inner.write_count(), 1);
        assert!(!manager.is_dirty());
        assert_eq!(manager.load_last().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_flush_saves_immediately() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(storage.clone());

        manager.schedule(&doc_with(1));
        manager.flush(&doc_with(3)).await.unwrap();

        assert_eq!(storage.write_count(), 1);
        assert!(!manager.is_dirty());
        assert!(!manager.is_pending());
        assert_eq!(manager.load_last().await.unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_cancels_and_deletes() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(storage.clone());
        assert!(!manager.discard().await.unwrap());

        manager.flush(&doc_with(2)).await.unwrap();
        manager.schedule(&doc_with(3));
        assert!(manager.discard().await.unwrap());

        tokio::time::sleep(DELAY * 2).await;
        tokio::task::yield_now().await;
        assert_eq!(storage.write_count(), 1);
        assert!(!manager.is_dirty());
        assert!(manager.load_last().await.is_none());
    }

    #[tokio::test]
    async fn test_load_last_ignores_corrupt_slot() {
        let storage = Arc::new(MemoryStorage::new());
        storage.save(AUTOSAVE_KEY, b"garbage").await.unwrap();
        let manager = manager(storage);

        assert!(manager.load_last().await.is_none());
    }
}
