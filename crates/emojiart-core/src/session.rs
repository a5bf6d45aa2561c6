//! An editing session: one document, its undo history, and the background
//! resolver and auto-save manager that follow it.
//!
//! Every committed change (a user intent, undo, redo, or opening a document)
//! is announced once on the session's [`EventBus`]. The resolver re-fetches
//! only when the background actually differs from the previous document's;
//! the auto-save manager re-arms its timer on every change except a restore.

use crate::background::{
    BackgroundImage, BackgroundResolver, FetchStatus, ImageDecoder, ImageFetcher,
};
use crate::camera::Camera;
use crate::document::{
    BackgroundRef, Document, DocumentError, Element, ElementId, export_document, import_document,
};
use crate::drop::{DropIntent, DropPayload, classify};
use crate::events::{ChangeCause, DocumentChange, EventBus};
use crate::history::{History, MAX_UNDO_HISTORY};
use crate::storage::{AUTOSAVE_KEY, AutoSaveManager, DEFAULT_AUTOSAVE_DELAY, Storage, StorageResult};
use kurbo::{Point, Size};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Font size, in screen points, of an emoji dropped onto the canvas.
pub const DEFAULT_EMOJI_FONT_SIZE: f64 = 40.0;

/// Tunables for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Quiet period before an auto-save.
    pub autosave_delay: Duration,
    /// Storage key of the auto-save slot.
    pub autosave_key: String,
    /// Maximum number of undo steps kept.
    pub history_limit: usize,
    /// Screen font size used for dropped emoji.
    pub default_font_size: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave_delay: DEFAULT_AUTOSAVE_DELAY,
            autosave_key: AUTOSAVE_KEY.to_string(),
            history_limit: MAX_UNDO_HISTORY,
            default_font_size: DEFAULT_EMOJI_FONT_SIZE,
        }
    }
}

/// Single owner of an EmojiArt document and everything derived from it.
pub struct EmojiArtSession<S: Storage + 'static> {
    document: Document,
    history: History,
    events: EventBus,
    resolver: BackgroundResolver,
    autosave: Arc<AutoSaveManager<S>>,
    camera: Camera,
    config: SessionConfig,
}

impl<S: Storage + 'static> EmojiArtSession<S> {
    /// Create a session over a blank document.
    ///
    /// Fetch and auto-save tasks are spawned on `runtime`.
    pub fn new(
        config: SessionConfig,
        storage: Arc<S>,
        fetcher: Arc<dyn ImageFetcher>,
        decoder: Arc<dyn ImageDecoder>,
        runtime: Handle,
    ) -> Self {
        let resolver = BackgroundResolver::new(fetcher, decoder, runtime.clone());
        let autosave = Arc::new(
            AutoSaveManager::new(storage, runtime)
                .with_delay(config.autosave_delay)
                .with_key(config.autosave_key.clone()),
        );

        let mut events = EventBus::new();
        events.subscribe(resolver.clone());
        events.subscribe(Arc::clone(&autosave));

        Self {
            document: Document::new(),
            history: History::with_limit(config.history_limit),
            events,
            resolver,
            autosave,
            camera: Camera::new(),
            config,
        }
    }

    /// Replace the document with the auto-saved one, if there is one.
    /// Returns whether anything was restored.
    pub async fn restore(&mut self) -> bool {
        match self.autosave.load_last().await {
            Some(document) => {
                self.replace(document, ChangeCause::Restore);
                true
            }
            None => false,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn elements(&self) -> &[Element] {
        self.document.elements()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Place a new emoji and return its id.
    pub fn add_emoji(&mut self, text: &str, location: (i64, i64), size: i64) -> ElementId {
        self.commit(format!("Add {}", text), |doc| {
            doc.add_element(text, location.0, location.1, size)
        })
    }

    /// Move an emoji by integer deltas. Unknown ids are ignored.
    pub fn move_emoji(&mut self, id: ElementId, dx: i64, dy: i64) -> bool {
        let Some(text) = self.element_text(id) else {
            return false;
        };
        self.commit(format!("Move {}", text), |doc| doc.move_element(id, dx, dy))
    }

    /// Scale an emoji. Unknown ids and non-positive factors are ignored.
    pub fn scale_emoji(&mut self, id: ElementId, factor: f64) -> bool {
        if !factor.is_finite() || factor <= 0.0 {
            return false;
        }
        let Some(text) = self.element_text(id) else {
            return false;
        };
        self.commit(format!("Scale {}", text), |doc| doc.scale_element(id, factor))
    }

    /// Delete an emoji. Unknown ids are ignored.
    pub fn remove_emoji(&mut self, id: ElementId) -> Option<Element> {
        let text = self.element_text(id)?;
        self.commit(format!("Delete {}", text), |doc| doc.remove_element(id))
    }

    pub fn set_background(&mut self, background: BackgroundRef) {
        self.commit("Set Background".to_string(), |doc| doc.set_background(background));
    }

    /// Undo the last action. Returns its name, or `None` if there was none.
    pub fn undo(&mut self) -> Option<String> {
        let action = self.history.undo(&mut self.document)?;
        let background_changed = self
            .history
            .last_redo_snapshot()
            .is_some_and(|after| after.background() != self.document.background());
        self.emit(ChangeCause::Undo(action.clone()), background_changed);
        Some(action)
    }

    /// Redo the last undone action. Returns its name, or `None` if there was none.
    pub fn redo(&mut self) -> Option<String> {
        let action = self.history.redo(&mut self.document)?;
        let background_changed = self
            .history
            .last_undo_snapshot()
            .is_some_and(|before| before.background() != self.document.background());
        self.emit(ChangeCause::Redo(action.clone()), background_changed);
        Some(action)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_action_name(&self) -> Option<String> {
        self.history.undo_action_name()
    }

    pub fn redo_action_name(&self) -> Option<String> {
        self.history.redo_action_name()
    }

    /// Replace the document wholesale. History is discarded.
    pub fn open(&mut self, document: Document) {
        self.replace(document, ChangeCause::Open);
    }

    /// Open a document file. The current document is untouched on error.
    pub fn import(&mut self, path: &Path) -> Result<(), DocumentError> {
        let document = import_document(path)?;
        self.open(document);
        Ok(())
    }

    /// Write the document to a file, bypassing auto-save.
    pub fn export(&self, path: &Path) -> Result<(), DocumentError> {
        export_document(&self.document, path)
    }

    /// Act on something dropped at screen point `at`.
    ///
    /// Links and image bytes become the background; a leading emoji is
    /// placed under the drop point at `font_size` screen points. Anything
    /// else is ignored. Returns whether the document changed.
    pub fn handle_drop(
        &mut self,
        payload: DropPayload,
        at: Point,
        viewport: Size,
        font_size: f64,
        is_emoji: impl Fn(char) -> bool,
    ) -> bool {
        match classify(payload, is_emoji) {
            Some(DropIntent::SetBackground(background)) => {
                self.set_background(background);
                true
            }
            Some(DropIntent::AddEmoji(emoji)) => {
                let location = self.camera.to_document(at, viewport);
                let size = (font_size / self.camera.zoom) as i64;
                self.add_emoji(&emoji, location, size);
                true
            }
            None => {
                log::debug!("Ignoring unusable drop");
                false
            }
        }
    }

    /// Zoom so the resolved background fills `viewport`.
    pub fn fit_background(&mut self, viewport: Size) {
        if let Some(image) = self.resolver.resolved_image() {
            let (width, height) = image.size();
            self.camera
                .zoom_to_fit(Size::new(width as f64, height as f64), viewport);
        }
    }

    pub fn fetch_status(&self) -> FetchStatus {
        self.resolver.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<FetchStatus> {
        self.resolver.subscribe_status()
    }

    pub fn background_image(&self) -> Option<Arc<BackgroundImage>> {
        self.resolver.resolved_image()
    }

    pub fn dismiss_fetch_failure(&self) {
        self.resolver.dismiss_failure();
    }

    /// Whether the latest change has not been auto-saved yet.
    pub fn is_dirty(&self) -> bool {
        self.autosave.is_dirty()
    }

    /// Save to the auto-save slot now.
    pub async fn flush(&self) -> StorageResult<()> {
        self.autosave.flush(&self.document).await
    }

    /// Forget the auto-saved document. The open document is untouched.
    pub async fn discard_autosave(&self) -> StorageResult<bool> {
        self.autosave.discard().await
    }

    fn element_text(&self, id: ElementId) -> Option<String> {
        self.document.element(id).map(|e| e.text().to_string())
    }

    fn commit<R>(&mut self, action: String, mutation: impl FnOnce(&mut Document) -> R) -> R {
        let result = self
            .history
            .perform(&mut self.document, action.clone(), mutation);
        let background_changed = self
            .history
            .last_undo_snapshot()
            .is_some_and(|before| before.background() != self.document.background());
        self.emit(ChangeCause::Perform(action), background_changed);
        result
    }

    fn replace(&mut self, document: Document, cause: ChangeCause) {
        let background_changed = document.background() != self.document.background();
        self.document = document;
        self.history.clear();
        self.emit(cause, background_changed);
    }

    fn emit(&self, cause: ChangeCause, background_changed: bool) {
        log::debug!(
            "Document replaced ({:?}, background changed: {})",
            cause,
            background_changed
        );
        self.events.emit(&DocumentChange {
            document: &self.document,
            cause,
            background_changed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drop::default_is_emoji;
    use crate::storage::MemoryStorage;
    use crate::testing::{GatedFetcher, StubDecoder, settle};
    use url::Url;

    const VIEWPORT: Size = Size::new(400.0, 300.0);

    fn session_with(
        storage: Arc<MemoryStorage>,
        fetcher: Arc<GatedFetcher>,
    ) -> EmojiArtSession<MemoryStorage> {
        EmojiArtSession::new(
            SessionConfig::default(),
            storage,
            fetcher,
            Arc::new(StubDecoder),
            Handle::current(),
        )
    }

    fn new_session() -> EmojiArtSession<MemoryStorage> {
        session_with(
            Arc::new(MemoryStorage::new()),
            Arc::new(GatedFetcher::default()),
        )
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_editing_scenario() {
        let fetcher = Arc::new(GatedFetcher::default());
        let mut session = session_with(Arc::new(MemoryStorage::new()), fetcher.clone());

        let fire = session.add_emoji("🔥", (-100, -100), 80);
        let tornado = session.add_emoji("🌪", (100, 50), 40);
        let ids: Vec<_> = session.elements().iter().map(|e| e.id()).collect();
        assert_eq!((fire, tornado), (1, 2));
        assert_eq!(ids, vec![1, 2]);

        assert!(session.move_emoji(fire, 10, -5));
        assert_eq!(session.document().element(fire).unwrap().position(), (-90, -105));
        assert_eq!(session.undo(), Some("Move 🔥".to_string()));
        assert_eq!(session.document().element(fire).unwrap().position(), (-100, -100));

        let old = url("https://x/old.png");
        let new = url("https://x/img.png");
        let old_gate = fetcher.gate(&old);
        let new_gate = fetcher.gate(&new);

        assert_eq!(session.fetch_status(), FetchStatus::Idle);
        session.set_background(BackgroundRef::Url(old));
        session.set_background(BackgroundRef::Url(new.clone()));
        assert_eq!(session.fetch_status(), FetchStatus::Fetching);

        // The superseded fetch completing must change nothing.
        let _ = old_gate.send(Ok(b"img:old-old".to_vec()));
        settle().await;
        assert_eq!(session.fetch_status(), FetchStatus::Fetching);
        assert!(session.background_image().is_none());

        new_gate.send(Ok(b"img:new".to_vec())).unwrap();
        session.subscribe_status().wait_for(|s| !s.is_fetching()).await.unwrap();
        assert_eq!(session.fetch_status(), FetchStatus::Idle);
        assert_eq!(session.background_image().unwrap().width, 3);
        assert_eq!(session.document().background().url(), Some(&new));
    }

    #[tokio::test]
    async fn test_action_names() {
        let mut session = new_session();
        let id = session.add_emoji("🐶", (0, 0), 40);
        assert_eq!(session.undo_action_name(), Some("Undo Add 🐶".to_string()));

        session.scale_emoji(id, 2.0);
        assert_eq!(session.undo_action_name(), Some("Undo Scale 🐶".to_string()));
        assert_eq!(session.document().element(id).unwrap().size(), 80);

        session.remove_emoji(id);
        assert_eq!(session.undo_action_name(), Some("Undo Delete 🐶".to_string()));

        session.undo();
        assert_eq!(session.redo_action_name(), Some("Redo Delete 🐶".to_string()));
        assert!(session.document().element(id).is_some());
    }

    #[tokio::test]
    async fn test_unknown_element_records_nothing() {
        let mut session = new_session();
        assert!(!session.move_emoji(42, 1, 1));
        assert!(!session.scale_emoji(42, 2.0));
        assert!(session.remove_emoji(42).is_none());

        let id = session.add_emoji("⭐", (0, 0), 10);
        assert!(!session.scale_emoji(id, 0.0));
        assert!(!session.scale_emoji(id, f64::NAN));

        assert_eq!(session.history.undo_len(), 1);
        assert_eq!(session.undo(), Some("Add ⭐".to_string()));
        assert_eq!(session.undo(), None);
        assert!(session.document().is_empty());
    }

    #[tokio::test]
    async fn test_undo_redo_round_trip() {
        let mut session = new_session();
        let id = session.add_emoji("🐙", (5, 5), 30);
        let before = session.document().clone();

        session.move_emoji(id, 3, 4);
        let after = session.document().clone();

        session.undo();
        assert_eq!(session.document(), &before);
        session.redo();
        assert_eq!(session.document(), &after);
        assert!(!session.can_redo());
    }

    #[tokio::test]
    async fn test_unrelated_undo_does_not_refetch() {
        let fetcher = Arc::new(GatedFetcher::default());
        let mut session = session_with(Arc::new(MemoryStorage::new()), fetcher.clone());
        let link = url("https://x/sky.png");
        let gate = fetcher.gate(&link);

        session.set_background(BackgroundRef::Url(link));
        session.add_emoji("☀", (0, 0), 40);
        session.undo();

        // A refetch would find no gate and fail.
        gate.send(Ok(b"img:sky".to_vec())).unwrap();
        session.subscribe_status().wait_for(|s| !s.is_fetching()).await.unwrap();
        assert_eq!(session.fetch_status(), FetchStatus::Idle);
        assert!(session.background_image().is_some());
    }

    #[tokio::test]
    async fn test_undo_redo_background_re_resolves() {
        let fetcher = Arc::new(GatedFetcher::default());
        let mut session = session_with(Arc::new(MemoryStorage::new()), fetcher.clone());
        let link = url("https://x/sky.png");
        let gate = fetcher.gate(&link);

        session.set_background(BackgroundRef::Url(link.clone()));
        gate.send(Ok(b"img:sky".to_vec())).unwrap();
        session.subscribe_status().wait_for(|s| !s.is_fetching()).await.unwrap();
        assert!(session.background_image().is_some());

        session.undo();
        assert!(session.document().background().is_blank());
        assert_eq!(session.fetch_status(), FetchStatus::Idle);
        assert!(session.background_image().is_none());

        // No gate armed this time, so the refetch reports a network failure.
        session.redo();
        assert_eq!(session.fetch_status(), FetchStatus::Fetching);
        settle().await;
        assert_eq!(session.fetch_status(), FetchStatus::Failed(Some(link)));

        session.dismiss_fetch_failure();
        assert_eq!(session.fetch_status(), FetchStatus::Idle);
    }

    #[tokio::test]
    async fn test_drop_emoji_under_pointer() {
        let mut session = new_session();
        session.camera_mut().zoom = 2.0;

        let changed = session.handle_drop(
            DropPayload::Text("🦊 fox".to_string()),
            Point::new(220.0, 130.0),
            VIEWPORT,
            DEFAULT_EMOJI_FONT_SIZE,
            default_is_emoji,
        );
        assert!(changed);
        let fox = &session.elements()[0];
        assert_eq!(fox.text(), "🦊");
        assert_eq!(fox.position(), (10, -10));
        assert_eq!(fox.size(), 20);
    }

    #[tokio::test]
    async fn test_drop_ignores_rejected_payloads() {
        let mut session = new_session();
        for payload in [
            DropPayload::Text("hello".to_string()),
            DropPayload::Url("::not a url::".to_string()),
            DropPayload::ImageData(Vec::new()),
        ] {
            assert!(!session.handle_drop(
                payload,
                Point::ZERO,
                VIEWPORT,
                DEFAULT_EMOJI_FONT_SIZE,
                default_is_emoji
            ));
        }
        assert!(!session.can_undo());
    }

    #[tokio::test]
    async fn test_drop_link_sets_unwrapped_background() {
        let mut session = new_session();
        session.handle_drop(
            DropPayload::Url("https://search.example/imgres?imgurl=https://cdn.example/a.png".to_string()),
            Point::ZERO,
            VIEWPORT,
            DEFAULT_EMOJI_FONT_SIZE,
            default_is_emoji,
        );
        assert_eq!(
            session.document().background().url(),
            Some(&url("https://cdn.example/a.png"))
        );
        assert_eq!(session.undo_action_name(), Some("Undo Set Background".to_string()));
    }

    #[tokio::test]
    async fn test_drop_image_bytes_resolves_inline() {
        let mut session = new_session();
        session.handle_drop(
            DropPayload::ImageData(b"img:abcd".to_vec()),
            Point::ZERO,
            VIEWPORT,
            DEFAULT_EMOJI_FONT_SIZE,
            default_is_emoji,
        );
        assert_eq!(session.fetch_status(), FetchStatus::Idle);
        assert_eq!(session.background_image().unwrap().size(), (4, 1));

        session.fit_background(Size::new(8.0, 8.0));
        assert!((session.camera().zoom - 2.0).abs() < f64::EPSILON);

        session.handle_drop(
            DropPayload::ImageData(b"junk".to_vec()),
            Point::ZERO,
            VIEWPORT,
            DEFAULT_EMOJI_FONT_SIZE,
            default_is_emoji,
        );
        assert_eq!(session.fetch_status(), FetchStatus::Failed(None));
        assert!(session.background_image().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_are_autosaved_and_restored() {
        let storage = Arc::new(MemoryStorage::new());
        let mut session = session_with(storage.clone(), Arc::new(GatedFetcher::default()));

        for i in 0..3 {
            session.add_emoji("🐝", (i, i), 20);
        }
        assert!(session.is_dirty());
        tokio::time::sleep(DEFAULT_AUTOSAVE_DELAY).await;
        settle().await;
        assert_eq!(storage.write_count(), 1);
        assert!(!session.is_dirty());

        let mut restored = session_with(storage.clone(), Arc::new(GatedFetcher::default()));
        assert!(restored.restore().await);
        assert_eq!(restored.document(), session.document());
        assert!(!restored.can_undo());

        // Restoring does not write the same document back.
        tokio::time::sleep(DEFAULT_AUTOSAVE_DELAY * 2).await;
        settle().await;
        assert_eq!(storage.write_count(), 1);
        assert!(!restored.is_dirty());
    }

    #[tokio::test]
    async fn test_restore_without_autosave() {
        let mut session = new_session();
        assert!(!session.restore().await);
        assert!(session.document().is_empty());
    }

    #[tokio::test]
    async fn test_flush_writes_autosave_slot() {
        let storage = Arc::new(MemoryStorage::new());
        let mut session = session_with(storage.clone(), Arc::new(GatedFetcher::default()));
        session.add_emoji("🍎", (1, 2), 30);

        session.flush().await.unwrap();
        assert!(!session.is_dirty());
        let bytes = storage.load(AUTOSAVE_KEY).await.unwrap();
        assert_eq!(&Document::from_bytes(&bytes).unwrap(), session.document());

        assert!(session.discard_autosave().await.unwrap());
        assert_eq!(session.document().len(), 1);
        let mut fresh = session_with(storage, Arc::new(GatedFetcher::default()));
        assert!(!fresh.restore().await);
    }

    #[tokio::test]
    async fn test_export_then_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("art.emojiart");

        let mut session = new_session();
        session.add_emoji("🌈", (7, -7), 50);
        session.export(&path).unwrap();

        let mut other = new_session();
        other.add_emoji("🍋", (0, 0), 10);
        other.import(&path).unwrap();
        assert_eq!(other.document(), session.document());
        assert!(!other.can_undo());
    }

    #[tokio::test]
    async fn test_import_failure_keeps_document() {
        let dir = tempfile::tempdir().unwrap();
        let corrupt = dir.path().join("corrupt.emojiart");
        std::fs::write(&corrupt, b"{ nope").unwrap();

        let mut session = new_session();
        session.add_emoji("🍋", (0, 0), 10);
        let before = session.document().clone();

        assert!(matches!(session.import(&corrupt), Err(DocumentError::Corrupt(_))));
        assert!(matches!(
            session.import(&dir.path().join("missing.emojiart")),
            Err(DocumentError::Io(_))
        ));
        assert_eq!(session.document(), &before);
        assert!(session.can_undo());
    }
}
