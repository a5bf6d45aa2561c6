//! EmojiArt Core Library
//!
//! Platform-agnostic document model, undo history, background resolution,
//! palettes and persistence for EmojiArt.

pub mod background;
pub mod camera;
pub mod document;
pub mod drop;
pub mod events;
pub mod history;
pub mod palette;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testing;

pub use background::{
    BackgroundImage, BackgroundResolver, DecodeError, FetchError, FetchStatus, HttpFetcher,
    ImageDecoder, ImageFetcher, RasterDecoder,
};
pub use camera::Camera;
pub use document::{BackgroundRef, Document, DocumentError, Element, ElementId};
pub use drop::{DropIntent, DropPayload, default_is_emoji};
pub use events::{ChangeCause, DocumentChange, DocumentObserver, EventBus};
pub use history::{History, MAX_UNDO_HISTORY};
pub use palette::{Palette, PaletteStore};
pub use session::{DEFAULT_EMOJI_FONT_SIZE, EmojiArtSession, SessionConfig};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError, StorageResult};
