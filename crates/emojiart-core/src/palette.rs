//! Named emoji palettes, persisted as a whole on every change.

use crate::drop::is_emoji_grapheme;
use crate::storage::{Storage, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

/// Palettes seeded into a store that has nothing saved yet.
const DEFAULT_PALETTES: &[(&str, &str)] = &[
    ("Animals", "🐅🐆🦓🦍🦧🦣🐘🦛🦏🐪🐫🦒🦘🦬🐃🐂🐄🐎🐖🐏🐑🦙🐐🦌🐕🐩"),
    ("Insects", "🐝🪱🐛🦋🐌🐞🐜🪰🪲🪳🦟🦗🕷🦂"),
    ("Sea Life", "🐙🦑🦐🦞🦀🐡🐠🐟🐬🐳🐋🦈"),
    ("Hearts", "💛💚💙💜🖤🤍🤎💔💕💞💓💗💖💘💝"),
    ("Fruits", "🍏🍎🍐🍊🍋🍌🍉🍇🍓🫐🍈🍒🍑🥭🍍"),
    ("Weather", "☀🌤⛅🌥🌦🌧⛈🌩🌨🌪🌫🌈☔⚡"),
];

/// A named set of emoji.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Palette {
    pub id: u64,
    pub name: String,
    pub emojis: String,
}

const STORE_KEY_PREFIX: &str = "PaletteStore.";

/// Storage key of the store called `name`.
pub fn store_key(name: &str) -> String {
    format!("{}{}", STORE_KEY_PREFIX, name)
}

/// Names of every palette store saved in `storage`, sorted.
pub fn stored_names<S: Storage + ?Sized>(storage: &S) -> Result<Vec<String>, StorageError> {
    let mut names: Vec<String> = pollster::block_on(storage.list())?
        .into_iter()
        .filter_map(|key| key.strip_prefix(STORE_KEY_PREFIX).map(str::to_string))
        .collect();
    names.sort();
    Ok(names)
}

/// Ordered list of palettes. Never empty once opened.
pub struct PaletteStore<S: Storage> {
    name: String,
    palettes: Vec<Palette>,
    storage: Arc<S>,
}

impl<S: Storage> PaletteStore<S> {
    /// Restore the store called `name`, seeding the defaults if nothing
    /// (or nothing readable) was saved.
    pub fn open(name: impl Into<String>, storage: Arc<S>) -> Self {
        let name = name.into();
        let key = store_key(&name);
        let restored = match pollster::block_on(storage.load(&key)) {
            Ok(bytes) => serde_json::from_slice::<Vec<Palette>>(&bytes)
                .map_err(|e| log::warn!("Palette store {} is corrupt: {}", name, e))
                .unwrap_or_default(),
            Err(StorageError::NotFound(_)) => Vec::new(),
            Err(e) => {
                log::warn!("Could not read palette store {}: {}", name, e);
                Vec::new()
            }
        };

        let mut store = Self {
            name,
            palettes: restored,
            storage,
        };
        if store.palettes.is_empty() {
            log::info!("Using built-in palettes for store {}", store.name);
            for (name, emojis) in DEFAULT_PALETTES {
                store.insert(*name, *emojis, store.palettes.len());
            }
        } else {
            log::info!(
                "Restored {} palettes for store {}",
                store.palettes.len(),
                store.name
            );
        }
        store
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn palettes(&self) -> &[Palette] {
        &self.palettes
    }

    pub fn len(&self) -> usize {
        self.palettes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.palettes.is_empty()
    }

    fn clamp(&self, index: usize) -> usize {
        index.min(self.palettes.len().saturating_sub(1))
    }

    /// The palette at `index`, or the last one if `index` is past the end.
    pub fn at(&self, index: usize) -> &Palette {
        &self.palettes[self.clamp(index)]
    }

    /// Position of the palette with `id`.
    pub fn index_of(&self, id: u64) -> Option<usize> {
        self.palettes.iter().position(|p| p.id == id)
    }

    /// Index after `index`, wrapping around.
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.palettes.len().max(1)
    }

    /// Insert a palette at `index` (clamped to the end) and return its id.
    pub fn insert(&mut self, name: impl Into<String>, emojis: impl Into<String>, index: usize) -> u64 {
        let id = self.palettes.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        let index = index.min(self.palettes.len());
        self.palettes.insert(
            index,
            Palette {
                id,
                name: name.into(),
                emojis: emojis.into(),
            },
        );
        self.persist();
        id
    }

    /// Remove the palette at `index`, unless it is the last one left.
    /// Returns the index of the palette to show next.
    pub fn remove_at(&mut self, index: usize) -> usize {
        if self.palettes.len() > 1 && index < self.palettes.len() {
            self.palettes.remove(index);
            self.persist();
        }
        index % self.palettes.len()
    }

    pub fn rename(&mut self, index: usize, name: impl Into<String>) {
        let index = self.clamp(index);
        self.palettes[index].name = name.into();
        self.persist();
    }

    /// Prepend the emoji in `text`, dropping anything `is_emoji` rejects and
    /// any emoji the palette already has.
    pub fn add_emojis(&mut self, index: usize, text: &str, is_emoji: impl Fn(char) -> bool) {
        let index = self.clamp(index);
        let palette = &mut self.palettes[index];
        let mut seen = HashSet::new();
        palette.emojis = text
            .graphemes(true)
            .chain(palette.emojis.graphemes(true))
            .filter(|&g| is_emoji_grapheme(g, &is_emoji) && seen.insert(g))
            .collect();
        self.persist();
    }

    /// Remove every occurrence of `emoji` from the palette at `index`.
    pub fn remove_emoji(&mut self, index: usize, emoji: &str) {
        let index = self.clamp(index);
        let palette = &mut self.palettes[index];
        palette.emojis = palette
            .emojis
            .graphemes(true)
            .filter(|&g| g != emoji)
            .collect();
        self.persist();
    }

    fn persist(&self) {
        let bytes = match serde_json::to_vec(&self.palettes) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Could not encode palette store {}: {}", self.name, e);
                return;
            }
        };
        if let Err(e) = pollster::block_on(self.storage.save(&store_key(&self.name), &bytes)) {
            log::warn!("Could not save palette store {}: {}", self.name, e);
        }
    }
}
