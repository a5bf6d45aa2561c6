//! Document model: background reference plus placed emoji elements.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Identifier of a placed element. Assigned once, never reused.
pub type ElementId = u64;

/// Largest `nextId` a document file may carry (the range of a signed 64-bit
/// counter). Element ids in a file stay below it.
pub const MAX_ELEMENT_ID: ElementId = i64::MAX as ElementId;

/// Errors surfaced by explicit document import/export.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Corrupt document: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the background image comes from.
///
/// Equality is structural so a re-fetch only happens when the source
/// actually changes, not when the document is merely replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BackgroundFile", into = "BackgroundFile")]
pub enum BackgroundRef {
    /// No background.
    #[default]
    Blank,
    /// Encoded image bytes stored inline in the document.
    ImageData(Vec<u8>),
    /// Remote image fetched over the network.
    Url(Url),
}

impl BackgroundRef {
    pub fn is_blank(&self) -> bool {
        matches!(self, BackgroundRef::Blank)
    }

    /// The remote URL, if this is a remote background.
    pub fn url(&self) -> Option<&Url> {
        match self {
            BackgroundRef::Url(url) => Some(url),
            _ => None,
        }
    }

    /// The inline bytes, if this is an inline background.
    pub fn image_data(&self) -> Option<&[u8]> {
        match self {
            BackgroundRef::ImageData(data) => Some(data),
            _ => None,
        }
    }
}

/// On-disk shape of a background: `{"URL": ..}`, `{"imageData": ..}` or empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BackgroundFile {
    #[serde(rename = "URL", default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(rename = "imageData", default, skip_serializing_if = "Option::is_none")]
    image_data: Option<String>,
}

impl From<BackgroundFile> for BackgroundRef {
    // Each key is tried in turn; anything unreadable falls back to blank.
    fn from(file: BackgroundFile) -> Self {
        if let Some(url) = file.url.as_deref().and_then(|s| Url::parse(s).ok()) {
            return BackgroundRef::Url(url);
        }
        if let Some(data) = file.image_data.as_deref().and_then(|s| STANDARD.decode(s).ok()) {
            return BackgroundRef::ImageData(data);
        }
        BackgroundRef::Blank
    }
}

impl From<BackgroundRef> for BackgroundFile {
    fn from(background: BackgroundRef) -> Self {
        match background {
            BackgroundRef::Blank => BackgroundFile::default(),
            BackgroundRef::ImageData(data) => BackgroundFile {
                url: None,
                image_data: Some(STANDARD.encode(data)),
            },
            BackgroundRef::Url(url) => BackgroundFile {
                url: Some(url.into()),
                image_data: None,
            },
        }
    }
}

/// A placed emoji sticker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Element {
    pub(crate) id: ElementId,
    pub(crate) text: String,
    /// Offset from the canvas origin in logical units.
    pub(crate) x: i64,
    pub(crate) y: i64,
    /// Logical font size, always at least 1.
    pub(crate) size: i64,
}

impl Element {
    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn x(&self) -> i64 {
        self.x
    }

    pub fn y(&self) -> i64 {
        self.y
    }

    pub fn position(&self) -> (i64, i64) {
        (self.x, self.y)
    }

    pub fn size(&self) -> i64 {
        self.size
    }
}

/// An EmojiArt document.
///
/// Elements are kept in insertion order, which is also their z-order
/// (later elements draw on top).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DocumentFile", into = "DocumentFile")]
pub struct Document {
    background: BackgroundRef,
    elements: Vec<Element>,
    next_element_id: ElementId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a blank document.
    pub fn new() -> Self {
        Self {
            background: BackgroundRef::Blank,
            elements: Vec::new(),
            next_element_id: 1,
        }
    }

    pub fn background(&self) -> &BackgroundRef {
        &self.background
    }

    /// Elements back to front.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// The id the next added element will receive.
    pub fn next_element_id(&self) -> ElementId {
        self.next_element_id
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Append a new element on top and return its id.
    pub fn add_element(&mut self, text: impl Into<String>, x: i64, y: i64, size: i64) -> ElementId {
        let id = self.next_element_id;
        self.next_element_id += 1;
        self.elements.push(Element {
            id,
            text: text.into(),
            x,
            y,
            size: size.max(1),
        });
        id
    }

    /// Offset an element by integer deltas.
    /// Returns false (and does nothing) if the element no longer exists.
    pub fn move_element(&mut self, id: ElementId, dx: i64, dy: i64) -> bool {
        match self.element_mut(id) {
            Some(element) => {
                element.x += dx;
                element.y += dy;
                true
            }
            None => false,
        }
    }

    /// Multiply an element's size, rounding half away from zero and
    /// clamping to at least 1.
    /// Returns false if the element is missing or the factor is not a
    /// positive finite number.
    pub fn scale_element(&mut self, id: ElementId, factor: f64) -> bool {
        if !factor.is_finite() || factor <= 0.0 {
            return false;
        }
        match self.element_mut(id) {
            Some(element) => {
                let scaled = (element.size as f64 * factor).round();
                element.size = (scaled as i64).max(1);
                true
            }
            None => false,
        }
    }

    /// Replace the background, even with an equal value.
    pub fn set_background(&mut self, background: BackgroundRef) {
        self.background = background;
    }

    /// Delete an element. Its id is never handed out again.
    pub fn remove_element(&mut self, id: ElementId) -> Option<Element> {
        let index = self.elements.iter().position(|e| e.id == id)?;
        Some(self.elements.remove(index))
    }

    fn element_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    /// Serialize the document to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize a document from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to bytes for storage backends.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        self.to_json().map(String::into_bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// On-disk shape of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocumentFile {
    #[serde(default, skip_serializing_if = "BackgroundRef::is_blank")]
    background: BackgroundRef,
    #[serde(default)]
    emojis: Vec<Element>,
    #[serde(rename = "nextId", default)]
    next_id: ElementId,
}

impl TryFrom<DocumentFile> for Document {
    type Error = String;

    fn try_from(file: DocumentFile) -> Result<Self, Self::Error> {
        let mut seen = HashSet::with_capacity(file.emojis.len());
        for element in &file.emojis {
            if !seen.insert(element.id) {
                return Err(format!("duplicate element id {}", element.id));
            }
        }
        let mut elements = file.emojis;
        for element in &mut elements {
            element.size = element.size.max(1);
        }
        if let Some(element) = elements.iter().find(|e| e.id >= MAX_ELEMENT_ID) {
            return Err(format!("element id {} out of range", element.id));
        }
        if file.next_id > MAX_ELEMENT_ID {
            return Err(format!("nextId {} out of range", file.next_id));
        }
        // Older files may lack the counter; never hand out an id already in use.
        let floor = elements.iter().map(|e| e.id + 1).max().unwrap_or(1);
        let next_element_id = file.next_id.max(floor);
        Ok(Document {
            background: file.background,
            elements,
            next_element_id,
        })
    }
}

impl From<Document> for DocumentFile {
    fn from(document: Document) -> Self {
        DocumentFile {
            background: document.background,
            emojis: document.elements,
            next_id: document.next_element_id,
        }
    }
}

/// Write a document to `path`, surfacing any failure to the caller.
pub fn export_document(document: &Document, path: &Path) -> Result<(), DocumentError> {
    let json = document.to_json()?;
    std::fs::write(path, json)?;
    log::info!("Exported document to {}", path.display());
    Ok(())
}

/// Read a document from `path`, distinguishing corrupt files from IO errors.
pub fn import_document(path: &Path) -> Result<Document, DocumentError> {
    let bytes = std::fs::read(path)?;
    let document = Document::from_bytes(&bytes)?;
    log::info!(
        "Imported document from {} ({} elements)",
        path.display(),
        document.len()
    );
    Ok(document)
}
