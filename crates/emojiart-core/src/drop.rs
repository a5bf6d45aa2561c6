//! Classification of dropped or pasted payloads.

use crate::document::BackgroundRef;
use unicode_segmentation::UnicodeSegmentation;
use url::Url;

/// Raw payload delivered by a drop, paste, picker or camera surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropPayload {
    /// A link, typically to an image.
    Url(String),
    /// Encoded image bytes.
    ImageData(Vec<u8>),
    /// Plain text; only a leading emoji is of interest.
    Text(String),
}

/// What a payload asks the document to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropIntent {
    SetBackground(BackgroundRef),
    AddEmoji(String),
}

/// Decide what `payload` means, or `None` if it should be silently ignored.
pub fn classify(payload: DropPayload, is_emoji: impl Fn(char) -> bool) -> Option<DropIntent> {
    match payload {
        DropPayload::Url(link) => {
            let url = Url::parse(link.trim()).ok()?;
            Some(DropIntent::SetBackground(BackgroundRef::Url(image_url(&url))))
        }
        DropPayload::ImageData(bytes) if !bytes.is_empty() => {
            Some(DropIntent::SetBackground(BackgroundRef::ImageData(bytes)))
        }
        DropPayload::ImageData(_) => None,
        DropPayload::Text(text) => {
            let first = text.graphemes(true).next()?;
            is_emoji_grapheme(first, &is_emoji).then(|| DropIntent::AddEmoji(first.to_string()))
        }
    }
}

/// Whether a user-perceived character is an emoji, judged by its first code
/// point. Flags, skin-tone modifiers and presentation selectors ride along.
pub fn is_emoji_grapheme(grapheme: &str, is_emoji: impl Fn(char) -> bool) -> bool {
    grapheme.chars().next().is_some_and(is_emoji)
}

/// Unwrap image-search redirect links to the image they point at.
///
/// Links such as `https://images.example/imgres?imgurl=https%3A%2F%2F...`
/// carry the real image in an `imgurl` query parameter.
pub fn image_url(url: &Url) -> Url {
    url.query_pairs()
        .find(|(key, _)| key == "imgurl")
        .and_then(|(_, value)| Url::parse(&value).ok())
        .unwrap_or_else(|| url.clone())
}

/// Best-effort emoji test over code point ranges.
///
/// Symbols up to U+238C (arrows, digits, punctuation) are rejected even
/// though some of them have emoji presentations.
pub fn default_is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x238D..=0x23FF
            | 0x24C2
            | 0x25AA..=0x25FE
            | 0x2600..=0x27BF
            | 0x2934..=0x2935
            | 0x2B05..=0x2B55
            | 0x3030
            | 0x303D
            | 0x3297
            | 0x3299
            | 0x1F000..=0x1FAFF
    )
}
