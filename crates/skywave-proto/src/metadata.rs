//! Stream metadata extraction.
//!
//! Radio streams report "now playing" information in three shapes: timed
//! metadata items pushed by the player, ICY response headers, and raw
//! in-band `StreamTitle='...'` blocks.  Every entry point here is pure and
//! returns a [`StreamMetadata`]; inputs that carry nothing useful produce an
//! empty value rather than an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::protocol::StreamMetadata;

/// Separators tried, in order, when splitting "Artist - Title".
const SEPARATORS: [&str; 5] = [" - ", " – ", " — ", " | ", " / "];

const ICY_TITLE_PREFIX: &str = "StreamTitle='";

/// One timed-metadata item as reported by the audio transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub key: Option<String>,
    pub value: Option<String>,
}

impl MetadataItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value: Some(value.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Title,
    Artist,
}

fn semantic_key(key: &str) -> Option<Field> {
    const TITLE_KEYS: [&str; 3] = ["title", "icy-title", "streamtitle"];
    const ARTIST_KEYS: [&str; 3] = ["artist", "icy-artist", "streamartist"];

    if TITLE_KEYS.iter().any(|k| key.eq_ignore_ascii_case(k)) {
        Some(Field::Title)
    } else if ARTIST_KEYS.iter().any(|k| key.eq_ignore_ascii_case(k)) {
        Some(Field::Artist)
    } else {
        None
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Extract title/artist from a batch of timed-metadata items.
///
/// Items with a recognised key fill that field directly; anything else is
/// run through [`split_artist_title`].  A field keeps the first non-empty
/// value it receives.
pub fn parse_items(items: &[MetadataItem]) -> StreamMetadata {
    let mut meta = StreamMetadata::default();

    for item in items {
        let Some(value) = item
            .value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            continue;
        };

        match item.key.as_deref().and_then(semantic_key) {
            Some(Field::Title) => fill(&mut meta.title, Some(value.to_string())),
            Some(Field::Artist) => fill(&mut meta.artist, Some(value.to_string())),
            None => {
                let parsed = split_artist_title(value);
                fill(&mut meta.title, parsed.title);
                fill(&mut meta.artist, parsed.artist);
            }
        }
    }

    meta
}

/// Extract title/artist from ICY response headers.
///
/// `icy-name` becomes the title.  `icy-description` is split and only fills
/// fields that are still empty.  Header names compare case-insensitively.
pub fn parse_headers(headers: &HashMap<String, String>) -> StreamMetadata {
    let lookup = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    };

    let mut meta = StreamMetadata {
        title: lookup("icy-name").map(str::to_string),
        artist: None,
    };

    if let Some(description) = lookup("icy-description") {
        let parsed = split_artist_title(description);
        fill(&mut meta.title, parsed.title);
        fill(&mut meta.artist, parsed.artist);
    }

    meta
}

/// Extract title/artist from a raw ICY block such as
/// `StreamTitle='Artist - Title';StreamUrl='';`.
pub fn parse_icy(raw: &str) -> StreamMetadata {
    match icy_stream_title(raw) {
        Some(payload) => split_artist_title(payload),
        None => StreamMetadata::default(),
    }
}

/// First non-empty single-quoted `StreamTitle` payload.
fn icy_stream_title(raw: &str) -> Option<&str> {
    let mut rest = raw;
    while let Some(start) = rest.find(ICY_TITLE_PREFIX) {
        let after = &rest[start + ICY_TITLE_PREFIX.len()..];
        let end = after.find('\'')?;
        if end > 0 {
            return Some(&after[..end]);
        }
        rest = &after[end..];
    }
    None
}

/// Split "Artist - Title" into its parts.
///
/// The first separator whose first two segments are both non-empty wins.
/// Without a usable separator the whole trimmed string is the title.
pub fn split_artist_title(raw: &str) -> StreamMetadata {
    let trimmed = raw.trim();

    for sep in SEPARATORS {
        if !trimmed.contains(sep) {
            continue;
        }
        let mut parts = trimmed.split(sep);
        let artist = parts.next().unwrap_or_default().trim();
        let title = parts.next().unwrap_or_default().trim();
        if !artist.is_empty() && !title.is_empty() {
            return StreamMetadata {
                title: Some(title.to_string()),
                artist: Some(artist.to_string()),
            };
        }
    }

    StreamMetadata {
        title: (!trimmed.is_empty()).then(|| trimmed.to_string()),
        artist: None,
    }
}
