//! Analytics events.

use serde::Serialize;
use tracing::warn;

/// Longest accepted collection name, in characters.
pub const MAX_NAME_CHARS: usize = 1028;

/// Longest accepted payload, in characters.
pub const MAX_PAYLOAD_CHARS: usize = 4096;

/// A single analytics event: the collection it belongs to and its JSON payload.
///
/// Oversized fields are truncated (with a warning) when the event is built, so
/// every `Event` in circulation already satisfies the wire limits. Two events
/// with the same name and payload are the same logical event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Event {
    name: String,
    #[serde(rename = "data")]
    payload: String,
}

impl Event {
    /// Build an event, truncating the name to [`MAX_NAME_CHARS`] and the payload
    /// to [`MAX_PAYLOAD_CHARS`].
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        let mut name = name.into();
        let mut payload = payload.into();

        if let Some(original) = truncate_chars(&mut name, MAX_NAME_CHARS) {
            warn!(
                original_chars = original,
                max_chars = MAX_NAME_CHARS,
                "Event name truncated"
            );
        }
        if let Some(original) = truncate_chars(&mut payload, MAX_PAYLOAD_CHARS) {
            warn!(
                event_name = %name,
                original_chars = original,
                max_chars = MAX_PAYLOAD_CHARS,
                "Event payload truncated"
            );
        }

        Self { name, payload }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// JSON payload.
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Truncate `value` to at most `max_chars` characters.
///
/// Returns the original character count when truncation happened.
pub(crate) fn truncate_chars(value: &mut String, max_chars: usize) -> Option<usize> {
    let (cut, _) = value.char_indices().nth(max_chars)?;
    let original = value.chars().count();
    value.truncate(cut);
    Some(original)
}
