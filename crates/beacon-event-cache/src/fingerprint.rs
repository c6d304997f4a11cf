//! Deduplication keys for cached events.

use crate::event::truncate_chars;
use crate::Event;
use std::fmt;
use tracing::warn;

/// Separator between name and payload inside a fingerprint.
///
/// ASCII unit separator: a JSON document can only carry it escaped, so it never
/// appears raw in a well-formed payload.
pub const FINGERPRINT_SEPARATOR: char = '\u{1f}';

/// Longest stored fingerprint, in characters.
pub const MAX_FINGERPRINT_CHARS: usize = 4096;

/// The cache key of an event: `name`, [`FINGERPRINT_SEPARATOR`], `payload`.
///
/// Equal events always produce equal fingerprints, and a fingerprint parses back
/// into the event it came from as long as neither field contained the separator
/// and the combined length fit in [`MAX_FINGERPRINT_CHARS`]. Separators found in
/// either field are stripped, and over-long fingerprints lose the tail of the
/// payload; both are logged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of an event.
    pub fn of(event: &Event) -> Self {
        let name = strip_separator(event.name(), "name", event.name());
        let payload = strip_separator(event.payload(), "payload", event.name());

        let mut key = String::with_capacity(name.len() + payload.len() + 1);
        key.push_str(&name);
        key.push(FINGERPRINT_SEPARATOR);
        key.push_str(&payload);

        if let Some(original) = truncate_chars(&mut key, MAX_FINGERPRINT_CHARS) {
            warn!(
                event_name = %event.name(),
                original_chars = original,
                max_chars = MAX_FINGERPRINT_CHARS,
                "Fingerprint truncated; cached payload will be shortened"
            );
        }

        Self(key)
    }

    /// Wrap a stored fingerprint string without validating it.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Reconstruct the event this fingerprint was computed from.
    ///
    /// Returns `None` if the separator is missing.
    pub fn to_event(&self) -> Option<Event> {
        let (name, payload) = self.0.split_once(FINGERPRINT_SEPARATOR)?;
        Some(Event::new(name, payload))
    }

    /// Borrow the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the key.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.replace(FINGERPRINT_SEPARATOR, "|"))
    }
}

fn strip_separator(value: &str, field: &'static str, event_name: &str) -> String {
    if !value.contains(FINGERPRINT_SEPARATOR) {
        return value.to_string();
    }
    warn!(
        event_name = %event_name.replace(FINGERPRINT_SEPARATOR, ""),
        field,
        "Fingerprint separator stripped from event field"
    );
    value.replace(FINGERPRINT_SEPARATOR, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MAX_NAME_CHARS, MAX_PAYLOAD_CHARS};

    #[test]
    fn round_trip_recovers_event() {
        let event = Event::new("purchases", r#"{"item":"sword","price":12.5}"#);
        let fingerprint = Fingerprint::of(&event);

        assert_eq!(fingerprint.to_event(), Some(event));
    }

    #[test]
    fn equal_events_share_a_fingerprint() {
        let a = Fingerprint::of(&Event::new("clicks", "{}"));
        let b = Fingerprint::of(&Event::new("clicks", "{}"));
        let c = Fingerprint::of(&Event::new("clicks", "{ }"));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn name_payload_boundary_is_unambiguous() {
        let a = Fingerprint::of(&Event::new("ab", "c"));
        let b = Fingerprint::of(&Event::new("a", "bc"));
        assert_ne!(a, b);
    }

    #[test]
    fn separator_is_stripped_from_payload() {
        let payload = format!("{{\"a\":\"x{FINGERPRINT_SEPARATOR}y\"}}");
        let fingerprint = Fingerprint::of(&Event::new("clicks", payload));

        let event = fingerprint.to_event().unwrap();
        assert_eq!(event.name(), "clicks");
        assert_eq!(event.payload(), r#"{"a":"xy"}"#);
    }

    #[test]
    fn separator_is_stripped_from_name() {
        let name = format!("cl{FINGERPRINT_SEPARATOR}icks");
        let fingerprint = Fingerprint::of(&Event::new(name, "{}"));

        let event = fingerprint.to_event().unwrap();
        assert_eq!(event.name(), "clicks");
        assert_eq!(event.payload(), "{}");
    }

    #[test]
    fn oversized_combination_is_truncated() {
        let event = Event::new("n".repeat(MAX_NAME_CHARS), "p".repeat(MAX_PAYLOAD_CHARS));
        let fingerprint = Fingerprint::of(&event);

        assert_eq!(fingerprint.as_str().chars().count(), MAX_FINGERPRINT_CHARS);

        // The name survives; the payload loses its tail.
        let rebuilt = fingerprint.to_event().unwrap();
        assert_eq!(rebuilt.name(), event.name());
        assert_eq!(
            rebuilt.payload().chars().count(),
            MAX_FINGERPRINT_CHARS - MAX_NAME_CHARS - 1
        );
    }

    #[test]
    fn stored_value_without_separator_does_not_parse() {
        assert!(Fingerprint::from_stored("garbage").to_event().is_none());
    }

    #[test]
    fn display_replaces_separator() {
        let fingerprint = Fingerprint::of(&Event::new("clicks", "{}"));
        assert_eq!(fingerprint.to_string(), "clicks|{}");
    }
}
