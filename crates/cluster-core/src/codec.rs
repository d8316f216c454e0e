//! Text wire format codec
//!
//! Frames on both telemetry channels use the same compact layout:
//!
//! ```text
//! speed:13890;battery:87;sign:80;
//! ```
//!
//! Segments are separated by `;`, and each segment carries exactly one
//! `key:value` pair. There is no escaping, so neither separator may appear
//! inside a key or a value. Decoding never fails: segments that do not have
//! the expected shape are dropped and the rest of the frame is kept.

use std::collections::hash_map;
use std::collections::HashMap;
use std::fmt;

use tokio::time::Instant;
use tracing::trace;

/// Separator between `key:value` segments
pub const SEGMENT_SEPARATOR: char = ';';

/// Separator between a key and its value
pub const PAIR_SEPARATOR: char = ':';

/// One text frame as received from a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Frame payload
    pub payload: String,
    /// When the frame was taken off the socket
    pub received_at: Instant,
}

impl RawMessage {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            received_at: Instant::now(),
        }
    }

    /// Decode this frame into its fields
    pub fn decode(&self) -> ParsedFields {
        decode(&self.payload)
    }
}

/// Decode a frame into a field map.
///
/// A segment is retained only when splitting it on `:` yields exactly two
/// parts that are both non-empty after trimming. A key seen twice keeps the
/// value of its last occurrence.
pub fn decode(frame: &str) -> ParsedFields {
    let mut fields = ParsedFields::new();

    for segment in frame.split(SEGMENT_SEPARATOR).filter(|s| !s.is_empty()) {
        let mut parts = segment.split(PAIR_SEPARATOR);
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            trace!(segment, "Dropping malformed segment");
            continue;
        };

        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            trace!(segment, "Dropping segment with empty key or value");
            continue;
        }

        fields.insert(key, value);
    }

    fields
}

/// Encode a field map into a frame.
///
/// Keys are written in sorted order so the output is stable.
pub fn encode(fields: &ParsedFields) -> String {
    let mut keys: Vec<&String> = fields.values.keys().collect();
    keys.sort();

    let mut frame = String::new();
    for key in keys {
        frame.push_str(key);
        frame.push(PAIR_SEPARATOR);
        frame.push_str(&fields.values[key]);
        frame.push(SEGMENT_SEPARATOR);
    }
    frame
}

/// Key/value fields decoded from a single frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFields {
    values: HashMap<String, String>,
}

impl ParsedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing any previous value for the key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Raw value for `key`, if present
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Raw value for `key`, or `default` when absent
    pub fn value_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Integer value for `key`.
    ///
    /// Returns `default` when the key is absent or the value does not parse.
    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Boolean value for `key`: `1` is true, `0` is false, anything else
    /// (including absence) yields `default`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).and_then(|v| v.parse::<i32>().ok()) {
            Some(1) => true,
            Some(0) => false,
            _ => default,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, String> {
        self.values.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParsedFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Self::new();
        for (key, value) in iter {
            fields.insert(key, value);
        }
        fields
    }
}

impl fmt::Display for ParsedFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> ParsedFields {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_decode_basic_frame() {
        let decoded = decode("speed:1000;battery:87;sign:stop;");
        assert_eq!(
            decoded,
            fields(&[("speed", "1000"), ("battery", "87"), ("sign", "stop")])
        );
    }

    #[test]
    fn test_decode_without_trailing_separator() {
        let decoded = decode("lane:1;obs:2");
        assert_eq!(decoded, fields(&[("lane", "1"), ("obs", "2")]));
    }

    #[test]
    fn test_decode_trims_whitespace() {
        let decoded = decode("  speed : 42 ; mode:1 ;");
        assert_eq!(decoded.get("speed"), Some("42"));
        assert_eq!(decoded.get("mode"), Some("1"));
    }

    #[test]
    fn test_duplicate_key_last_wins() {
        let decoded = decode("speed:1;battery:50;speed:3;");
        assert_eq!(decoded.get("speed"), Some("3"));
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn test_malformed_segments_dropped() {
        // no colon, too many colons, empty key, empty value, whitespace-only parts
        let decoded = decode("garbage;a:b:c;:5;odo:;  : ;;speed:10;x::y;battery:9");
        assert_eq!(decoded, fields(&[("speed", "10"), ("battery", "9")]));
    }

    #[test]
    fn test_decode_empty_and_separator_only() {
        assert!(decode("").is_empty());
        assert!(decode(";;;").is_empty());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = fields(&[("speed", "13890"), ("sign", "crosswalk"), ("odo", "12")]);
        let frame = encode(&original);
        assert_eq!(frame, "odo:12;sign:crosswalk;speed:13890;");
        assert_eq!(decode(&frame), original);
    }

    #[test]
    fn test_roundtrip_generated_frames() {
        assert!(decode(&encode(&ParsedFields::new())).is_empty());

        let single = fields(&[("lane", "1")]);
        assert_eq!(decode(&encode(&single)), single);

        let mut feed = crate::synthetic::SyntheticFeed::with_seed(3);
        for _ in 0..100 {
            let generated = feed.next_fields();
            assert_eq!(decode(&encode(&generated)), generated);
        }
    }

    #[test]
    fn test_get_int_falls_back_to_default() {
        let decoded = decode("speed:fast;battery:77;");
        assert_eq!(decoded.get_int("speed", -1), -1);
        assert_eq!(decoded.get_int("missing", 5), 5);
        assert_eq!(decoded.get_int("battery", 0), 77);
    }

    #[test]
    fn test_get_bool_only_accepts_zero_and_one() {
        let decoded = decode("a:1;b:0;c:2;d:yes;");
        assert!(decoded.get_bool("a", false));
        assert!(!decoded.get_bool("b", true));
        assert!(decoded.get_bool("c", true));
        assert!(!decoded.get_bool("c", false));
        assert!(decoded.get_bool("d", true));
        assert!(!decoded.get_bool("missing", false));
    }

    #[test]
    fn test_value_or() {
        let decoded = decode("sign:yield");
        assert_eq!(decoded.value_or("sign", "none"), "yield");
        assert_eq!(decoded.value_or("lane", "none"), "none");
    }

    #[test]
    fn test_raw_message_decode() {
        let msg = RawMessage::new("mode:1;");
        assert_eq!(msg.decode().get_int("mode", 0), 1);
    }
}
