//! Sentinel framing for the telemetry byte stream.
//!
//! Messages carry no length prefix. A message is complete once the
//! [`SENTINEL`](crate::SENTINEL) has been seen; everything after the last
//! sentinel is carried to the next read. Framing works on raw bytes so a
//! read boundary may fall anywhere, including inside the sentinel or inside a
//! multi-byte UTF-8 sequence.

use crate::SENTINEL;
use thiserror::Error;

/// A unit of input that could not be turned into a message or an event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// A complete message was not valid UTF-8.
    #[error("message of {len} bytes is not valid UTF-8: {reason}")]
    InvalidText { len: usize, reason: String },

    /// A supposedly complete message or log fragment is not a JSON event.
    #[error("fragment is not a telemetry event: {reason}")]
    InvalidJson { reason: String },

    /// More than `limit` bytes arrived without a sentinel. The partial
    /// message is dropped up to the next sentinel.
    #[error("over {limit} bytes buffered without a message end, discarding")]
    Oversized { limit: usize },
}

impl From<serde_json::Error> for FramingError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidJson {
            reason: value.to_string(),
        }
    }
}

/// Streaming splitter with an internal carry buffer.
#[derive(Debug, Default)]
pub struct Framer {
    pending: Vec<u8>,
    // Bytes of `pending` already known not to start a sentinel.
    scanned: usize,
    // Largest unterminated tail kept between reads.
    limit: Option<usize>,
    // Set after an overflow until the next sentinel.
    discarding: bool,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A framer that gives up on a message once `limit` bytes are buffered
    /// without a sentinel.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Feeds one read and returns every message it completed, in order.
    ///
    /// Each returned message includes its sentinel. Messages that are not
    /// valid UTF-8 come back as errors; the caller decides whether to drop
    /// them. The unterminated remainder stays buffered.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<String, FramingError>> {
        self.pending.extend_from_slice(bytes);

        let sentinel = SENTINEL.as_bytes();
        let keep = sentinel.len() - 1;
        let mut messages = Vec::new();
        let mut start = 0;

        while let Some(offset) = find(&self.pending[self.scanned..], sentinel) {
            let end = self.scanned + offset + sentinel.len();
            if self.discarding {
                // Tail of an oversized message, already reported.
                self.discarding = false;
            } else {
                messages.push(decode(&self.pending[start..end]));
            }
            start = end;
            self.scanned = end;
        }

        self.pending.drain(..start);

        if let Some(limit) = self.limit {
            if self.pending.len() > limit {
                if !self.discarding {
                    messages.push(Err(FramingError::Oversized { limit }));
                    self.discarding = true;
                }
                // Keep just enough to recognise a sentinel cut by the read.
                let excess = self.pending.len().saturating_sub(keep);
                self.pending.drain(..excess);
            }
        }

        // The tail may hold the first bytes of a sentinel split by the read.
        self.scanned = self.pending.len().saturating_sub(keep);

        messages
    }

    /// Bytes received after the last complete message.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Empties the carry buffer and returns what it held.
    pub fn take_pending(&mut self) -> Vec<u8> {
        self.scanned = 0;
        self.discarding = false;
        std::mem::take(&mut self.pending)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Checks that a complete unit of input is UTF-8 text.
pub fn decode_text(bytes: &[u8]) -> Result<&str, FramingError> {
    std::str::from_utf8(bytes).map_err(|e| FramingError::InvalidText {
        len: bytes.len(),
        reason: e.to_string(),
    })
}

fn decode(bytes: &[u8]) -> Result<String, FramingError> {
    decode_text(bytes).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn message(kind: &str) -> String {
        format!(r#"{{"type":"{}",{}"#, kind, SENTINEL)
    }

    fn ok_messages(results: Vec<Result<String, FramingError>>) -> Vec<String> {
        results.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_single_read_single_message() {
        let mut framer = Framer::new();
        let msg = message("CAMERA");

        let out = ok_messages(framer.feed(msg.as_bytes()));

        assert_eq!(out, vec![msg]);
        assert!(!framer.has_pending());
    }

    #[test]
    fn test_single_read_multiple_messages_and_partial() {
        let mut framer = Framer::new();
        let a = message("GOAL");
        let b = message("CHECKPOINT");
        let partial = r#"{"type":"EN"#;
        let stream = format!("{}{}{}", a, b, partial);

        let out = ok_messages(framer.feed(stream.as_bytes()));

        assert_eq!(out, vec![a, b]);
        assert_eq!(framer.pending(), partial.as_bytes());
    }

    #[test]
    fn test_message_spans_reads() {
        let mut framer = Framer::new();
        let msg = message("LINE");
        let (first, second) = msg.split_at(5);

        assert!(framer.feed(first.as_bytes()).is_empty());
        assert!(framer.has_pending());

        let out = ok_messages(framer.feed(second.as_bytes()));
        assert_eq!(out, vec![msg]);
        assert!(!framer.has_pending());
    }

    #[test]
    fn test_boundary_inside_sentinel() {
        let mut framer = Framer::new();
        let a = message("A");
        let b = message("B");
        let stream = format!("{}{}", a, b);
        // Cut in the middle of the first sentinel.
        let cut = a.len() - SENTINEL.len() / 2;

        let mut out = ok_messages(framer.feed(stream[..cut].as_bytes()));
        assert!(out.is_empty());
        out.extend(ok_messages(framer.feed(stream[cut..].as_bytes())));

        assert_eq!(out, vec![a, b]);
    }

    #[test]
    fn test_empty_read_yields_nothing() {
        let mut framer = Framer::new();
        assert!(framer.feed(b"").is_empty());
        assert!(!framer.has_pending());
    }

    #[test]
    fn test_invalid_utf8_message_is_isolated() {
        let mut framer = Framer::new();
        let mut stream = b"{\"type\":\"\xff\xfe\",".to_vec();
        stream.extend_from_slice(SENTINEL.as_bytes());
        let good = message("CAMERA");
        stream.extend_from_slice(good.as_bytes());

        let out = framer.feed(&stream);

        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(FramingError::InvalidText { .. })));
        assert_eq!(out[1].as_ref().unwrap(), &good);
    }

    #[test]
    fn test_multibyte_character_split_across_reads() {
        let mut framer = Framer::new();
        let msg = format!(r#"{{"type":"REGISTRATION","user_name":"joão",{}"#, SENTINEL);
        let bytes = msg.as_bytes();
        let accent = msg.find('ã').unwrap();

        assert!(framer.feed(&bytes[..accent + 1]).is_empty());
        let out = ok_messages(framer.feed(&bytes[accent + 1..]));

        assert_eq!(out, vec![msg]);
    }

    #[test]
    fn test_take_pending_resets() {
        let mut framer = Framer::new();
        framer.feed(b"{\"type\":\"CAM");
        assert_eq!(framer.take_pending(), b"{\"type\":\"CAM".to_vec());
        assert!(!framer.has_pending());

        let msg = message("CAMERA");
        assert_eq!(ok_messages(framer.feed(msg.as_bytes())), vec![msg]);
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text(b"{}"), Ok("{}"));
        assert!(matches!(
            decode_text(b"{\xff}"),
            Err(FramingError::InvalidText { len: 3, .. })
        ));
    }

    #[test]
    fn test_oversized_message_is_dropped_until_next_sentinel() {
        let mut framer = Framer::with_limit(64);
        let first = message("STATIC");

        let out = ok_messages(framer.feed(first.as_bytes()));
        assert_eq!(out, vec![first]);

        // A runaway message: never ends within the limit.
        let junk = "x".repeat(100);
        let out = framer.feed(format!("{{\"type\":\"CAMERA\",{}", junk).as_bytes());
        assert_eq!(out, vec![Err(FramingError::Oversized { limit: 64 })]);
        assert!(framer.pending().len() < SENTINEL.len());

        // More of it is discarded silently, including its eventual end.
        assert!(framer.feed(junk.as_bytes()).is_empty());
        let cut = SENTINEL.len() / 2;
        assert!(framer.feed(&SENTINEL.as_bytes()[..cut]).is_empty());
        assert!(framer.feed(&SENTINEL.as_bytes()[cut..]).is_empty());

        let next = message("END");
        assert_eq!(ok_messages(framer.feed(next.as_bytes())), vec![next]);
        assert!(!framer.has_pending());
    }

    #[test]
    fn test_limit_does_not_affect_messages_under_it() {
        let mut framer = Framer::with_limit(SENTINEL.len() + 32);
        let msg = message("GOAL");
        let mut out = Vec::new();
        for chunk in msg.as_bytes().chunks(3) {
            out.extend(ok_messages(framer.feed(chunk)));
        }
        assert_eq!(out, vec![msg]);
    }

    #[test]
    fn test_arbitrary_read_boundaries() {
        let stream: String = ["REGISTRATION", "STATIC", "CAMERA", "GOAL", "CHECKPOINT", "END"]
            .iter()
            .map(|k| message(k))
            .collect();
        let expected = ok_messages(Framer::new().feed(stream.as_bytes()));
        assert_eq!(expected.len(), 6);

        let mut rng = StdRng::seed_from_u64(7);
        let bytes = stream.as_bytes();
        for _ in 0..200 {
            let mut framer = Framer::new();
            let mut out = Vec::new();
            let mut pos = 0;
            while pos < bytes.len() {
                let step = rng.gen_range(1..=40).min(bytes.len() - pos);
                out.extend(ok_messages(framer.feed(&bytes[pos..pos + step])));
                pos += step;
            }
            assert_eq!(out, expected);
            assert!(!framer.has_pending());
        }
    }
}
