//! Session log lines.
//!
//! The server writes one message per line. Logs recorded by earlier builds
//! of the server can still hold several objects glued together as `...}{...`
//! on one physical line, so readers always pass each line through
//! [`resplit_line`] before decoding.

use crate::framing::FramingError;
use crate::TelemetryEvent;

const GLUE: &str = "}{";

/// Turns one message into a log record: the message text plus a newline.
pub fn to_log_record(message: &str) -> String {
    let mut record = String::with_capacity(message.len() + 1);
    record.push_str(message);
    record.push('\n');
    record
}

/// Splits a physical log line into standalone JSON object strings.
///
/// Every fragment but the last gets its `}` back and every fragment but the
/// first gets its `{` back. A line without `}{` comes back unchanged.
pub fn resplit_line(line: &str) -> Vec<String> {
    let pieces: Vec<&str> = line.split(GLUE).collect();
    let last = pieces.len() - 1;

    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            let mut fragment = String::with_capacity(piece.len() + 2);
            if i > 0 {
                fragment.push('{');
            }
            fragment.push_str(piece);
            if i < last {
                fragment.push('}');
            }
            fragment
        })
        .collect()
}

/// Inverse of [`resplit_line`].
pub fn rejoin_fragments<S: AsRef<str>>(fragments: &[S]) -> String {
    let last = fragments.len().saturating_sub(1);
    let mut line = String::new();

    for (i, fragment) in fragments.iter().enumerate() {
        let mut text = fragment.as_ref();
        if i > 0 {
            text = text.strip_prefix('{').unwrap_or(text);
            line.push_str(GLUE);
        }
        if i < last {
            text = text.strip_suffix('}').unwrap_or(text);
        }
        line.push_str(text);
    }

    line
}

/// Decodes every event on a physical line, one result per fragment.
pub fn decode_line(line: &str) -> Vec<Result<TelemetryEvent, FramingError>> {
    resplit_line(line)
        .iter()
        .map(|fragment| TelemetryEvent::parse(fragment).map_err(FramingError::from))
        .collect()
}
