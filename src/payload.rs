//! Payload decoding and display formatting.
//!
//! Everything here is infallible: a payload that cannot be decoded or parsed
//! falls back to a textual representation instead of failing the event.

use serde_json::Value;

/// Chars kept from a payload that is too large to format.
pub const TRUNCATED_PREVIEW_CHARS: usize = 1000;

/// Decode raw bytes as UTF-8 text, or a size placeholder for binary data.
pub fn decode(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(_) => binary_placeholder(data.len()),
    }
}

/// Placeholder shown in place of a non-text payload.
pub fn binary_placeholder(len: usize) -> String {
    format!("[Binary Data: {} bytes]", len)
}

/// Try a structured (JSON) parse of a payload.
pub fn parse_structured(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

/// A payload formatted for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedBody {
    pub text: String,
    /// Original size in chars, set when the body was truncated.
    pub truncated_from: Option<usize>,
    /// True when the body was pretty-printed from structured data.
    pub structured: bool,
}

/// Format a payload for display.
///
/// Objects and arrays are pretty-printed. Anything else, malformed JSON
/// included, is kept verbatim. Payloads over `threshold` chars skip parsing and
/// are cut to a preview with a size annotation.
pub fn render_body(text: &str, threshold: usize) -> RenderedBody {
    let chars = text.chars().count();
    if chars > threshold {
        let preview: String = text.chars().take(TRUNCATED_PREVIEW_CHARS.min(threshold)).collect();
        return RenderedBody {
            text: format!("{}... [truncated, {} chars total]", preview, chars),
            truncated_from: Some(chars),
            structured: false,
        };
    }

    match parse_structured(text) {
        Some(value @ (Value::Object(_) | Value::Array(_))) => {
            match serde_json::to_string_pretty(&value) {
                Ok(pretty) => RenderedBody {
                    text: pretty,
                    truncated_from: None,
                    structured: true,
                },
                Err(_) => raw(text),
            }
        }
        _ => raw(text),
    }
}

fn raw(text: &str) -> RenderedBody {
    RenderedBody {
        text: text.to_string(),
        truncated_from: None,
        structured: false,
    }
}
