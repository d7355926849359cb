//! Data-URL codec
//!
//! The browser submits reference images as `data:<mime>;base64,<payload>`
//! strings and expects generated posters back in the same shape. The payload
//! stays base64-encoded end to end; the Gemini API consumes it verbatim as
//! inline data.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Fallback MIME type for inputs that don't match the data-URL pattern
const FALLBACK_MIME_TYPE: &str = "image/jpeg";

/// An image payload split out of a data URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64-encoded payload, exactly as it appeared in the data URL
    pub data: String,
}

/// Split a data URL into its MIME type and base64 payload.
///
/// Malformed input never fails: anything that doesn't match
/// `data:<mime>;base64,<payload>` degrades to `image/jpeg` with the
/// substring after the first comma as payload.
pub fn decode_data_url(input: &str) -> InlineImage {
    if let Some(rest) = input.strip_prefix("data:") {
        if let Some((mime_type, data)) = rest.split_once(";base64,") {
            if !mime_type.is_empty() {
                return InlineImage {
                    mime_type: mime_type.to_string(),
                    data: data.to_string(),
                };
            }
        }
    }

    let data = input.split_once(',').map(|(_, rest)| rest).unwrap_or(input);
    InlineImage {
        mime_type: FALLBACK_MIME_TYPE.to_string(),
        data: data.to_string(),
    }
}

/// Join a MIME type and base64 payload back into a data URL.
///
/// Pure string assembly; the payload is not validated.
pub fn encode_data_url(mime_type: &str, data: &str) -> String {
    format!("data:{};base64,{}", mime_type, data)
}

/// Build a data URL from raw bytes, as a browser's file reader would
pub fn to_data_url(bytes: &[u8], mime_type: &str) -> String {
    encode_data_url(mime_type, &BASE64.encode(bytes))
}
