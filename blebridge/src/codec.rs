//! UTF-8 conversions for characteristic and descriptor values.

/// Decodes `bytes` as UTF-8. Malformed sequences become U+FFFD; the whole input is consumed.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Encodes `text` as UTF-8. The result has the UTF-8 byte length of `text`, not its character
/// count.
pub fn text_to_bytes(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}
