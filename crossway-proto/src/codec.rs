//! Percent-encoded key/value codec.
//!
//! A wire string is `key=value` pairs joined with `&`, every key and value
//! percent-encoded. Decoding is the exact inverse of encoding regardless of
//! key order, and never fails loudly: the inbound channel is shared with
//! arbitrary senders, so malformed input yields an empty map.

use std::collections::HashMap;

/// Upper-case hex digits used by the encoder.
const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Bytes that pass through the encoder unescaped: ASCII alphanumerics plus
/// `- _ . ! ~ * ' ( )`.
const fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')'
        )
}

/// Percent-encodes one key or value.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for &b in raw.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[usize::from(b >> 4)] as char);
            out.push(HEX[usize::from(b & 0x0f)] as char);
        }
    }
    out
}

/// Reverses [`escape`].
///
/// A `%` not followed by two hex digits decodes as a literal `%`; the
/// encoder never produces one, so the round-trip law is unaffected.
/// Returns `None` when the decoded bytes are not valid UTF-8.
pub fn unescape(raw: &str) -> Option<String> {
    const fn hex_val(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).ok()
}

/// Joins percent-encoded `key=value` pairs with `&`.
pub fn encode<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Parses a wire string back into a field map.
///
/// The exact inverse of [`encode`] for any key order. Malformed input — a
/// non-empty pair without `=`, or bytes that do not decode to UTF-8 —
/// yields an empty map rather than an error. Duplicate keys keep the last
/// occurrence.
pub fn decode(wire: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for part in wire.split('&') {
        if part.is_empty() {
            continue;
        }
        let Some((k, v)) = part.split_once('=') else {
            return HashMap::new();
        };
        let (Some(key), Some(value)) = (unescape(k), unescape(v)) else {
            return HashMap::new();
        };
        fields.insert(key, value);
    }
    fields
}
