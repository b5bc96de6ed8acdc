//! MIME decoding utilities.
//!
//! Supports Base64, Quoted-Printable, RFC 2047 header words and charset
//! conversion. Decoders here are lenient: malformed escapes are kept
//! verbatim instead of failing the whole value.

use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use encoding_rs::{Encoding, UTF_8};

/// Decodes Base64 data, ignoring embedded whitespace and missing padding.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    match STANDARD.decode(&cleaned) {
        Ok(bytes) => Ok(bytes),
        Err(_) => STANDARD_NO_PAD
            .decode(cleaned.trim_end_matches('='))
            .map_err(Into::into),
    }
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// Soft line breaks are removed. An `=` not followed by two hex digits is
/// copied through unchanged.
#[must_use]
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        // Soft line break, "=\r\n" or "=\n"
        match data.get(i + 1..) {
            Some([b'\r', b'\n', ..]) => {
                i += 3;
                continue;
            }
            Some([b'\n', ..]) => {
                i += 2;
                continue;
            }
            _ => {}
        }

        let hex = data.get(i + 1..i + 3).and_then(|h| {
            std::str::from_utf8(h)
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
        });

        if let Some(decoded) = hex {
            result.push(decoded);
            i += 3;
        } else {
            result.push(b'=');
            i += 1;
        }
    }

    result
}

/// Converts bytes in the named charset to a string.
///
/// Unknown or missing charsets fall back to UTF-8; invalid sequences are
/// replaced with U+FFFD.
#[must_use]
pub fn decode_charset(bytes: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .map(|c| c.trim().trim_matches('"'))
        .and_then(|c| Encoding::for_label(c.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Format: `=?charset?encoding?encoded-text?=`
///
/// Whitespace between two adjacent encoded words is dropped, as RFC 2047
/// requires. Words that cannot be decoded are left as they are.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut last_was_encoded = false;

    while let Some((start, end, decoded)) = next_encoded_word(rest) {
        let between = &rest[..start];
        if !(last_was_encoded && between.chars().all(char::is_whitespace)) {
            out.push_str(between);
        }
        out.push_str(&decoded);
        rest = &rest[end..];
        last_was_encoded = true;
    }

    out.push_str(rest);
    out
}

/// Finds the next decodable encoded word, returning its byte span and text.
fn next_encoded_word(s: &str) -> Option<(usize, usize, String)> {
    let mut offset = 0;
    while let Some(pos) = s[offset..].find("=?") {
        let start = offset + pos;
        if let Some((len, decoded)) = decode_word(&s[start..]) {
            return Some((start, start + len, decoded));
        }
        offset = start + 2;
    }
    None
}

/// Decodes a single encoded word at the start of `s`.
fn decode_word(s: &str) -> Option<(usize, String)> {
    let inner = s.strip_prefix("=?")?;
    let (charset, rest) = inner.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let encoded = &rest[..end];

    if charset.is_empty() || encoded.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => decode_base64(encoded).ok()?,
        "Q" | "q" => decode_quoted_printable(encoded.replace('_', " ").as_bytes()),
        _ => return None,
    };

    let len = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
    // RFC 2231 language suffix, e.g. "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);
    Some((len, decode_charset(&bytes, Some(charset))))
}
