//! Header value decoding.
//!
//! Supports Base64, Quoted-Printable and RFC 2047 encoded words.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Decodes Base64 data.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data.trim()).map_err(Into::into)
}

/// Decodes Quoted-Printable text (RFC 2045) into raw bytes.
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(text: &str) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        // Soft line break
        match bytes.get(i + 1..i + 3) {
            Some([b'\r', b'\n']) => {
                i += 3;
                continue;
            }
            Some([b'\n', _]) => {
                i += 2;
                continue;
            }
            _ => {}
        }
        if bytes.get(i + 1) == Some(&b'\n') {
            i += 2;
            continue;
        }

        let hex = bytes
            .get(i + 1..i + 3)
            .ok_or_else(|| Error::InvalidEncoding("Incomplete escape sequence".to_string()))?;
        let hex = std::str::from_utf8(hex)
            .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
        let value = u8::from_str_radix(hex, 16)
            .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
        result.push(value);
        i += 3;
    }

    Ok(result)
}

/// Decodes a single RFC 2047 encoded word.
///
/// Format: `=?charset?encoding?encoded-text?=`. Text that is not an encoded
/// word is returned unchanged.
///
/// # Errors
///
/// Returns an error if the word is malformed or its payload cannot be
/// decoded.
pub fn decode_rfc2047(text: &str) -> Result<String> {
    if !text.starts_with("=?") || !text.ends_with("?=") || text.len() < 4 {
        return Ok(text.to_string());
    }

    let inner = &text[2..text.len() - 2];
    let parts: Vec<&str> = inner.split('?').collect();

    if parts.len() != 3 {
        return Err(Error::InvalidEncoding(
            "Invalid RFC 2047 format".to_string(),
        ));
    }

    let charset = parts[0].to_lowercase();
    let encoding = parts[1].to_uppercase();
    let encoded_text = parts[2];

    let bytes = match encoding.as_str() {
        "B" => decode_base64(encoded_text)?,
        // Q encoding uses underscore for space
        "Q" => decode_quoted_printable(&encoded_text.replace('_', " "))?,
        _ => {
            return Err(Error::InvalidEncoding(format!(
                "Unknown encoding: {encoding}"
            )));
        }
    };

    decode_charset(&charset, bytes)
}

fn decode_charset(charset: &str, bytes: Vec<u8>) -> Result<String> {
    match charset {
        "iso-8859-1" | "latin1" | "latin-1" | "windows-1252" => {
            Ok(bytes.into_iter().map(char::from).collect())
        }
        "utf-8" | "utf8" | "us-ascii" => String::from_utf8(bytes).map_err(Into::into),
        _ => Ok(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// Decodes every encoded word inside a header value.
///
/// Whitespace between two adjacent encoded words is dropped, as RFC 2047
/// requires. Words that fail to decode are kept verbatim, so this never
/// fails.
#[must_use]
pub fn decode_header_value(value: &str) -> String {
    if !value.contains("=?") {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut pending_space = String::new();
    let mut last_was_encoded = false;

    for (i, token) in value.split(' ').enumerate() {
        let decoded = if token.starts_with("=?") && token.ends_with("?=") {
            decode_rfc2047(token).ok()
        } else {
            None
        };

        if i > 0 {
            pending_space.push(' ');
        }

        match decoded {
            Some(text) => {
                if !last_was_encoded {
                    out.push_str(&pending_space);
                }
                out.push_str(&text);
                last_was_encoded = true;
            }
            None => {
                out.push_str(&pending_space);
                out.push_str(token);
                last_was_encoded = false;
            }
        }
        pending_space.clear();
    }

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_decode() {
        let decoded = decode_base64("SGVsbG8sIFdvcmxkIQ==").unwrap();
        assert_eq!(decoded, b"Hello, World!");
        assert!(decode_base64("***").is_err());
    }

    #[test]
    fn test_quoted_printable_decode() {
        let decoded = decode_quoted_printable("Hello, World!").unwrap();
        assert_eq!(decoded, b"Hello, World!");

        let decoded = decode_quoted_printable("H=C3=A9llo").unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "Héllo");

        assert!(decode_quoted_printable("bad=Z").is_err());
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        let decoded = decode_quoted_printable("Hello=\r\nWorld").unwrap();
        assert_eq!(decoded, b"HelloWorld");
    }

    #[test]
    fn test_rfc2047_decode() {
        assert_eq!(decode_rfc2047("Hello").unwrap(), "Hello");
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?=").unwrap(), "Héllo");
        assert_eq!(decode_rfc2047("=?UTF-8?Q?H=C3=A9llo_there?=").unwrap(), "Héllo there");
        assert_eq!(decode_rfc2047("=?iso-8859-1?Q?caf=E9?=").unwrap(), "café");
        assert!(decode_rfc2047("=?utf-8?X?abc?=").is_err());
    }

    #[test]
    fn test_decode_header_value_mixed() {
        assert_eq!(decode_header_value("Plain subject"), "Plain subject");
        assert_eq!(
            decode_header_value("Re: =?utf-8?B?SMOpbGxv?= world"),
            "Re: Héllo world"
        );
        // adjacent encoded words are joined without the separating space
        assert_eq!(
            decode_header_value("=?utf-8?Q?ab?= =?utf-8?Q?cd?="),
            "abcd"
        );
    }

    #[test]
    fn test_decode_header_value_keeps_broken_words() {
        assert_eq!(decode_header_value("=?utf-8?B?***?= tail"), "=?utf-8?B?***?= tail");
    }
}
