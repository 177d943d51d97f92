/*
 * rfc2047.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of smtptrack, a tracking SMTP relay.
 *
 * smtptrack is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * smtptrack is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with smtptrack.  If not, see <http://www.gnu.org/licenses/>.
 */

//! RFC 2047 (formerly RFC 1342) encoded-word decoding (e.g. =?charset?q?text?=).
//! The lenient form leaves anything it cannot decode as literal text; the strict form
//! fails on the first malformed word.

use crate::error::DecodeError;
use crate::mime::{base64, charset, quoted_printable};

/// Expand encoded-words in a header value. Malformed words are kept verbatim.
pub fn decode_encoded_words(s: &str) -> String {
    decode(s, false).unwrap_or_else(|_| s.to_string())
}

/// Strictly decode encoded-words in a header value.
pub fn decode_rfc1342(s: &str) -> Result<String, DecodeError> {
    decode(s, true)
}

fn decode(s: &str, strict: bool) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(s.len());
    let mut pos = 0;
    let mut last_was_word = false;

    while pos < s.len() {
        let Some(rel) = s[pos..].find("=?") else {
            out.push_str(&s[pos..]);
            break;
        };
        let start = pos + rel;
        let literal = &s[pos..start];
        match parse_word(&s[start..]) {
            Ok((decoded, consumed)) => {
                // Whitespace between two adjacent encoded-words is dropped.
                if !(last_was_word && literal.chars().all(char::is_whitespace)) {
                    out.push_str(literal);
                }
                out.push_str(&decoded);
                last_was_word = true;
                pos = start + consumed;
            }
            Err(e) if strict => return Err(e),
            Err(_) => {
                out.push_str(literal);
                out.push_str("=?");
                last_was_word = false;
                pos = start + 2;
            }
        }
    }
    Ok(out)
}

/// Parse one encoded-word at the start of `s`. Returns (decoded, bytes consumed).
fn parse_word(s: &str) -> Result<(String, usize), DecodeError> {
    let body = s.strip_prefix("=?").ok_or(DecodeError::Malformed)?;
    let q1 = body.find('?').ok_or(DecodeError::Malformed)?;
    let charset_label = &body[..q1];
    if charset_label.is_empty() || charset_label.contains(char::is_whitespace) {
        return Err(DecodeError::Malformed);
    }
    let rest = &body[q1 + 1..];
    let mut chars = rest.chars();
    let encoding = chars.next().ok_or(DecodeError::Malformed)?;
    if !encoding.is_ascii() || chars.next() != Some('?') {
        return Err(DecodeError::Malformed);
    }
    let text_and_tail = &rest[2..];
    let end = text_and_tail.find("?=").ok_or(DecodeError::Malformed)?;
    let payload = &text_and_tail[..end];
    if payload.contains(|c: char| c.is_whitespace()) {
        return Err(DecodeError::Malformed);
    }
    let bytes = match encoding.to_ascii_lowercase() {
        'b' => decode_b(payload.as_bytes())?,
        'q' => decode_q(payload.as_bytes()),
        other => return Err(DecodeError::UnknownEncoding(other)),
    };
    let decoded = charset::decode_label(&bytes, charset_label)
        .ok_or_else(|| DecodeError::UnknownCharset(charset_label.to_string()))?;
    let consumed = 2 + q1 + 1 + 2 + end + 2;
    Ok((decoded, consumed))
}

fn decode_b(payload: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let valid = payload
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'=');
    if !valid {
        return Err(DecodeError::Malformed);
    }
    let mut out = Vec::with_capacity(payload.len() * 3 / 4);
    base64::decode_into(payload, &mut out, true);
    Ok(out)
}

/// Q encoding: `_` is space, the rest is quoted-printable.
fn decode_q(payload: &[u8]) -> Vec<u8> {
    let preprocessed: Vec<u8> = payload
        .iter()
        .map(|&b| if b == b'_' { b' ' } else { b })
        .collect();
    let mut out = Vec::with_capacity(preprocessed.len());
    quoted_printable::decode_into(&preprocessed, &mut out, true);
    out
}
