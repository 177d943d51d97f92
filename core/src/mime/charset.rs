/*
 * charset.rs
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

//! Charset transcoding for rewritten text parts, backed by encoding_rs labels.

use encoding_rs::{Encoding, UTF_8};
use tracing::warn;

/// Charset assumed when a text part declares none.
pub const DEFAULT_CHARSET: &str = "utf8";

/// Resolve a MIME charset label. Unknown labels fall back to UTF-8.
pub fn lookup(label: &str) -> &'static Encoding {
    match Encoding::for_label(label.trim().as_bytes()) {
        Some(encoding) => encoding,
        None => {
            warn!(charset = label, "unknown charset, treating as utf-8");
            UTF_8
        }
    }
}

/// Decode `bytes` in `encoding` to text. Malformed sequences become U+FFFD. A BOM is
/// kept as U+FEFF and never switches the encoding.
pub fn decode(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// Encode text back into `encoding`. encoding_rs cannot produce UTF-16, so those
/// families come out as UTF-8 (the returned encoding tells which was used).
pub fn encode(text: &str, encoding: &'static Encoding) -> (Vec<u8>, &'static Encoding) {
    let (bytes, used, _) = encoding.encode(text);
    (bytes.into_owned(), used)
}

/// Decode bytes named by a charset label in an encoded word. Returns None when the
/// label is unknown.
pub fn decode_label(bytes: &[u8], label: &str) -> Option<String> {
    // RFC 2231 language suffix: charset*lang
    let label = label.split('*').next().unwrap_or(label);
    let encoding = Encoding::for_label(label.trim().as_bytes())?;
    Some(decode(bytes, encoding))
}
