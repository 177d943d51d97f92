/*
 * base64.rs
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

//! Base64 Content-Transfer-Encoding (RFC 2045): incremental decoder for node bodies,
//! line-wrapped encoder for rewritten content.

use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Maximum encoded line length (RFC 2045 section 6.8).
const LINE_LENGTH: usize = 76;

fn decode_table() -> &'static [i8; 256] {
    static TABLE: OnceLock<[i8; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = [-1i8; 256];
        t[32] = -2; // space
        t[9] = -2; // tab
        t[13] = -2; // \r
        t[10] = -2; // \n
        for i in 0..26u8 {
            t[(b'A' + i) as usize] = i as i8;
            t[(b'a' + i) as usize] = (26 + i) as i8;
        }
        for i in 0..10u8 {
            t[(b'0' + i) as usize] = (52 + i) as i8;
        }
        t[b'+' as usize] = 62;
        t[b'/' as usize] = 63;
        t
    })
}

const WHITESPACE: i8 = -2;

/// Decode base64 from `src` into `out`. Consumes complete 4-char quanta only unless
/// `end_of_stream`, in which case trailing bits are flushed. Invalid characters are skipped.
/// Returns the number of bytes consumed from `src`.
pub fn decode_into(src: &[u8], out: &mut Vec<u8>, end_of_stream: bool) -> usize {
    let mut pos = 0;
    let mut quantum: u32 = 0;
    let mut quantum_bits: u32 = 0;
    let mut last_valid = 0;
    let mut saw_padding = false;

    while pos < src.len() {
        let b = src[pos];
        pos += 1;
        let val = decode_table()[b as usize];
        if val >= 0 {
            quantum = (quantum << 6) | (val as u32);
            quantum_bits += 6;
            if quantum_bits >= 24 {
                out.push((quantum >> 16) as u8);
                out.push((quantum >> 8) as u8);
                out.push(quantum as u8);
                last_valid = pos;
                quantum = 0;
                quantum_bits = 0;
            }
        } else if b != b'=' {
            if quantum_bits == 0 {
                last_valid = pos;
            }
        } else {
            saw_padding = true;
            break;
        }
    }

    if (saw_padding || end_of_stream) && quantum_bits >= 8 {
        out.push((quantum >> (quantum_bits - 8)) as u8);
        if quantum_bits >= 16 {
            out.push((quantum >> (quantum_bits - 16)) as u8);
        }
        last_valid = pos;
    }
    if saw_padding {
        // Swallow the rest of the padding run.
        while pos < src.len() && (src[pos] == b'=' || decode_table()[src[pos] as usize] == WHITESPACE) {
            pos += 1;
        }
        last_valid = pos;
    }
    if end_of_stream {
        last_valid = src.len();
    }
    last_valid
}

/// Incremental base64 body decoder: feed raw encoded chunks, unconsumed tail is kept.
#[derive(Default)]
pub struct Base64Decoder {
    pending: Vec<u8>,
}

impl Base64Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        self.pending.extend_from_slice(chunk);
        let consumed = decode_into(&self.pending, out, false);
        self.pending.drain(..consumed);
    }

    pub fn finish(&mut self, out: &mut Vec<u8>) {
        let pending = std::mem::take(&mut self.pending);
        decode_into(&pending, out, true);
    }
}

/// Encode `data` as base64 with CRLF after every 76 characters and a final CRLF.
pub fn encode_lines(data: &[u8]) -> Vec<u8> {
    let encoded = STANDARD.encode(data);
    let mut out = Vec::with_capacity(encoded.len() + encoded.len() / LINE_LENGTH * 2 + 2);
    for line in encoded.as_bytes().chunks(LINE_LENGTH) {
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_across_chunk_boundaries() {
        let mut decoder = Base64Decoder::new();
        let mut out = Vec::new();
        decoder.update(b"SGVs", &mut out);
        decoder.update(b"bG8s\r\nIHdv", &mut out);
        decoder.update(b"cmxk", &mut out);
        decoder.finish(&mut out);
        assert_eq!(out, b"Hello, world");
    }

    #[test]
    fn decodes_padding() {
        let mut out = Vec::new();
        decode_into(b"SGVsbG8=", &mut out, false);
        assert_eq!(out, b"Hello");
    }

    #[test]
    fn encode_wraps_long_lines() {
        let data = vec![b'a'; 100];
        let encoded = encode_lines(&data);
        let text = String::from_utf8(encoded).unwrap();
        let lines: Vec<&str> = text.split("\r\n").collect();
        assert_eq!(lines[0].len(), 76);
        assert!(text.ends_with("\r\n"));
        let mut decoded = Vec::new();
        decode_into(text.as_bytes(), &mut decoded, true);
        assert_eq!(decoded, data);
    }
}
