/*
 * quoted_printable.rs
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

//! Quoted-Printable Content-Transfer-Encoding (RFC 2045): incremental decoder and a
//! soft-wrapping encoder used when a rewritten body is written back.

const HEX_DECODE: [i8; 256] = {
    let mut t = [-1i8; 256];
    let mut i = 0u8;
    while i < 10 {
        t[(b'0' + i) as usize] = i as i8;
        i = i.wrapping_add(1);
    }
    let mut i = 0u8;
    while i < 6 {
        t[(b'A' + i) as usize] = (10 + i) as i8;
        t[(b'a' + i) as usize] = (10 + i) as i8;
        i = i.wrapping_add(1);
    }
    t
};

const HEX_ENCODE: &[u8; 16] = b"0123456789ABCDEF";

/// Soft line limit for encoded output, leaving room for the trailing `=`.
const MAX_LINE: usize = 75;

/// Decode quoted-printable from `src` into `out`. Handles =XX and soft line breaks (=CRLF, =LF).
/// An incomplete `=` sequence at the end is left unconsumed unless `end_of_stream`.
/// Returns the number of bytes consumed from `src`.
pub fn decode_into(src: &[u8], out: &mut Vec<u8>, end_of_stream: bool) -> usize {
    let mut pos = 0;
    while pos < src.len() {
        let b = src[pos];
        if b != b'=' {
            out.push(b);
            pos += 1;
            continue;
        }
        let remaining = src.len() - pos;
        if remaining >= 3 {
            let hex1 = src[pos + 1];
            let hex2 = src[pos + 2];
            let v1 = HEX_DECODE[hex1 as usize];
            let v2 = HEX_DECODE[hex2 as usize];
            if v1 >= 0 && v2 >= 0 {
                out.push(((v1 << 4) | v2) as u8);
                pos += 3;
            } else if hex1 == b'\r' && hex2 == b'\n' {
                pos += 3;
            } else if hex1 == b'\n' {
                pos += 2;
            } else {
                out.push(b);
                pos += 1;
            }
        } else if !end_of_stream {
            break;
        } else if remaining == 2 && src[pos + 1] == b'\n' {
            pos += 2;
        } else {
            out.push(b);
            pos += 1;
        }
    }
    pos
}

/// Incremental quoted-printable decoder; keeps a trailing partial escape between chunks.
#[derive(Default)]
pub struct QuotedPrintableDecoder {
    pending: Vec<u8>,
}

impl QuotedPrintableDecoder {
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

/// Encode `data` as quoted-printable. Line breaks (CRLF or LF) in the input become hard CRLF
/// breaks; long lines are soft-wrapped. Trailing whitespace before a break is escaped.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8);
    let mut line_len = 0;
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        if b == b'\r' && data.get(i + 1) == Some(&b'\n') {
            out.extend_from_slice(b"\r\n");
            line_len = 0;
            i += 2;
            continue;
        }
        if b == b'\n' {
            out.extend_from_slice(b"\r\n");
            line_len = 0;
            i += 1;
            continue;
        }
        let at_line_end = match data.get(i + 1) {
            None => true,
            Some(b'\n') => true,
            Some(b'\r') => data.get(i + 2) == Some(&b'\n'),
            _ => false,
        };
        let literal = (b == b' ' || b == b'\t') && !at_line_end
            || (b'!'..=b'~').contains(&b) && b != b'=';
        let width = if literal { 1 } else { 3 };
        if line_len + width > MAX_LINE {
            out.extend_from_slice(b"=\r\n");
            line_len = 0;
        }
        if literal {
            out.push(b);
        } else {
            out.push(b'=');
            out.push(HEX_ENCODE[(b >> 4) as usize]);
            out.push(HEX_ENCODE[(b & 0x0f) as usize]);
        }
        line_len += width;
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_escape_split_across_chunks() {
        let mut decoder = QuotedPrintableDecoder::new();
        let mut out = Vec::new();
        decoder.update(b"caf=C3=", &mut out);
        decoder.update(b"A9 soft=\r\nbreak", &mut out);
        decoder.finish(&mut out);
        assert_eq!(String::from_utf8(out).unwrap(), "caf\u{e9} softbreak");
    }

    #[test]
    fn encode_escapes_equals_and_trailing_space() {
        let encoded = encode(b"a=b \r\nnext");
        assert_eq!(encoded, b"a=3Db=20\r\nnext");
    }

    #[test]
    fn encode_soft_wraps() {
        let data = vec![b'x'; 200];
        let encoded = encode(&data);
        for line in encoded.split(|&b| b == b'\n') {
            assert!(line.len() <= 77);
        }
        let mut decoded = Vec::new();
        decode_into(&encoded, &mut decoded, true);
        assert_eq!(decoded, data);
    }
}
