/*
 * reply.rs
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

//! SMTP replies: `code-text` continuation lines and a final `code text` line.

/// A complete (possibly multi-line) reply, kept as received for relaying.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub code: u16,
    /// Raw lines without line endings.
    pub lines: Vec<String>,
}

impl Reply {
    /// Single-line reply generated locally.
    pub fn new(code: u16, text: impl AsRef<str>) -> Self {
        Self {
            code,
            lines: vec![format!("{} {}", code, text.as_ref())],
        }
    }

    /// Text of the final line after the code and separator.
    pub fn message(&self) -> &str {
        self.lines.last().map(|l| line_text(l)).unwrap_or("")
    }

    /// 2xx or 3xx.
    pub fn is_positive(&self) -> bool {
        (200..400).contains(&self.code)
    }

    /// Wire form: every line followed by CRLF.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for line in &self.lines {
            out.extend_from_slice(line.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out
    }
}

fn line_code(line: &str) -> u16 {
    line.get(..3).and_then(|c| c.parse().ok()).unwrap_or(0)
}

fn line_text(line: &str) -> &str {
    line.get(4..).unwrap_or("")
}

/// Groups reply lines into complete replies.
#[derive(Default)]
pub struct ReplyAssembler {
    lines: Vec<String>,
}

impl ReplyAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one line; returns the reply once its final line arrives.
    pub fn push(&mut self, line: &[u8]) -> Option<Reply> {
        let line = String::from_utf8_lossy(line).into_owned();
        let continuation = line.as_bytes().get(3) == Some(&b'-');
        self.lines.push(line);
        if continuation {
            return None;
        }
        let lines = std::mem::take(&mut self.lines);
        let code = lines.last().map(|l| line_code(l)).unwrap_or(0);
        Some(Reply { code, lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_line_reply_is_grouped() {
        let mut a = ReplyAssembler::new();
        assert_eq!(a.push(b"250-mx.example.com"), None);
        assert_eq!(a.push(b"250-PIPELINING"), None);
        let reply = a.push(b"250 8BITMIME").unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.message(), "8BITMIME");
        assert_eq!(
            reply.to_bytes(),
            b"250-mx.example.com\r\n250-PIPELINING\r\n250 8BITMIME\r\n"
        );
    }

    #[test]
    fn malformed_lines_do_not_panic() {
        let mut a = ReplyAssembler::new();
        let reply = a.push(b"ok").unwrap();
        assert_eq!(reply.code, 0);
        assert_eq!(reply.message(), "");
        let reply = a.push(b"354").unwrap();
        assert_eq!(reply.code, 354);
        assert!(reply.is_positive());
    }

    #[test]
    fn local_reply() {
        let reply = Reply::new(421, "mx You talk too soon");
        assert_eq!(reply.to_bytes(), b"421 mx You talk too soon\r\n");
        assert_eq!(reply.message(), "mx You talk too soon");
    }
}
