/*
 * dot_stuffer.rs
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

//! Dot stuffing for content forwarded upstream (RFC 5321 4.5.2: a line starting with `.`
//! gets an extra `.`), closed by the end-of-data sequence the next hop announced.

#[derive(Clone, Copy, PartialEq)]
enum State {
    /// Start of content; nothing emitted yet.
    Start,
    Normal,
    SawCr,
    SawCrLf,
}

/// Line-start-aware stuffer. A CR or CRLF is held back until the next byte shows
/// whether a dot follows.
pub struct DotStuffer {
    state: State,
}

impl Default for DotStuffer {
    fn default() -> Self {
        Self { state: State::Start }
    }
}

impl DotStuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a chunk; call `out` for each slice to send.
    pub fn process_chunk<F>(&mut self, chunk: &[u8], mut out: F)
    where
        F: FnMut(&[u8]),
    {
        let mut start = 0;
        let mut i = 0;
        while i < chunk.len() {
            let b = chunk[i];
            match self.state {
                State::Start | State::SawCrLf => {
                    if self.state == State::SawCrLf {
                        out(b"\r\n");
                    }
                    if b == b'.' {
                        out(b".");
                    }
                    start = i;
                    self.state = State::Normal;
                    // Re-examine b in Normal state.
                    continue;
                }
                State::Normal => {
                    if b == b'\r' {
                        if start < i {
                            out(&chunk[start..i]);
                        }
                        self.state = State::SawCr;
                        start = i + 1;
                    }
                    i += 1;
                }
                State::SawCr => {
                    if b == b'\n' {
                        self.state = State::SawCrLf;
                        start = i + 1;
                        i += 1;
                    } else {
                        out(b"\r");
                        start = i;
                        self.state = State::Normal;
                    }
                }
            }
        }
        if self.state == State::Normal && start < chunk.len() {
            out(&chunk[start..]);
        }
    }

    /// Emit held bytes and the end-of-data `terminator`; reset state. When no content
    /// was sent at all, a leading CRLF of the terminator is dropped so that no blank
    /// line is invented.
    pub fn end_message<F>(&mut self, terminator: &[u8], mut out: F)
    where
        F: FnMut(&[u8]),
    {
        match self.state {
            State::Start => {
                out(terminator.strip_prefix(b"\r\n").unwrap_or(terminator));
            }
            State::SawCr => {
                out(b"\r");
                out(terminator);
            }
            State::SawCrLf => {
                out(b"\r\n");
                out(terminator);
            }
            State::Normal => out(terminator),
        }
        self.state = State::Start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TERMINATOR: &[u8] = b"\r\n.\r\n";

    fn stuff(chunks: &[&[u8]]) -> Vec<u8> {
        let mut s = DotStuffer::new();
        let mut out = Vec::new();
        for chunk in chunks {
            s.process_chunk(chunk, |x| out.extend_from_slice(x));
        }
        s.end_message(TERMINATOR, |x| out.extend_from_slice(x));
        out
    }

    #[test]
    fn leading_dot_is_doubled() {
        assert_eq!(stuff(&[b".hidden"]), b"..hidden\r\n.\r\n");
    }

    #[test]
    fn line_with_dot_stuffed() {
        assert_eq!(stuff(&[b"Hi\r\n.\r\nBye"]), b"Hi\r\n..\r\nBye\r\n.\r\n");
    }

    #[test]
    fn split_across_chunks() {
        assert_eq!(
            stuff(&[b"Hi\r", b"\n", b".x\r\n", b"\r\n.."]),
            b"Hi\r\n..x\r\n\r\n...\r\n.\r\n"
        );
    }

    #[test]
    fn lone_cr_is_kept() {
        assert_eq!(stuff(&[b"a\rb\r"]), b"a\rb\r\r\n.\r\n");
    }

    #[test]
    fn empty_body_sends_only_the_dot_line() {
        assert_eq!(stuff(&[]), b".\r\n");
    }

    #[test]
    fn custom_terminator() {
        let mut s = DotStuffer::new();
        let mut out = Vec::new();
        s.process_chunk(b"body", |x| out.extend_from_slice(x));
        s.end_message(b"\r\n.\n", |x| out.extend_from_slice(x));
        assert_eq!(out, b"body\r\n.\n");
    }
}
