/*
 * stream.rs
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

//! SMTP line/data parser with the receive(buffer) contract: bytes are pushed in as they
//! arrive and events are pulled out. Command mode yields one event per CRLF-terminated
//! line; data mode yields unstuffed body bytes up to (not including) CRLF "." CRLF.

use bytes::{Buf, BytesMut};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A command or reply line without its line ending.
    Line(Vec<u8>),
    /// Body bytes, dot-unstuffed.
    Data(Vec<u8>),
    /// The body exceeded the limit; later body bytes are discarded.
    DataOverflow,
    /// The end-of-data line was consumed. No further events until `resume()`.
    DataEnd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Command,
    Data,
    /// Terminator seen; waiting for the consumer to call `resume()`.
    DataDone,
}

enum Step {
    Continue,
    NeedMore,
    Terminator,
}

pub struct SmtpStream {
    buf: BytesMut,
    mode: Mode,
    line_start: bool,
    /// A CRLF that may turn out to be the start of the terminator.
    held_crlf: bool,
    max_bytes: usize,
    received: usize,
    overflowed: bool,
    overflow_pending: bool,
}

impl Default for SmtpStream {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtpStream {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            mode: Mode::Command,
            line_start: true,
            held_crlf: false,
            max_bytes: usize::MAX,
            received: 0,
            overflowed: false,
            overflow_pending: false,
        }
    }

    pub fn receive(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes received but not yet turned into events.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Switch to data mode; body bytes beyond `max_bytes` raise `DataOverflow`.
    pub fn start_data_mode(&mut self, max_bytes: usize) {
        self.mode = Mode::Data;
        self.line_start = true;
        self.held_crlf = false;
        self.max_bytes = max_bytes;
        self.received = 0;
        self.overflowed = false;
        self.overflow_pending = false;
    }

    /// Back to command mode after `DataEnd` has been consumed.
    pub fn resume(&mut self) {
        self.mode = Mode::Command;
    }

    pub fn next_event(&mut self) -> Option<StreamEvent> {
        match self.mode {
            Mode::Command => self.next_line(),
            Mode::Data => self.next_data_event(),
            Mode::DataDone => None,
        }
    }

    fn next_line(&mut self) -> Option<StreamEvent> {
        let lf = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line = self.buf.split_to(lf + 1);
        line.truncate(lf);
        if line.last() == Some(&b'\r') {
            line.truncate(lf - 1);
        }
        Some(StreamEvent::Line(line.to_vec()))
    }

    fn next_data_event(&mut self) -> Option<StreamEvent> {
        let mut out = Vec::new();
        loop {
            if self.overflow_pending {
                if !out.is_empty() {
                    return Some(StreamEvent::Data(out));
                }
                self.overflow_pending = false;
                return Some(StreamEvent::DataOverflow);
            }
            match self.data_step(&mut out) {
                Step::Continue => {}
                Step::NeedMore if self.overflow_pending => {}
                Step::NeedMore => break,
                Step::Terminator => {
                    if !out.is_empty() {
                        return Some(StreamEvent::Data(out));
                    }
                    self.buf.advance(3);
                    self.held_crlf = false;
                    self.mode = Mode::DataDone;
                    return Some(StreamEvent::DataEnd);
                }
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(StreamEvent::Data(out))
        }
    }

    fn data_step(&mut self, out: &mut Vec<u8>) -> Step {
        if self.buf.is_empty() {
            return Step::NeedMore;
        }
        if self.line_start {
            if self.buf[0] == b'.' {
                if self.buf.len() < 3 {
                    if self.buf.len() == 2 && self.buf[1] != b'\r' {
                        // ".x": an ordinary stuffed line
                    } else {
                        return Step::NeedMore;
                    }
                } else if &self.buf[..3] == b".\r\n" {
                    return Step::Terminator;
                }
                // Transparency: the leading dot is removed.
                self.buf.advance(1);
            }
            if self.held_crlf {
                self.held_crlf = false;
                self.push_data(out, b"\r\n");
            }
            self.line_start = false;
            return Step::Continue;
        }
        match self.buf.windows(2).position(|w| w == b"\r\n") {
            Some(p) => {
                let chunk = self.buf.split_to(p);
                self.push_data(out, &chunk);
                self.buf.advance(2);
                self.held_crlf = true;
                self.line_start = true;
                Step::Continue
            }
            None => {
                let keep = usize::from(self.buf.last() == Some(&b'\r'));
                let take = self.buf.len() - keep;
                if take == 0 {
                    return Step::NeedMore;
                }
                let chunk = self.buf.split_to(take);
                self.push_data(out, &chunk);
                Step::NeedMore
            }
        }
    }

    fn push_data(&mut self, out: &mut Vec<u8>, bytes: &[u8]) {
        if self.overflowed {
            return;
        }
        if self.received + bytes.len() > self.max_bytes {
            self.overflowed = true;
            self.overflow_pending = true;
            return;
        }
        self.received += bytes.len();
        out.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(stream: &mut SmtpStream) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(e) = stream.next_event() {
            events.push(e);
        }
        events
    }

    fn body(events: &[StreamEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Data(d) => Some(d.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn lines_split_across_receives() {
        let mut s = SmtpStream::new();
        s.receive(b"EHLO exa");
        assert_eq!(s.next_event(), None);
        s.receive(b"mple.com\r\nNOOP\nQU");
        assert_eq!(
            drain(&mut s),
            vec![
                StreamEvent::Line(b"EHLO example.com".to_vec()),
                StreamEvent::Line(b"NOOP".to_vec()),
            ]
        );
        assert_eq!(s.buffered(), 2);
    }

    #[test]
    fn data_unstuffs_and_stops_at_terminator() {
        let mut s = SmtpStream::new();
        s.start_data_mode(1024);
        s.receive(b"Subject: x\r\n\r\n..leading\r\nlast\r\n.\r\nQUIT\r\n");
        let events = drain(&mut s);
        assert_eq!(events.last(), Some(&StreamEvent::DataEnd));
        assert_eq!(body(&events), b"Subject: x\r\n\r\n.leading\r\nlast");
        assert_eq!(s.next_event(), None);
        s.resume();
        assert_eq!(s.next_event(), Some(StreamEvent::Line(b"QUIT".to_vec())));
    }

    #[test]
    fn terminator_split_byte_by_byte() {
        let input = b"a\r\n.b\r\n.\r\n";
        let mut s = SmtpStream::new();
        s.start_data_mode(1024);
        let mut events = Vec::new();
        for b in input.iter() {
            s.receive(std::slice::from_ref(b));
            events.extend(drain(&mut s));
        }
        assert_eq!(events.last(), Some(&StreamEvent::DataEnd));
        assert_eq!(body(&events), b"a\r\nb");
    }

    #[test]
    fn empty_body() {
        let mut s = SmtpStream::new();
        s.start_data_mode(1024);
        s.receive(b".\r\n");
        assert_eq!(drain(&mut s), vec![StreamEvent::DataEnd]);
    }

    #[test]
    fn dot_inside_line_is_data() {
        let mut s = SmtpStream::new();
        s.start_data_mode(1024);
        s.receive(b"a.\r\n.\r\n");
        let events = drain(&mut s);
        assert_eq!(body(&events), b"a.");
        assert_eq!(events.last(), Some(&StreamEvent::DataEnd));
    }

    #[test]
    fn overflow_on_a_partial_line_is_signalled_at_once() {
        let mut s = SmtpStream::new();
        s.start_data_mode(4);
        s.receive(b"0123456789");
        assert_eq!(drain(&mut s), vec![StreamEvent::DataOverflow]);
        s.receive(b"\r\n.\r\n");
        assert_eq!(drain(&mut s), vec![StreamEvent::DataEnd]);
    }

    #[test]
    fn overflow_is_signalled_once_and_terminator_still_found() {
        let mut s = SmtpStream::new();
        s.start_data_mode(8);
        s.receive(b"12345\r\n67890\r\nmore\r\n.\r\nRSET\r\n");
        let events = drain(&mut s);
        let overflows = events
            .iter()
            .filter(|e| **e == StreamEvent::DataOverflow)
            .count();
        assert_eq!(overflows, 1);
        assert_eq!(events.last(), Some(&StreamEvent::DataEnd));
        assert!(body(&events).len() <= 8);
        s.resume();
        assert_eq!(s.next_event(), Some(StreamEvent::Line(b"RSET".to_vec())));
    }
}
