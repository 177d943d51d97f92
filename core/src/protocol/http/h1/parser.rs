/*
 * parser.rs
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

//! HTTP/1.1 response push parser: status line, headers, body (Content-Length, chunked,
//! or read until close).

use bytes::Buf;
use bytes::BytesMut;
use std::io;

/// Callback for HTTP/1.1 response events. The connection implements this and forwards
/// to its ResponseHandler.
pub trait H1ResponseHandler {
    fn status(&mut self, code: u16, reason: Option<&str>);
    fn header(&mut self, name: &str, value: &str);
    fn body_chunk(&mut self, data: &[u8]);
    fn trailer(&mut self, name: &str, value: &str);
    fn complete(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    StatusLine,
    Headers,
    Body,
    /// Body delimited by connection close; `finish()` completes it.
    BodyUntilClose,
    ChunkSize,
    ChunkData,
    ChunkDataEnd,
    ChunkTrailer,
    Complete,
}

/// Push parser for one HTTP/1.1 response. Feed bytes via `receive`; the handler is
/// invoked as complete tokens are parsed.
pub struct ResponseParser {
    state: ParseState,
    content_length: Option<u64>,
    chunked: bool,
    no_body: bool,
    /// Parsing the header block of a 1xx response.
    interim: bool,
    remaining: u64,
    notified: bool,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::StatusLine,
            content_length: None,
            chunked: false,
            no_body: false,
            interim: false,
            remaining: 0,
            notified: false,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == ParseState::Complete
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn find_crlf(buf: &[u8]) -> Option<usize> {
        buf.windows(2).position(|w| w == b"\r\n")
    }

    /// Take one CRLF-terminated line as text, or None if incomplete.
    fn take_line(buf: &mut BytesMut, what: &str) -> Result<Option<String>, io::Error> {
        let Some(line_end) = Self::find_crlf(buf) else {
            return Ok(None);
        };
        let line = buf.split_to(line_end + 2);
        let text = std::str::from_utf8(&line[..line_end]).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, format!("invalid {} UTF-8", what))
        })?;
        Ok(Some(text.to_string()))
    }

    fn split_header(line: &str) -> Option<(&str, &str)> {
        let colon = line.find(':')?;
        Some((line[..colon].trim(), line[colon + 1..].trim()))
    }

    /// Consume and parse as much as possible from buf. Partial data remains in buf.
    pub fn receive<H: H1ResponseHandler>(
        &mut self,
        buf: &mut BytesMut,
        handler: &mut H,
    ) -> Result<(), io::Error> {
        loop {
            match self.state {
                ParseState::StatusLine => {
                    let Some(line) = Self::take_line(buf, "status line")? else {
                        return Ok(());
                    };
                    // HTTP/1.1 200 OK or HTTP/1.1 200
                    let mut parts = line.splitn(3, ' ');
                    let version = parts.next().unwrap_or("");
                    if !version.starts_with("HTTP/") {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "not an HTTP response",
                        ));
                    }
                    let code = parts
                        .next()
                        .and_then(|s| s.parse::<u16>().ok())
                        .ok_or_else(|| {
                            io::Error::new(io::ErrorKind::InvalidData, "invalid status code")
                        })?;
                    self.state = ParseState::Headers;
                    if (100..200).contains(&code) {
                        // Interim response: its headers are skipped.
                        self.interim = true;
                        continue;
                    }
                    handler.status(code, parts.next());
                    if code == 204 || code == 304 {
                        self.no_body = true;
                    }
                }
                ParseState::Headers => {
                    let Some(line) = Self::take_line(buf, "header")? else {
                        return Ok(());
                    };
                    if line.is_empty() {
                        if self.interim {
                            self.interim = false;
                            self.state = ParseState::StatusLine;
                        } else {
                            self.start_body();
                        }
                        continue;
                    }
                    if self.interim {
                        continue;
                    }
                    if let Some((name, value)) = Self::split_header(&line) {
                        if name.eq_ignore_ascii_case("content-length") {
                            self.content_length = value.parse::<u64>().ok();
                        } else if name.eq_ignore_ascii_case("transfer-encoding")
                            && value.to_ascii_lowercase().contains("chunked")
                        {
                            self.chunked = true;
                        }
                        handler.header(name, value);
                    }
                }
                ParseState::Body => {
                    let to_read = (self.remaining.min(buf.len() as u64)) as usize;
                    if to_read > 0 {
                        let chunk = buf.split_to(to_read);
                        handler.body_chunk(&chunk);
                        self.remaining -= to_read as u64;
                    }
                    if self.remaining > 0 {
                        return Ok(());
                    }
                    self.state = ParseState::Complete;
                }
                ParseState::BodyUntilClose => {
                    if !buf.is_empty() {
                        let chunk = buf.split_to(buf.len());
                        handler.body_chunk(&chunk);
                    }
                    return Ok(());
                }
                ParseState::ChunkSize => {
                    let Some(line) = Self::take_line(buf, "chunk size")? else {
                        return Ok(());
                    };
                    let hex_part = line.split(';').next().unwrap_or("").trim();
                    self.remaining = u64::from_str_radix(hex_part, 16).map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "invalid chunk size")
                    })?;
                    self.state = if self.remaining == 0 {
                        ParseState::ChunkTrailer
                    } else {
                        ParseState::ChunkData
                    };
                }
                ParseState::ChunkData => {
                    let to_read = (self.remaining.min(buf.len() as u64)) as usize;
                    if to_read > 0 {
                        let chunk = buf.split_to(to_read);
                        handler.body_chunk(&chunk);
                        self.remaining -= to_read as u64;
                    }
                    if self.remaining > 0 {
                        return Ok(());
                    }
                    self.state = ParseState::ChunkDataEnd;
                }
                ParseState::ChunkDataEnd => {
                    if buf.len() < 2 {
                        return Ok(());
                    }
                    buf.advance(2);
                    self.state = ParseState::ChunkSize;
                }
                ParseState::ChunkTrailer => {
                    let Some(line) = Self::take_line(buf, "trailer")? else {
                        return Ok(());
                    };
                    if line.is_empty() {
                        self.state = ParseState::Complete;
                    } else if let Some((name, value)) = Self::split_header(&line) {
                        handler.trailer(name, value);
                    }
                }
                ParseState::Complete => {
                    self.notify_complete(handler);
                    return Ok(());
                }
            }
        }
    }

    fn notify_complete<H: H1ResponseHandler>(&mut self, handler: &mut H) {
        if !self.notified {
            self.notified = true;
            handler.complete();
        }
    }

    fn start_body(&mut self) {
        self.state = if self.no_body {
            ParseState::Complete
        } else if self.chunked {
            ParseState::ChunkSize
        } else if let Some(length) = self.content_length {
            self.remaining = length;
            if length == 0 {
                ParseState::Complete
            } else {
                ParseState::Body
            }
        } else {
            ParseState::BodyUntilClose
        };
    }

    /// The connection reached end of stream. Completes a read-until-close body; any
    /// other unfinished state is an error.
    pub fn finish<H: H1ResponseHandler>(&mut self, handler: &mut H) -> Result<(), io::Error> {
        match self.state {
            ParseState::BodyUntilClose => {
                self.state = ParseState::Complete;
                self.notify_complete(handler);
                Ok(())
            }
            ParseState::Complete => Ok(()),
            _ => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "HTTP connection closed mid-response",
            )),
        }
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        status: Option<u16>,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        trailers: usize,
        completed: usize,
    }

    impl H1ResponseHandler for Recorder {
        fn status(&mut self, code: u16, _reason: Option<&str>) {
            self.status = Some(code);
        }
        fn header(&mut self, name: &str, value: &str) {
            self.headers.push((name.into(), value.into()));
        }
        fn body_chunk(&mut self, data: &[u8]) {
            self.body.extend_from_slice(data);
        }
        fn trailer(&mut self, _name: &str, _value: &str) {
            self.trailers += 1;
        }
        fn complete(&mut self) {
            self.completed += 1;
        }
    }

    fn feed(parser: &mut ResponseParser, rec: &mut Recorder, input: &[&[u8]]) {
        let mut buf = BytesMut::new();
        for part in input {
            buf.extend_from_slice(part);
            parser.receive(&mut buf, rec).unwrap();
        }
    }

    #[test]
    fn content_length_body_in_one_read() {
        let mut parser = ResponseParser::new();
        let mut rec = Recorder::default();
        feed(
            &mut parser,
            &mut rec,
            &[b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello"],
        );
        assert_eq!(rec.status, Some(200));
        assert_eq!(rec.body, b"hello");
        assert_eq!(rec.completed, 1);
        assert!(parser.is_complete());
    }

    #[test]
    fn chunked_body_split_across_reads() {
        let mut parser = ResponseParser::new();
        let mut rec = Recorder::default();
        feed(
            &mut parser,
            &mut rec,
            &[
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\n{\"a\"",
                b"\r\n3\r\n:1}\r",
                b"\n0\r\nX-Trailer: y\r\n\r\n",
            ],
        );
        assert_eq!(rec.body, b"{\"a\":1}");
        assert_eq!(rec.trailers, 1);
        assert_eq!(rec.completed, 1);
    }

    #[test]
    fn interim_response_is_skipped() {
        let mut parser = ResponseParser::new();
        let mut rec = Recorder::default();
        feed(
            &mut parser,
            &mut rec,
            &[b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 204 No Content\r\n\r\n"],
        );
        assert_eq!(rec.status, Some(204));
        assert!(rec.body.is_empty());
        assert_eq!(rec.completed, 1);
    }

    #[test]
    fn body_until_close_completes_on_finish() {
        let mut parser = ResponseParser::new();
        let mut rec = Recorder::default();
        feed(&mut parser, &mut rec, &[b"HTTP/1.0 500 Oops\r\n\r\npartial", b" body"]);
        assert_eq!(rec.completed, 0);
        parser.finish(&mut rec).unwrap();
        assert_eq!(rec.status, Some(500));
        assert_eq!(rec.body, b"partial body");
        assert_eq!(rec.completed, 1);
    }

    #[test]
    fn truncated_response_is_an_error() {
        let mut parser = ResponseParser::new();
        let mut rec = Recorder::default();
        feed(
            &mut parser,
            &mut rec,
            &[b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc"],
        );
        assert!(parser.finish(&mut rec).is_err());
    }
}
