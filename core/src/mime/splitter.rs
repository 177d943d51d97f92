/*
 * splitter.rs
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

//! Byte-faithful MIME splitter: receive(buffer) contract, complete lines only.
//!
//! Every input byte comes back exactly once, in order, inside one of the events:
//! node header blocks, leaf body bytes, or structural bytes (boundary lines,
//! preambles, epilogues). Concatenating all event bytes reproduces the input.

use crate::mime::content_type::ContentType;
use crate::mime::headers::HeaderBlock;
use crate::mime::utils::{find_lf, trim_eol};

/// A MIME entity whose header block has been read.
#[derive(Debug, Clone)]
pub struct MimeNode {
    pub headers: HeaderBlock,
    /// Header bytes exactly as received, including the blank separator line.
    pub raw_headers: Vec<u8>,
    pub root: bool,
    /// Multipart containers get no Body/NodeEnd events; their children follow.
    pub multipart: bool,
}

impl MimeNode {
    pub fn content_type(&self) -> Option<ContentType> {
        self.headers.content_type()
    }

    /// A `text/html` leaf with no Content-Disposition at all.
    pub fn is_inline_html(&self) -> bool {
        !self.multipart
            && self.headers.get_first("content-disposition").is_none()
            && self
                .content_type()
                .is_some_and(|ct| ct.is_mime_type("text", "html"))
    }
}

#[derive(Debug, Clone)]
pub enum SplitEvent {
    Node(MimeNode),
    /// Body bytes of the current leaf node.
    Body(Vec<u8>),
    /// The current leaf node is complete.
    NodeEnd,
    /// Bytes that belong to no leaf body.
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Header,
    Body,
    /// Preamble or epilogue text around multipart children.
    Structure,
}

enum BoundaryMatch {
    Delimiter(usize),
    Close(usize),
}

pub struct MimeSplitter {
    state: State,
    line_buffer: Vec<u8>,
    header_buffer: Vec<u8>,
    boundaries: Vec<String>,
    /// Line ending held back from the leaf body: it belongs to a following boundary.
    pending_eol: Vec<u8>,
    seen_root: bool,
}

impl Default for MimeSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl MimeSplitter {
    pub fn new() -> Self {
        Self {
            state: State::Header,
            line_buffer: Vec::new(),
            header_buffer: Vec::new(),
            boundaries: Vec::new(),
            pending_eol: Vec::new(),
            seen_root: false,
        }
    }

    /// Process every complete line in `buf`; the incomplete tail is kept for the next call.
    pub fn receive(&mut self, buf: &[u8], events: &mut Vec<SplitEvent>) {
        self.line_buffer.extend_from_slice(buf);
        let mut data = std::mem::take(&mut self.line_buffer);
        let mut start = 0;
        while let Some(i) = find_lf(&data[start..]) {
            let end = start + i + 1;
            self.process_line(&data[start..end], events);
            start = end;
        }
        data.drain(..start);
        self.line_buffer = data;
    }

    /// End of input: the unterminated last line is processed and open nodes are closed.
    pub fn finish(&mut self, events: &mut Vec<SplitEvent>) {
        let tail = std::mem::take(&mut self.line_buffer);
        if !tail.is_empty() {
            self.process_line(&tail, events);
        }
        match self.state {
            State::Header => {
                if !self.header_buffer.is_empty() || !self.seen_root {
                    self.end_headers(events);
                }
                if self.state == State::Body {
                    self.end_body(events);
                }
            }
            State::Body => {
                let eol = std::mem::take(&mut self.pending_eol);
                if !eol.is_empty() {
                    events.push(SplitEvent::Body(eol));
                }
                self.end_body(events);
            }
            State::Structure => {}
        }
        self.state = State::Structure;
    }

    fn process_line(&mut self, line: &[u8], events: &mut Vec<SplitEvent>) {
        match self.state {
            State::Header => {
                if let Some(m) = self.match_boundary(line) {
                    // Part ended before its header block did.
                    self.end_headers(events);
                    if self.state == State::Body {
                        self.end_body(events);
                    }
                    self.on_boundary(m, line, events);
                    return;
                }
                self.header_buffer.extend_from_slice(line);
                if trim_eol(line).is_empty() {
                    self.end_headers(events);
                }
            }
            State::Body => {
                if let Some(m) = self.match_boundary(line) {
                    self.end_body(events);
                    self.on_boundary(m, line, events);
                    return;
                }
                if self.boundaries.is_empty() {
                    events.push(SplitEvent::Body(line.to_vec()));
                    return;
                }
                let content = trim_eol(line);
                let mut bytes = std::mem::take(&mut self.pending_eol);
                bytes.extend_from_slice(content);
                self.pending_eol = line[content.len()..].to_vec();
                if !bytes.is_empty() {
                    events.push(SplitEvent::Body(bytes));
                }
            }
            State::Structure => {
                if let Some(m) = self.match_boundary(line) {
                    self.on_boundary(m, line, events);
                } else {
                    push_raw(events, line);
                }
            }
        }
    }

    fn end_headers(&mut self, events: &mut Vec<SplitEvent>) {
        let raw_headers = std::mem::take(&mut self.header_buffer);
        let headers = HeaderBlock::parse(&raw_headers);
        let boundary = headers
            .content_type()
            .filter(|ct| ct.is_primary_type("multipart"))
            .and_then(|ct| ct.boundary().map(str::to_string))
            .filter(|b| !b.is_empty());
        let root = !self.seen_root;
        self.seen_root = true;
        let multipart = boundary.is_some();
        events.push(SplitEvent::Node(MimeNode {
            headers,
            raw_headers,
            root,
            multipart,
        }));
        match boundary {
            Some(b) => {
                self.boundaries.push(b);
                self.state = State::Structure;
            }
            None => self.state = State::Body,
        }
    }

    fn end_body(&mut self, events: &mut Vec<SplitEvent>) {
        events.push(SplitEvent::NodeEnd);
        self.state = State::Structure;
    }

    fn on_boundary(&mut self, m: BoundaryMatch, line: &[u8], events: &mut Vec<SplitEvent>) {
        let mut raw = std::mem::take(&mut self.pending_eol);
        raw.extend_from_slice(line);
        push_raw(events, &raw);
        match m {
            BoundaryMatch::Delimiter(depth) => {
                self.boundaries.truncate(depth + 1);
                self.state = State::Header;
            }
            BoundaryMatch::Close(depth) => {
                self.boundaries.truncate(depth);
                self.state = State::Structure;
            }
        }
    }

    /// Innermost enclosing boundary that `line` is a delimiter or close delimiter for.
    fn match_boundary(&self, line: &[u8]) -> Option<BoundaryMatch> {
        let content = trim_eol(line);
        let rest = content.strip_prefix(b"--")?;
        for (depth, boundary) in self.boundaries.iter().enumerate().rev() {
            let Some(after) = rest.strip_prefix(boundary.as_bytes()) else {
                continue;
            };
            if let Some(tail) = after.strip_prefix(b"--") {
                if tail.iter().all(|b| *b == b' ' || *b == b'\t') {
                    return Some(BoundaryMatch::Close(depth));
                }
            }
            if after.iter().all(|b| *b == b' ' || *b == b'\t') {
                return Some(BoundaryMatch::Delimiter(depth));
            }
        }
        None
    }
}

fn push_raw(events: &mut Vec<SplitEvent>, bytes: &[u8]) {
    if let Some(SplitEvent::Raw(last)) = events.last_mut() {
        last.extend_from_slice(bytes);
    } else {
        events.push(SplitEvent::Raw(bytes.to_vec()));
    }
}
