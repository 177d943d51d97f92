/*
 * rewriter.rs
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

//! Re-join stage: consumes splitter events in document order and produces the output
//! byte stream. Inline HTML leaves are held until the tracker result is known; all
//! other bytes pass through untouched.

use std::collections::VecDeque;

use encoding_rs::Encoding;
use tracing::{debug, warn};

use crate::mime::base64::{self, Base64Decoder};
use crate::mime::charset::{self, DEFAULT_CHARSET};
use crate::mime::quoted_printable::{self, QuotedPrintableDecoder};
use crate::mime::splitter::{MimeNode, SplitEvent};
use crate::tracker::{inject, TrackerResult};

#[derive(Debug, Clone, Copy, PartialEq)]
enum TransferEncoding {
    Identity,
    Base64,
    QuotedPrintable,
}

enum BodyDecoder {
    Identity,
    Base64(Base64Decoder),
    QuotedPrintable(QuotedPrintableDecoder),
}

impl BodyDecoder {
    fn update(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        match self {
            BodyDecoder::Identity => out.extend_from_slice(chunk),
            BodyDecoder::Base64(d) => d.update(chunk, out),
            BodyDecoder::QuotedPrintable(d) => d.update(chunk, out),
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        match self {
            BodyDecoder::Identity => {}
            BodyDecoder::Base64(d) => d.finish(out),
            BodyDecoder::QuotedPrintable(d) => d.finish(out),
        }
    }
}

/// An inline HTML body waiting for the tracker.
struct HeldPart {
    raw: Vec<u8>,
    decoded: Vec<u8>,
    decoder: BodyDecoder,
    transfer_encoding: TransferEncoding,
    encoding: &'static Encoding,
    complete: bool,
}

impl HeldPart {
    fn new(node: &MimeNode) -> Self {
        let transfer_encoding = match node.headers.transfer_encoding().as_deref() {
            Some("base64") => TransferEncoding::Base64,
            Some("quoted-printable") => TransferEncoding::QuotedPrintable,
            _ => TransferEncoding::Identity,
        };
        let decoder = match transfer_encoding {
            TransferEncoding::Identity => BodyDecoder::Identity,
            TransferEncoding::Base64 => BodyDecoder::Base64(Base64Decoder::new()),
            TransferEncoding::QuotedPrintable => {
                BodyDecoder::QuotedPrintable(QuotedPrintableDecoder::new())
            }
        };
        let label = node
            .content_type()
            .and_then(|ct| ct.charset().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_CHARSET.to_string());
        Self {
            raw: Vec::new(),
            decoded: Vec::new(),
            decoder,
            transfer_encoding,
            encoding: charset::lookup(&label),
            complete: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.raw.extend_from_slice(chunk);
        self.decoder.update(chunk, &mut self.decoded);
    }

    fn finish(&mut self) {
        self.decoder.finish(&mut self.decoded);
        self.complete = true;
    }

    /// Final bytes for this part: the rewritten body, or the original bytes when there
    /// is nothing to inject or the charset cannot be written back.
    fn render(self, tracker: Option<&TrackerResult>) -> Vec<u8> {
        let Some(result) = tracker else {
            return self.raw;
        };
        let text = charset::decode(&self.decoded, self.encoding);
        let rewritten = inject::apply(&text, result);
        let (bytes, used) = charset::encode(&rewritten, self.encoding);
        if used != self.encoding {
            warn!(
                charset = self.encoding.name(),
                "cannot write charset back, part left unmodified"
            );
            return self.raw;
        }
        let bytes_end_line = bytes.ends_with(b"\n");
        let mut out = match self.transfer_encoding {
            TransferEncoding::Identity => bytes,
            TransferEncoding::QuotedPrintable => quoted_printable::encode(&bytes),
            TransferEncoding::Base64 => base64::encode_lines(&bytes),
        };
        // The line ending before a following boundary is not part of the body.
        if !self.raw.ends_with(b"\n") && out.ends_with(b"\r\n") && !bytes_end_line {
            out.truncate(out.len() - 2);
        }
        out
    }
}

enum Segment {
    Ready(Vec<u8>),
    Held(HeldPart),
}

enum TrackerSlot {
    Pending,
    Resolved(Option<TrackerResult>),
}

pub struct MimeRewriter {
    segments: VecDeque<Segment>,
    tracker: TrackerSlot,
    /// The leaf currently receiving body bytes is held.
    holding: bool,
    held_parts: usize,
}

impl Default for MimeRewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MimeRewriter {
    pub fn new() -> Self {
        Self {
            segments: VecDeque::new(),
            tracker: TrackerSlot::Pending,
            holding: false,
            held_parts: 0,
        }
    }

    pub fn push(&mut self, event: SplitEvent) {
        match event {
            SplitEvent::Node(node) => {
                self.push_ready(&node.raw_headers);
                if node.is_inline_html() {
                    debug!(root = node.root, "holding html part");
                    self.segments.push_back(Segment::Held(HeldPart::new(&node)));
                    self.holding = true;
                    self.held_parts += 1;
                } else {
                    if let Some(disposition) = node.headers.content_disposition() {
                        debug!(
                            disposition = disposition.disposition_type(),
                            filename = disposition.filename(),
                            "part passed through"
                        );
                    }
                    self.holding = false;
                }
            }
            SplitEvent::Body(bytes) => {
                if self.holding {
                    if let Some(Segment::Held(part)) = self.segments.back_mut() {
                        part.push(&bytes);
                        return;
                    }
                }
                self.push_ready(&bytes);
            }
            SplitEvent::NodeEnd => {
                if self.holding {
                    if let Some(Segment::Held(part)) = self.segments.back_mut() {
                        part.finish();
                    }
                    self.holding = false;
                }
            }
            SplitEvent::Raw(bytes) => self.push_ready(&bytes),
        }
    }

    /// Number of inline HTML parts seen so far.
    pub fn held_parts(&self) -> usize {
        self.held_parts
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.tracker, TrackerSlot::Resolved(_))
    }

    /// Record the message's tracker outcome; None passes held parts through unmodified.
    pub fn resolve(&mut self, result: Option<TrackerResult>) {
        self.tracker = TrackerSlot::Resolved(result);
    }

    /// Take every output byte that can be produced now, in document order.
    pub fn drain_ready(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            match self.segments.front() {
                Some(Segment::Ready(_)) => {
                    if let Some(Segment::Ready(bytes)) = self.segments.pop_front() {
                        out.extend_from_slice(&bytes);
                    }
                }
                Some(Segment::Held(part)) if part.complete && self.is_resolved() => {
                    if let Some(Segment::Held(part)) = self.segments.pop_front() {
                        let tracker = match &self.tracker {
                            TrackerSlot::Resolved(r) => r.as_ref(),
                            TrackerSlot::Pending => None,
                        };
                        out.extend_from_slice(&part.render(tracker));
                    }
                }
                _ => break,
            }
        }
        out
    }

    /// All input has been consumed and written out.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn push_ready(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Some(Segment::Ready(last)) = self.segments.back_mut() {
            last.extend_from_slice(bytes);
        } else {
            self.segments.push_back(Segment::Ready(bytes.to_vec()));
        }
    }
}
