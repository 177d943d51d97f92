/*
 * context.rs
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

//! Per-session command log and per-DATA transfer state.

use tracing::warn;

use crate::mime::{decode_rfc1342, HeaderBlock, MimeRewriter, MimeSplitter};
use crate::tracker::{CommandEntry, HeaderEntry, TrackerRequest, DECODED_SUBJECT_KEY};

/// One client command as issued before DATA: name plus everything after the first
/// separator.
pub type CommandLogEntry = CommandEntry;

#[derive(Debug, Default)]
pub struct SessionLog {
    entries: Vec<CommandLogEntry>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, line: &str) {
        let data = line.split_once(' ').map(|(_, rest)| rest).unwrap_or("");
        self.entries.push(CommandLogEntry {
            command: name.to_string(),
            data: data.to_string(),
        });
    }

    /// Every command of the session so far, earlier transactions included.
    pub fn entries(&self) -> &[CommandLogEntry] {
        &self.entries
    }
}

/// State of one DATA transfer: body splitting and rewriting, the terminator learned
/// from the next hop, and how far the upstream copy has progressed.
pub struct MailTransferContext {
    pub message_id: Option<String>,
    pub splitter: MimeSplitter,
    pub rewriter: MimeRewriter,
    /// Known once the next hop answered DATA with 354.
    pub terminator: Option<Vec<u8>>,
    /// The tracker has been asked for this message.
    pub tracker_requested: bool,
    /// The client finished the body.
    pub body_complete: bool,
    /// The terminator has been written upstream.
    pub content_ended: bool,
}

impl Default for MailTransferContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MailTransferContext {
    pub fn new() -> Self {
        Self {
            message_id: None,
            splitter: MimeSplitter::new(),
            rewriter: MimeRewriter::new(),
            terminator: None,
            tracker_requested: false,
            body_complete: false,
            content_ended: false,
        }
    }

    /// Build the tracker request from the root header block and record the
    /// message id.
    pub fn tracker_request(&mut self, headers: &HeaderBlock, log: &SessionLog) -> TrackerRequest {
        self.message_id = headers
            .get_first("message-id")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if self.message_id.is_none() {
            warn!("message has no Message-ID");
        }
        TrackerRequest {
            message_id: self.message_id.clone(),
            headers: header_entries(headers),
            commands: log.entries().to_vec(),
        }
    }
}

/// Every header value with encoded words decoded, keys in first-seen order, then the
/// strictly decoded Subject under its synthetic key.
pub fn header_entries(headers: &HeaderBlock) -> Vec<HeaderEntry> {
    let mut entries: Vec<HeaderEntry> = headers
        .decoded_list()
        .into_iter()
        .map(|(key, value)| HeaderEntry { key, value })
        .collect();
    if let Some(subject) = headers.get_first("subject") {
        match decode_rfc1342(subject) {
            Ok(value) => entries.push(HeaderEntry {
                key: DECODED_SUBJECT_KEY.to_string(),
                value,
            }),
            Err(e) => warn!(error = %e, "cannot decode Subject"),
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_records_name_and_arguments() {
        let mut log = SessionLog::new();
        log.record("EHLO", "EHLO client.example");
        log.record("MAIL", "MAIL FROM:<a@b>");
        log.record("NOOP", "NOOP");
        assert_eq!(log.entries().len(), 3);
        assert_eq!(log.entries()[0].command, "EHLO");
        assert_eq!(log.entries()[0].data, "client.example");
        assert_eq!(log.entries()[1].data, "FROM:<a@b>");
        assert_eq!(log.entries()[2].data, "");
    }

    #[test]
    fn request_carries_headers_subject_and_commands() {
        let headers = HeaderBlock::parse(
            b"Message-ID: <42@example.com>\r\n\
Subject: =?UTF-8?B?SGVsbG8=?=\r\n\
Received: one\r\n\
To: c@d\r\n\
Received: two\r\n\r\n",
        );
        let mut log = SessionLog::new();
        log.record("MAIL", "MAIL FROM:<a@b>");
        let mut context = MailTransferContext::new();
        let request = context.tracker_request(&headers, &log);
        assert_eq!(context.message_id.as_deref(), Some("<42@example.com>"));
        assert_eq!(request.message_id.as_deref(), Some("<42@example.com>"));
        let keys: Vec<&str> = request.headers.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["message-id", "subject", "received", "received", "to", DECODED_SUBJECT_KEY]
        );
        assert_eq!(request.headers[1].value, "Hello");
        assert_eq!(request.headers[3].value, "two");
        assert_eq!(request.headers[5].value, "Hello");
        assert_eq!(request.commands.len(), 1);
    }

    #[test]
    fn undecodable_subject_is_left_out() {
        let headers = HeaderBlock::parse(b"Subject: =?UTF-8?B?###?=\r\n\r\n");
        let mut context = MailTransferContext::new();
        let request = context.tracker_request(&headers, &SessionLog::new());
        assert!(context.message_id.is_none());
        assert!(request
            .headers
            .iter()
            .all(|h| h.key != DECODED_SUBJECT_KEY));
    }
}
