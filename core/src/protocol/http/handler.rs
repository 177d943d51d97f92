/*
 * handler.rs
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

//! HTTP response handler trait (push model) and a handler that buffers the whole
//! response.
//!
//! Events: status → headers → body_chunk (×n) → trailers → complete.

use crate::protocol::http::response::Response;

/// Handler for HTTP response events. The connection drives this as data arrives.
///
/// Flow for a response:
/// 1. `ok(response)` or `error(response)`: status received
/// 2. `header(name, value)`: for each response header
/// 3. `body_chunk(data)`: for each chunk of body data
/// 4. `header(name, value)`: for each trailer (if any)
/// 5. `complete()`: response fully complete
pub trait ResponseHandler {
    /// Called when a successful (2xx) status is received.
    fn ok(&mut self, response: Response);

    /// Called for any other status.
    fn error(&mut self, response: Response);

    /// Called for each response or trailer header. Name may repeat for multi-value headers.
    fn header(&mut self, name: &str, value: &str);

    /// Data is only valid for the duration of the call.
    fn body_chunk(&mut self, data: &[u8]);

    fn complete(&mut self);
}

/// Collects status, headers and body in memory.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    pub status: Option<Response>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub complete: bool,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(&self) -> u16 {
        self.status.as_ref().map(|s| s.code).unwrap_or(0)
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl ResponseHandler for BufferedResponse {
    fn ok(&mut self, response: Response) {
        self.status = Some(response);
    }

    fn error(&mut self, response: Response) {
        self.status = Some(response);
    }

    fn header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn body_chunk(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    fn complete(&mut self) {
        self.complete = true;
    }
}
