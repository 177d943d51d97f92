/*
 * mod.rs
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

//! HTTP/1.1 client used by the URL tracker binding, push-parsed responses.
//!
//! - Callback-based response API: `ResponseHandler` with `ok`/`error`, `header`, `body_chunk`, `complete`.
//! - Buffers: `bytes` crate (BytesMut for the parse buffer).
//! - TLS through tokio-rustls with ALPN `http/1.1`.

mod handler;
mod request;
mod response;

pub mod client;
pub mod connection;
pub mod h1;

pub use client::HttpClient;
pub use connection::{HttpConnection, HttpStream};
pub use handler::{BufferedResponse, ResponseHandler};
pub use request::{Method, RequestBuilder};
pub use response::Response;
