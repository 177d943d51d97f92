/*
 * client.rs
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

//! HTTP client: connect to a host, then use the connection to send requests with a
//! callback handler.

use std::io;

use crate::net;
use crate::protocol::http::connection::{HttpConnection, HttpStream};

/// HTTP client. Create with `HttpClient::connect(host, port, use_tls)` then use the
/// returned connection to build requests and send them with a handler.
pub struct HttpClient;

impl HttpClient {
    /// Connect to the given host and port. If `use_tls` is true, performs the TLS
    /// handshake with ALPN `http/1.1`.
    pub async fn connect(host: &str, port: u16, use_tls: bool) -> io::Result<HttpConnection> {
        let stream = if use_tls {
            HttpStream::Tls(Box::new(net::connect_tls(host, port).await?))
        } else {
            HttpStream::Plain(net::connect_tcp(host, port).await?)
        };
        Ok(HttpConnection::new(stream, host.to_string(), port, use_tls))
    }
}
