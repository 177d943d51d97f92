/*
 * connection.rs
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

//! HTTP connection: one TCP or TLS stream driving the H1 parser and a ResponseHandler.

use bytes::BytesMut;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as TokioTlsStream;

use crate::protocol::http::h1::{H1ResponseHandler, ResponseParser};
use crate::protocol::http::request::{Method, RequestBuilder};
use crate::protocol::http::response::Response;
use crate::protocol::http::ResponseHandler;

/// Unified stream: plain TCP or TLS. Implements AsyncRead + AsyncWrite.
pub enum HttpStream {
    Plain(TcpStream),
    Tls(Box<TokioTlsStream<TcpStream>>),
}

impl AsyncRead for HttpStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for HttpStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_flush(cx),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            HttpStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            HttpStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Bridges H1 parser callbacks to the user's ResponseHandler.
struct H1Driver<'a, R: ResponseHandler> {
    handler: &'a mut R,
}

impl<R: ResponseHandler> H1ResponseHandler for H1Driver<'_, R> {
    fn status(&mut self, code: u16, reason: Option<&str>) {
        let response = match reason {
            Some(r) => Response::with_reason(code, r),
            None => Response::new(code),
        };
        if response.is_success() {
            self.handler.ok(response);
        } else {
            self.handler.error(response);
        }
    }

    fn header(&mut self, name: &str, value: &str) {
        self.handler.header(name, value);
    }

    fn body_chunk(&mut self, data: &[u8]) {
        self.handler.body_chunk(data);
    }

    fn trailer(&mut self, name: &str, value: &str) {
        self.handler.header(name, value);
    }

    fn complete(&mut self) {
        self.handler.complete();
    }
}

/// HTTP connection: holds the stream and drives the read loop. Call send() to issue a
/// request.
pub struct HttpConnection {
    stream: HttpStream,
    host: String,
    port: u16,
    secure: bool,
    read_buf: BytesMut,
}

impl HttpConnection {
    /// Create from an already-connected stream. Used by HttpClient::connect().
    pub fn new(stream: HttpStream, host: String, port: u16, secure: bool) -> Self {
        Self {
            stream,
            host,
            port,
            secure,
            read_buf: BytesMut::with_capacity(8192),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Build a request (method, path). Use send() to execute it with a handler.
    pub fn request(&self, method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, path)
    }

    /// Host header value: the port is included unless it is the scheme default.
    fn host_header(&self) -> String {
        let default_port = if self.secure { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Send the request and run the read loop until the response is complete. The
    /// handler is invoked as data arrives.
    pub async fn send<R: ResponseHandler>(
        &mut self,
        request: &RequestBuilder,
        handler: &mut R,
    ) -> io::Result<()> {
        let wire = request.to_bytes(&self.host_header());
        self.stream.write_all(&wire).await?;
        self.stream.flush().await?;

        let mut parser = ResponseParser::new();
        let mut driver = H1Driver { handler };
        // Bytes left over from a previous exchange belong to this response.
        parser.receive(&mut self.read_buf, &mut driver)?;
        let mut tmp = [0u8; 8192];
        while !parser.is_complete() {
            let n = self.stream.read(&mut tmp).await?;
            if n == 0 {
                return parser.finish(&mut driver);
            }
            self.read_buf.extend_from_slice(&tmp[..n]);
            parser.receive(&mut self.read_buf, &mut driver)?;
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::BufferedResponse;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn post_and_read_content_length_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            while !received.ends_with(b"{\"x\":1}") {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0);
                received.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 12\r\n\r\n{\"html\":\"x\"}")
                .await
                .unwrap();
            String::from_utf8(received).unwrap()
        });

        let tcp = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mut connection =
            HttpConnection::new(HttpStream::Plain(tcp), "127.0.0.1".into(), port, false);
        let mut request = connection.request(Method::Post, "/gen");
        request
            .header("Content-Type", "application/json")
            .body(b"{\"x\":1}".to_vec());
        let mut response = BufferedResponse::new();
        connection.send(&request, &mut response).await.unwrap();
        assert_eq!(response.code(), 200);
        assert_eq!(response.body, b"{\"html\":\"x\"}");
        assert!(response.complete);

        let sent = server.await.unwrap();
        assert!(sent.starts_with("POST /gen HTTP/1.1\r\n"));
        assert!(sent.contains(&format!("Host: 127.0.0.1:{}\r\n", port)));
        assert!(sent.contains("Content-Length: 7\r\n"));
    }
}
