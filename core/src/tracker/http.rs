/*
 * http.rs
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

//! URL binding: POST the request as JSON and parse the JSON response body.

use tracing::debug;

use crate::error::TrackerError;
use crate::protocol::http::{BufferedResponse, HttpClient, Method};
use crate::tracker::{TrackerFuture, TrackerHandler, TrackerRequest, TrackerResult};
use crate::uri::HttpUrl;

#[derive(Debug, Clone)]
pub struct HttpTracker {
    url: HttpUrl,
}

impl HttpTracker {
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        Ok(Self { url: url.parse()? })
    }

    pub fn url(&self) -> &HttpUrl {
        &self.url
    }
}

impl TrackerHandler for HttpTracker {
    fn generate(&self, request: TrackerRequest) -> TrackerFuture {
        let url = self.url.clone();
        Box::pin(async move { post(&url, &request).await })
    }
}

async fn post(url: &HttpUrl, request: &TrackerRequest) -> Result<TrackerResult, TrackerError> {
    let body = serde_json::to_vec(request)?;
    let mut connection = HttpClient::connect(&url.host, url.port, url.secure).await?;
    let mut http_request = connection.request(Method::Post, url.path.clone());
    http_request
        .header("Content-Type", "application/json")
        .header("Accept", "application/json")
        .body(body);
    let mut response = BufferedResponse::new();
    connection.send(&http_request, &mut response).await?;
    let _ = connection.shutdown().await;
    debug!(url = %url, status = response.code(), bytes = response.body.len(), "tracker response");
    if !(200..300).contains(&response.code()) {
        return Err(TrackerError::Http {
            status: response.code(),
        });
    }
    TrackerResult::from_json(&response.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(response: &'static [u8]) -> (u16, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
                if n == 0 || received.ends_with(b"]}") {
                    break;
                }
            }
            socket.write_all(response).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8(received).unwrap()
        });
        (port, task)
    }

    fn request() -> TrackerRequest {
        TrackerRequest {
            message_id: None,
            headers: Vec::new(),
            commands: Vec::new(),
        }
    }

    #[tokio::test]
    async fn posts_json_and_parses_image() {
        let (port, server) = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"imageSrc\":\"http://t/x.png\"}",
        )
        .await;
        let tracker = HttpTracker::new(&format!("http://127.0.0.1:{}/generate", port)).unwrap();
        let result = tracker.generate(request()).await.unwrap();
        assert_eq!(
            result,
            TrackerResult::ImageDescriptor {
                src: "http://t/x.png".into(),
                alt: None,
                styles: Default::default(),
            }
        );
        let sent = server.await.unwrap();
        assert!(sent.starts_with("POST /generate HTTP/1.1\r\n"));
        assert!(sent.ends_with("{\"headers\":[],\"commands\":[]}"));
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let (port, _server) =
            serve_once(b"HTTP/1.1 503 Unavailable\r\nContent-Length: 0\r\n\r\n").await;
        let tracker = HttpTracker::new(&format!("http://127.0.0.1:{}/", port)).unwrap();
        assert!(matches!(
            tracker.generate(request()).await,
            Err(TrackerError::Http { status: 503 })
        ));
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            HttpTracker::new("file:///tmp/handler"),
            Err(TrackerError::InvalidUrl(_))
        ));
    }
}
