/*
 * responder.rs
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

//! Downstream (client-facing) SMTP state machine.
//!
//! States: awaiting-ready, ready, data mode, closed. Every reply written to the client
//! goes through the pipelining queue, so locally generated replies (354, 221, DATA
//! completion) never overtake replies still owed for earlier pipelined commands.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::config::ProxyConfig;
use crate::protocol::smtp::pipeline::PipelineQueue;
use crate::protocol::smtp::reply::Reply;
use crate::protocol::smtp::stream::{SmtpStream, StreamEvent};

/// Consecutive unrecognized commands tolerated before the session is dropped.
const MAX_UNRECOGNIZED: u32 = 10;

const HTTP_METHODS: &[&str] = &[
    "OPTIONS", "GET", "HEAD", "POST", "PUT", "DELETE", "TRACE", "CONNECT",
];

/// What the relay has to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A command to forward upstream. `name` is upper-cased; `line` is verbatim.
    Command { name: String, line: String },
    /// DATA accepted locally; body events follow.
    DataStart,
    Body(Vec<u8>),
    /// The body went over the size limit; later body bytes are dropped.
    BodyOverflow,
    BodyEnd,
}

/// A failed DATA transaction (or one recipient of it).
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyError {
    /// Reply code; 450 when absent.
    pub code: Option<u16>,
    pub message: String,
}

/// How a DATA transaction ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DataOutcome {
    Accepted(String),
    Rejected(ReplyError),
    /// LMTP: one result per accepted recipient.
    PerRecipient(Vec<Result<String, ReplyError>>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    AwaitingReady,
    Ready,
    Data,
    Closed,
}

struct Outgoing {
    bytes: Vec<u8>,
    close_after: bool,
}

pub struct Responder<W> {
    writer: W,
    stream: SmtpStream,
    queue: PipelineQueue<Outgoing>,
    config: Arc<ProxyConfig>,
    phase: Phase,
    transactions: u64,
    unrecognized: u32,
    /// QUIT accepted: nothing after it is read.
    quitting: bool,
}

impl<W: AsyncWrite + Unpin> Responder<W> {
    pub fn new(writer: W, config: Arc<ProxyConfig>) -> Self {
        Self {
            writer,
            stream: SmtpStream::new(),
            queue: PipelineQueue::new(),
            config,
            phase: Phase::AwaitingReady,
            transactions: 0,
            unrecognized: 0,
            quitting: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    /// Completed DATA transactions.
    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    /// Feed bytes read from the client.
    pub fn receive(&mut self, data: &[u8]) {
        if self.phase != Phase::Closed {
            self.stream.receive(data);
        }
    }

    /// Send the 220 greeting; commands are accepted from now on.
    pub async fn greet(&mut self) -> std::io::Result<()> {
        if self.phase != Phase::AwaitingReady {
            return Ok(());
        }
        self.phase = Phase::Ready;
        let greeting = Reply::new(220, self.config.greeting());
        self.write_now(&greeting.to_bytes()).await
    }

    /// Next event for the relay, handling QUIT, DATA and early or bogus input locally.
    /// None when more input is needed.
    pub async fn next_event(&mut self) -> std::io::Result<Option<ClientEvent>> {
        loop {
            if self.phase == Phase::Closed || self.quitting {
                return Ok(None);
            }
            let Some(event) = self.stream.next_event() else {
                return Ok(None);
            };
            match event {
                StreamEvent::Data(bytes) => return Ok(Some(ClientEvent::Body(bytes))),
                StreamEvent::DataOverflow => return Ok(Some(ClientEvent::BodyOverflow)),
                StreamEvent::DataEnd => return Ok(Some(ClientEvent::BodyEnd)),
                StreamEvent::Line(raw) => {
                    let line = String::from_utf8_lossy(&raw).into_owned();
                    if let Some(event) = self.on_line(line).await? {
                        return Ok(Some(event));
                    }
                }
            }
        }
    }

    async fn on_line(&mut self, line: String) -> std::io::Result<Option<ClientEvent>> {
        debug!(line = %line, "C:");
        if is_http_request(&line) {
            info!("HTTP request on SMTP port, closing");
            let reply = Reply::new(
                421,
                format!("{} You talk HTTP to an SMTP server", self.config.hostname),
            );
            self.write_now(&reply.to_bytes()).await?;
            self.close().await;
            return Ok(None);
        }
        if self.phase == Phase::AwaitingReady {
            let reply = Reply::new(421, format!("{} You talk too soon", self.config.hostname));
            self.write_now(&reply.to_bytes()).await?;
            self.close().await;
            return Ok(None);
        }
        let name = command_name(&line);
        match name.as_str() {
            "" => {
                self.reject_unrecognized("Error: bad syntax").await?;
                Ok(None)
            }
            "QUIT" => {
                self.quitting = true;
                let reply = Reply::new(221, "Bye");
                self.defer("QUIT", reply.to_bytes(), true).await?;
                Ok(None)
            }
            "DATA" => {
                self.phase = Phase::Data;
                self.stream.start_data_mode(self.config.max_data_bytes);
                let reply = Reply::new(354, "End data with <CR><LF>.<CR><LF>");
                self.defer("DATA", reply.to_bytes(), false).await?;
                Ok(Some(ClientEvent::DataStart))
            }
            "HELO" | "EHLO" if self.config.lmtp => {
                self.reject_unrecognized("Error: command not recognized").await?;
                Ok(None)
            }
            _ => {
                self.queue.sent(name.as_str());
                Ok(Some(ClientEvent::Command { name, line }))
            }
        }
    }

    /// Write an upstream reply back to the client, acknowledging the oldest command.
    pub async fn relay(&mut self, reply: &Reply) -> std::io::Result<()> {
        if self.phase == Phase::Closed {
            return Ok(());
        }
        self.write_now(&reply.to_bytes()).await?;
        self.queue.ack();
        if matches!(reply.code, 500 | 502) {
            self.unrecognized += 1;
        } else {
            self.unrecognized = 0;
        }
        if self.unrecognized >= MAX_UNRECOGNIZED {
            return self.too_many_unrecognized().await;
        }
        self.flush_deferred().await
    }

    /// Finish the DATA transaction: queue the final reply (or one per LMTP recipient)
    /// and go back to reading commands.
    pub async fn complete_data(&mut self, outcome: DataOutcome) -> std::io::Result<()> {
        let replies = match outcome {
            DataOutcome::Accepted(text) => vec![Reply::new(250, text)],
            DataOutcome::Rejected(e) => vec![error_reply(&e)],
            DataOutcome::PerRecipient(results) => results
                .iter()
                .map(|r| match r {
                    Ok(text) => Reply::new(250, text),
                    Err(e) => error_reply(e),
                })
                .collect(),
        };
        for reply in replies {
            self.defer("DATA", reply.to_bytes(), false).await?;
        }
        self.transactions += 1;
        self.unrecognized = 0;
        if self.phase == Phase::Data {
            self.phase = Phase::Ready;
        }
        self.stream.resume();
        Ok(())
    }

    /// Write `reply` at once, ahead of anything still queued, and close. For failures
    /// after which no queued reply will ever be sent.
    pub async fn abort(&mut self, reply: &Reply) -> std::io::Result<()> {
        let result = self.write_now(&reply.to_bytes()).await;
        self.close().await;
        result
    }

    /// End the client stream. Idempotent.
    pub async fn close(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        self.phase = Phase::Closed;
        let _ = self.writer.shutdown().await;
        info!(
            transactions = self.transactions,
            unread = self.stream.buffered(),
            "client connection closed"
        );
    }

    async fn too_many_unrecognized(&mut self) -> std::io::Result<()> {
        let reply = Reply::new(
            421,
            format!("{} Error: too many unrecognized commands", self.config.hostname),
        );
        self.write_now(&reply.to_bytes()).await?;
        self.close().await;
        Ok(())
    }

    async fn reject_unrecognized(&mut self, text: &str) -> std::io::Result<()> {
        self.unrecognized += 1;
        if self.unrecognized >= MAX_UNRECOGNIZED {
            return self.too_many_unrecognized().await;
        }
        let reply = Reply::new(500, text);
        self.defer("ERROR", reply.to_bytes(), false).await
    }

    async fn defer(&mut self, name: &str, bytes: Vec<u8>, close_after: bool) -> std::io::Result<()> {
        if let Some(item) = self.queue.defer(name, Outgoing { bytes, close_after }) {
            self.emit(item).await?;
        }
        self.flush_deferred().await
    }

    async fn flush_deferred(&mut self) -> std::io::Result<()> {
        while self.phase != Phase::Closed {
            let Some(item) = self.queue.dispatch() else {
                break;
            };
            self.emit(item).await?;
        }
        Ok(())
    }

    /// Write a dispatched item; its write completion is the acknowledgment.
    async fn emit(&mut self, item: Outgoing) -> std::io::Result<()> {
        self.write_now(&item.bytes).await?;
        self.queue.ack();
        if item.close_after {
            self.close().await;
        }
        Ok(())
    }

    async fn write_now(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        if self.phase == Phase::Closed {
            return Ok(());
        }
        debug!(reply = %String::from_utf8_lossy(bytes).trim_end(), "S:");
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }
}

fn error_reply(e: &ReplyError) -> Reply {
    Reply::new(e.code.unwrap_or(450), &e.message)
}

/// Upper-cased first word of a command line.
fn command_name(line: &str) -> String {
    line.split(' ')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_uppercase()
}

/// `METHOD /path HTTP/x.y`
fn is_http_request(line: &str) -> bool {
    let mut parts = line.split(' ');
    let (Some(method), Some(path), Some(version)) = (parts.next(), parts.next(), parts.last())
    else {
        return false;
    };
    HTTP_METHODS.iter().any(|m| m.eq_ignore_ascii_case(method))
        && path.starts_with('/')
        && version.len() == 8
        && version.get(..5).is_some_and(|v| v.eq_ignore_ascii_case("HTTP/"))
        && version.as_bytes()[5].is_ascii_digit()
        && version.as_bytes()[6] == b'.'
        && version.as_bytes()[7].is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NextHop;
    use tokio::io::AsyncReadExt;

    fn config(lmtp: bool) -> Arc<ProxyConfig> {
        let mut config = ProxyConfig::new(NextHop::new("upstream", 25));
        config.hostname = "mx".into();
        config.lmtp = lmtp;
        config.max_data_bytes = 64;
        Arc::new(config)
    }

    async fn read_all<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> String {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn http_request_detection() {
        assert!(is_http_request("GET / HTTP/1.1"));
        assert!(is_http_request("post /x?y HTTP/1.0"));
        assert!(!is_http_request("MAIL FROM:<a@b>"));
        assert!(!is_http_request("GET"));
        assert!(!is_http_request("GET / HTTP/1.10"));
    }

    #[test]
    fn command_names() {
        assert_eq!(command_name("mail FROM:<a@b>"), "MAIL");
        assert_eq!(command_name("NOOP"), "NOOP");
        assert_eq!(command_name(""), "");
    }

    #[tokio::test]
    async fn too_soon_before_greeting() {
        let (client, server) = tokio::io::duplex(1024);
        let (mut client_read, _client_write) = tokio::io::split(client);
        let (_server_read, server_write) = tokio::io::split(server);
        let mut responder = Responder::new(server_write, config(false));
        responder.receive(b"EHLO me\r\n");
        assert_eq!(responder.next_event().await.unwrap(), None);
        assert!(responder.is_closed());
        assert_eq!(read_all(&mut client_read).await, "421 mx You talk too soon\r\n");
    }

    #[tokio::test]
    async fn quit_reply_waits_for_pipelined_replies() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut client_read, _client_write) = tokio::io::split(client);
        let (_server_read, server_write) = tokio::io::split(server);
        let mut responder = Responder::new(server_write, config(false));
        responder.greet().await.unwrap();
        responder.receive(b"NOOP\r\nQUIT\r\n");
        assert_eq!(
            responder.next_event().await.unwrap(),
            Some(ClientEvent::Command {
                name: "NOOP".into(),
                line: "NOOP".into()
            })
        );
        assert_eq!(responder.next_event().await.unwrap(), None);
        assert!(!responder.is_closed());
        responder.relay(&Reply::new(250, "2.0.0 Ok")).await.unwrap();
        assert!(responder.is_closed());
        assert_eq!(
            read_all(&mut client_read).await,
            "220 mx ESMTP smtptrack\r\n250 2.0.0 Ok\r\n221 Bye\r\n"
        );
    }

    #[tokio::test]
    async fn data_lifecycle_and_lmtp_completion() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut client_read, _client_write) = tokio::io::split(client);
        let (_server_read, server_write) = tokio::io::split(server);
        let mut responder = Responder::new(server_write, config(true));
        responder.greet().await.unwrap();
        responder.receive(b"EHLO x\r\nDATA\r\nhello\r\n.\r\nQUIT\r\n");
        assert_eq!(responder.next_event().await.unwrap(), Some(ClientEvent::DataStart));
        assert_eq!(
            responder.next_event().await.unwrap(),
            Some(ClientEvent::Body(b"hello".to_vec()))
        );
        assert_eq!(responder.next_event().await.unwrap(), Some(ClientEvent::BodyEnd));
        assert_eq!(responder.next_event().await.unwrap(), None);
        responder
            .complete_data(DataOutcome::PerRecipient(vec![
                Ok("2.0.0 delivered".into()),
                Err(ReplyError {
                    code: Some(552),
                    message: "mailbox full".into(),
                }),
                Err(ReplyError {
                    code: None,
                    message: "later".into(),
                }),
            ]))
            .await
            .unwrap();
        assert_eq!(responder.transactions(), 1);
        assert_eq!(responder.next_event().await.unwrap(), None);
        assert!(responder.is_closed());
        assert_eq!(
            read_all(&mut client_read).await,
            "220 mx LMTP smtptrack\r\n\
500 Error: command not recognized\r\n\
354 End data with <CR><LF>.<CR><LF>\r\n\
250 2.0.0 delivered\r\n\
552 mailbox full\r\n\
450 later\r\n\
221 Bye\r\n"
        );
    }

    fn command(name: &str, line: &str) -> Option<ClientEvent> {
        Some(ClientEvent::Command {
            name: name.into(),
            line: line.into(),
        })
    }

    #[tokio::test]
    async fn local_reply_keeps_its_place_among_pipelined_commands() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut client_read, _client_write) = tokio::io::split(client);
        let (_server_read, server_write) = tokio::io::split(server);
        let mut responder = Responder::new(server_write, config(true));
        responder.greet().await.unwrap();
        responder.receive(b"MAIL FROM:<a@b>\r\nEHLO x\r\nRCPT TO:<c@d>\r\n");
        assert_eq!(
            responder.next_event().await.unwrap(),
            command("MAIL", "MAIL FROM:<a@b>")
        );
        assert_eq!(
            responder.next_event().await.unwrap(),
            command("RCPT", "RCPT TO:<c@d>")
        );
        assert_eq!(responder.next_event().await.unwrap(), None);
        responder.relay(&Reply::new(250, "mail ok")).await.unwrap();
        responder.relay(&Reply::new(250, "rcpt ok")).await.unwrap();
        responder.close().await;
        assert_eq!(
            read_all(&mut client_read).await,
            "220 mx LMTP smtptrack\r\n\
250 mail ok\r\n\
500 Error: command not recognized\r\n\
250 rcpt ok\r\n"
        );
    }

    #[tokio::test]
    async fn nothing_after_quit_is_read() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut client_read, _client_write) = tokio::io::split(client);
        let (_server_read, server_write) = tokio::io::split(server);
        let mut responder = Responder::new(server_write, config(false));
        responder.greet().await.unwrap();
        responder.receive(b"NOOP\r\nQUIT\r\nMAIL FROM:<late@x>\r\n");
        assert_eq!(responder.next_event().await.unwrap(), command("NOOP", "NOOP"));
        assert_eq!(responder.next_event().await.unwrap(), None);
        assert_eq!(responder.next_event().await.unwrap(), None);
        responder.relay(&Reply::new(250, "ok")).await.unwrap();
        assert!(responder.is_closed());
        assert_eq!(
            read_all(&mut client_read).await,
            "220 mx ESMTP smtptrack\r\n250 ok\r\n221 Bye\r\n"
        );
    }

    #[tokio::test]
    async fn abort_overtakes_queued_replies() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut client_read, _client_write) = tokio::io::split(client);
        let (_server_read, server_write) = tokio::io::split(server);
        let mut responder = Responder::new(server_write, config(false));
        responder.greet().await.unwrap();
        responder.receive(b"RCPT TO:<c@d>\r\nDATA\r\n");
        assert_eq!(
            responder.next_event().await.unwrap(),
            command("RCPT", "RCPT TO:<c@d>")
        );
        assert_eq!(responder.next_event().await.unwrap(), Some(ClientEvent::DataStart));
        // The 354 still waits for the RCPT reply.
        responder
            .abort(&Reply::new(552, "message exceeds 64 bytes"))
            .await
            .unwrap();
        assert!(responder.is_closed());
        assert_eq!(
            read_all(&mut client_read).await,
            "220 mx ESMTP smtptrack\r\n552 message exceeds 64 bytes\r\n"
        );
    }
}
