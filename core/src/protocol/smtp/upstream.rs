/*
 * upstream.rs
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

//! Upstream (next-hop-facing) SMTP client state: greeting wait, pipelined command
//! forwarding, and the one-shot interceptors that take over the replies to DATA.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::ProxyError;
use crate::protocol::smtp::dot_stuffer::DotStuffer;
use crate::protocol::smtp::pipeline::PipelineQueue;
use crate::protocol::smtp::reply::{Reply, ReplyAssembler};
use crate::protocol::smtp::stream::{SmtpStream, StreamEvent};

/// End-of-data sequence when the 354 text names none.
pub const DEFAULT_TERMINATOR: &[u8] = b"\r\n.\r\n";

#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// The initial 220 arrived.
    Ready,
    /// A reply to a forwarded command.
    Relay(Reply),
    /// DATA was answered with 354; content may be sent, closed by `terminator`.
    DataReady { terminator: Vec<u8> },
    /// Final DATA replies: one, or one per accepted recipient in LMTP mode.
    DataComplete(Vec<Reply>),
}

enum Deferred {
    Data,
}

enum Interceptor {
    ExpectDataReady,
    DataCompletion { remaining: usize, collected: Vec<Reply> },
}

pub struct Upstream<W> {
    writer: W,
    stream: SmtpStream,
    assembler: ReplyAssembler,
    queue: PipelineQueue<Deferred>,
    ready: bool,
    closing: bool,
    interceptor: Option<Interceptor>,
    stuffer: DotStuffer,
    lmtp: bool,
    accepted_recipients: usize,
}

impl<W: AsyncWrite + Unpin> Upstream<W> {
    pub fn new(writer: W, lmtp: bool) -> Self {
        Self {
            writer,
            stream: SmtpStream::new(),
            assembler: ReplyAssembler::new(),
            queue: PipelineQueue::new(),
            ready: false,
            closing: false,
            interceptor: None,
            stuffer: DotStuffer::new(),
            lmtp,
            accepted_recipients: 0,
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Feed bytes read from the next hop.
    pub fn receive(&mut self, data: &[u8]) {
        self.stream.receive(data);
    }

    /// Next complete reply turned into an event. None when more input is needed.
    pub async fn next_event(&mut self) -> Result<Option<UpstreamEvent>, ProxyError> {
        while let Some(event) = self.stream.next_event() {
            let StreamEvent::Line(line) = event else {
                continue;
            };
            debug!(line = %String::from_utf8_lossy(&line), "R:");
            let Some(reply) = self.assembler.push(&line) else {
                continue;
            };
            if let Some(event) = self.on_reply(reply).await? {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    async fn on_reply(&mut self, reply: Reply) -> Result<Option<UpstreamEvent>, ProxyError> {
        if !self.ready {
            if reply.code != 220 {
                return Err(ProxyError::ProtocolViolation(format!(
                    "unexpected greeting from next hop: {}",
                    reply.lines.join(" / ")
                )));
            }
            self.ready = true;
            info!("next hop ready");
            return Ok(Some(UpstreamEvent::Ready));
        }
        let name = self.queue.ack();
        let event = match self.interceptor.take() {
            Some(Interceptor::ExpectDataReady) => {
                if reply.code != 354 {
                    return Err(ProxyError::ProtocolViolation(format!(
                        "DATA answered with {}",
                        reply.code
                    )));
                }
                let remaining = if self.lmtp {
                    self.accepted_recipients.max(1)
                } else {
                    1
                };
                self.interceptor = Some(Interceptor::DataCompletion {
                    remaining,
                    collected: Vec::with_capacity(remaining),
                });
                Some(UpstreamEvent::DataReady {
                    terminator: parse_terminator(reply.message()),
                })
            }
            Some(Interceptor::DataCompletion {
                remaining,
                mut collected,
            }) => {
                collected.push(reply);
                if remaining > 1 {
                    self.interceptor = Some(Interceptor::DataCompletion {
                        remaining: remaining - 1,
                        collected,
                    });
                    None
                } else {
                    self.accepted_recipients = 0;
                    Some(UpstreamEvent::DataComplete(collected))
                }
            }
            None => {
                match name.as_deref() {
                    Some("MAIL") | Some("RSET") | Some("EHLO") | Some("HELO") | Some("LHLO") => {
                        self.accepted_recipients = 0
                    }
                    Some("RCPT") if reply.is_positive() => self.accepted_recipients += 1,
                    _ => {}
                }
                Some(UpstreamEvent::Relay(reply))
            }
        };
        self.flush_deferred().await?;
        Ok(event)
    }

    /// Forward a client command line verbatim.
    pub async fn send_command(&mut self, name: &str, line: &str) -> Result<(), ProxyError> {
        if self.closing {
            return Ok(());
        }
        self.queue.sent(name);
        self.write_line(line).await
    }

    /// Queue DATA behind every command still awaiting a reply.
    pub async fn request_data(&mut self) -> Result<(), ProxyError> {
        if self.closing {
            return Ok(());
        }
        if let Some(item) = self.queue.defer("DATA", Deferred::Data) {
            self.emit(item).await?;
        }
        Ok(())
    }

    /// Forward message content, dot-stuffed.
    pub async fn write_content(&mut self, content: &[u8]) -> Result<(), ProxyError> {
        if self.closing || content.is_empty() {
            return Ok(());
        }
        let mut out = Vec::with_capacity(content.len() + 16);
        self.stuffer
            .process_chunk(content, |s| out.extend_from_slice(s));
        self.writer.write_all(&out).await?;
        Ok(())
    }

    /// Close the content with the terminator learned from the 354 reply. The final
    /// replies are counted as in flight.
    pub async fn end_content(&mut self, terminator: &[u8]) -> Result<(), ProxyError> {
        if self.closing {
            return Ok(());
        }
        let mut out = Vec::with_capacity(terminator.len() + 2);
        self.stuffer
            .end_message(terminator, |s| out.extend_from_slice(s));
        self.writer.write_all(&out).await?;
        self.writer.flush().await?;
        if let Some(Interceptor::DataCompletion { remaining, .. }) = &self.interceptor {
            for _ in 0..*remaining {
                self.queue.sent(".");
            }
        }
        Ok(())
    }

    /// Send QUIT and end the connection. Idempotent.
    pub async fn close(&mut self) {
        if self.closing {
            return;
        }
        self.closing = true;
        if self.ready {
            let _ = self.write_line("QUIT").await;
        }
        let _ = self.writer.shutdown().await;
        info!("next hop connection closed");
    }

    async fn flush_deferred(&mut self) -> Result<(), ProxyError> {
        while let Some(item) = self.queue.dispatch() {
            self.emit(item).await?;
        }
        Ok(())
    }

    async fn emit(&mut self, item: Deferred) -> Result<(), ProxyError> {
        match item {
            Deferred::Data => {
                self.interceptor = Some(Interceptor::ExpectDataReady);
                self.write_line("DATA").await
            }
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), ProxyError> {
        debug!(line = %line, "F:");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Terminator announced by `End data with <CR><LF>.<CR><LF>`, with the angle-bracket
/// names turned into bytes.
pub fn parse_terminator(message: &str) -> Vec<u8> {
    let announced = message
        .strip_prefix("End data with ")
        .map(|t| t.replace("<CR>", "\r").replace("<LF>", "\n"))
        .filter(|t| !t.is_empty());
    match announced {
        Some(t) => t.into_bytes(),
        None => DEFAULT_TERMINATOR.to_vec(),
    }
}
