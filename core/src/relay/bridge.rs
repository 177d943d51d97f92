/*
 * bridge.rs
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

//! One connection pair: the client-facing responder, the next-hop client, and the body
//! pipeline between them. Everything for the pair runs on a single task; the tracker
//! call is the only work spawned off it.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::ProxyConfig;
use crate::error::{ProxyError, TrackerError};
use crate::mime::SplitEvent;
use crate::net;
use crate::protocol::smtp::{
    ClientEvent, DataOutcome, Reply, ReplyError, Responder, Upstream, UpstreamEvent,
};
use crate::relay::context::{MailTransferContext, SessionLog};
use crate::tracker::{generate_with_timeout, TrackerHandler, TrackerResult};

const READ_BUFFER_SIZE: usize = 8192;

type TrackerTask = JoinHandle<Result<TrackerResult, TrackerError>>;

pub struct RelayBridge<DR, DW, UR, UW> {
    config: Arc<ProxyConfig>,
    handler: Arc<dyn TrackerHandler>,
    client_reader: DR,
    upstream_reader: UR,
    responder: Responder<DW>,
    upstream: Upstream<UW>,
    log: SessionLog,
    transfer: Option<MailTransferContext>,
    tracker: Option<TrackerTask>,
    closed: bool,
}

impl<DR, DW> RelayBridge<DR, DW, OwnedReadHalf, OwnedWriteHalf>
where
    DR: AsyncRead + Unpin,
    DW: AsyncWrite + Unpin,
{
    /// Open the next-hop connection for a freshly accepted client.
    pub async fn connect(
        config: Arc<ProxyConfig>,
        handler: Arc<dyn TrackerHandler>,
        client_reader: DR,
        client_writer: DW,
    ) -> Result<Self, ProxyError> {
        let stream = net::connect_next_hop(&config.next_hop).await?;
        let (upstream_reader, upstream_writer) = stream.into_split();
        Ok(Self::new(
            config,
            handler,
            client_reader,
            client_writer,
            upstream_reader,
            upstream_writer,
        ))
    }
}

impl<DR, DW, UR, UW> RelayBridge<DR, DW, UR, UW>
where
    DR: AsyncRead + Unpin,
    DW: AsyncWrite + Unpin,
    UR: AsyncRead + Unpin,
    UW: AsyncWrite + Unpin,
{
    pub fn new(
        config: Arc<ProxyConfig>,
        handler: Arc<dyn TrackerHandler>,
        client_reader: DR,
        client_writer: DW,
        upstream_reader: UR,
        upstream_writer: UW,
    ) -> Self {
        let lmtp = config.lmtp;
        Self {
            responder: Responder::new(client_writer, Arc::clone(&config)),
            upstream: Upstream::new(upstream_writer, lmtp),
            config,
            handler,
            client_reader,
            upstream_reader,
            log: SessionLog::new(),
            transfer: None,
            tracker: None,
            closed: false,
        }
    }

    /// Drive the pair until either side goes away. Fatal errors close both legs before
    /// they are returned.
    pub async fn run(&mut self) -> Result<(), ProxyError> {
        let result = self.run_loop().await;
        if let Err(e) = &result {
            error!(error = %e, "connection pair failed");
        }
        self.close().await;
        result
    }

    async fn run_loop(&mut self) -> Result<(), ProxyError> {
        let mut client_buf = vec![0u8; READ_BUFFER_SIZE];
        let mut upstream_buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            tokio::select! {
                read = self.client_reader.read(&mut client_buf) => {
                    let n = read?;
                    if n == 0 {
                        info!("client disconnected");
                        return Ok(());
                    }
                    self.responder.receive(&client_buf[..n]);
                }
                read = self.upstream_reader.read(&mut upstream_buf) => {
                    let n = read?;
                    if n == 0 {
                        if self.upstream.is_closing() {
                            return Ok(());
                        }
                        return Err(ProxyError::Transport(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "next hop closed the connection",
                        )));
                    }
                    self.upstream.receive(&upstream_buf[..n]);
                }
                joined = wait_tracker(&mut self.tracker) => {
                    self.tracker = None;
                    self.on_tracker_result(joined);
                }
            }
            self.pump().await?;
            if self.responder.is_closed() {
                return Ok(());
            }
        }
    }

    /// Process everything buffered on both legs until neither makes progress.
    async fn pump(&mut self) -> Result<(), ProxyError> {
        loop {
            let mut progressed = false;
            while let Some(event) = self.upstream.next_event().await? {
                progressed = true;
                self.on_upstream_event(event).await?;
            }
            if let Some(event) = self.responder.next_event().await? {
                progressed = true;
                self.on_client_event(event).await?;
            }
            self.flush_transfer().await?;
            if !progressed || self.responder.is_closed() {
                return Ok(());
            }
        }
    }

    async fn on_upstream_event(&mut self, event: UpstreamEvent) -> Result<(), ProxyError> {
        match event {
            UpstreamEvent::Ready => self.responder.greet().await?,
            UpstreamEvent::Relay(reply) => self.responder.relay(&reply).await?,
            UpstreamEvent::DataReady { terminator } => {
                debug!(terminator = ?String::from_utf8_lossy(&terminator), "next hop ready for content");
                if let Some(transfer) = self.transfer.as_mut() {
                    transfer.terminator = Some(terminator);
                }
            }
            UpstreamEvent::DataComplete(replies) => {
                let outcome = self.data_outcome(replies);
                info!(message_id = ?self.transfer.as_ref().and_then(|t| t.message_id.as_deref()), "transfer complete");
                self.end_transfer();
                self.responder.complete_data(outcome).await?;
            }
        }
        Ok(())
    }

    async fn on_client_event(&mut self, event: ClientEvent) -> Result<(), ProxyError> {
        match event {
            ClientEvent::Command { name, line } => {
                self.log.record(&name, &line);
                self.upstream.send_command(&name, &line).await?;
            }
            ClientEvent::DataStart => {
                self.transfer = Some(MailTransferContext::new());
                self.upstream.request_data().await?;
            }
            ClientEvent::Body(bytes) => {
                let mut events = Vec::new();
                if let Some(transfer) = self.transfer.as_mut() {
                    transfer.splitter.receive(&bytes, &mut events);
                }
                self.push_split_events(events);
            }
            ClientEvent::BodyOverflow => {
                let limit = self.config.max_data_bytes;
                let e = ProxyError::OversizedMessage { limit };
                warn!(limit, "message too large, closing");
                self.end_transfer();
                // Replies still owed ahead of the 552 would never come: write it now.
                self.responder.abort(&Reply::new(552, e.to_string())).await?;
                self.close().await;
            }
            ClientEvent::BodyEnd => {
                let mut events = Vec::new();
                if let Some(transfer) = self.transfer.as_mut() {
                    transfer.splitter.finish(&mut events);
                    transfer.body_complete = true;
                }
                self.push_split_events(events);
            }
        }
        Ok(())
    }

    /// Feed split events to the rewriter; the root header block starts the tracker.
    fn push_split_events(&mut self, events: Vec<SplitEvent>) {
        let Some(transfer) = self.transfer.as_mut() else {
            return;
        };
        for event in events {
            if let SplitEvent::Node(node) = &event {
                if node.root && !transfer.tracker_requested {
                    transfer.tracker_requested = true;
                    let request = transfer.tracker_request(&node.headers, &self.log);
                    let handler = Arc::clone(&self.handler);
                    let timeout = self.config.tracker_timeout;
                    debug!(headers = request.headers.len(), "requesting tracker");
                    self.tracker = Some(tokio::spawn(async move {
                        generate_with_timeout(handler.as_ref(), request, timeout).await
                    }));
                }
            }
            transfer.rewriter.push(event);
        }
    }

    fn on_tracker_result(&mut self, joined: Result<Result<TrackerResult, TrackerError>, JoinError>) {
        let result = match joined {
            Ok(Ok(result)) => {
                debug!(?result, "tracker generated");
                Some(result)
            }
            Ok(Err(e)) => {
                warn!(error = %ProxyError::from(e), "relaying message unmodified");
                None
            }
            Err(join_error) => {
                let e = if join_error.is_panic() {
                    TrackerError::Panicked
                } else {
                    TrackerError::Io(std::io::Error::new(
                        std::io::ErrorKind::Interrupted,
                        join_error.to_string(),
                    ))
                };
                warn!(error = %ProxyError::from(e), "relaying message unmodified");
                None
            }
        };
        if let Some(transfer) = self.transfer.as_mut() {
            transfer.rewriter.resolve(result);
        }
    }

    /// Copy whatever the rewriter can release to the next hop, and close the content
    /// once the whole body has gone out.
    async fn flush_transfer(&mut self) -> Result<(), ProxyError> {
        let Some(transfer) = self.transfer.as_mut() else {
            return Ok(());
        };
        let Some(terminator) = transfer.terminator.as_ref() else {
            return Ok(());
        };
        if transfer.content_ended {
            return Ok(());
        }
        let ready = transfer.rewriter.drain_ready();
        self.upstream.write_content(&ready).await?;
        if transfer.body_complete && transfer.rewriter.is_empty() {
            transfer.content_ended = true;
            self.upstream.end_content(terminator).await?;
        }
        Ok(())
    }

    fn data_outcome(&self, replies: Vec<Reply>) -> DataOutcome {
        let to_result = |reply: &Reply| {
            if reply.code >= 400 {
                Err(ReplyError {
                    code: Some(reply.code),
                    message: reply.message().to_string(),
                })
            } else {
                Ok(reply.message().to_string())
            }
        };
        if self.config.lmtp {
            return DataOutcome::PerRecipient(replies.iter().map(to_result).collect());
        }
        match replies.last().map(to_result) {
            Some(Ok(text)) => DataOutcome::Accepted(text),
            Some(Err(e)) => DataOutcome::Rejected(e),
            None => DataOutcome::Rejected(ReplyError {
                code: None,
                message: "no reply from next hop".to_string(),
            }),
        }
    }

    /// Drop the transfer state. A tracker call still running is left to finish on its
    /// own; its result is discarded. The command log carries over.
    fn end_transfer(&mut self) {
        self.transfer = None;
        self.tracker = None;
    }

    /// Close both legs. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.upstream.close().await;
        self.responder.close().await;
        info!(transactions = self.responder.transactions(), "session closed");
    }
}

async fn wait_tracker(
    slot: &mut Option<TrackerTask>,
) -> Result<Result<TrackerResult, TrackerError>, JoinError> {
    match slot.as_mut() {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}
