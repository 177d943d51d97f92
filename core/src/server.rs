/*
 * server.rs
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

//! Runners: accept loop (one task per connection pair) and a single pair over the
//! process's standard streams.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::relay::RelayBridge;
use crate::tracker::TrackerHandler;

/// Accept clients forever. A failed pair is logged; the listener keeps serving.
pub async fn serve(
    listener: TcpListener,
    config: Arc<ProxyConfig>,
    handler: Arc<dyn TrackerHandler>,
) -> io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), next_hop = %config.next_hop, "listening");
    loop {
        let (socket, peer) = listener.accept().await?;
        if let Err(e) = socket.set_nodelay(true) {
            warn!(error = %e, "cannot set TCP_NODELAY");
        }
        let config = Arc::clone(&config);
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let (reader, writer) = socket.into_split();
            info!(%peer, "client connected");
            if let Err(e) = run_session(config, handler, reader, writer).await {
                warn!(%peer, error = %e, "session ended with error");
            }
        });
    }
}

/// One pair over stdin/stdout, for a parent process that spawned us per connection.
pub async fn serve_stdio(
    config: Arc<ProxyConfig>,
    handler: Arc<dyn TrackerHandler>,
) -> Result<(), ProxyError> {
    run_session(config, handler, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Connect to the next hop and relay until either side goes away.
pub async fn run_session<R, W>(
    config: Arc<ProxyConfig>,
    handler: Arc<dyn TrackerHandler>,
    reader: R,
    writer: W,
) -> Result<(), ProxyError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let span = info_span!("session", id = %session_id());
    async move {
        let mut bridge = match RelayBridge::connect(config, handler, reader, writer).await {
            Ok(bridge) => bridge,
            Err(e) => {
                error!(error = %e, "cannot connect to next hop");
                return Err(e);
            }
        };
        bridge.run().await
    }
    .instrument(span)
    .await
}

static FALLBACK_SESSION: AtomicU64 = AtomicU64::new(1);

/// 10 random bytes as lowercase hex.
pub fn session_id() -> String {
    let mut bytes = [0u8; 10];
    if getrandom::getrandom(&mut bytes).is_err() {
        let n = FALLBACK_SESSION.fetch_add(1, Ordering::Relaxed);
        bytes[..8].copy_from_slice(&n.to_be_bytes());
    }
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_hex_and_distinct() {
        let a = session_id();
        let b = session_id();
        assert_eq!(a.len(), 20);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, b);
    }
}
