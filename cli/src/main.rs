/*
 * main.rs
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

//! smtptrack: transparent SMTP/LMTP proxy that injects tracker content into HTML mail.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{ArgGroup, Parser, ValueEnum};
use tokio::net::TcpListener;
use tracing::{error, info};

use smtptrack_core::{
    serve, serve_stdio, CommandTracker, HttpTracker, NextHop, ProxyConfig, TrackerHandler,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Listen for clients on a TCP port
    #[value(alias = "listen")]
    Socket,
    /// Serve one client over stdin/stdout
    Spawned,
}

#[derive(Parser)]
#[command(name = "smtptrack", version)]
#[command(group(ArgGroup::new("handler").required(true).args(["handler_file", "handler_url"])))]
struct Cli {
    /// Transport towards the client
    #[arg(long, value_enum, default_value = "socket", env = "SMTPTRACK_MODE")]
    mode: Mode,

    #[arg(long, default_value_t = 10025, env = "SMTPTRACK_LISTEN_PORT")]
    listen_port: u16,

    #[arg(long, default_value = "0.0.0.0", env = "SMTPTRACK_LISTEN_HOST")]
    listen_host: String,

    /// Next hop as HOST:PORT
    #[arg(long, value_name = "HOST:PORT", env = "SMTPTRACK_NEXT_HOP",
          conflicts_with_all = ["next_hop_host", "next_hop_port"])]
    next_hop: Option<NextHop>,

    #[arg(long, value_name = "HOST", env = "SMTPTRACK_NEXT_HOP_HOST", requires = "next_hop_port")]
    next_hop_host: Option<String>,

    #[arg(long, value_name = "PORT", env = "SMTPTRACK_NEXT_HOP_PORT", requires = "next_hop_host")]
    next_hop_port: Option<u16>,

    /// Executable that reads a tracker request as JSON on stdin and prints the result
    #[arg(long, value_name = "PATH", env = "SMTPTRACK_HANDLER_FILE")]
    handler_file: Option<PathBuf>,

    /// URL the tracker request is POSTed to
    #[arg(long, value_name = "URL", env = "SMTPTRACK_HANDLER_URL")]
    handler_url: Option<String>,

    /// Speak LMTP towards the client and the next hop
    #[arg(long, env = "SMTPTRACK_LMTP")]
    lmtp: bool,

    #[arg(long, value_name = "BYTES", env = "SMTPTRACK_MAX_DATA_BYTES")]
    max_data_bytes: Option<usize>,

    /// Name announced in the greeting
    #[arg(long, env = "SMTPTRACK_HOSTNAME")]
    hostname: Option<String>,

    /// Give up on the tracker after this many milliseconds and relay unmodified
    #[arg(long, value_name = "MS", env = "SMTPTRACK_TRACKER_TIMEOUT_MS")]
    tracker_timeout_ms: Option<u64>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn next_hop(&self) -> anyhow::Result<NextHop> {
        if let Some(hop) = &self.next_hop {
            return Ok(hop.clone());
        }
        match (&self.next_hop_host, self.next_hop_port) {
            (Some(host), Some(port)) => Ok(NextHop::new(host.clone(), port)),
            _ => bail!("a next hop is required: --next-hop HOST:PORT or --next-hop-host with --next-hop-port"),
        }
    }

    fn config(&self) -> anyhow::Result<ProxyConfig> {
        let mut config = ProxyConfig::new(self.next_hop()?);
        config.lmtp = self.lmtp;
        if let Some(max) = self.max_data_bytes {
            config.max_data_bytes = max;
        }
        if let Some(hostname) = &self.hostname {
            config.hostname = hostname.clone();
        }
        config.tracker_timeout = self.tracker_timeout_ms.map(Duration::from_millis);
        Ok(config)
    }

    fn handler(&self) -> anyhow::Result<Arc<dyn TrackerHandler>> {
        match (&self.handler_file, &self.handler_url) {
            (Some(path), None) => Ok(Arc::new(CommandTracker::new(path.clone()))),
            (None, Some(url)) => {
                let tracker = HttpTracker::new(url)
                    .with_context(|| format!("invalid handler URL {url}"))?;
                Ok(Arc::new(tracker))
            }
            _ => bail!("exactly one of --handler-file or --handler-url is required"),
        }
    }
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    // stdout carries SMTP in spawned mode
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Arc::new(cli.config()?);
    let handler = cli.handler()?;
    match cli.mode {
        Mode::Socket => {
            let addr = (cli.listen_host.as_str(), cli.listen_port);
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("cannot listen on {}:{}", cli.listen_host, cli.listen_port))?;
            serve(listener, config, handler).await?;
        }
        Mode::Spawned => {
            serve_stdio(config, handler).await?;
            info!("spawned session finished");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "cannot start runtime");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "smtptrack stopped");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn split_next_hop_and_defaults() {
        let cli = Cli::try_parse_from([
            "smtptrack",
            "--next-hop-host",
            "mx.example.com",
            "--next-hop-port",
            "2525",
            "--handler-url",
            "http://tracker.example/generate",
        ])
        .unwrap();
        assert_eq!(cli.mode, Mode::Socket);
        assert_eq!(cli.listen_port, 10025);
        let config = cli.config().unwrap();
        assert_eq!(config.next_hop, NextHop::new("mx.example.com", 2525));
        assert!(config.tracker_timeout.is_none());
    }

    #[test]
    fn listen_alias_and_combined_next_hop() {
        let cli = Cli::try_parse_from([
            "smtptrack",
            "--mode",
            "listen",
            "--next-hop",
            "[::1]:25",
            "--handler-file",
            "/usr/local/bin/tracker",
            "--tracker-timeout-ms",
            "1500",
        ])
        .unwrap();
        assert_eq!(cli.mode, Mode::Socket);
        let config = cli.config().unwrap();
        assert_eq!(config.next_hop.host, "::1");
        assert_eq!(config.tracker_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn both_handlers_are_rejected() {
        let result = Cli::try_parse_from([
            "smtptrack",
            "--next-hop",
            "localhost:25",
            "--handler-file",
            "/bin/true",
            "--handler-url",
            "http://x/",
        ]);
        assert!(result.is_err());
    }
}
