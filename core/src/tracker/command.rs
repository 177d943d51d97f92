/*
 * command.rs
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

//! Local binding: run an executable per message, JSON request on its stdin, JSON
//! response on its stdout.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::TrackerError;
use crate::tracker::{TrackerFuture, TrackerHandler, TrackerRequest, TrackerResult};

#[derive(Debug, Clone)]
pub struct CommandTracker {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandTracker {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl TrackerHandler for CommandTracker {
    fn generate(&self, request: TrackerRequest) -> TrackerFuture {
        let tracker = self.clone();
        Box::pin(async move { tracker.run(&request).await })
    }
}

impl CommandTracker {
    async fn run(&self, request: &TrackerRequest) -> Result<TrackerResult, TrackerError> {
        let input = serde_json::to_vec(request)?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&input).await?;
            stdin.shutdown().await?;
        }
        let output = child.wait_with_output().await?;
        debug!(program = %self.program.display(), status = %output.status, bytes = output.stdout.len(), "tracker process finished");
        if !output.status.success() {
            return Err(TrackerError::Process {
                status: output.status.to_string(),
            });
        }
        TrackerResult::from_json(&output.stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn request() -> TrackerRequest {
        TrackerRequest {
            message_id: Some("<m@x>".into()),
            headers: Vec::new(),
            commands: Vec::new(),
        }
    }

    #[tokio::test]
    async fn reads_html_from_stdout() {
        let tracker = CommandTracker::new("/bin/sh").with_args([
            "-c",
            "cat > /dev/null; printf '{\"html\":\"<b>t</b>\"}'",
        ]);
        assert_eq!(
            tracker.generate(request()).await.unwrap(),
            TrackerResult::HtmlFragment {
                html: "<b>t</b>".into()
            }
        );
    }

    #[tokio::test]
    async fn request_is_written_to_stdin() {
        // Echo the request back inside an html field.
        let tracker = CommandTracker::new("/bin/sh").with_args([
            "-c",
            "read line; printf '{\"html\":\"%s\"}' \"$(printf '%s' \"$line\" | tr -d '\"')\"",
        ]);
        match tracker.generate(request()).await.unwrap() {
            TrackerResult::HtmlFragment { html } => assert!(html.contains("messageId:<m@x>")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let tracker = CommandTracker::new("/bin/sh").with_args(["-c", "cat > /dev/null; exit 3"]);
        assert!(matches!(
            tracker.generate(request()).await,
            Err(TrackerError::Process { .. })
        ));
    }

    #[tokio::test]
    async fn unrecognized_shape_is_a_failure() {
        let tracker =
            CommandTracker::new("/bin/sh").with_args(["-c", "cat > /dev/null; echo '{}'"]);
        assert!(matches!(
            tracker.generate(request()).await,
            Err(TrackerError::Unrecognized)
        ));
    }
}
