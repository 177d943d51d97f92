/*
 * pipeline.rs
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

//! Pipelining queue shared by both legs: one ordered list of sent-but-unacknowledged
//! items ("in flight") and deferred sends. A deferred item goes out only once everything
//! queued ahead of it has been acknowledged, and anything sent after it is acknowledged
//! after it. The owner performs the actual writes; this type only decides the order.

use std::collections::VecDeque;

enum Entry<T> {
    InFlight(String),
    Waiting(String, T),
}

pub struct PipelineQueue<T> {
    entries: VecDeque<Entry<T>>,
}

impl<T> Default for PipelineQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PipelineQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Record a direct send.
    pub fn sent(&mut self, name: impl Into<String>) {
        self.entries.push_back(Entry::InFlight(name.into()));
    }

    /// Queue `item`. Returns it straight back (already recorded as in flight) when it
    /// may be sent now.
    pub fn defer(&mut self, name: impl Into<String>, item: T) -> Option<T> {
        self.entries.push_back(Entry::Waiting(name.into(), item));
        self.dispatch()
    }

    /// Acknowledge the oldest in-flight item. Returns its name, or None when the front
    /// of the queue is a deferred item still waiting to go out.
    pub fn ack(&mut self) -> Option<String> {
        match self.entries.front() {
            Some(Entry::InFlight(_)) => match self.entries.pop_front() {
                Some(Entry::InFlight(name)) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// The deferred item at the front, if any; it is now in flight. Call after every
    /// `ack` until None.
    pub fn dispatch(&mut self) -> Option<T> {
        if !matches!(self.entries.front(), Some(Entry::Waiting(..))) {
            return None;
        }
        match self.entries.pop_front() {
            Some(Entry::Waiting(name, item)) => {
                self.entries.push_front(Entry::InFlight(name));
                Some(item)
            }
            _ => None,
        }
    }
}
