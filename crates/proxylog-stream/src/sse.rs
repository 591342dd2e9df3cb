// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent-Event framing.
//!
//! Events are separated by blank lines. Within an event, `data:` lines are
//! joined with `\n`, an `event:` line names the event type, and lines starting
//! with `:` are comments. Both `\n` and `\r\n` line endings are accepted.

/// Terminal sentinel sent as the final `data:` payload.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A data payload, with the optional `event:` type that preceded it.
    Data { event: Option<String>, data: String },
    /// The `[DONE]` sentinel.
    Done,
}

#[derive(Default)]
struct PendingEvent {
    event: Option<String>,
    data: Vec<String>,
}

impl PendingEvent {
    fn dispatch(&mut self, out: &mut Vec<SseEvent>) {
        let event = self.event.take();
        if self.data.is_empty() {
            return;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        out.push(SseEvent::Data { event, data });
    }
}

/// Split a complete SSE body into events.
///
/// A trailing event without a terminating blank line is still dispatched.
/// A `data:` line carrying the sentinel ends the pending event and yields
/// [`SseEvent::Done`] even when no blank line precedes it.
pub fn parse_events(body: &str) -> Vec<SseEvent> {
    let mut events = Vec::new();
    let mut pending = PendingEvent::default();

    for line in body.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            pending.dispatch(&mut events);
            continue;
        }
        if line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" if value == DONE_SENTINEL => {
                pending.dispatch(&mut events);
                events.push(SseEvent::Done);
            }
            "data" => pending.data.push(value.to_string()),
            "event" => pending.event = Some(value.to_string()),
            _ => {}
        }
    }
    pending.dispatch(&mut events);

    events
}
