// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-request accumulation of a streamed chat completion.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use proxylog_core::TokenUsage;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::sse::{DONE_SENTINEL, SseEvent, parse_events};

/// Error recorded when the stream ends without the `[DONE]` sentinel.
pub const MISSING_TERMINATOR: &str = "stream ended without terminal marker";

/// Longest line that can still be a sentinel line (`data: [DONE]\r\n`).
const DONE_LINE_MAX: usize = 14;

/// Raw chunks of one streamed exchange, in arrival order.
///
/// Owned by the request task; consumed by [`finalize`](Self::finalize).
#[derive(Debug)]
pub struct StreamBuffer {
    chunks: Vec<Vec<u8>>,
    started: Instant,
    started_at: DateTime<Utc>,
    interrupted: Option<String>,
    /// Start of the current unterminated line, capped past [`DONE_LINE_MAX`].
    line_tail: Vec<u8>,
    done_seen: bool,
}

/// The reconciled result of a finished (or abandoned) stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    /// A `chat.completion` object equivalent to the non-streamed response.
    pub response: Value,
    /// Token counts from the stream's usage event, zero if none arrived.
    pub usage: TokenUsage,
    /// Set when the stream was interrupted, failed upstream or never finished.
    pub error: Option<String>,
    /// Whether the `[DONE]` sentinel was seen.
    pub complete: bool,
    /// All chunks concatenated.
    pub raw: Vec<u8>,
    /// Time from buffer creation to finalize.
    pub duration_ms: u64,
}

impl StreamOutcome {
    /// The response object serialized as compact JSON.
    pub fn response_bytes(&self) -> Vec<u8> {
        // Serializing a `Value` cannot fail.
        serde_json::to_vec(&self.response).unwrap_or_default()
    }
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            started: Instant::now(),
            started_at: Utc::now(),
            interrupted: None,
            line_tail: Vec::new(),
            done_seen: false,
        }
    }

    /// Store one chunk. Chunks may split lines or UTF-8 sequences anywhere.
    pub fn append(&mut self, chunk: impl Into<Vec<u8>>) {
        let chunk = chunk.into();
        self.scan_for_done(&chunk);
        self.chunks.push(chunk);
    }

    fn scan_for_done(&mut self, chunk: &[u8]) {
        if self.done_seen {
            return;
        }
        for piece in chunk.split_inclusive(|b| *b == b'\n') {
            let room = (DONE_LINE_MAX + 1).saturating_sub(self.line_tail.len());
            self.line_tail.extend(piece.iter().take(room));
            if piece.ends_with(b"\n") {
                if is_done_line(&self.line_tail) {
                    self.done_seen = true;
                    self.line_tail.clear();
                    return;
                }
                self.line_tail.clear();
            }
        }
    }

    /// Mark the stream as abandoned (e.g. client disconnect).
    ///
    /// The first reason wins; the buffer is still finalized normally.
    pub fn interrupt(&mut self, reason: impl Into<String>) {
        if self.interrupted.is_none() {
            self.interrupted = Some(reason.into());
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// All chunks concatenated.
    pub fn raw_bytes(&self) -> Vec<u8> {
        self.chunks.concat()
    }

    /// Milliseconds since the buffer was created.
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Whether the `[DONE]` sentinel has arrived so far.
    ///
    /// Tracked as chunks are appended, so polling this is cheap.
    pub fn is_complete(&self) -> bool {
        self.done_seen || is_done_line(&self.line_tail)
    }

    /// Parse the collected chunks and reconstruct the response.
    pub fn finalize(self) -> StreamOutcome {
        let duration_ms = self.duration_ms();
        let raw = self.raw_bytes();

        let mut acc = Accumulator::default();
        for event in parse_events(&String::from_utf8_lossy(&raw)) {
            match event {
                SseEvent::Done => acc.done = true,
                SseEvent::Data { event, data } => acc.feed(event.as_deref(), &data),
            }
        }
        if acc.skipped > 0 {
            debug!(skipped = acc.skipped, "skipped malformed stream events");
        }

        let error = self
            .interrupted
            .or_else(|| acc.upstream_error.clone())
            .or_else(|| (!acc.done).then(|| MISSING_TERMINATOR.to_string()));

        let complete = acc.done;
        let usage = acc.usage();
        let response = acc.into_response(self.started_at, usage);

        StreamOutcome {
            response,
            usage,
            error,
            complete,
            raw,
            duration_ms,
        }
    }
}

/// Whether a raw line (line ending included or not) is `data: [DONE]`.
fn is_done_line(line: &[u8]) -> bool {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let Some(value) = line.strip_prefix(b"data:") else {
        return false;
    };
    let value = value.strip_prefix(b" ").unwrap_or(value);
    value == DONE_SENTINEL.as_bytes()
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct ChoiceState {
    role: Option<String>,
    content: String,
    finish_reason: Option<String>,
}

#[derive(Debug, Default)]
struct Accumulator {
    id: Option<Value>,
    model: Option<Value>,
    created: Option<Value>,
    choices: BTreeMap<u64, ChoiceState>,
    usage: Option<Map<String, Value>>,
    upstream_error: Option<String>,
    done: bool,
    skipped: usize,
}

impl Accumulator {
    fn feed(&mut self, event_type: Option<&str>, data: &str) {
        match serde_json::from_str::<Value>(data) {
            Ok(payload) => self.merge(event_type, &payload),
            // Some upstreams omit the blank line between events.
            Err(_) if data.contains('\n') => {
                for line in data.lines() {
                    self.feed(event_type, line);
                }
            }
            Err(_) => self.skipped += 1,
        }
    }

    fn merge(&mut self, event_type: Option<&str>, payload: &Value) {
        if let Some(error) = payload.get("error").filter(|e| !e.is_null()) {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            self.upstream_error.get_or_insert(format!("upstream error: {message}"));
            return;
        }
        if event_type == Some("error") {
            self.upstream_error
                .get_or_insert(format!("upstream error: {payload}"));
            return;
        }

        for (key, slot) in [
            ("id", &mut self.id),
            ("model", &mut self.model),
            ("created", &mut self.created),
        ] {
            if slot.is_none()
                && let Some(value) = payload.get(key).filter(|v| !v.is_null())
            {
                *slot = Some(value.clone());
            }
        }

        if let Some(choices) = payload.get("choices").and_then(Value::as_array) {
            for (position, choice) in choices.iter().enumerate() {
                let index = choice
                    .get("index")
                    .and_then(Value::as_u64)
                    .unwrap_or(position as u64);
                let state = self.choices.entry(index).or_default();

                if let Some(delta) = choice.get("delta") {
                    if let Some(role) = delta.get("role").and_then(Value::as_str) {
                        state.role.get_or_insert_with(|| role.to_string());
                    }
                    if let Some(content) = delta.get("content").and_then(Value::as_str) {
                        state.content.push_str(content);
                    }
                }
                if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
                    state.finish_reason = Some(reason.to_string());
                }
            }
        }

        if let Some(usage) = payload.get("usage").and_then(Value::as_object) {
            self.usage = Some(usage.clone());
        }
    }

    fn usage(&self) -> TokenUsage {
        let Some(usage) = &self.usage else {
            return TokenUsage::default();
        };
        let field = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
        let prompt = field("prompt_tokens");
        let completion = field("completion_tokens");
        TokenUsage {
            prompt,
            completion,
            total: usage
                .get("total_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(prompt.saturating_add(completion)),
        }
    }

    fn into_response(mut self, started_at: DateTime<Utc>, usage: TokenUsage) -> Value {
        if self.choices.is_empty() {
            self.choices.insert(0, ChoiceState::default());
        }
        let default_finish = if self.done { Some("stop") } else { None };

        let choices: Vec<Value> = self
            .choices
            .into_iter()
            .map(|(index, state)| {
                json!({
                    "index": index,
                    "message": {
                        "role": state.role.as_deref().unwrap_or("assistant"),
                        "content": state.content,
                    },
                    "finish_reason": state.finish_reason.as_deref().or(default_finish),
                })
            })
            .collect();

        json!({
            "id": self.id.unwrap_or_else(|| Value::String(String::new())),
            "object": "chat.completion",
            "created": self.created.unwrap_or_else(|| json!(started_at.timestamp())),
            "model": self.model.unwrap_or_else(|| Value::String(String::new())),
            "choices": choices,
            "usage": {
                "prompt_tokens": usage.prompt,
                "completion_tokens": usage.completion,
                "total_tokens": usage.total,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_event(content: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "created": 1_760_000_000,
                "model": "gpt-4o",
                "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}],
            })
        )
    }

    fn full_stream() -> Vec<String> {
        vec![
            format!(
                "data: {}\n\n",
                json!({"id": "chatcmpl-1", "model": "gpt-4o", "created": 1_760_000_000,
                       "choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}}]})
            ),
            delta_event("Hel"),
            delta_event("lo"),
            format!(
                "data: {}\n\n",
                json!({"id": "chatcmpl-1", "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]})
            ),
            format!(
                "data: {}\n\n",
                json!({"id": "chatcmpl-1", "choices": [],
                       "usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11}})
            ),
            "data: [DONE]\n\n".to_string(),
        ]
    }

    fn content(outcome: &StreamOutcome, index: usize) -> &str {
        outcome.response["choices"][index]["message"]["content"]
            .as_str()
            .unwrap()
    }

    #[test]
    fn complete_stream_reconstructs_response() {
        let mut buffer = StreamBuffer::new();
        for chunk in full_stream() {
            buffer.append(chunk);
        }
        assert!(buffer.is_complete());
        let outcome = buffer.finalize();

        assert!(outcome.error.is_none());
        assert!(outcome.complete);
        assert_eq!(content(&outcome, 0), "Hello");
        assert_eq!(outcome.response["object"], "chat.completion");
        assert_eq!(outcome.response["id"], "chatcmpl-1");
        assert_eq!(outcome.response["model"], "gpt-4o");
        assert_eq!(outcome.response["created"], 1_760_000_000);
        assert_eq!(outcome.response["choices"][0]["finish_reason"], "stop");
        assert_eq!(outcome.response["choices"][0]["message"]["role"], "assistant");
        assert_eq!(outcome.response["usage"]["total_tokens"], 11);
        assert_eq!(outcome.usage, TokenUsage::new(9, 2));
    }

    #[test]
    fn chunk_boundaries_may_split_lines_and_characters() {
        let body = format!("{}{}data: [DONE]\n\n", delta_event("naïve "), delta_event("café"));
        let bytes = body.into_bytes();

        let mut buffer = StreamBuffer::new();
        for piece in bytes.chunks(7) {
            buffer.append(piece.to_vec());
        }
        assert_eq!(buffer.chunk_count(), bytes.len().div_ceil(7));
        let outcome = buffer.finalize();

        assert_eq!(content(&outcome, 0), "naïve café");
        assert_eq!(outcome.raw, bytes);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn missing_terminator_keeps_partial_content_and_sets_error() {
        let mut buffer = StreamBuffer::new();
        buffer.append(delta_event("partial "));
        buffer.append(delta_event("answer"));
        assert!(!buffer.is_complete());
        let outcome = buffer.finalize();

        assert_eq!(content(&outcome, 0), "partial answer");
        assert_eq!(outcome.error.as_deref(), Some(MISSING_TERMINATOR));
        assert!(!outcome.complete);
        assert!(outcome.response["choices"][0]["finish_reason"].is_null());
        assert_eq!(outcome.usage, TokenUsage::default());
    }

    #[test]
    fn interrupt_reason_is_reported() {
        let mut buffer = StreamBuffer::new();
        buffer.append(delta_event("cut"));
        buffer.interrupt("client disconnected");
        buffer.interrupt("second reason ignored");
        let outcome = buffer.finalize();

        assert_eq!(outcome.error.as_deref(), Some("client disconnected"));
        assert_eq!(content(&outcome, 0), "cut");
    }

    #[test]
    fn upstream_error_event_is_reported() {
        let mut buffer = StreamBuffer::new();
        buffer.append(delta_event("so far"));
        buffer.append(format!(
            "data: {}\n\n",
            json!({"error": {"message": "content filter triggered", "code": "content_filter"}})
        ));
        let outcome = buffer.finalize();

        assert_eq!(
            outcome.error.as_deref(),
            Some("upstream error: content filter triggered")
        );
        assert_eq!(content(&outcome, 0), "so far");
    }

    #[test]
    fn malformed_payloads_are_skipped() {
        let mut buffer = StreamBuffer::new();
        buffer.append(delta_event("a"));
        buffer.append("data: {not json\n\n");
        buffer.append(delta_event("b"));
        buffer.append("data: [DONE]\n\n");
        let outcome = buffer.finalize();

        assert_eq!(content(&outcome, 0), "ab");
        assert!(outcome.error.is_none());
    }

    #[test]
    fn events_without_blank_separator_are_still_read() {
        let mut buffer = StreamBuffer::new();
        let a = delta_event("x");
        let b = delta_event("y");
        buffer.append(format!("{}{}", a.trim_end(), "\n"));
        buffer.append(b);
        buffer.append("data: [DONE]\n\n");
        let outcome = buffer.finalize();

        assert_eq!(content(&outcome, 0), "xy");
    }

    #[test]
    fn sentinel_line_without_blank_separator_completes_stream() {
        let mut buffer = StreamBuffer::new();
        let chunk = json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "delta": {"content": "hi"}, "finish_reason": "stop"}],
        });
        buffer.append(format!("data: {chunk}\ndata: [DONE]\n\n"));
        let outcome = buffer.finalize();

        assert!(outcome.complete);
        assert_eq!(outcome.error, None);
        assert_eq!(content(&outcome, 0), "hi");
    }

    #[test]
    fn completion_is_tracked_across_split_sentinel() {
        let mut buffer = StreamBuffer::new();
        buffer.append(delta_event("x"));
        assert!(!buffer.is_complete());
        buffer.append("data: [DO");
        assert!(!buffer.is_complete());
        buffer.append("NE]\r");
        assert!(buffer.is_complete());
        buffer.append("\n\n");
        assert!(buffer.is_complete());
    }

    #[test]
    fn sentinel_inside_payload_does_not_complete() {
        let mut buffer = StreamBuffer::new();
        buffer.append("data: {\"content\":\"data: [DONE]\"}\n\n");
        assert!(!buffer.is_complete());
        buffer.append(format!("data: {}\n\n", "a".repeat(64)));
        assert!(!buffer.is_complete());
    }

    #[test]
    fn choices_are_kept_per_index() {
        let mut buffer = StreamBuffer::new();
        buffer.append(format!(
            "data: {}\n\n",
            json!({"choices": [
                {"index": 0, "delta": {"content": "first"}},
                {"index": 1, "delta": {"content": "second"}},
            ]})
        ));
        buffer.append(format!(
            "data: {}\n\n",
            json!({"choices": [{"index": 1, "delta": {}, "finish_reason": "length"}]})
        ));
        buffer.append("data: [DONE]\n\n");
        let outcome = buffer.finalize();

        assert_eq!(content(&outcome, 0), "first");
        assert_eq!(content(&outcome, 1), "second");
        assert_eq!(outcome.response["choices"][0]["finish_reason"], "stop");
        assert_eq!(outcome.response["choices"][1]["finish_reason"], "length");
    }

    #[test]
    fn empty_stream_yields_empty_message() {
        let outcome = StreamBuffer::new().finalize();
        assert_eq!(content(&outcome, 0), "");
        assert_eq!(outcome.error.as_deref(), Some(MISSING_TERMINATOR));
        assert!(outcome.raw.is_empty());
    }

    #[test]
    fn response_bytes_are_json() {
        let mut buffer = StreamBuffer::new();
        for chunk in full_stream() {
            buffer.append(chunk);
        }
        let outcome = buffer.finalize();
        let parsed: Value = serde_json::from_slice(&outcome.response_bytes()).unwrap();
        assert_eq!(parsed, outcome.response);
    }
}
