// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming response accumulation.
//!
//! A [`StreamBuffer`] collects the raw chunks of one streamed exchange in
//! arrival order. [`StreamBuffer::finalize`] parses them as Server-Sent Events
//! and rebuilds the `chat.completion` object a non-streamed call would have
//! returned, along with token usage and an error if the stream ended early.

pub mod buffer;
pub mod sse;

pub use buffer::{MISSING_TERMINATOR, StreamBuffer, StreamOutcome};
pub use sse::{parse_events, SseEvent};
