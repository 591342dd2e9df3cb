// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canned upstream payloads.

use serde_json::json;

/// A valid base64 AES-256 key (bytes `0x00..=0x1f`).
pub const TEST_KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

/// Deployment priced by the default harness.
pub const TEST_DEPLOYMENT: &str = "gpt-4o";

/// Chat endpoint for [`TEST_DEPLOYMENT`].
pub const CHAT_ENDPOINT: &str = "/openai/deployments/gpt-4o/chat/completions";

/// A small chat completions request body.
pub fn chat_request(prompt: &str) -> Vec<u8> {
    json!({
        "messages": [{"role": "user", "content": prompt}],
        "max_tokens": 256,
    })
    .to_string()
    .into_bytes()
}

/// A chat completion response reporting the given token counts.
pub fn chat_response(content: &str, prompt_tokens: u64, completion_tokens: u64) -> Vec<u8> {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_792_000_000,
        "model": TEST_DEPLOYMENT,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop",
        }],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens,
        },
    })
    .to_string()
    .into_bytes()
}

/// An embeddings response carrying only a prompt token count.
pub fn embedding_response(prompt_tokens: u64) -> Vec<u8> {
    json!({
        "object": "list",
        "data": [{"object": "embedding", "index": 0, "embedding": [0.1, -0.2, 0.3]}],
        "model": "text-embedding-3-small",
        "usage": {"prompt_tokens": prompt_tokens, "total_tokens": prompt_tokens},
    })
    .to_string()
    .into_bytes()
}

/// SSE chunks streaming `parts` as content deltas, then a usage event.
///
/// The `[DONE]` sentinel is appended only when `done` is set, so callers can
/// simulate a stream cut short.
pub fn sse_chunks(
    parts: &[&str],
    prompt_tokens: u64,
    completion_tokens: u64,
    done: bool,
) -> Vec<Vec<u8>> {
    let mut chunks = Vec::with_capacity(parts.len() + 3);
    chunks.push(sse_event(&json!({
        "id": "chatcmpl-stream",
        "object": "chat.completion.chunk",
        "created": 1_792_000_000,
        "model": TEST_DEPLOYMENT,
        "choices": [{"index": 0, "delta": {"role": "assistant", "content": ""}, "finish_reason": null}],
    })));
    for part in parts {
        chunks.push(sse_event(&json!({
            "id": "chatcmpl-stream",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": part}, "finish_reason": null}],
        })));
    }
    chunks.push(sse_event(&json!({
        "id": "chatcmpl-stream",
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens,
        },
    })));
    if done {
        chunks.push(b"data: [DONE]\n\n".to_vec());
    }
    chunks
}

fn sse_event(payload: &serde_json::Value) -> Vec<u8> {
    format!("data: {payload}\n\n").into_bytes()
}
