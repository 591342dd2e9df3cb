// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable exchange recording.
//!
//! The [`BatchRecorder`] is the only component that touches persistent
//! storage. Request tasks hand it finished [`ExchangeRecord`]s; a single
//! background task seals their payloads, groups them by UTC day and identity,
//! and appends them to `<root>/<YYYYMMDD>/<identity>_<YYYYMMDD>.jsonl`.
//!
//! [`ExchangeRecord`]: proxylog_core::ExchangeRecord

pub mod layout;
pub mod line;
pub mod telemetry;
pub mod recorder;
pub mod tail;

pub use layout::{sanitize_identity, LogLayout};
pub use line::StoredRecord;
pub use recorder::{BatchRecorder, RecorderSettings};
pub use tail::{last_record_for_date, read_last_line};
