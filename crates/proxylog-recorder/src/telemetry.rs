// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recorder metrics.
//!
//! Uses the metrics-rs facade so any installed recorder can collect these.
//! Without one installed the calls are no-ops.

use metrics::describe_counter;

pub const RECORDS_WRITTEN: &str = "proxylog_records_written_total";
pub const RECORDS_DROPPED: &str = "proxylog_records_dropped_total";
pub const BATCH_WRITE_FAILURES: &str = "proxylog_batch_write_failures_total";

/// Register metric descriptions. Call once after a recorder is installed.
pub fn register_metrics() {
    describe_counter!(RECORDS_WRITTEN, "Exchange records appended to log files");
    describe_counter!(
        RECORDS_DROPPED,
        "Exchange records discarded because the queue was full or closed"
    );
    describe_counter!(
        BATCH_WRITE_FAILURES,
        "Grouped log appends that failed and were dropped"
    );
}

pub(crate) fn record_written(count: usize) {
    metrics::counter!(RECORDS_WRITTEN).increment(count as u64);
}

pub(crate) fn record_dropped(reason: &'static str) {
    metrics::counter!(RECORDS_DROPPED, "reason" => reason).increment(1);
}

pub(crate) fn record_write_failure() {
    metrics::counter!(BATCH_WRITE_FAILURES).increment(1);
}
