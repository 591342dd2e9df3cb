// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Async batch recorder with a bounded queue.
//!
//! [`BatchRecorder::write`] is fire-and-forget: it `try_send`s into a bounded
//! channel and returns immediately. A single background task owns every
//! durable write:
//!
//! - it waits for the first record, then keeps receiving until `batch_size`
//!   records are collected or `batch_timeout` has passed since that first
//!   record, whichever comes first;
//! - the batch is grouped by (UTC date, identity) and each group is appended
//!   to its file in one write, under a lock scoped to that path;
//! - a failed group write is logged and dropped; the task keeps going.
//!
//! When the queue is full the incoming record is dropped (drop-newest), a
//! warning is logged and the dropped counter is incremented.
//!
//! [`BatchRecorder::stop`] sends a shutdown command. The task closes the
//! channel so no new records are accepted, drains and writes everything
//! already queued, then exits; `stop` returns once it has.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use proxylog_config::model::LoggingConfig;
use proxylog_core::{ExchangeRecord, ProxylogError};
use proxylog_vault::FieldCodec;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::layout::LogLayout;
use crate::line::StoredRecord;
use crate::telemetry;

/// Batching parameters for the background writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderSettings {
    /// Maximum records per flush.
    pub batch_size: usize,
    /// Maximum wait after the first record of a batch arrives.
    pub batch_timeout: Duration,
    /// Bounded queue capacity.
    pub queue_capacity: usize,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_timeout: Duration::from_secs(1),
            queue_capacity: 4096,
        }
    }
}

impl RecorderSettings {
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            batch_timeout: config.batch_timeout(),
            queue_capacity: config.queue_capacity.max(1),
        }
    }
}

enum Command {
    Record(Box<ExchangeRecord>),
    Shutdown,
}

#[derive(Debug, Default)]
struct Counters {
    written: AtomicU64,
    dropped: AtomicU64,
}

/// Handle to the background writer. Shared by reference across request tasks.
#[derive(Debug)]
pub struct BatchRecorder {
    tx: mpsc::Sender<Command>,
    handle: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl BatchRecorder {
    /// Spawn the background writer task. Must be called inside a Tokio runtime.
    pub fn start(settings: RecorderSettings, codec: Arc<FieldCodec>, layout: LogLayout) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let root = layout.root().display().to_string();

        let writer = Writer {
            codec,
            layout,
            settings,
            path_locks: DashMap::new(),
            counters: Arc::clone(&counters),
        };
        let handle = tokio::spawn(writer.run(rx));

        info!(
            root = %root,
            batch_size = settings.batch_size,
            batch_timeout_ms = settings.batch_timeout.as_millis() as u64,
            queue_capacity = settings.queue_capacity,
            "batch recorder started"
        );

        Self {
            tx,
            handle: Mutex::new(Some(handle)),
            counters,
        }
    }

    /// Enqueue a finished record. Never blocks and never fails the caller.
    pub fn write(&self, record: ExchangeRecord) {
        match self.tx.try_send(Command::Record(Box::new(record))) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                telemetry::record_dropped("queue_full");
                warn!(dropped, "exchange log queue full, dropping record");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                telemetry::record_dropped("stopped");
                warn!(dropped, "exchange recorder stopped, dropping record");
            }
        }
    }

    /// Drain every queued record to disk and wait for the writer to exit.
    ///
    /// Calling `stop` again after it has returned is a no-op.
    pub async fn stop(&self) -> Result<(), ProxylogError> {
        let Some(handle) = self.handle.lock().await.take() else {
            return Ok(());
        };

        if self.tx.send(Command::Shutdown).await.is_err() {
            debug!("recorder channel already closed before shutdown");
        }

        handle
            .await
            .map_err(|e| ProxylogError::Recorder(format!("recorder task failed: {e}")))?;

        info!(
            written = self.written(),
            dropped = self.dropped(),
            "batch recorder stopped"
        );
        Ok(())
    }

    /// Records appended to disk so far.
    pub fn written(&self) -> u64 {
        self.counters.written.load(Ordering::Relaxed)
    }

    /// Records discarded because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }
}

/// Lines bound for one file within a batch, in arrival order.
struct Group {
    date: NaiveDate,
    identity: String,
    contents: String,
    count: usize,
}

struct Writer {
    codec: Arc<FieldCodec>,
    layout: LogLayout,
    settings: RecorderSettings,
    path_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    counters: Arc<Counters>,
}

impl Writer {
    async fn run(self, mut rx: mpsc::Receiver<Command>) {
        loop {
            let first = match rx.recv().await {
                Some(Command::Record(record)) => record,
                Some(Command::Shutdown) | None => break,
            };

            let mut batch = Vec::with_capacity(self.settings.batch_size);
            batch.push(*first);
            let deadline = Instant::now() + self.settings.batch_timeout;
            let mut shutting_down = false;

            while batch.len() < self.settings.batch_size {
                match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(Some(Command::Record(record))) => batch.push(*record),
                    Ok(Some(Command::Shutdown)) | Ok(None) => {
                        shutting_down = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            self.flush(batch).await;
            if shutting_down {
                break;
            }
        }

        self.drain(&mut rx).await;
        info!("batch recorder drained");
    }

    /// Close the channel and write everything still buffered in it.
    async fn drain(&self, rx: &mut mpsc::Receiver<Command>) {
        rx.close();
        let mut batch = Vec::with_capacity(self.settings.batch_size);
        while let Some(command) = rx.recv().await {
            if let Command::Record(record) = command {
                batch.push(*record);
                if batch.len() >= self.settings.batch_size {
                    self.flush(std::mem::take(&mut batch)).await;
                }
            }
        }
        self.flush(batch).await;
    }

    /// Seal, group and append one batch.
    async fn flush(&self, batch: Vec<ExchangeRecord>) {
        if batch.is_empty() {
            return;
        }

        let mut index: HashMap<(NaiveDate, String), usize> = HashMap::new();
        let mut groups: Vec<Group> = Vec::new();

        for record in batch {
            let key = (record.date(), record.identity.clone());
            let line = match StoredRecord::seal(record, &self.codec).and_then(|s| s.to_line()) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, identity = %key.1, "failed to seal exchange record, skipping");
                    continue;
                }
            };

            let slot = *index.entry(key.clone()).or_insert_with(|| {
                groups.push(Group {
                    date: key.0,
                    identity: key.1,
                    contents: String::new(),
                    count: 0,
                });
                groups.len() - 1
            });
            let group = &mut groups[slot];
            group.contents.push_str(&line);
            group.contents.push('\n');
            group.count += 1;
        }

        for group in groups {
            let count = group.count;
            let path = self.layout.path_for(&group.identity, group.date);
            match self.append(&path, group.contents.as_bytes()).await {
                Ok(()) => {
                    self.counters
                        .written
                        .fetch_add(count as u64, Ordering::Relaxed);
                    telemetry::record_written(count);
                    debug!(path = %path.display(), count, "appended exchange records");
                }
                Err(e) => {
                    telemetry::record_write_failure();
                    warn!(
                        path = %path.display(),
                        count,
                        error = %e,
                        "failed to write exchange log batch, dropping it"
                    );
                }
            }
        }
    }

    async fn append(&self, path: &Path, contents: &[u8]) -> Result<(), ProxylogError> {
        let lock = self.path_locks.entry(path.to_path_buf()).or_default().clone();
        let _guard = lock.lock().await;

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ProxylogError::Storage { source: e.into() })?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| ProxylogError::Storage { source: e.into() })?;
        file.write_all(contents)
            .await
            .map_err(|e| ProxylogError::Storage { source: e.into() })?;
        file.flush()
            .await
            .map_err(|e| ProxylogError::Storage { source: e.into() })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use proxylog_core::Cost;

    use super::*;

    fn codec() -> Arc<FieldCodec> {
        Arc::new(FieldCodec::new(&[11u8; 32]).unwrap())
    }

    fn settings(batch_size: usize, batch_timeout: Duration, queue_capacity: usize) -> RecorderSettings {
        RecorderSettings {
            batch_size,
            batch_timeout,
            queue_capacity,
        }
    }

    fn record(identity: &str, n: usize) -> ExchangeRecord {
        ExchangeRecord::new(identity, format!("/r{n}"), "gpt-4o", format!("{{\"n\":{n}}}").into_bytes())
            .with_cost(Cost::from_micros(1), Cost::from_micros(n as u64))
    }

    fn today_path(layout: &LogLayout, identity: &str) -> PathBuf {
        layout.path_for(identity, Utc::now().date_naive())
    }

    fn read_records(path: &Path) -> Vec<StoredRecord> {
        match std::fs::read_to_string(path) {
            Ok(contents) => contents
                .lines()
                .map(|line| StoredRecord::from_line(line).unwrap())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn partial_batch_is_flushed_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let recorder = BatchRecorder::start(
            settings(10, Duration::from_secs(1), 100),
            codec(),
            layout.clone(),
        );

        for n in 0..3 {
            recorder.write(record("alice", n));
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(read_records(&today_path(&layout, "alice")).is_empty());

        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert_eq!(read_records(&today_path(&layout, "alice")).len(), 3);
        assert_eq!(recorder.written(), 3);

        recorder.stop().await.unwrap();
    }

    #[tokio::test]
    async fn full_batch_is_flushed_without_waiting_for_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let recorder = BatchRecorder::start(
            settings(3, Duration::from_secs(60), 100),
            codec(),
            layout.clone(),
        );

        for n in 0..3 {
            recorder.write(record("alice", n));
        }

        let path = today_path(&layout, "alice");
        let mut lines = 0;
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            lines = read_records(&path).len();
            if lines == 3 {
                break;
            }
        }
        assert_eq!(lines, 3);

        recorder.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_drains_queued_records_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let recorder = BatchRecorder::start(
            settings(10, Duration::from_secs(60), 100),
            codec(),
            layout.clone(),
        );

        for n in 0..25 {
            recorder.write(record("alice", n));
        }
        recorder.stop().await.unwrap();

        let records = read_records(&today_path(&layout, "alice"));
        let endpoints: Vec<String> = records.iter().map(|r| r.endpoint.clone()).collect();
        let expected: Vec<String> = (0..25).map(|n| format!("/r{n}")).collect();
        assert_eq!(endpoints, expected);
        assert_eq!(recorder.written(), 25);
        assert_eq!(recorder.dropped(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_keeps_every_accepted_record_under_concurrent_writes() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let recorder = Arc::new(BatchRecorder::start(
            settings(16, Duration::from_millis(50), 10_000),
            codec(),
            layout.clone(),
        ));

        let mut writers = Vec::new();
        for worker in 0..8 {
            let recorder = Arc::clone(&recorder);
            writers.push(tokio::spawn(async move {
                for n in 0..200 {
                    recorder.write(record(&format!("user{worker}"), n));
                    if n % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
        recorder.stop().await.unwrap();
        for writer in writers {
            writer.await.unwrap();
        }

        let on_disk: usize = (0..8)
            .map(|worker| read_records(&today_path(&layout, &format!("user{worker}"))).len())
            .sum();
        assert_eq!(on_disk as u64, 1600 - recorder.dropped());
        assert_eq!(recorder.written(), on_disk as u64);
    }

    #[tokio::test]
    async fn full_queue_drops_newest_records() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let recorder = BatchRecorder::start(
            settings(2, Duration::from_secs(60), 2),
            codec(),
            layout.clone(),
        );

        // The writer task cannot run until this task yields, so the queue
        // holds exactly two records.
        for n in 0..5 {
            recorder.write(record("alice", n));
        }
        assert_eq!(recorder.dropped(), 3);

        recorder.stop().await.unwrap();
        let endpoints: Vec<String> = read_records(&today_path(&layout, "alice"))
            .into_iter()
            .map(|r| r.endpoint)
            .collect();
        assert_eq!(endpoints, vec!["/r0".to_string(), "/r1".to_string()]);
    }

    #[tokio::test]
    async fn records_are_grouped_by_day_and_identity() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(dir.path());
        let recorder = BatchRecorder::start(
            settings(10, Duration::from_secs(60), 100),
            codec(),
            layout.clone(),
        );

        let day1 = Utc.with_ymd_and_hms(2026, 10, 15, 23, 59, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 10, 16, 0, 1, 0).unwrap();
        recorder.write(record("alice", 0).at(day1));
        recorder.write(record("bob", 1).at(day1));
        recorder.write(record("alice", 2).at(day2));
        recorder.write(record("alice", 3).at(day1));
        recorder.stop().await.unwrap();

        let alice_day1 = read_records(&layout.path_for("alice", day1.date_naive()));
        let bob_day1 = read_records(&layout.path_for("bob", day1.date_naive()));
        let alice_day2 = read_records(&layout.path_for("alice", day2.date_naive()));

        let endpoints = |records: &[StoredRecord]| -> Vec<String> {
            records.iter().map(|r| r.endpoint.clone()).collect()
        };
        assert_eq!(endpoints(&alice_day1), vec!["/r0", "/r3"]);
        assert_eq!(endpoints(&bob_day1), vec!["/r1"]);
        assert_eq!(endpoints(&alice_day2), vec!["/r2"]);
    }

    #[tokio::test]
    async fn write_failures_do_not_stop_the_writer() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the log root directory should be.
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let recorder = BatchRecorder::start(
            settings(1, Duration::from_millis(10), 100),
            codec(),
            LogLayout::new(&blocker),
        );

        recorder.write(record("alice", 0));
        recorder.write(record("alice", 1));
        recorder.stop().await.unwrap();

        assert_eq!(recorder.written(), 0);
        assert_eq!(recorder.dropped(), 0);
    }

    #[tokio::test]
    async fn writes_after_stop_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = BatchRecorder::start(RecorderSettings::default(), codec(), LogLayout::new(dir.path()));
        recorder.stop().await.unwrap();
        recorder.stop().await.unwrap();

        recorder.write(record("alice", 0));
        assert_eq!(recorder.dropped(), 1);
    }

    #[test]
    fn settings_follow_logging_config() {
        let config = LoggingConfig {
            batch_size: 25,
            batch_timeout_ms: 250,
            queue_capacity: 500,
            ..LoggingConfig::default()
        };
        assert_eq!(
            RecorderSettings::from_config(&config),
            settings(25, Duration::from_millis(250), 500)
        );
    }
}
