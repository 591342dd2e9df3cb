// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reading the most recent record of a day file.
//!
//! Only the tail of the file is read: the reader walks backwards in 1 KiB
//! chunks until it has a complete final line, so startup cost does not grow
//! with the size of the day's log.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use chrono::NaiveDate;
use proxylog_core::CostSnapshot;
use tracing::{debug, warn};

use crate::layout::LogLayout;
use crate::line::StoredRecord;

const CHUNK_SIZE: u64 = 1024;

/// Read the last non-empty line of a file, or `None` if it has none.
pub fn read_last_line(path: &Path) -> io::Result<Option<String>> {
    let mut file = File::open(path)?;
    let mut pos = file.seek(SeekFrom::End(0))?;
    let mut tail: Vec<u8> = Vec::new();

    loop {
        let trimmed = trim_trailing_whitespace(&tail);
        if let Some(newline) = trimmed.iter().rposition(|&b| b == b'\n') {
            return Ok(to_line(&trimmed[newline + 1..]));
        }
        if pos == 0 {
            return Ok(to_line(trimmed));
        }

        let read_len = CHUNK_SIZE.min(pos);
        pos -= read_len;
        file.seek(SeekFrom::Start(pos))?;
        let mut chunk = vec![0u8; read_len as usize];
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&tail);
        tail = chunk;
    }
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

fn to_line(bytes: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(bytes).trim().to_string();
    (!line.is_empty()).then_some(line)
}

/// Cost snapshot from the last record written for `identity` on `date`.
///
/// A missing or empty file yields `None`. An unreadable file or corrupt final
/// line is logged and also yields `None`; history problems never stop startup.
pub fn last_record_for_date(
    layout: &LogLayout,
    identity: &str,
    date: NaiveDate,
) -> Option<CostSnapshot> {
    let path = layout.path_for(identity, date);
    if !path.exists() {
        debug!(path = %path.display(), "no log file for today");
        return None;
    }

    let line = match read_last_line(&path) {
        Ok(Some(line)) => line,
        Ok(None) => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read last log line");
            return None;
        }
    };

    match StoredRecord::from_line(&line) {
        Ok(record) => Some(record.cost_snapshot()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "last log line is corrupt, ignoring");
            None
        }
    }
}
