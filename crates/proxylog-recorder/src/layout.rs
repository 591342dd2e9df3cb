// SPDX-FileCopyrightText: 2026 Proxylog Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk layout of the exchange logs.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

const DATE_FORMAT: &str = "%Y%m%d";

/// Maps (identity, UTC date) to a log file under a root directory.
///
/// `<root>/<YYYYMMDD>/<identity>_<YYYYMMDD>.jsonl`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLayout {
    root: PathBuf,
}

impl LogLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every identity's file for `date`.
    pub fn day_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(date.format(DATE_FORMAT).to_string())
    }

    /// Log file for `identity` on `date`. The identity is sanitized first.
    pub fn path_for(&self, identity: &str, date: NaiveDate) -> PathBuf {
        let day = date.format(DATE_FORMAT).to_string();
        self.root
            .join(&day)
            .join(format!("{}_{day}.jsonl", sanitize_identity(identity)))
    }
}

/// Make an identity safe to embed in a file name.
///
/// Keeps ASCII alphanumerics and `-_.@`; everything else becomes `_`. Names
/// that would be empty or consist only of dots become `_`.
pub fn sanitize_identity(identity: &str) -> String {
    let cleaned: String = identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn path_follows_day_and_identity() {
        let layout = LogLayout::new("/var/log/proxylog");
        assert_eq!(
            layout.path_for("alice", date()),
            PathBuf::from("/var/log/proxylog/20261016/alice_20261016.jsonl")
        );
        assert_eq!(
            layout.day_dir(date()),
            PathBuf::from("/var/log/proxylog/20261016")
        );
    }

    #[test]
    fn identity_cannot_escape_the_day_directory() {
        let layout = LogLayout::new("logs");
        let path = layout.path_for("../../etc/passwd", date());
        assert_eq!(path.parent(), Some(layout.day_dir(date()).as_path()));
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            ".._.._etc_passwd_20261016.jsonl"
        );
    }

    #[test]
    fn sanitize_keeps_common_identity_characters() {
        assert_eq!(sanitize_identity("jane.doe@example.com"), "jane.doe@example.com");
        assert_eq!(sanitize_identity("DOMAIN\\user"), "DOMAIN_user");
        assert_eq!(sanitize_identity("üser name"), "_ser_name");
    }

    #[test]
    fn sanitize_rejects_dot_only_and_empty_names() {
        assert_eq!(sanitize_identity(""), "_");
        assert_eq!(sanitize_identity(".."), "_");
    }
}
