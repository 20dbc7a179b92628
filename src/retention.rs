//! Log file retention management
//!
//! Handles cleanup of old day files based on age. The sweep is best-effort:
//! a file that cannot be inspected or deleted is skipped without retrying.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::Result;

use crate::config::DEFAULT_MAX_AGE_HOURS;

/// Clean up day files older than the default retention window (24 hours)
///
/// Returns the number of files deleted.
pub fn cleanup_old_logs(logs_dir: &Path) -> Result<usize> {
    cleanup_old_logs_with_max_age(
        logs_dir,
        Duration::from_secs(DEFAULT_MAX_AGE_HOURS * 60 * 60),
    )
}

/// Clean up day files created strictly before `now - max_age`
///
/// A file created exactly at the cutoff is kept. Returns the number of files
/// deleted.
pub fn cleanup_old_logs_with_max_age(logs_dir: &Path, max_age: Duration) -> Result<usize> {
    if !logs_dir.exists() {
        return Ok(0);
    }

    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut deleted_count = 0;

    for entry in fs::read_dir(logs_dir)? {
        let entry = entry?;
        let path = entry.path();

        // Only process day-named log files
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if !name.starts_with("log-") || !name.ends_with(".txt") {
                continue;
            }
        } else {
            continue;
        }

        if let Ok(metadata) = entry.metadata() {
            // Creation time where the filesystem records it, else mtime
            let created = metadata.created().or_else(|_| metadata.modified());
            if let Ok(created) = created {
                if created < cutoff && fs::remove_file(&path).is_ok() {
                    deleted_count += 1;
                }
            }
        }
    }

    Ok(deleted_count)
}
