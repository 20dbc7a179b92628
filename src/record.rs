//! Log record construction and rendering
//!
//! A record is ephemeral: it exists only long enough to be mirrored to the
//! platform channel and rendered into the line appended to the day file.
//! Nothing structured is persisted.

use chrono::{DateTime, Utc};

use crate::level::Level;

/// Timestamp format used for file lines and session markers (ms precision)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A single log record
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// When the record was emitted
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: Level,
    /// Optional component tag (e.g. "net")
    pub tag: Option<String>,
    /// Log message
    pub message: String,
}

impl LogRecord {
    /// Create a record stamped with the current time
    pub fn new(level: Level, tag: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            tag: tag.map(str::to_string),
            message: message.into(),
        }
    }

    /// The line mirrored to the platform channel: `"{tag}: {message}"`,
    /// or the bare message when no tag is set
    pub fn display_message(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{}: {}", tag, self.message),
            None => self.message.clone(),
        }
    }

    /// The line persisted to the day file:
    /// `"{timestamp} {LEVEL} {tag-or-empty}: {message}"`
    pub fn file_line(&self) -> String {
        format!(
            "{} {} {}: {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.level,
            self.tag.as_deref().unwrap_or(""),
            self.message
        )
    }
}

/// Render an error and its source chain into a single loggable block
///
/// The alternate `Display` of `anyhow::Error` prints the error followed by
/// each cause, which is the closest analogue to a platform stack trace.
pub fn render_error(error: &anyhow::Error) -> String {
    format!("{:#}", error)
}
