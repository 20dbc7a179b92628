//! External collaborator interfaces
//!
//! The store talks to the host application through four narrow traits: the
//! platform logging channel, the crash reporter, the disk-space monitor and
//! the account provider consumed by the header writer. Defaults are provided
//! so a store can be built with only the collaborators the host cares about.

use std::sync::Arc;

use crate::level::Level;

/// OS-level logging channel the emitted lines are mirrored to
pub trait PlatformLogger: Send + Sync {
    /// Log one line at the given level; `error` is passed through for native
    /// stack-trace rendering
    fn log(&self, level: Level, tag: &str, message: &str, error: Option<&anyhow::Error>);
}

/// Remote crash-reporting sink for warn+ lines and recorded exceptions
pub trait CrashReporter: Send + Sync {
    /// Attach a contextual line to the current crash-reporting session
    fn log_breadcrumb(&self, message: &str);

    /// Submit a non-fatal exception for remote aggregation
    fn record_exception(&self, error: &anyhow::Error);
}

/// Notified when a write fails because storage is exhausted
pub trait DiskSpaceMonitor: Send + Sync {
    /// `required_slack` is the number of free megabytes the host should try
    /// to reclaim before logging can resume
    fn notify_low_disk(&self, required_slack: u64);
}

/// A signed-in account slot, consumed only by the header writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSlot {
    /// Slot index in the host's account table
    pub slot: usize,
    /// Numeric account identifier
    pub user_id: i64,
}

/// Enumerates the host's signed-in account slots
pub trait AccountProvider: Send + Sync {
    /// Slots that are actively signed in, in slot order
    fn signed_in_accounts(&self) -> Vec<AccountSlot>;
}

/// Default platform logger backed by the `tracing` ecosystem
#[derive(Debug, Default)]
pub struct TracingPlatformLogger;

impl PlatformLogger for TracingPlatformLogger {
    fn log(&self, level: Level, tag: &str, message: &str, error: Option<&anyhow::Error>) {
        match tracing::Level::from(level) {
            tracing::Level::TRACE | tracing::Level::DEBUG => match error {
                Some(e) => tracing::debug!(target: "chatlog", tag, error = %e, "{message}"),
                None => tracing::debug!(target: "chatlog", tag, "{message}"),
            },
            tracing::Level::INFO => match error {
                Some(e) => tracing::info!(target: "chatlog", tag, error = %e, "{message}"),
                None => tracing::info!(target: "chatlog", tag, "{message}"),
            },
            tracing::Level::WARN => match error {
                Some(e) => tracing::warn!(target: "chatlog", tag, error = %e, "{message}"),
                None => tracing::warn!(target: "chatlog", tag, "{message}"),
            },
            tracing::Level::ERROR => match error {
                Some(e) => tracing::error!(target: "chatlog", tag, error = %e, "{message}"),
                None => tracing::error!(target: "chatlog", tag, "{message}"),
            },
        }
    }
}

/// Crash reporter that discards everything (hosts without remote reporting)
#[derive(Debug, Default)]
pub struct NoopCrashReporter;

impl CrashReporter for NoopCrashReporter {
    fn log_breadcrumb(&self, _message: &str) {}
    fn record_exception(&self, _error: &anyhow::Error) {}
}

/// Disk monitor that ignores notifications
#[derive(Debug, Default)]
pub struct NoopDiskSpaceMonitor;

impl DiskSpaceMonitor for NoopDiskSpaceMonitor {
    fn notify_low_disk(&self, _required_slack: u64) {}
}

/// Account provider with no signed-in accounts
#[derive(Debug, Default)]
pub struct NoAccounts;

impl AccountProvider for NoAccounts {
    fn signed_in_accounts(&self) -> Vec<AccountSlot> {
        Vec::new()
    }
}

/// Bundle of all collaborators handed to the store at construction
#[derive(Clone)]
pub struct Hooks {
    pub platform: Arc<dyn PlatformLogger>,
    pub crash_reporter: Arc<dyn CrashReporter>,
    pub disk_monitor: Arc<dyn DiskSpaceMonitor>,
    pub accounts: Arc<dyn AccountProvider>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            platform: Arc::new(TracingPlatformLogger),
            crash_reporter: Arc::new(NoopCrashReporter),
            disk_monitor: Arc::new(NoopDiskSpaceMonitor),
            accounts: Arc::new(NoAccounts),
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

/// Install a plain `tracing` subscriber for hosts that don't set up their own
///
/// Respects `RUST_LOG`; falls back to showing `chatlog` at debug. Returns an
/// error if a global subscriber is already installed.
pub fn init_platform_subscriber() -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "chatlog=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
