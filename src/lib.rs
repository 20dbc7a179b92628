//! Chatlog - application-level logging for a mobile chat client
//!
//! Level-filtered log emission mirrored to the platform logging channel and a
//! crash reporter, persisted to one rotating on-disk file per UTC calendar
//! day, with startup retention sweeps and disk-space-exhaustion recovery.

pub mod config;
pub mod dayfile;
pub mod hooks;
pub mod level;
pub mod record;
pub mod retention;
pub mod store;

pub use config::{HeaderInfo, LogConfig, LogFilter};
pub use hooks::{
    AccountProvider, AccountSlot, CrashReporter, DiskSpaceMonitor, Hooks, PlatformLogger,
};
pub use level::Level;
pub use store::LogStore;
