//! Active day-file lifecycle
//!
//! One physical log file per UTC calendar day, named `log-YYYY-MM-DD.txt`.
//! The file is append-only except for the truncating rotation that replaces
//! it once it grows past the size ceiling. The active path is re-derived on
//! every append, so a process running across midnight starts writing to the
//! new day's file instead of growing yesterday's forever.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};

use crate::config::HeaderInfo;
use crate::hooks::AccountProvider;
use crate::record::TIMESTAMP_FORMAT;

/// Categories of disk errors seen on the append path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    /// Permission denied (read or write)
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// Other IO error
    Other,
}

/// Categorize an IO error; `DiskFull` triggers the disk-space monitor
pub fn categorize_io_error(e: &io::Error) -> DiskErrorKind {
    use std::io::ErrorKind;

    #[cfg(unix)]
    if e.raw_os_error() == Some(libc::ENOSPC) || e.raw_os_error() == Some(libc::EDQUOT) {
        return DiskErrorKind::DiskFull;
    }

    match e.kind() {
        ErrorKind::StorageFull => DiskErrorKind::DiskFull,
        // On some systems, disk full might appear as WriteZero
        ErrorKind::WriteZero => DiskErrorKind::DiskFull,
        ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,
        ErrorKind::NotFound => DiskErrorKind::NotFound,
        _ => DiskErrorKind::Other,
    }
}

/// Deterministic file name for a UTC calendar day
pub fn file_name_for(date: NaiveDate) -> String {
    format!("log-{}.txt", date.format("%Y-%m-%d"))
}

/// The store's handle on the current day's log file
///
/// Not internally synchronized; the store wraps it in a mutex so that a
/// refresh can never interleave with an append.
#[derive(Debug)]
pub struct DayFile {
    dir: PathBuf,
    header: HeaderInfo,
    max_file_size: u64,
}

impl DayFile {
    pub fn new(dir: PathBuf, header: HeaderInfo, max_file_size: u64) -> Self {
        Self {
            dir,
            header,
            max_file_size,
        }
    }

    /// Path of today's file, re-derived from the current UTC date
    pub fn active_path(&self) -> PathBuf {
        self.dir.join(file_name_for(Utc::now().date_naive()))
    }

    /// Path of today's file if it exists on disk (for sharing)
    pub fn existing_path(&self) -> Option<PathBuf> {
        let path = self.active_path();
        path.exists().then_some(path)
    }

    /// Make sure today's file exists and is under the ceiling, creating or
    /// rotating as needed; returns the path ready for appending
    pub fn prepare(&self, accounts: &dyn AccountProvider) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.active_path();

        if !path.exists() {
            self.start_file(&path, accounts)?;
        } else if fs::metadata(&path)?.len() > self.max_file_size {
            // Truncating rotation: history for the day is discarded
            fs::remove_file(&path)?;
            self.start_file(&path, accounts)?;
        }

        Ok(path)
    }

    /// Append one pre-rendered line, creating or rotating the file first
    pub fn append_line(&self, accounts: &dyn AccountProvider, line: &str) -> io::Result<()> {
        let path = self.prepare(accounts)?;
        let mut file = OpenOptions::new().append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Mark the start of a session in today's file
    ///
    /// Creating the file already writes a marker; when the file carried over
    /// from an earlier run, a fresh marker is appended so sessions remain
    /// distinguishable.
    pub fn start_session(&self, accounts: &dyn AccountProvider) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.active_path();
        if path.exists() {
            let mut file = OpenOptions::new().append(true).open(&path)?;
            write_session_marker(&mut file, &self.header)?;
        } else {
            self.start_file(&path, accounts)?;
        }
        Ok(())
    }

    /// Delete and recreate today's file with a fresh header and marker
    pub fn refresh(&self, accounts: &dyn AccountProvider) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.active_path();
        if path.exists() {
            fs::remove_file(&path)?;
        }
        self.start_file(&path, accounts)?;
        Ok(path)
    }

    /// Create a fresh file containing the header block and session marker
    fn start_file(&self, path: &Path, accounts: &dyn AccountProvider) -> io::Result<()> {
        let mut file = OpenOptions::new().create_new(true).write(true).open(path)?;
        write_header(&mut file, &self.header, accounts)?;
        write_session_marker(&mut file, &self.header)?;
        Ok(())
    }
}

/// Write the descriptive header block: app version, device identity, then one
/// line per signed-in account slot
fn write_header(
    w: &mut impl Write,
    header: &HeaderInfo,
    accounts: &dyn AccountProvider,
) -> io::Result<()> {
    writeln!(w, "Current version: {}", header.app_version)?;
    writeln!(w, "Device Brand: {}", header.brand)?;
    writeln!(w, "Device: {}", header.model)?;
    writeln!(w, "Manufacturer: {}", header.manufacturer)?;
    writeln!(w, "OS: {}", header.os_version)?;
    writeln!(w, "ABI: {}", header.abi)?;
    for account in accounts.signed_in_accounts() {
        writeln!(w, "User {}: {}", account.slot, account.user_id)?;
    }
    Ok(())
}

/// Write the session-start marker and a repeated version line
fn write_session_marker(w: &mut impl Write, header: &HeaderInfo) -> io::Result<()> {
    writeln!(
        w,
        ">>>> Log start at {}",
        Utc::now().format(TIMESTAMP_FORMAT)
    )?;
    writeln!(w, "Current version: {}", header.app_version)?;
    Ok(())
}
