//! Time-based staleness check backed by per-channel marker files.
//!
//! Only a marker's modification time matters; its content is never read.

use crate::channel::Channel;
use crate::error::{Result, ResultIoExt};
use crate::path::cache_path;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Whether `channel` must be re-checked against its remote.
///
/// A missing marker, a `None` timeout and a zero timeout are always stale.
pub fn is_stale(cache_dir: impl AsRef<Path>, channel: &Channel, timeout: Option<Duration>) -> bool {
    let Some(timeout) = timeout.filter(|t| !t.is_zero()) else {
        return true;
    };

    let marker = cache_path(cache_dir, channel);
    let modified = match fs::metadata(&marker).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => return true,
    };

    // a marker from the future counts as fresh
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO);
    age >= timeout
}

/// Create the marker (and its directory) or bump its modification time
pub fn touch(cache_dir: impl AsRef<Path>, channel: &Channel) -> Result<()> {
    let cache_dir = cache_dir.as_ref();
    fs::create_dir_all(cache_dir).map_io_err(cache_dir)?;

    let marker = cache_path(cache_dir, channel);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&marker)
        .map_io_err(&marker)?;
    file.set_modified(SystemTime::now()).map_io_err(&marker)?;

    tracing::debug!(channel = %channel, "Touched ToS cache");
    Ok(())
}
