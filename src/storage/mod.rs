//! Local ToS metadata store.
//!
//! Structure: {root}/{channel hash}/{version}.json
//!
//! Versions are never overwritten in place; each version gets its own file
//! and the highest version found on the search path is the current one.

pub mod cleanup;

use crate::channel::Channel;
use crate::error::{Error, Result, ResultIoExt};
use crate::models::{LocalMetadata, MetadataRecord, RemoteMetadata};
use crate::path::{SearchPath, all_channel_paths, channel_paths, metadata_path};
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// Load one metadata file.
///
/// Missing, unreadable and malformed files all yield `None`.
pub fn read(path: impl AsRef<Path>) -> Option<LocalMetadata> {
    let path = path.as_ref();
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Unable to read ToS file");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt ToS file");
            None
        }
    }
}

/// Record a decision for `channel` under `root`.
///
/// `base` may be a freshly fetched [`RemoteMetadata`] or an existing
/// [`LocalMetadata`]; its free-form fields are kept.
pub fn write(
    root: impl AsRef<Path>,
    channel: &Channel,
    base: impl AsRef<RemoteMetadata>,
    accepted: bool,
) -> Result<MetadataRecord> {
    let base = base.as_ref();
    let metadata = LocalMetadata::decide(base, channel.base_url(), accepted, Utc::now());
    let path = metadata_path(root, channel, &metadata.version());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| write_error(e, parent, channel))?;
    }

    let json = serde_json::to_string_pretty(&metadata).map_err(|e| Error::Serialization {
        msg: format!("failed to serialize ToS for {channel}: {e}"),
    })?;

    // write-then-rename so readers never observe a partial file
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| write_error(e, &tmp, channel))?;
    if let Err(e) = fs::rename(&tmp, &path) {
        let _ = fs::remove_file(&tmp);
        return Err(write_error(e, &path, channel));
    }

    tracing::info!(
        channel = %channel,
        version = %metadata.version(),
        accepted,
        path = %path.display(),
        "Recorded ToS decision"
    );
    Ok(MetadataRecord::decided(metadata, path))
}

/// Permission failures get their own error carrying the channel
fn write_error(error: io::Error, at: &Path, channel: &Channel) -> Error {
    if error.kind() == io::ErrorKind::PermissionDenied {
        Error::PermissionDenied {
            path: at.display().to_string(),
            channel: channel.base_url(),
        }
    } else {
        Error::Io {
            error,
            path: at.display().to_string(),
        }
    }
}

/// Newest record for `channel` anywhere on the search path.
///
/// On equal versions the file from the higher-priority root wins.
pub fn read_latest(channel: &Channel, search_path: &SearchPath) -> Result<MetadataRecord> {
    let mut latest: Option<MetadataRecord> = None;
    for path in channel_paths(channel, search_path) {
        let Some(metadata) = read(&path) else {
            continue;
        };
        let record = MetadataRecord::decided(metadata, path);
        if latest
            .as_ref()
            .is_none_or(|current| record.version() > current.version())
        {
            latest = Some(record);
        }
    }

    latest.ok_or_else(|| Error::Missing {
        channel: channel.base_url(),
    })
}

/// Newest record per channel across the whole search path.
///
/// Channels are keyed by the base URL stored inside each file and returned in
/// first-seen order.
pub fn read_all(search_path: &SearchPath) -> Vec<(Channel, MetadataRecord)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut latest: Vec<(Channel, MetadataRecord)> = Vec::new();

    for path in all_channel_paths(search_path) {
        let Some(metadata) = read(&path) else {
            continue;
        };
        let channel = match Channel::from_url(&metadata.base_url) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring ToS file");
                continue;
            }
        };
        let record = MetadataRecord::decided(metadata, path);

        match index.get(&channel.base_url()) {
            Some(&i) => {
                if record.version() > latest[i].1.version() {
                    latest[i].1 = record;
                }
            }
            None => {
                index.insert(channel.base_url(), latest.len());
                latest.push((channel, record));
            }
        }
    }

    latest
}

/// Remove a file, logging instead of failing
pub(crate) fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path).map_io_err(path) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to remove file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Version;
    use crate::path::hash_channel;
    use tempfile::TempDir;

    fn channel() -> Channel {
        Channel::from_url("https://example.com/pkgs/chan").unwrap()
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let root = TempDir::new().unwrap();
        let remote = RemoteMetadata::new(1, "Sample ToS").with_field("support", "help@example.com");

        let record = write(root.path(), &channel(), &remote, true).unwrap();
        let path = record.path().unwrap().to_path_buf();
        assert_eq!(
            path,
            root.path().join(hash_channel(&channel())).join("1.json")
        );

        let read_back = read(&path).unwrap();
        assert_eq!(Some(&read_back), record.local());
        assert_eq!(read_back.base_url, "https://example.com/pkgs/chan");
        assert_eq!(read_back.tos_accepted(), Some(true));
        assert_eq!(read_back.remote.support(), Some("help@example.com"));
    }

    #[test]
    fn test_write_from_local_base_restamps() {
        let root = TempDir::new().unwrap();
        let accepted = write(root.path(), &channel(), RemoteMetadata::new(3, "ToS"), true).unwrap();
        let local = accepted.local().unwrap().clone();

        let rejected = write(root.path(), &channel(), &local, false).unwrap();
        assert_eq!(rejected.accepted(), Some(false));
        assert_eq!(rejected.path(), accepted.path());
        assert_eq!(read(rejected.path().unwrap()).unwrap().tos_accepted(), Some(false));
    }

    #[test]
    fn test_write_error_maps_permission_denied() {
        let at = Path::new("/tos/abc/1.json");
        let err = write_error(io::ErrorKind::PermissionDenied.into(), at, &channel());
        match err {
            Error::PermissionDenied { path, channel } => {
                assert_eq!(path, "/tos/abc/1.json");
                assert_eq!(channel, "https://example.com/pkgs/chan");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_write_error_keeps_other_io_errors() {
        let at = Path::new("/tos/abc/1.json");
        let err = write_error(io::ErrorKind::Other.into(), at, &channel());
        match err {
            Error::Io { error, path } => {
                assert_eq!(error.kind(), io::ErrorKind::Other);
                assert_eq!(path, "/tos/abc/1.json");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_write_into_read_only_root_is_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let locked = root.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        // privileged users ignore directory modes
        if fs::create_dir(locked.join("mode-check")).is_ok() {
            return;
        }

        let err = write(&locked, &channel(), RemoteMetadata::new(1, "ToS"), true).unwrap_err();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        match err {
            Error::PermissionDenied { path, channel } => {
                assert!(path.starts_with(&locked.display().to_string()));
                assert_eq!(channel, "https://example.com/pkgs/chan");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_read_collapses_failures_to_none() {
        let root = TempDir::new().unwrap();
        assert!(read(root.path().join("missing.json")).is_none());

        let corrupt = root.path().join("corrupt.json");
        fs::write(&corrupt, "{not json").unwrap();
        assert!(read(&corrupt).is_none());

        let half = root.path().join("half.json");
        fs::write(&half, r#"{"version": 1, "text": "t", "base_url": "u", "tos_accepted": true}"#)
            .unwrap();
        assert!(read(&half).is_none());
    }

    #[test]
    fn test_read_latest_picks_highest_version() {
        let root = TempDir::new().unwrap();
        for v in [2u64, 10, 1] {
            write(root.path(), &channel(), RemoteMetadata::new(v, "ToS"), true).unwrap();
        }
        let search_path = SearchPath::from_roots([root.path()]);

        let latest = read_latest(&channel(), &search_path).unwrap();
        assert_eq!(latest.version(), Version::Sequence(10));
    }

    #[test]
    fn test_read_latest_prefers_higher_priority_root_on_tie() {
        let high = TempDir::new().unwrap();
        let low = TempDir::new().unwrap();
        write(high.path(), &channel(), RemoteMetadata::new(5, "ToS"), true).unwrap();
        write(low.path(), &channel(), RemoteMetadata::new(5, "ToS"), false).unwrap();

        let search_path = SearchPath::from_roots([high.path(), low.path()]);
        let latest = read_latest(&channel(), &search_path).unwrap();
        assert_eq!(latest.accepted(), Some(true));
        assert!(latest.path().unwrap().starts_with(high.path()));
    }

    #[test]
    fn test_timestamps_in_same_second_get_separate_files() {
        let root = TempDir::new().unwrap();
        let base = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 10, 1, 0, 0, 0).unwrap();
        let early = base + chrono::Duration::milliseconds(100);
        let late = base + chrono::Duration::milliseconds(900);

        let a = write(root.path(), &channel(), RemoteMetadata::new(early, "old"), true).unwrap();
        let b = write(root.path(), &channel(), RemoteMetadata::new(late, "new"), false).unwrap();
        assert_ne!(a.path(), b.path());

        let search_path = SearchPath::from_roots([root.path()]);
        assert_eq!(all_channel_paths(&search_path).len(), 2);
        let latest = read_latest(&channel(), &search_path).unwrap();
        assert_eq!(latest.version(), Version::Timestamp(late));
        assert_eq!(latest.current().text, "new");
    }

    #[test]
    fn test_read_latest_missing() {
        let root = TempDir::new().unwrap();
        let search_path = SearchPath::from_roots([root.path()]);
        let err = read_latest(&channel(), &search_path).unwrap_err();
        assert!(err.is_missing());
    }

    #[test]
    fn test_read_all_groups_by_embedded_base_url() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let other = Channel::from_url("https://example.com/pkgs/other").unwrap();

        write(first.path(), &channel(), RemoteMetadata::new(1, "ToS"), true).unwrap();
        write(second.path(), &channel(), RemoteMetadata::new(2, "ToS"), false).unwrap();
        write(second.path(), &other, RemoteMetadata::new(1, "ToS"), true).unwrap();

        let search_path = SearchPath::from_roots([first.path(), second.path()]);
        let all = read_all(&search_path);
        assert_eq!(all.len(), 2);

        let (c, record) = all.iter().find(|(c, _)| *c == channel()).unwrap();
        assert_eq!(c.base_url(), "https://example.com/pkgs/chan");
        assert_eq!(record.version(), Version::Sequence(2));
        assert_eq!(record.accepted(), Some(false));
    }
}
