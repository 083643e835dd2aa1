use super::metadata::{Decision, LocalMetadata, RemoteMetadata, Version};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Authoritative ToS state for one channel
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataRecord {
    /// Published, never accepted or rejected locally
    Pending { remote: RemoteMetadata },
    /// Decided locally and still current
    Decided {
        metadata: LocalMetadata,
        path: PathBuf,
    },
    /// Decided on an older version; `remote` is newer and awaits a decision
    Outdated {
        metadata: LocalMetadata,
        path: PathBuf,
        remote: RemoteMetadata,
    },
}

impl MetadataRecord {
    pub fn decided(metadata: LocalMetadata, path: impl Into<PathBuf>) -> Self {
        MetadataRecord::Decided {
            metadata,
            path: path.into(),
        }
    }

    /// The document a user should be shown (newest known version)
    pub fn current(&self) -> &RemoteMetadata {
        match self {
            MetadataRecord::Pending { remote } | MetadataRecord::Outdated { remote, .. } => remote,
            MetadataRecord::Decided { metadata, .. } => &metadata.remote,
        }
    }

    pub fn version(&self) -> Version {
        self.current().version
    }

    /// Path of the local file backing this record, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            MetadataRecord::Pending { .. } => None,
            MetadataRecord::Decided { path, .. } | MetadataRecord::Outdated { path, .. } => {
                Some(path)
            }
        }
    }

    /// Decision on the current version; `None` while pending
    pub fn decision(&self) -> Option<Decision> {
        match self {
            MetadataRecord::Decided { metadata, .. } => metadata.decision,
            _ => None,
        }
    }

    pub fn accepted(&self) -> Option<bool> {
        self.decision().map(|d| d.accepted)
    }

    /// Earlier local decision superseded by a newer remote version
    pub fn previous(&self) -> Option<(&LocalMetadata, &Path)> {
        match self {
            MetadataRecord::Outdated { metadata, path, .. } => Some((metadata, path.as_path())),
            _ => None,
        }
    }

    pub fn local(&self) -> Option<&LocalMetadata> {
        match self {
            MetadataRecord::Pending { .. } => None,
            MetadataRecord::Decided { metadata, .. } | MetadataRecord::Outdated { metadata, .. } => {
                Some(metadata)
            }
        }
    }

    /// Split a `Decided` record into its parts
    pub fn into_decided(self) -> Option<(LocalMetadata, PathBuf)> {
        match self {
            MetadataRecord::Decided { metadata, path } => Some((metadata, path)),
            _ => None,
        }
    }

    /// True when the user still has to accept or reject
    pub fn is_pending(&self) -> bool {
        self.decision().is_none()
    }

    /// Records order by version only
    pub fn cmp_version(&self, other: &Self) -> Ordering {
        self.version().cmp(&other.version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn local(version: u64, accepted: bool) -> LocalMetadata {
        LocalMetadata::decide(
            &RemoteMetadata::new(version, "ToS"),
            "https://example.com/c",
            accepted,
            Utc::now(),
        )
    }

    #[test]
    fn test_pending_has_no_path_or_decision() {
        let record = MetadataRecord::Pending {
            remote: RemoteMetadata::new(1, "Sample ToS"),
        };
        assert_eq!(record.version(), Version::Sequence(1));
        assert_eq!(record.path(), None);
        assert_eq!(record.accepted(), None);
        assert!(record.is_pending());
    }

    #[test]
    fn test_outdated_surfaces_remote_and_keeps_previous() {
        let record = MetadataRecord::Outdated {
            metadata: local(1, true),
            path: PathBuf::from("/tos/abc/1.json"),
            remote: RemoteMetadata::new(2, "New ToS"),
        };
        assert_eq!(record.version(), Version::Sequence(2));
        assert_eq!(record.current().text, "New ToS");
        assert!(record.is_pending());

        let (previous, path) = record.previous().unwrap();
        assert_eq!(previous.version(), Version::Sequence(1));
        assert_eq!(previous.tos_accepted(), Some(true));
        assert_eq!(path, Path::new("/tos/abc/1.json"));
    }

    #[test]
    fn test_cmp_version_ignores_path() {
        let a = MetadataRecord::decided(local(3, true), "/a/3.json");
        let b = MetadataRecord::decided(local(3, false), "/b/3.json");
        let c = MetadataRecord::decided(local(4, false), "/a/4.json");
        assert_eq!(a.cmp_version(&b), Ordering::Equal);
        assert_eq!(c.cmp_version(&a), Ordering::Greater);
    }
}
