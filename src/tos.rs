//! Reconciliation of remote ToS documents with local decisions.
//!
//! A channel is only checked against its remote when its cache marker is
//! stale. The newest version wins: a local decision on a version `>=` the
//! remote one stays current, otherwise the newer remote document is surfaced
//! as pending alongside the old decision.

use crate::cache;
use crate::channel::Channel;
use crate::config::Settings;
use crate::error::Result;
use crate::models::{MetadataRecord, RemoteMetadata};
use crate::path::SearchPath;
use crate::remote::RemoteSource;
use crate::storage::{self, cleanup};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Query/write API over the local store, the cache and a remote source
#[derive(Debug, Clone)]
pub struct TosClient<R> {
    search_path: SearchPath,
    cache_dir: PathBuf,
    remote: R,
}

/// Active channels split by their current ToS state
#[derive(Debug, Default)]
pub struct Gathered {
    pub accepted: Vec<Channel>,
    pub rejected: Vec<Channel>,
    /// Channels with a ToS version nobody decided on yet
    pub pending: Vec<(Channel, MetadataRecord)>,
}

impl<R: RemoteSource> TosClient<R> {
    pub fn new(search_path: SearchPath, cache_dir: impl Into<PathBuf>, remote: R) -> Self {
        Self {
            search_path,
            cache_dir: cache_dir.into(),
            remote,
        }
    }

    pub fn from_settings(settings: &Settings, remote: R) -> Self {
        Self::new(
            settings.search_path.clone(),
            settings.cache_dir.clone(),
            remote,
        )
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn is_stale(&self, channel: &Channel, cache_timeout: Option<Duration>) -> bool {
        cache::is_stale(&self.cache_dir, channel, cache_timeout)
    }

    /// Authoritative ToS state for one channel.
    ///
    /// Fresh cache: the local record, no network. Stale cache: fetch the
    /// remote and merge. Fails with `Missing` when neither side has a ToS.
    pub fn resolve(
        &self,
        channel: &Channel,
        tos_root: impl AsRef<Path>,
        cache_timeout: Option<Duration>,
    ) -> Result<MetadataRecord> {
        let search_path = self.search_path.with_root(tos_root);

        if !self.is_stale(channel, cache_timeout) {
            tracing::debug!(channel = %channel, "ToS cache fresh, using local record");
            return storage::read_latest(channel, &search_path);
        }

        let remote = match self.remote.fetch(channel) {
            Ok(remote) => remote,
            Err(e) if e.is_missing() => {
                self.touch(channel);
                return storage::read_latest(channel, &search_path);
            }
            Err(e) => return Err(e),
        };

        match storage::read_latest(channel, &search_path) {
            Ok(local) => Ok(self.merge(channel, local, remote)),
            Err(e) if e.is_missing() => {
                tracing::debug!(channel = %channel, version = %remote.version, "ToS pending");
                Ok(MetadataRecord::Pending { remote })
            }
            Err(e) => Err(e),
        }
    }

    /// Current state of every channel with a local record.
    ///
    /// Channels whose remote no longer publishes a ToS are left out.
    pub fn resolve_all(
        &self,
        tos_root: impl AsRef<Path>,
        cache_timeout: Option<Duration>,
    ) -> Result<Vec<(Channel, MetadataRecord)>> {
        self.resolve_stored(tos_root.as_ref(), cache_timeout, &HashSet::new())
    }

    fn resolve_stored(
        &self,
        tos_root: &Path,
        cache_timeout: Option<Duration>,
        skip: &HashSet<String>,
    ) -> Result<Vec<(Channel, MetadataRecord)>> {
        let search_path = self.search_path.with_root(tos_root);
        let mut resolved = Vec::new();

        for (channel, local) in storage::read_all(&search_path) {
            if skip.contains(&channel.base_url()) {
                continue;
            }
            if !self.is_stale(&channel, cache_timeout) {
                resolved.push((channel, local));
                continue;
            }
            match self.remote.fetch(&channel) {
                Ok(remote) => {
                    let record = self.merge(&channel, local, remote);
                    resolved.push((channel, record));
                }
                Err(e) if e.is_missing() => {
                    tracing::debug!(channel = %channel, "ToS no longer published, skipping");
                    self.touch(&channel);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(resolved)
    }

    fn merge(
        &self,
        channel: &Channel,
        local: MetadataRecord,
        remote: RemoteMetadata,
    ) -> MetadataRecord {
        if local.version() >= remote.version {
            self.touch(channel);
            return local;
        }

        tracing::debug!(
            channel = %channel,
            local = %local.version(),
            remote = %remote.version,
            "Newer ToS published"
        );
        match local.into_decided() {
            Some((metadata, path)) => MetadataRecord::Outdated {
                metadata,
                path,
                remote,
            },
            None => MetadataRecord::Pending { remote },
        }
    }

    /// Accept the ToS version the user is currently shown
    pub fn accept(
        &self,
        channel: &Channel,
        tos_root: impl AsRef<Path>,
        cache_timeout: Option<Duration>,
    ) -> Result<MetadataRecord> {
        self.decide(channel, tos_root.as_ref(), cache_timeout, true)
    }

    /// Reject the ToS version the user is currently shown
    pub fn reject(
        &self,
        channel: &Channel,
        tos_root: impl AsRef<Path>,
        cache_timeout: Option<Duration>,
    ) -> Result<MetadataRecord> {
        self.decide(channel, tos_root.as_ref(), cache_timeout, false)
    }

    fn decide(
        &self,
        channel: &Channel,
        tos_root: &Path,
        cache_timeout: Option<Duration>,
        accepted: bool,
    ) -> Result<MetadataRecord> {
        let current = self.resolve(channel, tos_root, cache_timeout)?;
        self.record_decision(channel, tos_root, &current, accepted)
    }

    /// Store a decision on the version `shown` presents, without refetching
    pub fn record_decision(
        &self,
        channel: &Channel,
        tos_root: impl AsRef<Path>,
        shown: &MetadataRecord,
        accepted: bool,
    ) -> Result<MetadataRecord> {
        let record = storage::write(tos_root, channel, shown.current(), accepted)?;
        self.touch(channel);
        Ok(record)
    }

    /// Every active channel (with `None` when it has no ToS), followed by
    /// every other channel with a stored decision.
    pub fn list_all(
        &self,
        channels: &[Channel],
        tos_root: impl AsRef<Path>,
        cache_timeout: Option<Duration>,
    ) -> Result<Vec<(Channel, Option<MetadataRecord>)>> {
        let tos_root = tos_root.as_ref();
        let mut seen = HashSet::new();
        let mut listing = Vec::new();

        for channel in channels {
            if !seen.insert(channel.base_url()) {
                continue;
            }
            match self.resolve(channel, tos_root, cache_timeout) {
                Ok(record) => listing.push((channel.clone(), Some(record))),
                Err(e) if e.is_missing() => listing.push((channel.clone(), None)),
                Err(e) => return Err(e),
            }
        }

        for (channel, record) in self.resolve_stored(tos_root, cache_timeout, &seen)? {
            listing.push((channel, Some(record)));
        }

        Ok(listing)
    }

    /// Classify active channels; channels without a ToS are left out
    pub fn gather(
        &self,
        channels: &[Channel],
        tos_root: impl AsRef<Path>,
        cache_timeout: Option<Duration>,
    ) -> Result<Gathered> {
        let tos_root = tos_root.as_ref();
        let mut gathered = Gathered::default();

        for channel in channels {
            let record = match self.resolve(channel, tos_root, cache_timeout) {
                Ok(record) => record,
                Err(e) if e.is_missing() => continue,
                Err(e) => return Err(e),
            };
            match record.accepted() {
                Some(true) => gathered.accepted.push(channel.clone()),
                Some(false) => gathered.rejected.push(channel.clone()),
                None => gathered.pending.push((channel.clone(), record)),
            }
        }

        Ok(gathered)
    }

    /// Remove all cache markers
    pub fn clean_cache(&self) -> Vec<PathBuf> {
        cleanup::clean_cache(&self.cache_dir)
    }

    /// Remove all stored decisions on the search path and `tos_root`
    pub fn clean_tos(&self, tos_root: impl AsRef<Path>) -> Vec<PathBuf> {
        cleanup::clean_tos(&self.search_path.with_root(tos_root))
    }

    fn touch(&self, channel: &Channel) {
        if let Err(e) = cache::touch(&self.cache_dir, channel) {
            tracing::warn!(channel = %channel, error = %e, "Failed to update ToS cache");
        }
    }
}
