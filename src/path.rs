//! Where ToS metadata and cache markers live on disk.
//!
//! Layout: `<root>/<sha256(location + name)>/<version>.json` for metadata and
//! `<cache_dir>/<sha256(location + name)>.cache` for cache markers.

use crate::channel::Channel;
use crate::environment::Environment;
use crate::models::Version;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Site metadata directory, highest priority
#[cfg(not(windows))]
pub const SITE_TOS_ROOT: &str = "/etc/conda/tos";
#[cfg(windows)]
pub const SITE_TOS_ROOT: &str = "C:/ProgramData/conda/tos";

/// Metadata directory inside the conda installation
pub const SYSTEM_TOS_ROOT: &str = "$CONDA_ROOT/conda-meta/tos";

/// Metadata directory in the user's home
pub const USER_TOS_ROOT: &str = "~/.conda/tos";

/// Metadata directory inside the active environment
pub const ENV_TOS_ROOT: &str = "$CONDA_PREFIX/conda-meta/tos";

/// Built-in search path, highest priority first
#[cfg(not(windows))]
pub const DEFAULT_SEARCH_PATH: &[&str] = &[
    SITE_TOS_ROOT,
    "/var/lib/conda/tos",
    SYSTEM_TOS_ROOT,
    "$XDG_CONFIG_HOME/conda/tos",
    "~/.config/conda/tos",
    USER_TOS_ROOT,
    ENV_TOS_ROOT,
    "$CONDATOS",
];
#[cfg(windows)]
pub const DEFAULT_SEARCH_PATH: &[&str] = &[
    SITE_TOS_ROOT,
    SYSTEM_TOS_ROOT,
    "$XDG_CONFIG_HOME/conda/tos",
    "~/.config/conda/tos",
    USER_TOS_ROOT,
    ENV_TOS_ROOT,
    "$CONDATOS",
];

const METADATA_GLOB: &str = "*.json";
const CACHE_EXTENSION: &str = "cache";

/// Ordered candidate roots for metadata reads
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    templates: Vec<String>,
    roots: Vec<PathBuf>,
}

impl SearchPath {
    /// Expand templates against `env`; templates that reference unset
    /// variables are dropped, duplicates keep their first position
    pub fn from_templates<I, S>(templates: I, env: &Environment) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut search_path = SearchPath::default();
        for template in templates {
            let template = template.into();
            if let Some(root) = env.expand(&template) {
                search_path.push(root);
            }
            search_path.templates.push(template);
        }
        search_path
    }

    pub fn from_roots<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut search_path = SearchPath::default();
        for root in roots {
            let root = root.into();
            search_path.templates.push(root.display().to_string());
            search_path.push(root);
        }
        search_path
    }

    fn push(&mut self, root: PathBuf) {
        if !self.roots.contains(&root) {
            self.roots.push(root);
        }
    }

    /// Copy of this search path with `root` appended at lowest priority
    pub fn with_root(&self, root: impl AsRef<Path>) -> Self {
        let mut extended = self.clone();
        let root = root.as_ref().to_path_buf();
        extended.templates.push(root.display().to_string());
        extended.push(root);
        extended
    }

    /// Templates as configured, for display
    pub fn templates(&self) -> &[String] {
        &self.templates
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Roots that currently exist as directories
    pub fn existing_roots(&self) -> impl Iterator<Item = &Path> {
        self.roots
            .iter()
            .map(PathBuf::as_path)
            .filter(|root| root.is_dir())
    }
}

/// Filesystem-safe token identifying a channel
pub fn hash_channel(channel: &Channel) -> String {
    let mut hasher = Sha256::new();
    hasher.update(channel.location().as_bytes());
    hasher.update(channel.name().as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn metadata_dir(root: impl AsRef<Path>, channel: &Channel) -> PathBuf {
    root.as_ref().join(hash_channel(channel))
}

pub fn metadata_path(root: impl AsRef<Path>, channel: &Channel, version: &Version) -> PathBuf {
    metadata_dir(root, channel).join(format!("{version}.json"))
}

/// Every metadata file under every existing root, root order then lexical
pub fn all_channel_paths(search_path: &SearchPath) -> Vec<PathBuf> {
    search_path
        .existing_roots()
        .flat_map(|root| glob_sorted(root, &format!("*/{METADATA_GLOB}")))
        .collect()
}

/// Metadata files for one channel, root order then lexical
pub fn channel_paths(channel: &Channel, search_path: &SearchPath) -> Vec<PathBuf> {
    let hash = hash_channel(channel);
    search_path
        .existing_roots()
        .flat_map(|root| glob_sorted(root, &format!("{hash}/{METADATA_GLOB}")))
        .collect()
}

pub fn cache_path(cache_dir: impl AsRef<Path>, channel: &Channel) -> PathBuf {
    cache_dir
        .as_ref()
        .join(format!("{}.{CACHE_EXTENSION}", hash_channel(channel)))
}

/// Every cache marker in the cache directory
pub fn cache_paths(cache_dir: impl AsRef<Path>) -> Vec<PathBuf> {
    glob_sorted(cache_dir.as_ref(), &format!("*.{CACHE_EXTENSION}"))
}

fn glob_sorted(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let full = format!("{}/{}", escaped.trim_end_matches('/'), pattern);
    let mut paths: Vec<PathBuf> = match glob::glob(&full) {
        Ok(entries) => entries
            .filter_map(|entry| match entry {
                Ok(path) if path.is_file() => Some(path),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable path");
                    None
                }
            })
            .collect(),
        Err(e) => {
            tracing::warn!(pattern = %full, error = %e, "Invalid glob pattern");
            Vec::new()
        }
    };
    paths.sort();
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn channel(url: &str) -> Channel {
        Channel::from_url(url).unwrap()
    }

    #[test]
    fn test_hash_channel_is_stable_and_distinct() {
        let main = channel("https://repo.anaconda.com/pkgs/main");
        let r = channel("https://repo.anaconda.com/pkgs/r");
        assert_eq!(hash_channel(&main), hash_channel(&main.clone()));
        assert_ne!(hash_channel(&main), hash_channel(&r));
        assert_eq!(hash_channel(&main).len(), 64);
        assert!(hash_channel(&main).chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_metadata_path_layout() {
        let c = channel("https://repo.anaconda.com/pkgs/main");
        let path = metadata_path("/tos", &c, &Version::Sequence(42));
        assert_eq!(path, PathBuf::from("/tos").join(hash_channel(&c)).join("42.json"));
        assert_eq!(
            cache_path("/cache", &c),
            PathBuf::from("/cache").join(format!("{}.cache", hash_channel(&c)))
        );
    }

    #[test]
    fn test_search_path_skips_unset_and_duplicates() {
        let env = Environment::from_vars([("CONDA_PREFIX", "/opt/env")]).with_home("/home/u");
        let search_path = SearchPath::from_templates(
            ["$CONDATOS", "~/.conda/tos", "$CONDA_PREFIX/tos", "/home/u/.conda/tos"],
            &env,
        );
        assert_eq!(
            search_path.roots(),
            &[PathBuf::from("/home/u/.conda/tos"), PathBuf::from("/opt/env/tos")]
        );
        assert_eq!(search_path.templates().len(), 4);
    }

    #[test]
    fn test_channel_paths_in_root_then_lexical_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let c = channel("https://example.com/chan");
        let other = channel("https://example.com/other");

        for (root, version) in [(&second, 1u64), (&first, 2), (&first, 1)] {
            let path = metadata_path(root.path(), &c, &Version::Sequence(version));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "{}").unwrap();
        }
        let path = metadata_path(second.path(), &other, &Version::Sequence(7));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{}").unwrap();

        let search_path =
            SearchPath::from_roots([first.path(), Path::new("/nonexistent/tos"), second.path()]);

        let paths = channel_paths(&c, &search_path);
        assert_eq!(
            paths,
            vec![
                metadata_path(first.path(), &c, &Version::Sequence(1)),
                metadata_path(first.path(), &c, &Version::Sequence(2)),
                metadata_path(second.path(), &c, &Version::Sequence(1)),
            ]
        );
        assert_eq!(all_channel_paths(&search_path).len(), 4);
    }
}
