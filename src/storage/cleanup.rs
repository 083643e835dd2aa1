use super::remove_quietly;
use crate::path::{SearchPath, all_channel_paths, cache_paths};
use std::path::{Path, PathBuf};

/// Remove every cache marker. Returns the removed paths.
pub fn clean_cache(cache_dir: impl AsRef<Path>) -> Vec<PathBuf> {
    cache_paths(cache_dir)
        .into_iter()
        .filter(|path| remove_quietly(path))
        .collect()
}

/// Remove every metadata file on the search path. Returns the removed paths.
///
/// Files that cannot be removed (permissions, races) are skipped.
pub fn clean_tos(search_path: &SearchPath) -> Vec<PathBuf> {
    let removed: Vec<PathBuf> = all_channel_paths(search_path)
        .into_iter()
        .filter(|path| remove_quietly(path))
        .collect();
    tracing::info!(count = removed.len(), "Removed ToS files");
    removed
}
