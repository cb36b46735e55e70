use std::fs::Metadata;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::types::SkipReason;

/// Tree walk settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    pub follow_links: bool,
    pub max_depth: Option<usize>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            follow_links: true,
            max_depth: None,
        }
    }
}

impl From<&ScanConfig> for WalkOptions {
    fn from(config: &ScanConfig) -> Self {
        Self {
            follow_links: config.follow_links,
            max_depth: config.max_depth,
        }
    }
}

/// Make `path` absolute against the current directory without touching symlinks
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Lazily enumerate every non-directory entry below `root`.
///
/// Paths are absolute. Entries that cannot be read (permission denied,
/// symlink loops, dangling links) are yielded as errors so the caller can
/// log them and carry on.
pub fn walk(root: &Path, options: WalkOptions) -> Result<impl Iterator<Item = Result<PathBuf>>> {
    // Check if directory exists
    if !root.exists() {
        return Err(Error::FileNotFound(root.to_path_buf()));
    }
    let root = absolute_path(root)?;

    let mut walker = WalkDir::new(root).follow_links(options.follow_links);
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }

    Ok(walker.into_iter().filter_map(|entry| match entry {
        Ok(entry) if entry.file_type().is_dir() => None,
        Ok(entry) => Some(Ok(entry.into_path())),
        Err(e) => Some(Err(Error::Walk(e))),
    }))
}

/// Returns if the file name of `path` carries `extension`, ignoring case
pub fn has_image_extension(path: &Path, extension: &str) -> bool {
    let wanted = extension.trim_start_matches('.');
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}

/// Decide whether a walked path is a candidate for ingestion
pub fn check_eligibility(
    path: &Path,
    metadata: &Metadata,
    extension: &str,
) -> std::result::Result<(), SkipReason> {
    if !metadata.is_file() {
        return Err(SkipReason::NotRegularFile);
    }
    if metadata.len() == 0 {
        return Err(SkipReason::Empty);
    }
    if !has_image_extension(path, extension) {
        return Err(SkipReason::UnrecognisedExtension);
    }
    Ok(())
}

// -- Tests --
