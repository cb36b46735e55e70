//! Content-addressed output layout.
//!
//! Every distinct content gets a directory named by its hash under the output
//! root, holding one copy of the first file seen with that content:
//!
//! ```text
//! <output root>/
//!   <hash>/
//!     <original file name>
//! ```
//!
//! Copies are written to a temporary file inside the hash directory and then
//! moved into place, so an interrupted run never leaves a truncated file under
//! the final name. An existing non-empty target is never overwritten.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::hashing::ContentHash;
use crate::logging::log_fs_modification;

/// Where a canonical copy ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub path: PathBuf,

    /// The target already held a non-empty file; nothing was copied
    pub already_present: bool,
}

/// Places canonical copies under hash-named directories
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the canonical copy of `file_name` with `hash` lives at
    pub fn destination_for(&self, hash: &ContentHash, file_name: &str) -> PathBuf {
        self.root.join(hash.as_str()).join(file_name)
    }

    /// Copy `source` into the directory for `hash`, keeping its file name.
    ///
    /// An existing non-empty target counts as already placed. An empty target
    /// left behind by an interrupted copy is replaced.
    pub fn place(&self, hash: &ContentHash, source: &Path) -> Result<Placement> {
        let file_name = source
            .file_name()
            .ok_or_else(|| Error::FileNotFound(source.to_path_buf()))?
            .to_string_lossy()
            .into_owned();
        let destination = self.destination_for(hash, &file_name);

        let replace_empty = match fs::metadata(&destination) {
            Ok(existing) if existing.len() > 0 => {
                debug!("Target file already exists: {}", destination.display());
                return Ok(Placement {
                    path: destination,
                    already_present: true,
                });
            }
            Ok(_) => {
                warn!(
                    "Replacing empty target left by an earlier run: {}",
                    destination.display()
                );
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(placement_error(source, &destination, e)),
        };

        let dir = self.root.join(hash.as_str());
        fs::create_dir_all(&dir).map_err(|e| placement_error(source, &destination, e))?;

        let staged = stage_copy(source, &dir).map_err(|e| placement_error(source, &destination, e))?;

        let persisted = if replace_empty {
            staged.persist(&destination)
        } else {
            staged.persist_noclobber(&destination)
        };

        match persisted {
            Ok(_) => {
                log_fs_modification(
                    "copy",
                    &destination,
                    Some(format!("from {}", source.display()).as_str()),
                );
                Ok(Placement {
                    path: destination,
                    already_present: false,
                })
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists && is_non_empty(&destination) => {
                // Someone else put the same name in place since we looked
                debug!("Target file already exists: {}", destination.display());
                Ok(Placement {
                    path: destination,
                    already_present: true,
                })
            }
            Err(e) => Err(placement_error(source, &destination, e.error)),
        }
    }
}

fn placement_error(source: &Path, destination: &Path, error: io::Error) -> Error {
    Error::Placement {
        source_path: source.to_path_buf(),
        destination: destination.to_path_buf(),
        source: error,
    }
}

fn is_non_empty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Copy `source` with its permissions and modification time into a temporary file in `dir`
fn stage_copy(source: &Path, dir: &Path) -> io::Result<tempfile::NamedTempFile> {
    let mut input = File::open(source)?;
    let metadata = input.metadata()?;

    let mut staged = tempfile::Builder::new()
        .prefix(".")
        .suffix(".partial")
        .tempfile_in(dir)?;

    io::copy(&mut input, staged.as_file_mut())?;

    let file = staged.as_file();
    file.set_permissions(metadata.permissions())?;
    if let Ok(modified) = metadata.modified() {
        file.set_modified(modified)?;
    }
    file.sync_all()?;

    Ok(staged)
}
