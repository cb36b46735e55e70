use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::hashing::ContentHash;

/// Column names of the manifest, in on-disk order
pub const MANIFEST_COLUMNS: [&str; 8] = [
    "original-path",
    "filename",
    "size",
    "modified",
    "hash",
    "barcode",
    "destination-path",
    "duplicate-of",
];

/// One row of the manifest, describing a single processed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Absolute source path, the identity of this file instance
    pub original_path: String,

    /// File name component of the source path
    pub file_name: String,

    /// File size in bytes
    pub size_bytes: u64,

    /// Last modified timestamp (epoch millis)
    pub last_modified: i64,

    /// Hex content digest
    pub content_hash: String,

    /// Space-joined decoder output, possibly empty
    pub decoded_text: String,

    /// Where the canonical copy lives; empty for duplicates
    pub destination_path: String,

    /// Original path owning this content; empty for the canonical entry
    pub duplicate_of: String,
}

impl ManifestRecord {
    pub fn is_canonical(&self) -> bool {
        self.duplicate_of.is_empty()
    }

    /// Fields in on-disk column order
    pub fn to_row(&self) -> [String; 8] {
        [
            self.original_path.clone(),
            self.file_name.clone(),
            self.size_bytes.to_string(),
            self.last_modified.to_string(),
            self.content_hash.clone(),
            self.decoded_text.clone(),
            self.destination_path.clone(),
            self.duplicate_of.clone(),
        ]
    }
}

/// An eligible file found during the walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    /// Absolute path to the file
    pub path: PathBuf,

    /// File size in bytes
    pub size: u64,

    /// Last modified timestamp
    pub last_modified: SystemTime,
}

impl ImageFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn last_modified_millis(&self) -> i64 {
        system_time_to_millis(&self.last_modified)
    }
}

/// Convert a `SystemTime` to epoch milliseconds, clamping pre-epoch times to 0
pub fn system_time_to_millis(time: &SystemTime) -> i64 {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => i64::try_from(duration.as_millis()).unwrap_or(i64::MAX),
        Err(_) => 0,
    }
}

/// Why a candidate was not ingested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Directory, socket, device or dangling link
    NotRegularFile,

    /// Zero-length file
    Empty,

    /// Name does not carry the recognised image suffix
    UnrecognisedExtension,

    /// Path is already recorded in the manifest
    AlreadyProcessed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotRegularFile => "not a regular file",
            Self::Empty => "file length is 0",
            Self::UnrecognisedExtension => "unrecognised extension",
            Self::AlreadyProcessed => "already processed",
        };
        f.write_str(text)
    }
}

/// Result of ingesting one eligible file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedFile {
    pub path: PathBuf,
    pub hash: ContentHash,

    /// Canonical copy location, `None` for duplicates
    pub destination: Option<PathBuf>,

    /// Owning original path when this file is a duplicate
    pub duplicate_of: Option<String>,

    /// The canonical copy was already present in the store
    pub already_placed: bool,

    /// The decoder failed and an empty text was recorded
    pub decode_failed: bool,
}

impl ProcessedFile {
    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }
}

/// Outcome of a single candidate path
#[derive(Debug)]
pub enum FileOutcome {
    Processed(ProcessedFile),
    Skipped(SkipReason),
    Failed(Error),
}

/// Aggregated counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// New canonical entries
    pub canonical: usize,

    /// New duplicate entries
    pub duplicates: usize,

    /// Canonical entries whose copy was already in the store
    pub already_placed: usize,

    /// Entries written with an empty decoded text after a decoder failure
    pub decode_failures: usize,

    pub skipped_not_regular: usize,
    pub skipped_empty: usize,
    pub skipped_extension: usize,
    pub skipped_already_processed: usize,

    /// Candidates that failed and were not recorded
    pub failed: usize,

    pub elapsed: Duration,
}

impl RunSummary {
    /// Fold one outcome into the counters
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Processed(file) => {
                if file.is_duplicate() {
                    self.duplicates += 1;
                } else {
                    self.canonical += 1;
                }
                if file.already_placed {
                    self.already_placed += 1;
                }
                if file.decode_failed {
                    self.decode_failures += 1;
                }
            }
            FileOutcome::Skipped(reason) => match reason {
                SkipReason::NotRegularFile => self.skipped_not_regular += 1,
                SkipReason::Empty => self.skipped_empty += 1,
                SkipReason::UnrecognisedExtension => self.skipped_extension += 1,
                SkipReason::AlreadyProcessed => self.skipped_already_processed += 1,
            },
            FileOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// Rows appended to the manifest during this run
    pub fn recorded(&self) -> usize {
        self.canonical + self.duplicates
    }

    pub fn skipped(&self) -> usize {
        self.skipped_not_regular
            + self.skipped_empty
            + self.skipped_extension
            + self.skipped_already_processed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} recorded ({} canonical, {} duplicates), {} skipped ({} already processed), {} failed in {:.1?}",
            self.recorded(),
            self.canonical,
            self.duplicates,
            self.skipped(),
            self.skipped_already_processed,
            self.failed,
            self.elapsed
        )
    }
}
