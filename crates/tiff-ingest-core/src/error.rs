use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Custom error types for the tiff-ingest library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image decoding error
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// File not found error
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The existing manifest cannot be trusted
    #[error("Corrupt manifest {path} at line {line}: {reason}")]
    ManifestCorruption {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    /// A record could not be made durable
    #[error("Failed to append to manifest {path}: {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// A record cannot be represented in the manifest's format
    #[error("Cannot write record to manifest {path}: {reason}")]
    ManifestEncoding { path: PathBuf, reason: String },

    /// Copying into the content store failed
    #[error("Failed to place {source_path} at {destination}: {source}")]
    Placement {
        source_path: PathBuf,
        destination: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Page decoder failure
    #[error("Decoding failed for {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Directory traversal error
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl Error {
    /// Whether this error must stop the whole run rather than a single file
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::ManifestCorruption { .. } | Self::ManifestWrite { .. }
        )
    }
}
