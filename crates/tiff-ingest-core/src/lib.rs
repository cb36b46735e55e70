//! Core functionality for ingesting scanned image files.
//!
//! This library provides the components of a resumable, content-addressed
//! ingestion run:
//! - Directory traversal and eligibility filtering
//! - Content hashing
//! - Duplicate detection against an index rebuilt from the manifest
//! - Placement of one canonical copy per distinct content
//! - Durable, append-only manifest writing

// -- Internal Modules --
mod error;

// -- Public Re-exports --
pub use config::*;
pub use decoder::{decoder_from_config, NullDecoder, PageDecoder, QrPageDecoder};
pub use error::{Error, Result};
pub use hashing::{compute_content_hash, ContentHash, HashAlgorithm};
pub use index::HashIndex;
pub use manifest::{ensure_header, replay_all, ManifestFormat, ManifestWriter};
pub use pipeline::{ingest, Pipeline};
pub use store::{ContentStore, Placement};
pub use types::*;

// -- Public Modules --
pub mod config;
pub mod decoder;
pub mod discovery;
pub mod hashing;
pub mod index;
pub mod logging;
pub mod manifest;
pub mod pipeline;
pub mod store;
pub mod types;
