//! The ingestion pipeline.
//!
//! Files are handled strictly one at a time: eligibility, resume check, hash,
//! duplicate decision, placement, decoding, manifest append and finally the
//! index update. The index is only touched after the row is durable, so it
//! never refers to a path the manifest does not contain.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Instant, SystemTime};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::decoder::PageDecoder;
use crate::discovery::{absolute_path, check_eligibility, walk, WalkOptions};
use crate::error::Result;
use crate::hashing::{compute_content_hash, HashAlgorithm};
use crate::index::HashIndex;
use crate::logging::{log_file_error, log_hash_error};
use crate::manifest::{ensure_header, replay_all, ManifestFormat, ManifestWriter};
use crate::store::ContentStore;
use crate::types::{FileOutcome, ImageFile, ManifestRecord, ProcessedFile, RunSummary, SkipReason};

/// Where the content of a new file belongs
enum Decision {
    Canonical,
    DuplicateOf(String),
}

/// Owns the manifest, the index and the content store for one run
pub struct Pipeline<D: PageDecoder> {
    writer: ManifestWriter,
    index: HashIndex,
    store: ContentStore,
    decoder: D,
    extension: String,
    algorithm: HashAlgorithm,
    walk_options: WalkOptions,
    show_progress: bool,
}

impl<D: PageDecoder> Pipeline<D> {
    /// Prepare a run against `manifest_path`, rebuilding the index from it
    pub fn open(config: &Config, manifest_path: &Path, decoder: D) -> Result<Self> {
        config.validate()?;
        let format = ManifestFormat::from_config(&config.manifest)?;

        ensure_header(manifest_path, &format)?;
        let records = replay_all(manifest_path, &format)?;
        let index = HashIndex::from_records(&records);
        info!(
            "Loaded {} processed files with {} distinct hashes from {}",
            index.len(),
            index.distinct_hashes(),
            manifest_path.display()
        );

        let writer = ManifestWriter::open(manifest_path, &format)?;

        Ok(Self {
            writer,
            index,
            store: ContentStore::new(config.output.target_directory.clone()),
            decoder,
            extension: config.scan.extension.clone(),
            algorithm: config.hash_algorithm,
            walk_options: WalkOptions::from(&config.scan),
            show_progress: config.show_progress,
        })
    }

    pub fn index(&self) -> &HashIndex {
        &self.index
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn manifest_path(&self) -> &Path {
        self.writer.path()
    }

    /// Walk `root` and ingest every eligible file not yet in the manifest.
    ///
    /// Only fatal errors end the run early; everything else is counted in the
    /// returned summary.
    pub fn run(&mut self, root: &Path) -> Result<RunSummary> {
        let start_time = Instant::now();
        let mut summary = RunSummary::default();

        info!("Scanning {}", root.display());
        let candidates = walk(root, self.walk_options)?;
        let progress = self.progress_bar();

        for candidate in candidates {
            let outcome = match candidate {
                Ok(path) => self.process_path(&path)?,
                Err(e) => {
                    error!("Skipping unreadable entry: {}", e);
                    FileOutcome::Failed(e)
                }
            };

            summary.record(&outcome);
            progress.inc(1);
            progress.set_message(format!(
                "{} new, {} duplicates, {} failed",
                summary.canonical, summary.duplicates, summary.failed
            ));
        }

        summary.elapsed = start_time.elapsed();
        progress.finish_with_message(format!("Completed: {}", summary));
        info!("Scan of {} complete: {}", root.display(), summary);

        Ok(summary)
    }

    /// Ingest a single path.
    ///
    /// Per-file problems come back as [`FileOutcome::Failed`]; `Err` is
    /// reserved for failures that make continuing unsafe.
    pub fn process_path(&mut self, path: &Path) -> Result<FileOutcome> {
        match self.ingest(path) {
            Ok(outcome) => {
                log_outcome(path, &outcome);
                Ok(outcome)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                log_file_error(path, "ingest", &e);
                Ok(FileOutcome::Failed(e))
            }
        }
    }

    fn ingest(&mut self, path: &Path) -> Result<FileOutcome> {
        let path = absolute_path(path)?;

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            // Vanished since the walk, or a dangling link
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(FileOutcome::Skipped(SkipReason::NotRegularFile))
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(reason) = check_eligibility(&path, &metadata, &self.extension) {
            return Ok(FileOutcome::Skipped(reason));
        }

        let path_key = path.to_string_lossy().into_owned();
        if self.index.contains_path(&path_key) {
            return Ok(FileOutcome::Skipped(SkipReason::AlreadyProcessed));
        }

        let image = ImageFile {
            path,
            size: metadata.len(),
            last_modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        };

        let hash = compute_content_hash(&image.path, self.algorithm).map_err(|e| {
            log_hash_error(&image.path, &e);
            e
        })?;

        let decision = match self.index.owner_of(hash.as_str()) {
            None => Decision::Canonical,
            Some(owner) if owner == path_key => {
                return Ok(FileOutcome::Skipped(SkipReason::AlreadyProcessed))
            }
            Some(owner) => Decision::DuplicateOf(owner.to_string()),
        };

        let (destination, already_placed) = match &decision {
            Decision::Canonical => {
                let placement = self.store.place(&hash, &image.path)?;
                (Some(placement.path), placement.already_present)
            }
            Decision::DuplicateOf(_) => (None, false),
        };

        let (decoded_text, decode_failed) = self.decode(&image.path);

        let record = ManifestRecord {
            original_path: path_key,
            file_name: image.file_name(),
            size_bytes: image.size,
            last_modified: image.last_modified_millis(),
            content_hash: hash.to_string(),
            decoded_text,
            destination_path: destination
                .as_deref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            duplicate_of: match &decision {
                Decision::Canonical => String::new(),
                Decision::DuplicateOf(owner) => owner.clone(),
            },
        };

        self.writer.append(&record)?;
        self.index.commit(&record);

        Ok(FileOutcome::Processed(ProcessedFile {
            path: image.path,
            hash,
            destination,
            duplicate_of: match decision {
                Decision::Canonical => None,
                Decision::DuplicateOf(owner) => Some(owner),
            },
            already_placed,
            decode_failed,
        }))
    }

    /// Decoder failures are recorded as an empty text rather than dropping the row
    fn decode(&self, path: &Path) -> (String, bool) {
        match self.decoder.decode_first_page(path) {
            Ok(codes) => (codes.join(" "), false),
            Err(e) => {
                warn!(
                    "Could not decode first page of {}, recording empty text: {}",
                    path.display(),
                    e
                );
                (String::new(), true)
            }
        }
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} files - {msg}")
        {
            progress.set_style(style);
        }
        progress.enable_steady_tick(std::time::Duration::from_millis(200));
        progress
    }
}

fn log_outcome(path: &Path, outcome: &FileOutcome) {
    match outcome {
        FileOutcome::Processed(file) => match (&file.destination, &file.duplicate_of) {
            (_, Some(owner)) => info!("Found a duplicate file {} of {}", path.display(), owner),
            (Some(destination), None) if file.already_placed => info!(
                "Recorded file {} with hash {}, target already present at {}",
                path.display(),
                file.hash,
                destination.display()
            ),
            (Some(destination), None) => info!(
                "Copied file {} with hash {} to target {}",
                path.display(),
                file.hash,
                destination.display()
            ),
            (None, None) => info!("Recorded file {} with hash {}", path.display(), file.hash),
        },
        FileOutcome::Skipped(SkipReason::Empty) => {
            warn!("File length is 0 : {}", path.display())
        }
        FileOutcome::Skipped(SkipReason::AlreadyProcessed) => {
            info!("Already processed file {}", path.display())
        }
        FileOutcome::Skipped(reason) => debug!("Skipping {}: {}", path.display(), reason),
        FileOutcome::Failed(_) => {}
    }
}

/// Convenience wrapper: open the pipeline, scan `root`, return the summary
pub fn ingest<D: PageDecoder>(
    config: &Config,
    manifest_path: &Path,
    root: &Path,
    decoder: D,
) -> Result<RunSummary> {
    let mut pipeline = Pipeline::open(config, manifest_path, decoder)?;
    pipeline.run(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::NullDecoder;
    use crate::error::Error;
    use std::path::PathBuf;
    use std::cell::Cell;
    use tempfile::{tempdir, TempDir};

    struct FixedDecoder(Vec<&'static str>);

    impl PageDecoder for FixedDecoder {
        fn decode_first_page(&self, _path: &Path) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    struct FailingDecoder {
        calls: Cell<usize>,
    }

    impl PageDecoder for FailingDecoder {
        fn decode_first_page(&self, path: &Path) -> Result<Vec<String>> {
            self.calls.set(self.calls.get() + 1);
            Err(Error::Decode {
                path: path.to_path_buf(),
                reason: "licence expired".to_string(),
            })
        }
    }

    fn setup() -> (TempDir, Config, PathBuf, PathBuf) {
        let dir = tempdir().unwrap();
        let scans = dir.path().join("scans");
        fs::create_dir_all(&scans).unwrap();

        let mut config = Config::default();
        config.output.target_directory = dir.path().join("output");
        let manifest = dir.path().join("manifest.csv");
        (dir, config, manifest, scans)
    }

    #[test]
    fn test_decoded_codes_are_space_joined() {
        let (_dir, config, manifest, scans) = setup();
        let scan = scans.join("a.tif");
        fs::write(&scan, b"page").unwrap();

        let mut pipeline =
            Pipeline::open(&config, &manifest, FixedDecoder(vec!["BOX-1", "FOLDER-7"])).unwrap();
        pipeline.process_path(&scan).unwrap();

        let format = ManifestFormat::from_config(&config.manifest).unwrap();
        let records = replay_all(&manifest, &format).unwrap();
        assert_eq!(records[0].decoded_text, "BOX-1 FOLDER-7");
    }

    #[test]
    fn test_decoder_failure_still_records_row() {
        let (_dir, config, manifest, scans) = setup();
        let scan = scans.join("a.tif");
        fs::write(&scan, b"page").unwrap();

        let decoder = FailingDecoder { calls: Cell::new(0) };
        let mut pipeline = Pipeline::open(&config, &manifest, decoder).unwrap();
        let outcome = pipeline.process_path(&scan).unwrap();

        match outcome {
            FileOutcome::Processed(file) => {
                assert!(file.decode_failed);
                assert!(file.destination.is_some());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(pipeline.decoder.calls.get(), 1);

        let format = ManifestFormat::from_config(&config.manifest).unwrap();
        let records = replay_all(&manifest, &format).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].decoded_text, "");
    }

    #[test]
    fn test_same_path_twice_is_skipped() {
        let (_dir, config, manifest, scans) = setup();
        let scan = scans.join("a.tif");
        fs::write(&scan, b"page").unwrap();

        let mut pipeline = Pipeline::open(&config, &manifest, NullDecoder).unwrap();
        assert!(matches!(
            pipeline.process_path(&scan).unwrap(),
            FileOutcome::Processed(_)
        ));
        assert!(matches!(
            pipeline.process_path(&scan).unwrap(),
            FileOutcome::Skipped(SkipReason::AlreadyProcessed)
        ));
        assert_eq!(pipeline.index().len(), 1);
    }

    #[test]
    fn test_placement_failure_is_per_file_and_not_recorded() {
        let (dir, mut config, manifest, scans) = setup();
        // A regular file where the output directory should be
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, b"in the way").unwrap();
        config.output.target_directory = blocker;

        let scan = scans.join("a.tif");
        fs::write(&scan, b"page").unwrap();

        let mut pipeline = Pipeline::open(&config, &manifest, NullDecoder).unwrap();
        let outcome = pipeline.process_path(&scan).unwrap();
        assert!(matches!(outcome, FileOutcome::Failed(Error::Placement { .. })));
        assert!(pipeline.index().is_empty());

        let format = ManifestFormat::from_config(&config.manifest).unwrap();
        assert!(replay_all(&manifest, &format).unwrap().is_empty());
    }

    #[test]
    fn test_vanished_file_is_skipped() {
        let (_dir, config, manifest, scans) = setup();
        let mut pipeline = Pipeline::open(&config, &manifest, NullDecoder).unwrap();
        let outcome = pipeline.process_path(&scans.join("gone.tif")).unwrap();
        assert!(matches!(
            outcome,
            FileOutcome::Skipped(SkipReason::NotRegularFile)
        ));
    }
}
