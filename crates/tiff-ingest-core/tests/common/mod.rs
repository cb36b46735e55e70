#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tiff_ingest_core::{replay_all, Config, ManifestFormat, ManifestRecord};

/// A scan root, an output directory and a manifest inside one temporary directory
pub struct Workspace {
    pub dir: TempDir,
    pub scans: PathBuf,
    pub manifest: PathBuf,
    pub config: Config,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let scans = dir.path().join("scans");
        fs::create_dir_all(&scans).unwrap();

        let mut config = Config::default();
        config.output.target_directory = dir.path().join("output");
        config.decoder.enabled = false;

        let manifest = dir.path().join("manifest.csv");
        Self {
            dir,
            scans,
            manifest,
            config,
        }
    }

    pub fn output(&self) -> &Path {
        &self.config.output.target_directory
    }

    /// Create a file below the scan root with the given bytes
    pub fn scan_file(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.scans.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    pub fn records(&self) -> Vec<ManifestRecord> {
        let format = ManifestFormat::from_config(&self.config.manifest).unwrap();
        replay_all(&self.manifest, &format).unwrap()
    }

    pub fn record_for(&self, path: &Path) -> Option<ManifestRecord> {
        let key = path.to_string_lossy();
        self.records().into_iter().find(|r| r.original_path == key)
    }

    /// Hash-named directories under the output root, with the files in each
    pub fn stored(&self) -> Vec<(String, Vec<String>)> {
        if !self.output().exists() {
            return Vec::new();
        }
        let mut dirs: Vec<(String, Vec<String>)> = fs::read_dir(self.output())
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                let mut files: Vec<String> = fs::read_dir(entry.path())
                    .unwrap()
                    .map(|f| f.unwrap().file_name().to_string_lossy().into_owned())
                    .collect();
                files.sort();
                (entry.file_name().to_string_lossy().into_owned(), files)
            })
            .collect();
        dirs.sort();
        dirs
    }
}
