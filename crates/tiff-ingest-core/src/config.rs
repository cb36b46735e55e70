use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hashing::HashAlgorithm;

/// Tabular dialect of the manifest file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Comma separated, quoted when needed, CRLF line endings
    Default,

    /// Spreadsheet compatible variant
    Excel,

    /// Strict RFC 4180
    Rfc4180,

    /// Tab delimited
    Tdf,

    /// MySQL `LOAD DATA` style: tab delimited, backslash escaped, unquoted
    Mysql,
}

impl Dialect {
    /// Resolve a dialect from its configured name. An empty name means `Default`.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "excel" => Ok(Self::Excel),
            "rfc4180" => Ok(Self::Rfc4180),
            "tdf" => Ok(Self::Tdf),
            "mysql" => Ok(Self::Mysql),
            other => Err(Error::Configuration(format!(
                "Unknown manifest format '{}'",
                other
            ))),
        }
    }
}

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Manifest file settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Whether the first row of the manifest is the column header
    pub header_present: bool,

    /// Dialect name (`default`, `excel`, `rfc4180`, `tdf`, `mysql`)
    pub format: String,

    /// Field delimiter, exactly one character
    pub delimiter: String,

    /// Character encoding of the manifest
    pub charset: String,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            header_present: true,
            format: "excel".to_string(),
            delimiter: ";".to_string(),
            charset: "UTF-8".to_string(),
        }
    }
}

/// Content store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root under which hash-named directories are created
    pub target_directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            target_directory: PathBuf::from("output"),
        }
    }
}

/// Page decoder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Whether the first page of every file is decoded at all
    pub enabled: bool,

    /// Licence / activation data the decoder must be able to read at start-up
    pub license_file: Option<PathBuf>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            license_file: None,
        }
    }
}

/// Tree walk settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Recognised image suffix, compared case-insensitively
    pub extension: String,

    /// Maximum directory depth for scanning
    pub max_depth: Option<usize>,

    /// Whether symbolic links are followed
    pub follow_links: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extension: "tif".to_string(),
            max_depth: None,
            follow_links: true,
        }
    }
}

/// Configuration for an ingestion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub manifest: ManifestConfig,
    pub output: OutputConfig,
    pub decoder: DecoderConfig,
    pub scan: ScanConfig,

    /// Digest used for content fingerprints
    pub hash_algorithm: HashAlgorithm,

    /// Show a progress spinner on stderr
    pub show_progress: bool,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest: ManifestConfig::default(),
            output: OutputConfig::default(),
            decoder: DecoderConfig::default(),
            scan: ScanConfig::default(),
            hash_algorithm: HashAlgorithm::Sha256,
            show_progress: false,
            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Configuration(format!("Failed to open config file: {}", e)))?;

        let config: Config = serde_json::from_reader(file)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .map_err(|e| Error::Configuration(format!("Failed to create config file: {}", e)))?;

        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Error::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let mut chars = self.manifest.delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii() && c != '\n' && c != '\r' => {}
            _ => {
                return Err(Error::Configuration(format!(
                    "Delimiter must be a single ASCII character, got '{}'",
                    self.manifest.delimiter
                )))
            }
        }

        Dialect::from_name(&self.manifest.format)?;

        encoding_for_label(&self.manifest.charset)?;

        let ext = self.scan.extension.trim_start_matches('.');
        if ext.is_empty() {
            return Err(Error::Configuration(
                "Recognised image extension must not be empty".to_string(),
            ));
        }

        if self.output.target_directory.as_os_str().is_empty() {
            return Err(Error::Configuration(
                "Output target directory must not be empty".to_string(),
            ));
        }

        if self.scan.max_depth == Some(0) {
            return Err(Error::Configuration(
                "Maximum scan depth of 0 would never reach a file".to_string(),
            ));
        }

        Ok(())
    }
}

/// Resolve a charset label such as `UTF-8` or `ISO-8859-1`.
///
/// Only encodings that can also be written are accepted, which rules out
/// UTF-16 and the replacement encoding.
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding> {
    let encoding = Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
        Error::Configuration(format!("Unknown manifest charset '{}'", label))
    })?;

    if encoding.output_encoding() != encoding {
        return Err(Error::Configuration(format!(
            "Manifest charset '{}' cannot be written, use an ASCII compatible encoding",
            label
        )));
    }
    Ok(encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.manifest.delimiter, ";");
        assert_eq!(config.output.target_directory, PathBuf::from("output"));
        assert_eq!(config.scan.extension, "tif");
    }

    #[test]
    fn test_rejects_multi_char_delimiter() {
        let mut config = Config::default();
        config.manifest.delimiter = ";;".to_string();
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        config.manifest.delimiter = String::new();
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_rejects_unknown_format_and_charset() {
        let mut config = Config::default();
        config.manifest.format = "parquet".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.manifest.charset = "klingon".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.manifest.charset = "UTF-16LE".to_string();
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = Config::default();
        config.manifest.charset = "utf8".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_charset_labels_resolve() {
        assert_eq!(encoding_for_label("UTF-8").unwrap(), encoding_rs::UTF_8);
        assert_eq!(
            encoding_for_label(" ISO-8859-1 ").unwrap(),
            encoding_rs::WINDOWS_1252
        );
        assert_eq!(
            encoding_for_label("shift_jis").unwrap(),
            encoding_rs::SHIFT_JIS
        );
    }

    #[test]
    fn test_dialect_names_are_case_insensitive() {
        assert_eq!(Dialect::from_name("EXCEL").unwrap(), Dialect::Excel);
        assert_eq!(Dialect::from_name("").unwrap(), Dialect::Default);
        assert_eq!(Dialect::from_name("MySQL").unwrap(), Dialect::Mysql);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiff-ingest.json");

        let mut config = Config::default();
        config.output.target_directory = PathBuf::from("/srv/archive");
        config.hash_algorithm = HashAlgorithm::Blake3;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "manifest": { "delimiter": "," } }"#).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.manifest.delimiter, ",");
        assert!(loaded.manifest.header_present);
        assert_eq!(loaded.hash_algorithm, HashAlgorithm::Sha256);
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let result = Config::from_file(Path::new("/path/that/does/not/exist.json"));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
