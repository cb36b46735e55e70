use log::{error, info, LevelFilter};
use std::path::{Path, PathBuf};

// For file-based logging with rotation
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::error::{Error, Result};

const LOG_FILE_NAME: &str = "tiff-ingest.log";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_ARCHIVES: u32 = 5;
const LEVEL_ENV_VAR: &str = "TIFF_INGEST_LOG";

/// Level named by the environment, or `default` when unset or unparseable
fn level_override(value: Option<&str>, default: LevelFilter) -> LevelFilter {
    value
        .and_then(|value| value.trim().parse::<LevelFilter>().ok())
        .unwrap_or(default)
}

/// Initialize the logger with timestamp, log level, and module path.
///
/// Logs go to a size-rotated file in `log_dir` only so they never interleave
/// with the progress spinner. `TIFF_INGEST_LOG` overrides `level`.
pub fn init_logger(log_dir: &Path, level: LevelFilter) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;

    let log_file_path = log_dir.join(LOG_FILE_NAME);
    let archived_logs_pattern = log_dir.join("tiff-ingest.{}.log");

    let file_trigger = SizeTrigger::new(ROTATE_AT_BYTES);

    let file_roller = FixedWindowRoller::builder()
        .build(&archived_logs_pattern.to_string_lossy(), KEEP_ARCHIVES)
        .map_err(|e| Error::Configuration(format!("Failed to create log roller: {}", e)))?;

    let compound_policy = CompoundPolicy::new(Box::new(file_trigger), Box::new(file_roller));

    let rolling_file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] [{M}:{L}] - {m}{n}",
        )))
        .build(&log_file_path, Box::new(compound_policy))
        .map_err(|e| Error::Configuration(format!("Failed to create log appender: {}", e)))?;

    let level = level_override(std::env::var(LEVEL_ENV_VAR).ok().as_deref(), level);

    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(rolling_file)))
        .build(Root::builder().appender("file").build(level))
        .map_err(|e| Error::Configuration(format!("Failed to build log config: {}", e)))?;

    log4rs::init_config(config)
        .map_err(|e| Error::Configuration(format!("Failed to initialize log4rs: {}", e)))?;

    info!("Logging to file: {}", log_file_path.display());
    Ok(log_file_path)
}

/// Log file operation that failed
pub fn log_file_error(path: &Path, operation: &str, error: &dyn std::error::Error) {
    error!(
        "File operation failed - Operation: {}, Path: {}, Error: {}",
        operation,
        path.display(),
        error
    );
}

/// Log hash computation error
pub fn log_hash_error(path: &Path, error: &dyn std::error::Error) {
    error!(
        "Hash computation failed - Path: {}, Error: {}",
        path.display(),
        error
    );
}

/// Log file system modification
pub fn log_fs_modification(operation: &str, path: &Path, details: Option<&str>) {
    match details {
        Some(details) if !details.is_empty() => info!(
            "FS CHANGE - Operation: {}, Path: {}, Details: {}",
            operation,
            path.display(),
            details
        ),
        _ => info!("FS CHANGE - Operation: {}, Path: {}", operation, path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_overrides_level_only_when_valid() {
        assert_eq!(level_override(Some("debug"), LevelFilter::Info), LevelFilter::Debug);
        assert_eq!(level_override(Some(" TRACE "), LevelFilter::Info), LevelFilter::Trace);
        assert_eq!(level_override(Some("loud"), LevelFilter::Warn), LevelFilter::Warn);
        assert_eq!(level_override(None, LevelFilter::Error), LevelFilter::Error);
    }
}
