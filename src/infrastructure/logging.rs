//! File-based logging bootstrap.

use crate::infrastructure::error::EngineError;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "tasktime";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 3;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    log_dir: PathBuf,
    _logger: LoggerHandle,
}

/// Starts rotating file logging under `log_dir`, creating it if needed.
///
/// Idempotent for the same directory; a second call with a different
/// directory is rejected. Log level comes from the `RUST_LOG` environment
/// variable, defaulting to `info`.
pub fn init_logging(log_dir: &Path) -> Result<(), EngineError> {
    let state = LOGGING_STATE.get_or_try_init(|| -> Result<LoggingState, EngineError> {
        std::fs::create_dir_all(log_dir)?;

        let logger = Logger::try_with_env_or_str("info")
            .map_err(|error| EngineError::InvalidConfig(format!("invalid log level: {error}")))?
            .log_to_file(
                FileSpec::default()
                    .directory(log_dir)
                    .basename(LOG_FILE_BASENAME),
            )
            .rotate(
                Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                Naming::Numbers,
                Cleanup::KeepLogFiles(MAX_LOG_FILES),
            )
            .write_mode(WriteMode::BufferAndFlush)
            .append()
            .format_for_files(flexi_logger::detailed_format)
            .start()
            .map_err(|error| {
                EngineError::InvalidConfig(format!("failed to start logger: {error}"))
            })?;

        log::info!(
            "logging started, version {} in {}",
            env!("CARGO_PKG_VERSION"),
            log_dir.display()
        );
        Ok(LoggingState {
            log_dir: log_dir.to_path_buf(),
            _logger: logger,
        })
    })?;

    if state.log_dir != log_dir {
        return Err(EngineError::InvalidConfig(format!(
            "logging already initialized at {}, refusing to switch to {}",
            state.log_dir.display(),
            log_dir.display()
        )));
    }
    Ok(())
}
