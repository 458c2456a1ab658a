//! Seat config file loader for Chorus.
//!
//! Reads `seats.toml` and deserializes it into [`SeatConfigFile`]. Unlike
//! optional settings files, a missing or malformed seat file is an error:
//! the orchestrator cannot run without seat definitions.

use std::path::{Path, PathBuf};

use chorus_core::seat_table::SeatConfigSource;
use chorus_types::config::{DEFAULT_SEATS_TOML, SeatConfigFile};
use chorus_types::error::ConfigError;

/// File name of the seat config inside the data directory.
pub const SEATS_FILE: &str = "seats.toml";

/// Environment variable pointing directly at a seat config file.
pub const SEATS_ENV: &str = "CHORUS_SEATS";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CHORUS_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `CHORUS_DATA_DIR` environment variable
/// 2. `~/.chorus`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".chorus");
    }

    PathBuf::from(".chorus")
}

/// Resolve which seat file to use: an explicit path, then `CHORUS_SEATS`,
/// then `{data_dir}/seats.toml`.
pub fn resolve_seats_path(explicit: Option<&Path>) -> PathBuf {
    seats_path_from(
        explicit,
        std::env::var(SEATS_ENV).ok().as_deref(),
        &resolve_data_dir(),
    )
}

fn seats_path_from(explicit: Option<&Path>, env_path: Option<&str>, data_dir: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = env_path.filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(path);
    }
    data_dir.join(SEATS_FILE)
}

/// Read and parse a seat config file. Validation happens when the table is
/// built from it.
pub async fn load_seat_config(path: &Path) -> Result<SeatConfigFile, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;

    toml::from_str::<SeatConfigFile>(&content)
        .map_err(|err| ConfigError::Parse(format!("{}: {err}", path.display())))
}

/// Write the default seat config to `path`, creating parent directories.
///
/// Returns `false` without touching the file when it already exists and
/// `force` is not set.
pub async fn write_default_seats(path: &Path, force: bool) -> Result<bool, ConfigError> {
    let io_err = |err: std::io::Error| ConfigError::Read {
        path: path.display().to_string(),
        message: err.to_string(),
    };

    if !force && tokio::fs::try_exists(path).await.map_err(io_err)? {
        tracing::debug!("{} already exists, leaving it alone", path.display());
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(path, DEFAULT_SEATS_TOML)
        .await
        .map_err(io_err)?;

    tracing::info!("wrote default seat config to {}", path.display());
    Ok(true)
}

/// [`SeatConfigSource`] backed by a TOML file on disk.
#[derive(Debug, Clone)]
pub struct TomlSeatSource {
    path: PathBuf,
}

impl TomlSeatSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SeatConfigSource for TomlSeatSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<SeatConfigFile, ConfigError> {
        load_seat_config(&self.path).await
    }
}
