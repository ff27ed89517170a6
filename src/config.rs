use crate::core::engine::EngineConfig;
use crate::utils::get_config_dir;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Environment variable overriding the configured snapshot path
pub const SNAPSHOT_ENV: &str = "FWCHECK_SNAPSHOT";

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Policy snapshot analysed when `--snapshot` is not given
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Record every verdict in the analysis history (opt-in)
    #[serde(default)]
    pub enable_analysis_log: bool,
    /// Loopback id and fail-safe defaults handed to the engine
    #[serde(default)]
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Snapshot to analyse: explicit argument, then `FWCHECK_SNAPSHOT`, then config.
    pub fn resolve_snapshot(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(SNAPSHOT_ENV).map(PathBuf::from))
            .or_else(|| self.snapshot_path.clone())
    }
}

pub fn config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.json"))
}

/// Saves the config to `path` using an atomic write pattern.
/// 1. Writes to a temporary file in the same directory.
/// 2. Sets restrictive permissions (0o600).
/// 3. Atomically renames to the target path.
pub fn save_config_to(config: &AppConfig, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    temp.write_all(json.as_bytes())?;
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save configuration. Free up space and try again.",
            )
        } else {
            e.error
        }
    })?;
    Ok(())
}

/// Saves the config to the XDG config directory.
pub fn save_config(config: &AppConfig) -> std::io::Result<()> {
    match config_path() {
        Some(path) => save_config_to(config, &path),
        None => Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Config directory not available",
        )),
    }
}

/// Loads the config from `path`, or returns default if missing or unreadable.
pub fn load_config_from(path: &Path) -> AppConfig {
    match std::fs::read_to_string(path) {
        Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            tracing::warn!("Ignoring invalid config {}: {e}", path.display());
            AppConfig::default()
        }),
        Err(_) => AppConfig::default(),
    }
}

/// Loads the config from the XDG config directory, or returns default if not found.
pub fn load_config() -> AppConfig {
    config_path()
        .map(|path| load_config_from(&path))
        .unwrap_or_default()
}
