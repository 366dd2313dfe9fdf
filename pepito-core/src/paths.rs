// ABOUTME: XDG Base Directory paths for cross-platform config and data storage
// ABOUTME: Provides standardized paths for logs, the channel registry, and configuration

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application identifier for XDG directories
const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "thecatdoor";
const APPLICATION: &str = "pepito";

/// Get XDG-compliant directories for the application
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Get the data directory path (e.g., ~/.local/share/pepito/)
/// Falls back to ./data if XDG directories unavailable
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// Get the log directory path (inside data dir)
/// e.g., ~/.local/share/pepito/logs/
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Default location of the tenant → channel registry
/// e.g., ~/.local/share/pepito/channels.json
pub fn registry_file() -> PathBuf {
    data_dir().join("channels.json")
}

/// Get the config directory path (e.g., ~/.config/pepito/)
/// Falls back to current directory if XDG directories unavailable
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the default config file path
/// e.g., ~/.config/pepito/config.toml
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
