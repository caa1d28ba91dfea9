// Bookmark-sync platform paths.
// Selects the per-OS config directory at compile time.

use std::path::PathBuf;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

/// Directory holding `config.json`.
///
/// - **Linux**: `$XDG_CONFIG_HOME/bookmark-sync` or `~/.config/bookmark-sync`
/// - **macOS**: `~/Library/Application Support/BookmarkSync`
/// - **Windows**: `%APPDATA%/BookmarkSync`
pub fn get_config_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        linux::get_config_dir()
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_config_dir()
    }
    #[cfg(target_os = "windows")]
    {
        windows::get_config_dir()
    }
}
