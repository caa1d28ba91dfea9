// Linux config path: $XDG_CONFIG_HOME/bookmark-sync, falling back to ~/.config.

use std::env;
use std::path::PathBuf;

pub fn get_config_dir() -> PathBuf {
    config_dir_from(env::var("XDG_CONFIG_HOME").ok(), env::var("HOME").ok())
}

fn config_dir_from(xdg: Option<String>, home: Option<String>) -> PathBuf {
    match xdg.filter(|x| !x.is_empty()) {
        Some(xdg) => PathBuf::from(xdg).join("bookmark-sync"),
        None => PathBuf::from(home.unwrap_or_else(|| String::from("/tmp")))
            .join(".config")
            .join("bookmark-sync"),
    }
}
