//! Path utilities for muster.
//!
//! All data lives under `~/.muster/`:
//! - `~/.muster/config.toml` - tool settings
//! - `~/.muster/profiles/` - cluster profile documents
//! - `~/.muster/clusters/` - persisted cluster records
//!
//! The `MUSTER_HOME` environment variable relocates the whole tree, which
//! also keeps CLI tests hermetic.

use std::path::PathBuf;

/// Returns the muster home directory (`~/.muster/` or `$MUSTER_HOME`).
pub fn home_dir() -> PathBuf {
    if let Some(home) = std::env::var_os("MUSTER_HOME") {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".muster")
}

/// Returns the default settings file path (`~/.muster/config.toml`).
pub fn default_config() -> PathBuf {
    home_dir().join("config.toml")
}

/// Returns the profile documents directory (`~/.muster/profiles/`).
pub fn profiles_dir() -> PathBuf {
    home_dir().join("profiles")
}

/// Returns the cluster records directory (`~/.muster/clusters/`).
pub fn clusters_dir() -> PathBuf {
    home_dir().join("clusters")
}

/// Ensures the muster home directory exists.
pub fn ensure_home_dir() -> std::io::Result<()> {
    std::fs::create_dir_all(home_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_hang_off_the_home_dir() {
        let home = home_dir();
        assert!(default_config().starts_with(&home));
        assert!(profiles_dir().starts_with(&home));
        assert!(clusters_dir().starts_with(&home));
    }
}
