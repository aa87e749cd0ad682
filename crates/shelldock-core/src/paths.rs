//! Standard paths used by shelldock

use std::path::{Path, PathBuf};

/// Environment variable that relocates all shelldock state
pub const HOME_ENV: &str = "SHELLDOCK_HOME";

/// Standard shelldock paths
#[derive(Debug, Clone)]
pub struct Paths {
    /// Data directory (~/.local/share/shelldock)
    pub data: PathBuf,
    /// Config directory (~/.config/shelldock)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    /// Resolve paths from `SHELLDOCK_HOME`, falling back to the XDG locations
    pub fn new() -> Self {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Self::with_home(Path::new(&home));
        }

        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("shelldock");

        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("shelldock");

        Self { data, config }
    }

    /// Keep data and config together under a single directory
    pub fn with_home(home: &Path) -> Self {
        Self {
            data: home.to_path_buf(),
            config: home.to_path_buf(),
        }
    }

    /// Directory holding the entry journal, revision log and index cache
    pub fn store_dir(&self) -> PathBuf {
        self.data.clone()
    }

    /// Path of the JSON configuration file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_home_shares_directory() {
        let paths = Paths::with_home(Path::new("/tmp/sd"));
        assert_eq!(paths.store_dir(), PathBuf::from("/tmp/sd"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/sd/config.json"));
    }
}
