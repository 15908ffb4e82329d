//! Storage configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_DB_PATH: &str = "strongbox.db";
const DEFAULT_MAP_SIZE_MB: usize = 1024;
const DEFAULT_MAX_DBS: u32 = 256;
const DEFAULT_MAX_READERS: u32 = 126;

/// Embedded engine settings.
///
/// The store is a single data file at `path` (plus an LMDB lock file next to
/// it). `map_size_mb` caps the file size, `max_dbs` caps the number of
/// top-level containers (three per unique-key bucket) and `max_readers` caps
/// concurrent read transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub map_size_mb: usize,
    pub max_dbs: u32,
    pub max_readers: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
            map_size_mb: DEFAULT_MAP_SIZE_MB,
            max_dbs: DEFAULT_MAX_DBS,
            max_readers: DEFAULT_MAX_READERS,
        }
    }
}

impl StorageConfig {
    /// Create a config for the given data file with default limits.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set the maximum map size.
    pub fn with_map_size_mb(mut self, map_size_mb: usize) -> Self {
        self.map_size_mb = map_size_mb;
        self
    }

    /// Set the maximum number of named containers.
    pub fn with_max_dbs(mut self, max_dbs: u32) -> Self {
        self.max_dbs = max_dbs;
        self
    }

    /// Set the maximum number of concurrent readers.
    pub fn with_max_readers(mut self, max_readers: u32) -> Self {
        self.max_readers = max_readers;
        self
    }

    /// Load a config from a TOML file. The result is validated.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: StorageConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `STRONGBOX_DB_PATH`: Data file path (default: strongbox.db)
    /// - `STRONGBOX_MAP_SIZE_MB`: Maximum map size in MiB (default: 1024)
    /// - `STRONGBOX_MAX_DBS`: Maximum named containers (default: 256)
    /// - `STRONGBOX_MAX_READERS`: Maximum concurrent readers (default: 126)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            path: lookup("STRONGBOX_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            map_size_mb: lookup("STRONGBOX_MAP_SIZE_MB")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.map_size_mb),
            max_dbs: lookup("STRONGBOX_MAX_DBS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_dbs),
            max_readers: lookup("STRONGBOX_MAX_READERS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_readers),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "path".to_string(),
                value: String::new(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.map_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "map_size_mb".to_string(),
                value: self.map_size_mb.to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        // Three databases per unique-key bucket; anything below that cannot host one.
        if self.max_dbs < 3 {
            return Err(ConfigError::InvalidValue {
                field: "max_dbs".to_string(),
                value: self.max_dbs.to_string(),
                reason: "must be >= 3".to_string(),
            });
        }
        if self.max_readers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_readers".to_string(),
                value: self.max_readers.to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Map size in bytes as handed to the engine.
    pub fn map_size_bytes(&self) -> usize {
        self.map_size_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = StorageConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.map_size_bytes(), 1024 * 1024 * 1024);
    }

    #[test]
    fn test_builder() {
        let config = StorageConfig::new("/tmp/x.db")
            .with_map_size_mb(16)
            .with_max_dbs(12)
            .with_max_readers(8);
        assert_eq!(config.path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.map_size_mb, 16);
        assert_eq!(config.max_dbs, 12);
        assert_eq!(config.max_readers, 8);
    }

    #[test]
    fn test_validate_rejects_zero_map_size() {
        let err = StorageConfig::default()
            .with_map_size_mb(0)
            .validate()
            .expect_err("zero map size should be rejected");
        assert!(
            matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "map_size_mb")
        );
    }

    #[test]
    fn test_validate_rejects_too_few_dbs() {
        let err = StorageConfig::default()
            .with_max_dbs(2)
            .validate()
            .expect_err("max_dbs below 3 should be rejected");
        assert!(
            matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "max_dbs")
        );
    }

    #[test]
    fn test_from_lookup_uses_overrides_and_defaults() {
        let vars: HashMap<&str, &str> = [
            ("STRONGBOX_DB_PATH", "/var/lib/strongbox/central.db"),
            ("STRONGBOX_MAX_DBS", "64"),
            ("STRONGBOX_MAX_READERS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = StorageConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.path, PathBuf::from("/var/lib/strongbox/central.db"));
        assert_eq!(config.max_dbs, 64);
        assert_eq!(config.map_size_mb, DEFAULT_MAP_SIZE_MB);
        assert_eq!(config.max_readers, DEFAULT_MAX_READERS);
    }

    #[test]
    fn test_from_path_parses_toml() {
        let dir = tempfile::TempDir::new().expect("TempDir creation should succeed");
        let file_path = dir.path().join("storage.toml");
        let mut file = std::fs::File::create(&file_path).expect("create config file");
        writeln!(
            file,
            "path = \"/data/strongbox.db\"\nmap_size_mb = 64\nmax_dbs = 32\nmax_readers = 16"
        )
        .expect("write config file");

        let config = StorageConfig::from_path(&file_path).expect("config should parse");
        assert_eq!(config.path, PathBuf::from("/data/strongbox.db"));
        assert_eq!(config.map_size_mb, 64);
    }

    #[test]
    fn test_from_path_rejects_unknown_fields() {
        let dir = tempfile::TempDir::new().expect("TempDir creation should succeed");
        let file_path = dir.path().join("storage.toml");
        std::fs::write(
            &file_path,
            "path = \"a.db\"\nmap_size_mb = 1\nmax_dbs = 3\nmax_readers = 1\nbogus = true\n",
        )
        .expect("write config file");

        let err = StorageConfig::from_path(&file_path).expect_err("unknown field should fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_from_path_fills_missing_fields() {
        let dir = tempfile::TempDir::new().expect("TempDir creation should succeed");
        let file_path = dir.path().join("storage.toml");
        std::fs::write(&file_path, "path = \"partial.db\"\n").expect("write config file");

        let config = StorageConfig::from_path(&file_path).expect("config should parse");
        assert_eq!(config, StorageConfig::new("partial.db"));
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = StorageConfig::from_path(Path::new("/nonexistent/strongbox.toml"))
            .expect_err("missing file should fail");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
