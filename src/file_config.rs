use crate::error::Result;
use directories::ProjectDirs;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Upload defaults loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

impl FileConfig {
    /// Load config from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        debug!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: FileConfig = serde_json::from_str(&contents)
            .map_err(|e| crate::error::Error::Config(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    /// Load config with fallback priority:
    /// 1. Explicit path (if provided)
    /// 2. Project directory (./tus.json or ./.tus/config.json)
    /// 3. User config directory (~/.config/tus/config.json)
    ///
    /// # Errors
    ///
    /// Returns an error only if an explicit path is provided but cannot be read
    pub fn load_with_fallback(explicit_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit path is provided, it must succeed
        if let Some(path) = explicit_path {
            return Self::load_from_path(path);
        }

        // Try project directory locations
        let project_paths = vec![
            PathBuf::from("./tus.json"),
            PathBuf::from("./.tus/config.json"),
        ];

        for path in &project_paths {
            if path.exists() {
                match Self::load_from_path(path) {
                    Ok(config) => {
                        debug!("Loaded config from project directory: {}", path.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        debug!("Failed to load config from {}: {}", path.display(), e);
                    }
                }
            }
        }

        // Try user config directory
        if let Some(proj_dirs) = ProjectDirs::from("", "", "tus") {
            let user_config_path = proj_dirs.config_dir().join("config.json");
            if user_config_path.exists() {
                match Self::load_from_path(&user_config_path) {
                    Ok(config) => {
                        debug!(
                            "Loaded config from user directory: {}",
                            user_config_path.display()
                        );
                        return Ok(config);
                    }
                    Err(e) => {
                        debug!(
                            "Failed to load config from {}: {}",
                            user_config_path.display(),
                            e
                        );
                    }
                }
            }
        }

        // No config file found, return empty config
        debug!("No config file found, using defaults");
        Ok(FileConfig::default())
    }

    /// Merge with another config, preferring values from self
    #[must_use]
    pub fn merge_with(&self, other: &FileConfig) -> Self {
        FileConfig {
            endpoint: self.endpoint.clone().or_else(|| other.endpoint.clone()),
            chunk_size: self.chunk_size.or(other.chunk_size),
            max_retries: self.max_retries.or(other.max_retries),
            store_dir: self.store_dir.clone().or_else(|| other.store_dir.clone()),
            headers: self.headers.clone().or_else(|| other.headers.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_with() {
        let config1 = FileConfig {
            endpoint: Some("https://one.example/files".to_string()),
            chunk_size: None,
            max_retries: Some(3),
            store_dir: None,
            headers: None,
        };

        let config2 = FileConfig {
            endpoint: Some("https://two.example/files".to_string()),
            chunk_size: Some(1024),
            max_retries: Some(8),
            store_dir: Some(PathBuf::from("/tmp/tus-store")),
            headers: None,
        };

        let merged = config1.merge_with(&config2);

        assert_eq!(
            merged.endpoint,
            Some("https://one.example/files".to_string())
        );
        assert_eq!(merged.chunk_size, Some(1024));
        assert_eq!(merged.max_retries, Some(3));
        assert_eq!(merged.store_dir, Some(PathBuf::from("/tmp/tus-store")));
    }

    #[test]
    fn test_load_from_path_parses_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"endpoint": "https://tus.example/files", "chunk_size": 4096}"#,
        )
        .unwrap();

        let config = FileConfig::load_from_path(&path).unwrap();
        assert_eq!(config.endpoint, Some("https://tus.example/files".to_string()));
        assert_eq!(config.chunk_size, Some(4096));
        assert_eq!(config.max_retries, None);
    }
}
