use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ESTIMATOR_URL_ENV: &str = "PLATE_ESTIMATOR_URL";

pub struct Config {
    pub db_path: PathBuf,
    pub estimator: EstimatorConfig,
}

/// Contents of `config.toml`. Every table is optional.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    estimator: EstimatorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub endpoint: Option<String>,
    /// Name of the environment variable that holds the API key.
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: None,
            timeout_secs: 8,
        }
    }
}

impl EstimatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_deref()?;
        std::env::var(var).ok().filter(|k| !k.trim().is_empty())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "plate").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let config_path = proj_dirs.config_dir().join("config.toml");
        Self::from_parts(
            &data_dir,
            &config_path,
            std::env::var(ESTIMATOR_URL_ENV).ok(),
        )
    }

    fn from_parts(
        data_dir: &Path,
        config_path: &Path,
        url_override: Option<String>,
    ) -> Result<Self> {
        let mut file = if config_path.exists() {
            let raw = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<FileConfig>(&raw)
                .with_context(|| format!("Invalid config file {}", config_path.display()))?
        } else {
            FileConfig::default()
        };

        if let Some(url) = url_override.filter(|u| !u.trim().is_empty()) {
            file.estimator.endpoint = Some(url);
        }

        Ok(Config {
            db_path: data_dir.join("plate.db"),
            estimator: file.estimator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_parts(dir.path(), &dir.path().join("config.toml"), None).unwrap();
        assert_eq!(config.db_path, dir.path().join("plate.db"));
        assert_eq!(config.estimator, EstimatorConfig::default());
        assert_eq!(config.estimator.timeout(), Duration::from_secs(8));
    }

    #[test]
    fn test_estimator_table_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[estimator]\nendpoint = \"http://localhost:9000/estimate\"\napi_key_env = \"PLATE_TEST_KEY\"\ntimeout_secs = 3\n",
        )
        .unwrap();

        let config = Config::from_parts(dir.path(), &path, None).unwrap();
        assert_eq!(
            config.estimator.endpoint.as_deref(),
            Some("http://localhost:9000/estimate")
        );
        assert_eq!(config.estimator.api_key_env.as_deref(), Some("PLATE_TEST_KEY"));
        assert_eq!(config.estimator.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_env_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[estimator]\nendpoint = \"http://file\"\n").unwrap();

        let config =
            Config::from_parts(dir.path(), &path, Some("http://env".to_string())).unwrap();
        assert_eq!(config.estimator.endpoint.as_deref(), Some("http://env"));
        assert_eq!(config.estimator.timeout_secs, 8);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[estimator\nendpoint = ").unwrap();
        assert!(Config::from_parts(dir.path(), &path, None).is_err());
    }
}
