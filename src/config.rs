use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::WorkshopError;

pub const DEFAULT_API_BASE_URL: &str = "https://celab.jetfox.ovh/api/v4";
pub const CONFIG_FILE_NAME: &str = "workshop-dl.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub fanout: Option<usize>,
    #[serde(default)]
    pub workshop_dir: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub map_extension: Option<String>,
    #[serde(default)]
    pub payload_extensions: Option<Vec<String>>,
    #[serde(default)]
    pub progress_interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub api_base_url: String,
    pub per_page: u32,
    pub request_timeout: Duration,
    pub fanout: usize,
    pub workshop_dir: Utf8PathBuf,
    pub cache_dir: Utf8PathBuf,
    pub map_extension: String,
    pub payload_extensions: Vec<String>,
    pub progress_interval: Duration,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, WorkshopError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE_NAME),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| WorkshopError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| WorkshopError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, WorkshopError> {
        let api_base_url = config
            .api_base_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(WorkshopError::ConfigParse(format!(
                "api_base_url must be an http(s) URL: {api_base_url}"
            )));
        }

        let workshop_dir = match config.workshop_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_workshop_dir()?,
        };
        let cache_dir = match config.cache_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_cache_dir()?,
        };

        let map_extension = normalize_extension(
            config.map_extension.as_deref().unwrap_or("upk"),
        );
        let mut payload_extensions = config
            .payload_extensions
            .unwrap_or_else(default_payload_extensions)
            .iter()
            .map(|ext| normalize_extension(ext))
            .filter(|ext| !ext.is_empty())
            .collect::<Vec<_>>();
        if !payload_extensions.contains(&map_extension) {
            payload_extensions.insert(0, map_extension.clone());
        }

        Ok(ResolvedConfig {
            api_base_url,
            per_page: config.per_page.unwrap_or(20).clamp(1, 100),
            request_timeout: Duration::from_secs(config.request_timeout_secs.unwrap_or(30).max(1)),
            fanout: config.fanout.unwrap_or(4).max(1),
            workshop_dir,
            cache_dir,
            map_extension,
            payload_extensions,
            progress_interval: Duration::from_millis(config.progress_interval_ms.unwrap_or(100)),
        })
    }
}

pub fn default_payload_extensions() -> Vec<String> {
    vec!["upk".to_string(), "udk".to_string()]
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn default_workshop_dir() -> Result<Utf8PathBuf, WorkshopError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.data_dir().join("workshop-dl").join("maps")).ok()
        })
        .ok_or_else(|| WorkshopError::Filesystem("unable to resolve data directory".to_string()))
}

fn default_cache_dir() -> Result<Utf8PathBuf, WorkshopError> {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.cache_dir().join("workshop-dl")).ok())
        .ok_or_else(|| WorkshopError::Filesystem("unable to resolve cache directory".to_string()))
}
