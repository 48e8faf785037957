use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::config::ResolvedConfig;
use crate::domain::{ProjectId, Release, SearchResult};
use crate::error::WorkshopError;

#[derive(Debug, Clone)]
pub struct Store {
    workshop_root: Utf8PathBuf,
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new(config: &ResolvedConfig) -> Self {
        Self::new_with_paths(config.workshop_dir.clone(), config.cache_dir.clone())
    }

    pub fn new_with_paths(workshop_root: Utf8PathBuf, cache_root: Utf8PathBuf) -> Self {
        Self {
            workshop_root,
            cache_root,
        }
    }

    pub fn workshop_root(&self) -> &Utf8Path {
        &self.workshop_root
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn previews_dir(&self) -> Utf8PathBuf {
        self.cache_root.join("previews")
    }

    pub fn preview_path(&self, id: ProjectId) -> Utf8PathBuf {
        self.previews_dir().join(format!("{id}.jpg"))
    }

    pub fn map_dir(destination: &Utf8Path, result: &SearchResult) -> Utf8PathBuf {
        destination.join(result.folder_name())
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), WorkshopError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| WorkshopError::Folder(format!("{path}: {err}")))?;
        if !path.as_std_path().is_dir() {
            return Err(WorkshopError::Folder(format!("{path}: not a directory")));
        }
        Ok(())
    }

    pub fn write_metadata(path: &Utf8Path, metadata: &MapMetadata) -> Result<(), WorkshopError> {
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| WorkshopError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn read_metadata(path: &Utf8Path) -> Result<MapMetadata, WorkshopError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| WorkshopError::Filesystem(format!("{path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| WorkshopError::Parse(err.to_string()))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), WorkshopError> {
        let parent = path
            .parent()
            .ok_or_else(|| WorkshopError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| WorkshopError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("workshop-dl-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| WorkshopError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content)
            .map_err(|err| WorkshopError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| WorkshopError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), WorkshopError> {
        let content = fs::read(source.as_std_path())
            .map_err(|err| WorkshopError::Filesystem(format!("{source}: {err}")))?;
        Self::write_bytes_atomic(dest, &content)
    }
}

/// On-disk description of a downloaded map. Key names are read back by the
/// local map indexer and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MapMetadata {
    pub title: String,
    pub author: String,
    pub description: String,
    pub preview_url: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(default)]
    pub downloaded_at: String,
    #[serde(default)]
    pub tool: String,
}

impl MapMetadata {
    pub fn from_result(result: &SearchResult, release: &Release) -> Self {
        Self {
            title: result.name.clone(),
            author: result.author.clone(),
            description: result.description.clone(),
            preview_url: result
                .preview_url
                .clone()
                .or_else(|| release.picture_url.clone())
                .unwrap_or_default(),
            id: result.id.to_string(),
            release: release.name.clone(),
            tag: release.tag.clone(),
            download_url: release.download_url.clone(),
            downloaded_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("workshop-dl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
