use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::WorkshopError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(u64);

impl ProjectId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProjectId {
    type Err = WorkshopError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(WorkshopError::InvalidProjectId(value.to_string()));
        }
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|_| WorkshopError::InvalidProjectId(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub keywords: String,
    pub page: u32,
}

impl SearchQuery {
    pub fn new(keywords: impl Into<String>, page: u32) -> Self {
        Self {
            keywords: keywords.into().trim().to_string(),
            page,
        }
    }
}

/// One downloadable version of a catalog entry. Never mutated after it is
/// attached to a [`SearchResult`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Release {
    pub name: String,
    pub tag: String,
    pub description: String,
    pub archive_name: String,
    pub download_url: String,
    pub picture_url: Option<String>,
}

impl Release {
    pub fn is_downloadable(&self) -> bool {
        !self.download_url.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResult {
    pub id: ProjectId,
    pub name: String,
    pub project_path: String,
    pub size_bytes: u64,
    pub description: String,
    pub preview_url: Option<String>,
    pub author: String,
    pub releases: Vec<Release>,
    pub releases_loaded: bool,
    pub preview_path: Option<Utf8PathBuf>,
    #[serde(skip)]
    pub preview_image: Option<Arc<[u8]>>,
    pub image_loaded: bool,
    pub preview_download_in_flight: bool,
    pub generation: u64,
}

impl SearchResult {
    pub fn release(&self, index: Option<usize>) -> Option<&Release> {
        match index {
            Some(index) => self.releases.get(index).filter(|release| release.is_downloadable()),
            None => self.releases.iter().find(|release| release.is_downloadable()),
        }
    }

    /// Folder name safe on every common filesystem; falls back to the id.
    pub fn folder_name(&self) -> String {
        let sanitized = self
            .name
            .trim()
            .chars()
            .map(|ch| match ch {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                ch if ch.is_control() => '_',
                ch => ch,
            })
            .collect::<String>();
        let sanitized = sanitized.trim_matches(|ch| ch == '.' || ch == ' ');
        if sanitized.is_empty() {
            format!("map-{}", self.id)
        } else {
            sanitized.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_project_id_valid() {
        let id: ProjectId = " 1042 ".parse().unwrap();
        assert_eq!(id.get(), 1042);
    }

    #[test]
    fn parse_project_id_invalid() {
        let err = "12a".parse::<ProjectId>().unwrap_err();
        assert_matches!(err, WorkshopError::InvalidProjectId(_));
    }

    #[test]
    fn folder_name_strips_separators() {
        let result = SearchResult {
            id: ProjectId::new(7),
            name: "Flick/Reset: v2?".to_string(),
            ..SearchResult::default()
        };
        assert_eq!(result.folder_name(), "Flick_Reset_ v2_");
    }

    #[test]
    fn folder_name_falls_back_to_id() {
        let result = SearchResult {
            id: ProjectId::new(7),
            name: " .. ".to_string(),
            ..SearchResult::default()
        };
        assert_eq!(result.folder_name(), "map-7");
    }
}
