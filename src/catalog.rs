use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::client::HttpResponse;
use crate::domain::{ProjectId, Release, SearchResult};
use crate::error::WorkshopError;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static MARKDOWN_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\(([^)\s]+)[^)]*\)").unwrap());

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".jfif", ".png", ".gif", ".webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub total_results: u64,
    pub total_pages: u32,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    api_base_url: String,
    web_base_url: String,
    per_page: u32,
}

impl Catalog {
    pub fn new(api_base_url: &str, per_page: u32) -> Self {
        let api_base_url = api_base_url.trim_end_matches('/').to_string();
        let web_base_url = match api_base_url.find("/api/") {
            Some(index) => api_base_url[..index].to_string(),
            None => api_base_url.clone(),
        };
        Self {
            api_base_url,
            web_base_url,
            per_page: per_page.max(1),
        }
    }

    pub fn count_url(&self, keywords: &str) -> String {
        format!(
            "{}/projects?search={}&per_page=1",
            self.api_base_url,
            urlencoding::encode(keywords)
        )
    }

    /// `page` is zero-based; the catalog counts from one.
    pub fn page_url(&self, keywords: &str, page: u32) -> String {
        format!(
            "{}/projects?search={}&page={}&per_page={}",
            self.api_base_url,
            urlencoding::encode(keywords),
            page.saturating_add(1),
            self.per_page
        )
    }

    pub fn releases_url(&self, id: ProjectId) -> String {
        format!("{}/projects/{}/releases", self.api_base_url, id)
    }

    pub fn resolve_url(&self, project_path: &str, raw: &str) -> String {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return raw.to_string();
        }
        if raw.starts_with("/uploads/") && !project_path.is_empty() {
            return format!("{}/{}{}", self.web_base_url, project_path, raw);
        }
        if raw.starts_with('/') {
            return format!("{}{}", self.web_base_url, raw);
        }
        format!("{}/{}", self.web_base_url, raw)
    }

    pub fn page_info(&self, count: &HttpResponse, page: &HttpResponse) -> PageInfo {
        let total_results = count
            .header("x-total")
            .or_else(|| page.header("x-total"))
            .and_then(|value| value.trim().parse::<u64>().ok())
            .or_else(|| {
                page.json()
                    .ok()
                    .and_then(|value| value.as_array().map(|items| items.len() as u64))
            })
            .unwrap_or(0);
        let total_pages = page
            .header("x-total-pages")
            .and_then(|value| value.trim().parse::<u32>().ok())
            .unwrap_or_else(|| {
                u32::try_from(total_results.div_ceil(u64::from(self.per_page))).unwrap_or(u32::MAX)
            });
        PageInfo {
            total_results,
            total_pages,
        }
    }

    pub fn parse_projects(&self, raw: &Value) -> Result<Vec<SearchResult>, WorkshopError> {
        let items = raw
            .as_array()
            .ok_or_else(|| WorkshopError::Parse("expected a JSON array of projects".to_string()))?;
        items
            .iter()
            .map(|item| self.parse_project(item))
            .collect()
    }

    fn parse_project(&self, item: &Value) -> Result<SearchResult, WorkshopError> {
        let id = item
            .get("id")
            .and_then(|v| v.as_u64())
            .map(ProjectId::new)
            .ok_or_else(|| WorkshopError::Parse("project without numeric id".to_string()))?;
        let name = string_field(item, "name")
            .or_else(|| string_field(item, "path"))
            .unwrap_or_else(|| format!("map-{id}"));
        let project_path = string_field(item, "path_with_namespace").unwrap_or_default();
        let author = item
            .get("namespace")
            .and_then(|v| v.get("name"))
            .and_then(|v| v.as_str())
            .or_else(|| {
                item.get("owner")
                    .and_then(|v| v.get("name"))
                    .and_then(|v| v.as_str())
            })
            .unwrap_or_default()
            .to_string();
        let size_bytes = item
            .get("statistics")
            .and_then(|v| v.get("repository_size"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let preview_url = string_field(item, "avatar_url")
            .filter(|url| !url.trim().is_empty())
            .map(|url| self.resolve_url(&project_path, &url));

        Ok(SearchResult {
            id,
            name,
            project_path,
            size_bytes,
            description: clean_html(&string_field(item, "description").unwrap_or_default()),
            preview_url,
            author,
            ..SearchResult::default()
        })
    }

    pub fn parse_releases(
        &self,
        project_path: &str,
        raw: &Value,
    ) -> Result<Vec<Release>, WorkshopError> {
        let items = raw
            .as_array()
            .ok_or_else(|| WorkshopError::Parse("expected a JSON array of releases".to_string()))?;

        let mut releases = Vec::with_capacity(items.len());
        for item in items {
            let description = string_field(item, "description").unwrap_or_default();
            let links = item
                .get("assets")
                .and_then(|v| v.get("links"))
                .and_then(|v| v.as_array())
                .map(|links| {
                    links
                        .iter()
                        .filter_map(|link| {
                            let url = string_field(link, "url")
                                .or_else(|| string_field(link, "direct_asset_url"))?;
                            let name = string_field(link, "name").unwrap_or_else(|| {
                                url.rsplit('/').next().unwrap_or_default().to_string()
                            });
                            Some((name, url))
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();

            let archive = links
                .iter()
                .find(|(name, url)| has_suffix(name, &[".zip"]) || has_suffix(url, &[".zip"]))
                .or_else(|| {
                    links
                        .iter()
                        .find(|(name, url)| !is_image(name) && !is_image(url))
                });
            let picture_url = links
                .iter()
                .find(|(name, url)| is_image(name) || is_image(url))
                .map(|(_, url)| url.clone())
                .or_else(|| {
                    MARKDOWN_IMAGE
                        .captures(&description)
                        .and_then(|caps| caps.get(1))
                        .map(|m| m.as_str().to_string())
                })
                .map(|url| self.resolve_url(project_path, &url));

            releases.push(Release {
                name: string_field(item, "name").unwrap_or_default(),
                tag: string_field(item, "tag_name").unwrap_or_default(),
                description: clean_html(&description),
                archive_name: archive.map(|(name, _)| name.clone()).unwrap_or_default(),
                download_url: archive
                    .map(|(_, url)| self.resolve_url(project_path, url))
                    .unwrap_or_default(),
                picture_url,
            });
        }
        Ok(releases)
    }
}

pub fn clean_html(value: &str) -> String {
    let stripped = HTML_TAG.replace_all(value, "");
    stripped
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .trim()
        .to_string()
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

fn has_suffix(value: &str, suffixes: &[&str]) -> bool {
    let lower = value.to_ascii_lowercase();
    let lower = lower.split(['?', '#']).next().unwrap_or_default();
    suffixes.iter().any(|suffix| lower.ends_with(suffix))
}

fn is_image(value: &str) -> bool {
    has_suffix(value, IMAGE_EXTENSIONS)
}
