use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::WorkshopError;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|value| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn into_success(self) -> Result<Self, WorkshopError> {
        if self.is_success() {
            return Ok(self);
        }
        let message = String::from_utf8_lossy(&self.body).trim().to_string();
        let message = if message.is_empty() {
            "catalog request failed".to_string()
        } else {
            message
        };
        Err(WorkshopError::Status {
            status: self.status,
            message,
        })
    }

    pub fn json(&self) -> Result<Value, WorkshopError> {
        serde_json::from_slice(&self.body).map_err(|err| WorkshopError::Parse(err.to_string()))
    }
}

/// Network access used by the search and download background tasks. Calls
/// block the calling worker; no retries happen at this layer.
pub trait ContentClient: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, WorkshopError>;

    /// Streams `url` into `destination`, reporting `(received, total)`.
    /// Returning `false` from `on_progress` aborts with [`WorkshopError::Cancelled`].
    fn download_to_file(
        &self,
        url: &str,
        destination: &Path,
        on_progress: &mut dyn FnMut(u64, Option<u64>) -> bool,
    ) -> Result<u64, WorkshopError>;
}

impl<C: ContentClient + ?Sized> ContentClient for Arc<C> {
    fn get(&self, url: &str) -> Result<HttpResponse, WorkshopError> {
        (**self).get(url)
    }

    fn download_to_file(
        &self,
        url: &str,
        destination: &Path,
        on_progress: &mut dyn FnMut(u64, Option<u64>) -> bool,
    ) -> Result<u64, WorkshopError> {
        (**self).download_to_file(url, destination, on_progress)
    }
}

#[derive(Clone)]
pub struct HttpContentClient {
    client: Client,
}

impl HttpContentClient {
    pub fn new(timeout: Duration) -> Result<Self, WorkshopError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("workshop-dl/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| WorkshopError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|err| WorkshopError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn collect_headers(response: &reqwest::blocking::Response) -> BTreeMap<String, String> {
        response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect()
    }
}

impl ContentClient for HttpContentClient {
    fn get(&self, url: &str) -> Result<HttpResponse, WorkshopError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| WorkshopError::Http(err.to_string()))?;
        let status = response.status().as_u16();
        let headers = Self::collect_headers(&response);
        let body = response
            .bytes()
            .map_err(|err| WorkshopError::Http(err.to_string()))?;
        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    fn download_to_file(
        &self,
        url: &str,
        destination: &Path,
        on_progress: &mut dyn FnMut(u64, Option<u64>) -> bool,
    ) -> Result<u64, WorkshopError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| WorkshopError::Http(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "download request failed".to_string());
            return Err(WorkshopError::Status { status, message });
        }
        let total = response.content_length();

        let mut file = File::create(destination)
            .map_err(|err| WorkshopError::Filesystem(err.to_string()))?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut received = 0u64;
        if !on_progress(received, total) {
            return Err(WorkshopError::Cancelled);
        }
        loop {
            let read = response
                .read(&mut buffer)
                .map_err(|err| WorkshopError::Http(err.to_string()))?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])
                .map_err(|err| WorkshopError::Filesystem(err.to_string()))?;
            received += read as u64;
            if !on_progress(received, total) {
                return Err(WorkshopError::Cancelled);
            }
        }
        file.flush()
            .map_err(|err| WorkshopError::Filesystem(err.to_string()))?;
        Ok(received)
    }
}
