use std::io::{self, Write};

use serde::Serialize;

use crate::domain::SearchResult;
use crate::download::DownloadedMap;
use crate::progress::DownloadProgress;
use crate::search::SearchStatus;

#[derive(Debug, Serialize)]
pub struct SearchReport<'a> {
    pub status: &'a SearchStatus,
    pub results: &'a [SearchResult],
}

#[derive(Debug, Serialize)]
pub struct DownloadReport<'a> {
    pub progress: &'a DownloadProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<&'a DownloadedMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_error: Option<&'a str>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_search(status: &SearchStatus, results: &[SearchResult]) -> io::Result<()> {
        Self::print_json(&SearchReport { status, results })
    }

    pub fn print_download(report: &DownloadReport<'_>) -> io::Result<()> {
        Self::print_json(report)
    }

    /// One compact line per progress update, for streaming consumers.
    pub fn print_progress_line(progress: &DownloadProgress) -> io::Result<()> {
        let json = serde_json::to_string(progress).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        stdout.flush()
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
