use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::ContentClient;
use crate::config::ResolvedConfig;
use crate::domain::{Release, SearchResult};
use crate::error::{ErrorCategory, WorkshopError};
use crate::fs_util;
use crate::progress::{DownloadProgress, ProgressCell, ProgressThrottle};
use crate::state::ErrorSlot;
use crate::store::{MapMetadata, Store};

pub type ProgressCallback = Box<dyn FnMut(&DownloadProgress) + Send + 'static>;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub map_extension: String,
    pub payload_extensions: Vec<String>,
    pub progress_interval: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            map_extension: config.map_extension.clone(),
            payload_extensions: config.payload_extensions.clone(),
            progress_interval: config.progress_interval,
        }
    }

    /// Payload extensions with the map extension moved to the front, so a
    /// file that already has it wins over one that would need renaming.
    pub fn payload_priority(&self) -> Vec<String> {
        let mut priority = vec![self.map_extension.clone()];
        priority.extend(
            self.payload_extensions
                .iter()
                .filter(|ext| !ext.eq_ignore_ascii_case(&self.map_extension))
                .cloned(),
        );
        priority
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            map_extension: "upk".to_string(),
            payload_extensions: crate::config::default_payload_extensions(),
            progress_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadedMap {
    pub map_dir: Utf8PathBuf,
    pub payload: Utf8PathBuf,
    pub metadata: Utf8PathBuf,
    pub preview: Option<Utf8PathBuf>,
    pub extracted_files: usize,
}

pub struct DownloadHandle {
    handle: JoinHandle<Result<DownloadedMap, WorkshopError>>,
}

impl DownloadHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> Result<DownloadedMap, WorkshopError> {
        self.handle
            .join()
            .unwrap_or_else(|_| Err(WorkshopError::Filesystem("download worker panicked".to_string())))
    }
}

// Clears the busy flag even if a progress callback panics.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Shared<C> {
    client: C,
    settings: PipelineSettings,
    progress: ProgressCell,
    downloading: AtomicBool,
    cancel: AtomicBool,
    folder_error: ErrorSlot,
}

pub struct DownloadPipeline<C: ContentClient + 'static> {
    shared: Arc<Shared<C>>,
}

impl<C: ContentClient + 'static> DownloadPipeline<C> {
    pub fn new(client: C, settings: PipelineSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                client,
                settings,
                progress: ProgressCell::default(),
                downloading: AtomicBool::new(false),
                cancel: AtomicBool::new(false),
                folder_error: ErrorSlot::default(),
            }),
        }
    }

    /// Starts downloading `release` (or the first downloadable one) of
    /// `result` into `destination/<map name>`. Only one download runs at a
    /// time; a second call while one is active fails with
    /// [`WorkshopError::Busy`] and leaves the active one untouched.
    pub fn download(
        &self,
        result: &SearchResult,
        release: Option<usize>,
        destination: &Utf8Path,
        on_progress: Option<ProgressCallback>,
    ) -> Result<DownloadHandle, WorkshopError> {
        let shared = &self.shared;
        if shared
            .downloading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(map = %result.name, "download rejected; another one is active");
            return Err(WorkshopError::Busy);
        }

        let Some(selected) = result.release(release).cloned() else {
            shared.downloading.store(false, Ordering::SeqCst);
            return Err(WorkshopError::NoRelease(result.name.clone()));
        };

        shared.cancel.store(false, Ordering::SeqCst);
        shared.folder_error.clear();
        shared.progress.start(&result.name);

        let job = shared.clone();
        let result = result.clone();
        let destination = destination.to_path_buf();
        let spawned = thread::Builder::new()
            .name("workshop-download".to_string())
            .spawn(move || {
                let _busy = BusyGuard(&job.downloading);
                let mut on_progress = on_progress;
                let outcome = job.run(&result, &selected, &destination, &mut on_progress);
                if let Err(err) = &outcome {
                    job.record_failure(err);
                    job.notify(&mut on_progress);
                }
                outcome
            });

        match spawned {
            Ok(handle) => Ok(DownloadHandle { handle }),
            Err(err) => {
                let err = WorkshopError::Filesystem(format!("spawn download worker: {err}"));
                shared.progress.fail(err.to_string());
                shared.downloading.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    pub fn cancel(&self) {
        self.shared.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_downloading(&self) -> bool {
        self.shared.downloading.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> DownloadProgress {
        self.shared.progress.snapshot()
    }

    pub fn folder_error(&self) -> Option<String> {
        self.shared.folder_error.message()
    }

    pub fn has_folder_error(&self) -> bool {
        self.shared.folder_error.is_set()
    }
}

impl<C: ContentClient + 'static> Shared<C> {
    fn notify(&self, on_progress: &mut Option<ProgressCallback>) {
        if let Some(callback) = on_progress.as_mut() {
            callback(&self.progress.snapshot());
        }
    }

    fn check_cancelled(&self) -> Result<(), WorkshopError> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(WorkshopError::Cancelled);
        }
        Ok(())
    }

    fn record_failure(&self, err: &WorkshopError) {
        if err.category() == ErrorCategory::Filesystem {
            self.folder_error.set(err.to_string());
        }
        self.progress.fail(err.to_string());
        warn!(error = %err, "download failed");
    }

    fn run(
        &self,
        result: &SearchResult,
        release: &Release,
        destination: &Utf8Path,
        on_progress: &mut Option<ProgressCallback>,
    ) -> Result<DownloadedMap, WorkshopError> {
        let map_dir = Store::map_dir(destination, result);
        Store::ensure_dir(&map_dir)?;
        self.check_cancelled()?;

        let temp_dir = tempfile::Builder::new()
            .prefix("workshop-dl")
            .tempdir()
            .map_err(|err| WorkshopError::Filesystem(err.to_string()))?;
        let archive_name = if release.archive_name.is_empty() {
            "archive.zip".to_string()
        } else {
            sanitize_file_name(&release.archive_name)
        };
        let archive_path = temp_dir.path().join(archive_name);

        info!(map = %result.name, url = %release.download_url, "downloading archive");
        let received = self.transfer(&release.download_url, &archive_path, on_progress)?;
        self.progress.finish_transfer(received);
        self.notify(on_progress);
        self.check_cancelled()?;

        debug!(archive = %archive_path.display(), "validating archive");
        fs_util::validate_zip(&archive_path)?;
        let extracted_files = fs_util::extract_zip(&archive_path, map_dir.as_std_path())?;
        info!(files = extracted_files, dir = %map_dir, "archive extracted");
        self.check_cancelled()?;

        let payload =
            fs_util::find_payload(map_dir.as_std_path(), &self.settings.payload_priority())?;
        let payload = fs_util::normalize_extension(&payload, &self.settings.map_extension)?;
        let payload = utf8(payload)?;

        let metadata_path = payload.with_extension("json");
        Store::write_metadata(&metadata_path, &MapMetadata::from_result(result, release))?;
        let preview = copy_cached_preview(result, &payload);

        self.progress.complete();
        self.notify(on_progress);
        info!(map = %result.name, payload = %payload, "download complete");

        Ok(DownloadedMap {
            map_dir,
            payload,
            metadata: metadata_path,
            preview,
            extracted_files,
        })
    }

    fn transfer(
        &self,
        url: &str,
        archive_path: &Path,
        on_progress: &mut Option<ProgressCallback>,
    ) -> Result<u64, WorkshopError> {
        let mut throttle = ProgressThrottle::new(self.settings.progress_interval);
        let mut report = |received: u64, total: Option<u64>| {
            if throttle.should_emit() {
                self.progress.update(received, total);
                self.notify(on_progress);
            }
            !self.cancel.load(Ordering::SeqCst)
        };
        self.client.download_to_file(url, archive_path, &mut report)
    }
}

fn copy_cached_preview(result: &SearchResult, payload: &Utf8Path) -> Option<Utf8PathBuf> {
    let source = result.preview_path.as_ref()?;
    if !source.as_std_path().is_file() {
        return None;
    }
    let target = payload.with_extension("jpg");
    if target.as_std_path().exists() {
        return Some(target);
    }
    match Store::copy_file_atomic(source, &target) {
        Ok(()) => Some(target),
        Err(err) => {
            warn!(error = %err, "preview copy skipped");
            None
        }
    }
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned = name
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch => ch,
        })
        .collect::<String>();
    if cleaned.trim_matches('.').is_empty() {
        "archive.zip".to_string()
    } else {
        cleaned
    }
}

fn utf8(path: std::path::PathBuf) -> Result<Utf8PathBuf, WorkshopError> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|_| WorkshopError::Filesystem("non-utf8 file path in archive".to_string()))
}
