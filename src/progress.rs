use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadProgress {
    pub map_name: String,
    pub bytes_downloaded: u64,
    pub total_bytes: u64,
    pub percent_complete: u8,
    pub is_complete: bool,
    pub has_failed: bool,
    pub error_message: String,
}

/// Shared, lock-free view of the running download.
///
/// The stored percentage is capped at 99 while bytes are still moving and
/// only ever grows; a snapshot reports 100 exactly when the completion flag
/// is set.
#[derive(Debug, Default)]
pub struct ProgressCell {
    map_name: Mutex<String>,
    downloaded: AtomicU64,
    total: AtomicU64,
    percent: AtomicU8,
    complete: AtomicBool,
    failed: AtomicBool,
    error: Mutex<String>,
}

impl ProgressCell {
    pub fn start(&self, map_name: &str) {
        self.complete.store(false, Ordering::SeqCst);
        self.failed.store(false, Ordering::SeqCst);
        self.downloaded.store(0, Ordering::SeqCst);
        self.total.store(0, Ordering::SeqCst);
        self.percent.store(0, Ordering::SeqCst);
        if let Ok(mut error) = self.error.lock() {
            error.clear();
        }
        if let Ok(mut name) = self.map_name.lock() {
            *name = map_name.to_string();
        }
    }

    pub fn update(&self, downloaded: u64, total: Option<u64>) {
        let total = total.unwrap_or(0);
        self.total.store(total, Ordering::SeqCst);
        self.downloaded.store(downloaded, Ordering::SeqCst);
        if total > 0 {
            let percent = (downloaded.min(total) * 100 / total).min(99) as u8;
            self.percent.fetch_max(percent, Ordering::SeqCst);
        }
    }

    /// Final transfer update; `received` becomes both the byte count and the
    /// total.
    pub fn finish_transfer(&self, received: u64) {
        self.update(received, Some(received.max(1)));
        self.downloaded.store(received, Ordering::SeqCst);
        self.total.store(received, Ordering::SeqCst);
    }

    pub fn complete(&self) {
        self.complete.store(true, Ordering::SeqCst);
    }

    pub fn fail(&self, message: impl Into<String>) {
        if let Ok(mut error) = self.error.lock() {
            *error = message.into();
        }
        self.failed.store(true, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> DownloadProgress {
        let is_complete = self.complete.load(Ordering::SeqCst);
        let has_failed = self.failed.load(Ordering::SeqCst);
        let percent_complete = if is_complete {
            100
        } else {
            self.percent.load(Ordering::SeqCst).min(99)
        };
        DownloadProgress {
            map_name: self
                .map_name
                .lock()
                .map(|name| name.clone())
                .unwrap_or_default(),
            bytes_downloaded: self.downloaded.load(Ordering::SeqCst),
            total_bytes: self.total.load(Ordering::SeqCst),
            percent_complete,
            is_complete,
            has_failed,
            error_message: if has_failed {
                self.error
                    .lock()
                    .map(|error| error.clone())
                    .unwrap_or_default()
            } else {
                String::new()
            },
        }
    }
}

/// Rate limiter for progress updates.
pub struct ProgressThrottle {
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl ProgressThrottle {
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: None,
            min_interval,
        }
    }

    pub fn should_emit(&mut self) -> bool {
        let now = Instant::now();
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}
