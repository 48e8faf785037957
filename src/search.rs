use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, PageInfo};
use crate::client::ContentClient;
use crate::config::ResolvedConfig;
use crate::domain::{SearchQuery, SearchResult};
use crate::error::WorkshopError;
use crate::generation::Generations;
use crate::results::ResultStore;
use crate::state::ErrorSlot;
use crate::store::Store;
use crate::worker::WorkerPool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    PageLoaded {
        generation: u64,
        count: usize,
        total_pages: u32,
    },
    ItemUpdated {
        generation: u64,
        index: usize,
    },
    Completed {
        generation: u64,
    },
    Failed {
        generation: u64,
        message: String,
    },
}

/// Receives search events on a background worker. Implementations must not
/// block or call back into the orchestrator.
pub trait SearchSink: Send + Sync {
    fn event(&self, event: SearchEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchStatus {
    pub searching: bool,
    pub result_count: u64,
    pub current_page: u32,
    pub total_pages: u32,
    pub error: Option<String>,
    pub generation: u64,
    pub version: u64,
}

#[derive(Debug, Default)]
struct Completion {
    generation: u64,
    expected: usize,
    completed: usize,
}

struct Shared<C> {
    client: C,
    catalog: Catalog,
    store: Store,
    generations: Arc<Generations>,
    results: Arc<ResultStore>,
    searching: AtomicBool,
    result_count: AtomicU64,
    current_page: AtomicU32,
    total_pages: AtomicU32,
    error: ErrorSlot,
    completion: Mutex<Completion>,
    sink: Option<Arc<dyn SearchSink>>,
    pool: WorkerPool,
}

pub struct SearchOrchestrator<C: ContentClient + 'static> {
    shared: Arc<Shared<C>>,
}

impl<C: ContentClient + 'static> SearchOrchestrator<C> {
    pub fn new(
        client: C,
        catalog: Catalog,
        store: Store,
        fanout: usize,
        sink: Option<Arc<dyn SearchSink>>,
    ) -> Result<Self, WorkshopError> {
        let generations = Arc::new(Generations::new());
        let results = Arc::new(ResultStore::new(generations.clone()));
        let pool = WorkerPool::new("workshop-search", fanout)?;
        Ok(Self {
            shared: Arc::new(Shared {
                client,
                catalog,
                store,
                generations,
                results,
                searching: AtomicBool::new(false),
                result_count: AtomicU64::new(0),
                current_page: AtomicU32::new(0),
                total_pages: AtomicU32::new(0),
                error: ErrorSlot::default(),
                completion: Mutex::new(Completion::default()),
                sink,
                pool,
            }),
        })
    }

    pub fn from_config(
        client: C,
        config: &ResolvedConfig,
        sink: Option<Arc<dyn SearchSink>>,
    ) -> Result<Self, WorkshopError> {
        Self::new(
            client,
            Catalog::new(&config.api_base_url, config.per_page),
            Store::new(config),
            config.fanout,
            sink,
        )
    }

    /// Starts a new search in the background and returns its generation.
    /// A search still in flight is abandoned without waiting for it.
    pub fn search(&self, keywords: &str, page: u32) -> u64 {
        let shared = &self.shared;
        let query = SearchQuery::new(keywords, page);

        let generation = {
            let mut completion = shared.lock_completion();
            if shared.searching.load(Ordering::SeqCst) {
                let stopped = shared.generations.request_stop();
                debug!(generation = stopped, "abandoning previous search");
            }
            let generation = shared.generations.begin_new_search();
            shared.results.clear();
            shared.error.clear();
            shared.result_count.store(0, Ordering::SeqCst);
            shared.total_pages.store(0, Ordering::SeqCst);
            shared.current_page.store(page, Ordering::SeqCst);
            *completion = Completion {
                generation,
                expected: 0,
                completed: 0,
            };
            shared.searching.store(true, Ordering::SeqCst);
            generation
        };

        info!(generation, keywords = %query.keywords, page, "search started");
        let job = shared.clone();
        shared.pool.execute(move || job.run_page(generation, query));
        generation
    }

    pub fn request_stop(&self) {
        let _completion = self.shared.lock_completion();
        let generation = self.shared.generations.request_stop();
        self.shared.searching.store(false, Ordering::SeqCst);
        debug!(generation, "search stop requested");
    }

    pub fn fetch_release_details(&self, index: usize, generation: u64) {
        self.shared.schedule_details(index, generation, false);
    }

    pub fn fetch_preview_image(&self, index: usize, generation: u64) {
        self.shared.schedule_preview(index, generation, false);
    }

    pub fn is_searching(&self) -> bool {
        self.shared.searching.load(Ordering::SeqCst)
    }

    pub fn result_count(&self) -> u64 {
        self.shared.result_count.load(Ordering::SeqCst)
    }

    pub fn current_page(&self) -> u32 {
        self.shared.current_page.load(Ordering::SeqCst)
    }

    pub fn total_pages(&self) -> u32 {
        self.shared.total_pages.load(Ordering::SeqCst)
    }

    pub fn search_error(&self) -> Option<String> {
        self.shared.error.message()
    }

    pub fn current_generation(&self) -> u64 {
        self.shared.generations.current_generation()
    }

    pub fn results(&self) -> Arc<ResultStore> {
        self.shared.results.clone()
    }

    pub fn snapshot(&self) -> Vec<SearchResult> {
        self.shared.results.snapshot()
    }

    pub fn version(&self) -> u64 {
        self.shared.results.version()
    }

    pub fn status(&self) -> SearchStatus {
        SearchStatus {
            searching: self.is_searching(),
            result_count: self.result_count(),
            current_page: self.current_page(),
            total_pages: self.total_pages(),
            error: self.search_error(),
            generation: self.current_generation(),
            version: self.version(),
        }
    }
}

impl<C: ContentClient + 'static> Shared<C> {
    fn lock_completion(&self) -> MutexGuard<'_, Completion> {
        self.completion
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Held across the sink call so a new search cannot start between the
    // liveness check and delivery.
    fn emit(&self, generation: u64, event: SearchEvent) {
        let Some(sink) = &self.sink else {
            return;
        };
        let _completion = self.lock_completion();
        if self.generations.is_live(generation) {
            sink.event(event);
        }
    }

    // A panic anywhere in the page fetch still settles the search.
    fn run_page(self: &Arc<Self>, generation: u64, query: SearchQuery) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.fetch_page(generation, query)));
        if outcome.is_err() {
            self.fail_search(generation, "search worker panicked".to_string());
        }
    }

    fn fetch_page(self: &Arc<Self>, generation: u64, query: SearchQuery) {
        let (info, page) = match self.load_page(generation, &query) {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                debug!(generation, "stale page fetch discarded");
                return;
            }
            Err(err) => {
                self.fail_search(generation, err.to_string());
                return;
            }
        };

        let count = page.len();
        if !self.results.replace_page(generation, page) {
            debug!(generation, "stale page discarded");
            return;
        }

        let done = {
            let mut completion = self.lock_completion();
            if completion.generation != generation || !self.generations.is_live(generation) {
                return;
            }
            self.result_count.store(info.total_results, Ordering::SeqCst);
            self.total_pages.store(info.total_pages, Ordering::SeqCst);
            completion.expected = count * 2;
            completion.completed = 0;
            if count == 0 {
                self.searching.store(false, Ordering::SeqCst);
            }
            count == 0
        };

        info!(
            generation,
            count,
            total = info.total_results,
            pages = info.total_pages,
            "search page loaded"
        );
        self.emit(
            generation,
            SearchEvent::PageLoaded {
                generation,
                count,
                total_pages: info.total_pages,
            },
        );
        if done {
            self.emit(generation, SearchEvent::Completed { generation });
            return;
        }

        for index in 0..count {
            self.schedule_details(index, generation, true);
            self.schedule_preview(index, generation, true);
        }
    }

    fn load_page(
        &self,
        generation: u64,
        query: &SearchQuery,
    ) -> Result<Option<(PageInfo, Vec<SearchResult>)>, WorkshopError> {
        if !self.generations.is_live(generation) {
            return Ok(None);
        }
        let count = self
            .client
            .get(&self.catalog.count_url(&query.keywords))?
            .into_success()?;

        if !self.generations.is_live(generation) {
            return Ok(None);
        }
        let page = self
            .client
            .get(&self.catalog.page_url(&query.keywords, query.page))?
            .into_success()?;

        if !self.generations.is_live(generation) {
            return Ok(None);
        }
        let info = self.catalog.page_info(&count, &page);
        let results = self.catalog.parse_projects(&page.json()?)?;
        Ok(Some((info, results)))
    }

    fn fail_search(&self, generation: u64, message: String) {
        {
            let _completion = self.lock_completion();
            if !self.generations.is_live(generation) {
                debug!(generation, error = %message, "stale search failure ignored");
                return;
            }
            self.error.set(message.clone());
            self.searching.store(false, Ordering::SeqCst);
        }
        warn!(generation, error = %message, "search failed");
        self.emit(generation, SearchEvent::Failed { generation, message });
    }

    fn finish_subtask(&self, generation: u64) {
        let done = {
            let mut completion = self.lock_completion();
            if completion.generation != generation {
                return;
            }
            completion.completed += 1;
            let done = completion.completed == completion.expected
                && self.generations.is_live(generation);
            if done {
                self.searching.store(false, Ordering::SeqCst);
            }
            done
        };
        if done {
            info!(generation, "search complete");
            self.emit(generation, SearchEvent::Completed { generation });
        }
    }

    fn schedule_details(self: &Arc<Self>, index: usize, generation: u64, tracked: bool) {
        let job = self.clone();
        self.pool.execute(move || {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| job.refresh_details(index, generation)));
            if outcome.is_err() {
                warn!(generation, index, "release fetch panicked");
            }
            if tracked {
                job.finish_subtask(generation);
            }
        });
    }

    fn refresh_details(&self, index: usize, generation: u64) {
        match self.load_releases(index, generation) {
            Ok(true) => self.emit(generation, SearchEvent::ItemUpdated { generation, index }),
            Ok(false) => debug!(generation, index, "stale release fetch discarded"),
            Err(err) => warn!(generation, index, error = %err, "release fetch failed"),
        }
    }

    /// Claims the slot's in-flight flag before queueing a preview fetch, so
    /// one image is never downloaded twice at the same time.
    fn schedule_preview(self: &Arc<Self>, index: usize, generation: u64, tracked: bool) {
        let mut claimed = false;
        self.results.update_item(index, generation, |item| {
            if item.preview_url.is_some()
                && !item.image_loaded
                && !item.preview_download_in_flight
            {
                item.preview_download_in_flight = true;
                claimed = true;
            }
        });
        if !claimed {
            if tracked {
                self.finish_subtask(generation);
            }
            return;
        }

        let job = self.clone();
        self.pool.execute(move || {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| job.refresh_preview(index, generation)));
            if outcome.is_err() {
                warn!(generation, index, "preview fetch panicked");
                job.release_preview_claim(index, generation);
            }
            if tracked {
                job.finish_subtask(generation);
            }
        });
    }

    fn refresh_preview(&self, index: usize, generation: u64) {
        match self.load_preview(index, generation) {
            Ok(true) => self.emit(generation, SearchEvent::ItemUpdated { generation, index }),
            Ok(false) => debug!(generation, index, "stale preview fetch discarded"),
            Err(err) => {
                warn!(generation, index, error = %err, "preview fetch failed");
                self.release_preview_claim(index, generation);
            }
        }
    }

    fn release_preview_claim(&self, index: usize, generation: u64) {
        self.results.update_item(index, generation, |item| {
            item.preview_download_in_flight = false;
        });
    }

    fn live_item(&self, index: usize, generation: u64) -> Option<SearchResult> {
        if !self.generations.is_live(generation) {
            return None;
        }
        self.results
            .get(index)
            .filter(|item| item.generation == generation)
    }

    fn load_releases(&self, index: usize, generation: u64) -> Result<bool, WorkshopError> {
        let Some(item) = self.live_item(index, generation) else {
            return Ok(false);
        };
        let response = self
            .client
            .get(&self.catalog.releases_url(item.id))?
            .into_success()?;
        if !self.generations.is_live(generation) {
            return Ok(false);
        }
        let releases = self
            .catalog
            .parse_releases(&item.project_path, &response.json()?)?;
        Ok(self.results.update_item(index, generation, move |slot| {
            slot.releases = releases;
            slot.releases_loaded = true;
        }))
    }

    fn load_preview(&self, index: usize, generation: u64) -> Result<bool, WorkshopError> {
        let Some(item) = self.live_item(index, generation) else {
            return Ok(false);
        };
        if item.image_loaded {
            return Ok(false);
        }
        let Some(url) = item.preview_url.clone() else {
            return Ok(false);
        };

        let path = self.store.preview_path(item.id);
        if !path.as_std_path().is_file() {
            Store::ensure_dir(&self.store.previews_dir())
                .map_err(|err| WorkshopError::Filesystem(err.to_string()))?;
            let partial = path.with_extension("jpg.part");
            let generations = self.generations.clone();
            self.client.download_to_file(
                &url,
                partial.as_std_path(),
                &mut |_: u64, _: Option<u64>| generations.is_live(generation),
            )?;
            fs::rename(partial.as_std_path(), path.as_std_path())
                .map_err(|err| WorkshopError::Filesystem(err.to_string()))?;
        } else {
            debug!(id = %item.id, "preview served from cache");
        }

        if !self.generations.is_live(generation) {
            return Ok(false);
        }
        let bytes: Arc<[u8]> = fs::read(path.as_std_path())
            .map_err(|err| WorkshopError::Filesystem(err.to_string()))?
            .into();
        Ok(self.results.update_item(index, generation, move |slot| {
            slot.preview_path = Some(path);
            slot.preview_image = Some(bytes);
            slot.image_loaded = true;
            slot.preview_download_in_flight = false;
        }))
    }
}
