#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde_json::json;
use zip::write::SimpleFileOptions;

use workshop_dl::catalog::Catalog;
use workshop_dl::client::{ContentClient, HttpResponse};
use workshop_dl::domain::ProjectId;
use workshop_dl::error::WorkshopError;
use workshop_dl::search::{SearchEvent, SearchOrchestrator, SearchSink};
use workshop_dl::store::Store;

pub const API: &str = "https://maps.test/api/v4";
pub const CHUNK: usize = 1024;

/// Canned catalog. Any request can be held behind a gate until the test
/// releases it, which is how stale interleavings are forced.
#[derive(Default)]
pub struct MockClient {
    responses: Mutex<HashMap<String, HttpResponse>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    gates: Mutex<HashMap<String, Receiver<()>>>,
    panics: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, response: HttpResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn serve_file(&self, url: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(url.to_string(), bytes);
    }

    /// The next request for `url` blocks until the returned sender fires
    /// (or is dropped).
    pub fn hold(&self, url: &str) -> Sender<()> {
        let (sender, receiver) = mpsc::channel();
        self.gates.lock().unwrap().insert(url.to_string(), receiver);
        sender
    }

    /// Requests for `url` panic inside the client, as a buggy transport would.
    pub fn panic_on(&self, url: &str) {
        self.panics.lock().unwrap().push(url.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|call| call.as_str() == url).count()
    }

    pub fn wait_for_call(&self, url: &str) {
        let found = wait_until(Duration::from_secs(5), || self.call_count(url) > 0);
        assert!(found, "request for {url} never arrived");
    }

    fn enter(&self, url: &str) {
        self.calls.lock().unwrap().push(url.to_string());
        let gate = self.gates.lock().unwrap().remove(url);
        if let Some(gate) = gate {
            let _ = gate.recv_timeout(Duration::from_secs(10));
        }
        let panics = self.panics.lock().unwrap().iter().any(|call| call == url);
        if panics {
            panic!("transport blew up on {url}");
        }
    }
}

impl ContentClient for MockClient {
    fn get(&self, url: &str) -> Result<HttpResponse, WorkshopError> {
        self.enter(url);
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| WorkshopError::Http(format!("no route for {url}")))
    }

    fn download_to_file(
        &self,
        url: &str,
        destination: &Path,
        on_progress: &mut dyn FnMut(u64, Option<u64>) -> bool,
    ) -> Result<u64, WorkshopError> {
        self.enter(url);
        let bytes = self
            .files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| WorkshopError::Status {
                status: 404,
                message: format!("no file at {url}"),
            })?;

        let total = bytes.len() as u64;
        let mut file =
            File::create(destination).map_err(|err| WorkshopError::Filesystem(err.to_string()))?;
        let mut received = 0u64;
        if !on_progress(received, Some(total)) {
            return Err(WorkshopError::Cancelled);
        }
        for chunk in bytes.chunks(CHUNK) {
            file.write_all(chunk)
                .map_err(|err| WorkshopError::Filesystem(err.to_string()))?;
            received += chunk.len() as u64;
            if !on_progress(received, Some(total)) {
                return Err(WorkshopError::Cancelled);
            }
        }
        Ok(received)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SearchEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SearchEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl SearchSink for RecordingSink {
    fn event(&self, event: SearchEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn catalog() -> Catalog {
    Catalog::new(API, 20)
}

pub fn temp_store(root: &Path) -> Store {
    let root = Utf8PathBuf::from_path_buf(root.to_path_buf()).unwrap();
    Store::new_with_paths(root.join("maps"), root.join("cache"))
}

pub fn orchestrator(
    client: &Arc<MockClient>,
    root: &Path,
    sink: Option<Arc<RecordingSink>>,
) -> SearchOrchestrator<Arc<MockClient>> {
    let sink = sink.map(|sink| sink as Arc<dyn SearchSink>);
    SearchOrchestrator::new(client.clone(), catalog(), temp_store(root), 4, sink).unwrap()
}

pub struct Project<'a> {
    pub id: u64,
    pub name: &'a str,
    pub avatar: Option<&'a str>,
}

impl<'a> Project<'a> {
    pub fn new(id: u64, name: &'a str) -> Self {
        Self {
            id,
            name,
            avatar: None,
        }
    }
}

/// Registers count, page and per-project release routes for `keywords`.
pub fn route_search(client: &MockClient, keywords: &str, projects: &[Project<'_>]) {
    let catalog = catalog();
    let total = projects.len().to_string();
    client.respond(
        &catalog.count_url(keywords),
        HttpResponse::new(200, "[]").with_header("X-Total", total.clone()),
    );

    let body = projects
        .iter()
        .map(|project| {
            json!({
                "id": project.id,
                "name": project.name,
                "path_with_namespace": format!("maps/{}", project.id),
                "description": format!("<p>{} map</p>", project.name),
                "avatar_url": project.avatar,
                "namespace": { "name": "Sam" },
            })
        })
        .collect::<Vec<_>>();
    client.respond(
        &catalog.page_url(keywords, 0),
        HttpResponse::new(200, serde_json::to_vec(&body).unwrap())
            .with_header("X-Total", total)
            .with_header("X-Total-Pages", "1"),
    );

    for project in projects {
        route_releases(client, project.id, &format!("{} release", project.name));
    }
}

pub fn route_releases(client: &MockClient, id: u64, release_name: &str) {
    let body = json!([{
        "name": release_name,
        "tag_name": "v1",
        "description": "",
        "assets": { "links": [
            { "name": "map.zip", "url": format!("https://maps.test/files/{id}.zip") }
        ]}
    }]);
    client.respond(
        &catalog().releases_url(ProjectId::new(id)),
        HttpResponse::new(200, serde_json::to_vec(&body).unwrap()),
    );
}

pub fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
