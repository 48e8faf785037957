use serde_json::Value;

use workshop_dl::catalog::{Catalog, clean_html};
use workshop_dl::client::HttpResponse;
use workshop_dl::domain::ProjectId;

fn fixture(name: &str) -> Value {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn catalog() -> Catalog {
    Catalog::new("https://maps.example.org/api/v4", 20)
}

#[test]
fn request_urls() {
    let catalog = catalog();
    assert_eq!(
        catalog.count_url("flick reset"),
        "https://maps.example.org/api/v4/projects?search=flick%20reset&per_page=1"
    );
    assert_eq!(
        catalog.page_url("flick&reset", 2),
        "https://maps.example.org/api/v4/projects?search=flick%26reset&page=3&per_page=20"
    );
    assert_eq!(
        catalog.releases_url(ProjectId::new(4101)),
        "https://maps.example.org/api/v4/projects/4101/releases"
    );
}

#[test]
fn parse_projects_page() {
    let results = catalog()
        .parse_projects(&fixture("projects_page.json"))
        .unwrap();
    assert_eq!(results.len(), 2);

    let flick = &results[0];
    assert_eq!(flick.id, ProjectId::new(4101));
    assert_eq!(flick.name, "Flick Lab");
    assert_eq!(flick.project_path, "sam/flick-lab");
    assert_eq!(flick.author, "Sam");
    assert_eq!(flick.size_bytes, 5_242_880);
    assert_eq!(flick.description, "Aerial flick practice & resets");
    assert_eq!(
        flick.preview_url.as_deref(),
        Some("https://maps.example.org/sam/flick-lab/uploads/-/system/project/avatar/4101/flick.png")
    );
    assert!(flick.releases.is_empty());
    assert!(!flick.releases_loaded);
    assert!(!flick.image_loaded);

    let reset = &results[1];
    assert_eq!(reset.name, "reset-park");
    assert_eq!(reset.author, "Lee");
    assert_eq!(reset.size_bytes, 0);
    assert_eq!(reset.description, "");
    assert_eq!(reset.preview_url, None);
}

#[test]
fn parse_projects_rejects_non_array() {
    let raw: Value = serde_json::from_str(r#"{"message": "404 Not Found"}"#).unwrap();
    assert!(catalog().parse_projects(&raw).is_err());
}

#[test]
fn parse_releases_picks_archive_and_picture() {
    let releases = catalog()
        .parse_releases("sam/flick-lab", &fixture("releases.json"))
        .unwrap();
    assert_eq!(releases.len(), 3);

    let latest = &releases[0];
    assert_eq!(latest.name, "Flick Lab 1.2");
    assert_eq!(latest.tag, "v1.2");
    assert_eq!(latest.archive_name, "FlickLab.ZIP");
    assert_eq!(
        latest.download_url,
        "https://maps.example.org/sam/flick-lab/uploads/def456/FlickLab.ZIP"
    );
    assert_eq!(
        latest.picture_url.as_deref(),
        Some("https://cdn.example.org/flick/preview.PNG")
    );
    assert!(latest.is_downloadable());

    let first = &releases[1];
    assert_eq!(first.archive_name, "flicklab-1.0");
    assert_eq!(first.download_url, "https://files.example.org/flicklab-1.0");
    assert_eq!(
        first.picture_url.as_deref(),
        Some("https://maps.example.org/sam/flick-lab/uploads/aaa111/first.jpg")
    );
    assert!(!first.description.contains("<p>"));

    let notes = &releases[2];
    assert!(!notes.is_downloadable());
    assert_eq!(notes.picture_url, None);
}

#[test]
fn page_info_prefers_headers() {
    let catalog = catalog();
    let count = HttpResponse::new(200, "[]").with_header("X-Total", "45");
    let page = HttpResponse::new(200, "[]").with_header("X-Total-Pages", "3");
    let info = catalog.page_info(&count, &page);
    assert_eq!(info.total_results, 45);
    assert_eq!(info.total_pages, 3);
}

#[test]
fn page_info_falls_back_to_body() {
    let catalog = catalog();
    let count = HttpResponse::new(200, "[]");
    let page = HttpResponse::new(200, r#"[{"id": 1}, {"id": 2}]"#);
    let info = catalog.page_info(&count, &page);
    assert_eq!(info.total_results, 2);
    assert_eq!(info.total_pages, 1);
}

#[test]
fn clean_html_is_public() {
    assert_eq!(clean_html("  plain  "), "plain");
}
