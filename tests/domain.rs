use assert_matches::assert_matches;

use workshop_dl::domain::{ProjectId, Release, SearchQuery, SearchResult};
use workshop_dl::error::{ErrorCategory, WorkshopError};

fn release(name: &str, url: &str) -> Release {
    Release {
        name: name.to_string(),
        download_url: url.to_string(),
        ..Release::default()
    }
}

#[test]
fn parse_project_id() {
    let id: ProjectId = "4101".parse().unwrap();
    assert_eq!(id, ProjectId::new(4101));
    assert_eq!(id.to_string(), "4101");

    let err = "".parse::<ProjectId>().unwrap_err();
    assert_matches!(err, WorkshopError::InvalidProjectId(_));
}

#[test]
fn query_keeps_keywords_verbatim() {
    let query = SearchQuery::new("flick reset", 2);
    assert_eq!(query.keywords, "flick reset");
    assert_eq!(query.page, 2);
}

#[test]
fn release_selection_skips_undownloadable() {
    let result = SearchResult {
        releases: vec![
            release("notes", ""),
            release("1.0", "https://files.example.org/a.zip"),
            release("1.1", "https://files.example.org/b.zip"),
        ],
        ..SearchResult::default()
    };

    assert_eq!(result.release(None).map(|r| r.name.as_str()), Some("1.0"));
    assert_eq!(result.release(Some(2)).map(|r| r.name.as_str()), Some("1.1"));
    assert!(result.release(Some(0)).is_none());
    assert!(result.release(Some(9)).is_none());
}

#[test]
fn preview_bytes_are_not_serialized() {
    let result = SearchResult {
        name: "Flick Lab".to_string(),
        preview_image: Some(vec![1u8, 2, 3].into()),
        image_loaded: true,
        ..SearchResult::default()
    };
    let value = serde_json::to_value(&result).unwrap();
    assert!(value.get("preview_image").is_none());
    assert_eq!(value["image_loaded"], true);
}

#[test]
fn error_categories() {
    assert_eq!(
        WorkshopError::Http("reset".to_string()).category(),
        ErrorCategory::Transport
    );
    assert_eq!(
        WorkshopError::Status {
            status: 500,
            message: String::new()
        }
        .category(),
        ErrorCategory::Transport
    );
    assert_eq!(
        WorkshopError::Folder("x".to_string()).category(),
        ErrorCategory::Filesystem
    );
    assert_eq!(
        WorkshopError::Extraction("x".to_string()).category(),
        ErrorCategory::Extraction
    );
    assert_eq!(WorkshopError::Busy.category(), ErrorCategory::Busy);
    assert_eq!(
        WorkshopError::InvalidIndex(3).category(),
        ErrorCategory::Usage
    );
}
