use httpmock::prelude::*;
use overdrive_tools::api::{MetadataClient, Region};
use overdrive_tools::chapters::{ChapterExtractor, Prompter};
use overdrive_tools::{Config, OverdriveError, Result};
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;
use tempfile::TempDir;

/// Answers from a script, records what was shown
struct ScriptedPrompter {
    answers: VecDeque<String>,
    shown: Vec<String>,
}

impl ScriptedPrompter {
    fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            shown: Vec::new(),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String> {
        let answer = self
            .answers
            .pop_front()
            .ok_or_else(|| OverdriveError::invalid_input(format!("unexpected question: {}", question)))?;
        match default {
            Some(d) if answer.is_empty() => Ok(d.to_string()),
            _ => Ok(answer),
        }
    }

    fn show(&mut self, text: &str) {
        self.shown.push(text.to_string());
    }
}

fn client_for(server: &MockServer) -> MetadataClient {
    let config = Config::builder()
        .catalog_base_url(server.url("/1.0/catalog/products"))
        .audnex_base_url(server.base_url())
        .max_attempts(1)
        .initial_retry_delay(Duration::from_millis(10))
        .build();
    MetadataClient::new(config).unwrap()
}

async fn mock_catalog<'a>(server: &'a MockServer, keywords: &str) -> httpmock::Mock<'a> {
    let keywords = keywords.to_string();
    server
        .mock_async(move |when, then| {
            when.method(GET)
                .path("/1.0/catalog/products")
                .query_param("keywords", keywords.as_str());
            then.status(200).json_body(json!({
                "products": [
                    {"asin": "B002V1OF70", "title": "Dune", "authors": [{"name": "Frank Herbert"}]},
                    {"asin": "B00UNKNOWN", "title": "Dune Messiah", "authors": [{"name": "Frank Herbert"}]}
                ]
            }));
        })
        .await
}

async fn mock_chapters(server: &MockServer, is_accurate: bool) -> httpmock::Mock<'_> {
    server
        .mock_async(move |when, then| {
            when.method(GET)
                .path("/books/B002V1OF70/chapters")
                .query_param("region", "us")
                .query_param("update", "1");
            then.status(200).json_body(json!({
                "chapters": [
                    {"title": "Opening Credits", "startOffsetSec": 0, "startOffsetMs": 0, "lengthMs": 41340},
                    {"title": "Book One: Dune", "startOffsetSec": 41.34, "startOffsetMs": 41340, "lengthMs": 3600000},
                    {"title": "End Credits", "startOffsetSec": "3641.34", "startOffsetMs": 3641340, "lengthMs": 50000}
                ],
                "isAccurate": is_accurate
            }));
        })
        .await
}

#[tokio::test]
async fn test_extract_uses_directory_name() {
    let server = MockServer::start_async().await;
    let catalog_mock = mock_catalog(&server, "Dune Frank Herbert").await;
    let chapters_mock = mock_chapters(&server, false).await;

    let temp_dir = TempDir::new().unwrap();
    let book_dir = temp_dir.path().join("Frank Herbert - Dune");
    tokio::fs::create_dir(&book_dir).await.unwrap();

    let extractor = ChapterExtractor::new(&book_dir, client_for(&server));
    // invalid choice first, then the default (1)
    let mut prompter = ScriptedPrompter::new(&["3", ""]);
    let report = extractor.extract(Region::Us, &mut prompter).await.unwrap();

    assert_eq!(report.path, book_dir.join("chapters.txt"));
    assert_eq!(report.chapter_count, 3);
    assert!(!report.is_accurate);

    let contents = tokio::fs::read_to_string(&report.path).await.unwrap();
    assert_eq!(
        contents,
        "00:00:00.000 Opening Credits\n00:00:41.340 Book One: Dune\n01:00:41.340 End Credits\n"
    );
    assert!(prompter
        .shown
        .contains(&"Note: Chapter timestamps may be approximate".to_string()));
    assert!(prompter.shown.contains(&"2. Dune Messiah".to_string()));

    catalog_mock.assert_async().await;
    chapters_mock.assert_async().await;
}

#[tokio::test]
async fn test_extract_prompts_when_nothing_is_known() {
    let server = MockServer::start_async().await;
    let catalog_mock = mock_catalog(&server, "Dune Frank Herbert").await;
    let chapters_mock = mock_chapters(&server, true).await;

    let temp_dir = TempDir::new().unwrap();
    let extractor = ChapterExtractor::new(temp_dir.path(), client_for(&server));
    let mut prompter = ScriptedPrompter::new(&["Frank Herbert", "Dune", "1"]);
    let report = extractor.extract(Region::Us, &mut prompter).await.unwrap();

    assert!(report.is_accurate);
    assert!(prompter
        .shown
        .contains(&"Could not determine book information automatically.".to_string()));
    catalog_mock.assert_async().await;
    chapters_mock.assert_async().await;
}

#[tokio::test]
async fn test_extract_cancelled_writes_nothing() {
    let server = MockServer::start_async().await;
    mock_catalog(&server, "Dune Frank Herbert").await;
    let chapters_mock = mock_chapters(&server, true).await;

    let temp_dir = TempDir::new().unwrap();
    let book_dir = temp_dir.path().join("Frank Herbert - Dune");
    tokio::fs::create_dir(&book_dir).await.unwrap();

    let extractor = ChapterExtractor::new(&book_dir, client_for(&server));
    let mut prompter = ScriptedPrompter::new(&["0"]);
    let result = extractor.extract(Region::Us, &mut prompter).await;

    assert!(matches!(result, Err(OverdriveError::Cancelled)));
    assert!(!book_dir.join("chapters.txt").exists());
    chapters_mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_extract_without_chapters_is_no_results() {
    let server = MockServer::start_async().await;
    mock_catalog(&server, "Dune Frank Herbert").await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/books/B002V1OF70/chapters");
            then.status(200).json_body(json!({"chapters": []}));
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let book_dir = temp_dir.path().join("Frank Herbert - Dune");
    tokio::fs::create_dir(&book_dir).await.unwrap();

    let extractor = ChapterExtractor::new(&book_dir, client_for(&server));
    let mut prompter = ScriptedPrompter::new(&["1"]);
    let result = extractor.extract(Region::Us, &mut prompter).await;

    assert!(matches!(result, Err(OverdriveError::NoResults(_))));
    assert!(!book_dir.join("chapters.txt").exists());
}

#[tokio::test]
async fn test_search_and_get_chapters_writes_output_file() {
    let server = MockServer::start_async().await;
    let catalog_mock = mock_catalog(&server, "Dune Frank Herbert").await;
    let book_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/books/B002V1OF70");
            then.status(200).json_body(json!({
                "asin": "B002V1OF70",
                "title": "Dune",
                "authors": [{"name": "Frank Herbert"}]
            }));
        })
        .await;
    let chapters_mock = mock_chapters(&server, true).await;

    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("dune-chapters.txt");
    let client = client_for(&server);
    let mut prompter = ScriptedPrompter::new(&["1"]);

    let report = ChapterExtractor::search_and_get_chapters(
        &client,
        "Frank Herbert",
        "Dune",
        Region::Us,
        &output,
        &mut prompter,
    )
    .await
    .unwrap();

    assert_eq!(report.path, output);
    assert_eq!(report.chapter_count, 3);
    assert!(prompter.shown.contains(&"Selected: Dune by Frank Herbert".to_string()));
    let contents = tokio::fs::read_to_string(&output).await.unwrap();
    assert!(contents.starts_with("00:00:00.000 Opening Credits\n"));

    catalog_mock.assert_async().await;
    book_mock.assert_async().await;
    chapters_mock.assert_async().await;
}

#[tokio::test]
async fn test_search_and_get_chapters_with_no_results() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/1.0/catalog/products");
            then.status(200).json_body(json!({"products": []}));
        })
        .await;

    let temp_dir = TempDir::new().unwrap();
    let client = client_for(&server);
    let mut prompter = ScriptedPrompter::new(&[]);
    let result = ChapterExtractor::search_and_get_chapters(
        &client,
        "Nobody",
        "Nothing",
        Region::Us,
        &temp_dir.path().join("chapters.txt"),
        &mut prompter,
    )
    .await;

    assert!(matches!(result, Err(OverdriveError::NoResults(_))));
}

#[tokio::test]
async fn test_search_and_get_chapters_requires_author_and_title() {
    let server = MockServer::start_async().await;
    let client = client_for(&server);
    let mut prompter = ScriptedPrompter::new(&[]);
    let result = ChapterExtractor::search_and_get_chapters(
        &client,
        " ",
        "Dune",
        Region::Us,
        std::path::Path::new("unused.txt"),
        &mut prompter,
    )
    .await;

    assert!(matches!(result, Err(OverdriveError::InvalidInput(_))));
}
