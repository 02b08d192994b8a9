//! Integration tests for the download engine module.
//!
//! These tests run the blocking engine against a mock HTTP server. The engine
//! is built and driven inside `spawn_blocking` because the blocking HTTP
//! client must not live on an async worker thread.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use annales_core::download::{
    BatchResult, ClientOptions, DownloadEngine, DownloadJob, EngineSettings, FailureRecord,
    DownloadRecord, HttpClient, RateGate, RetryPolicy, Sleeper,
};
use annales_core::metadata::{Discipline, DocumentMetadata};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, Respond, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return Ok(());
        };
        mock_server
    }};
}

type TestResult = Result<(), Box<dyn std::error::Error>>;

// ==================== Helper Functions ====================

#[derive(Debug)]
struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _duration: Duration) {}
}

/// Fails the first `fail_count` requests with 500, then serves `body`.
struct FlakyResponder {
    request_count: Arc<AtomicUsize>,
    fail_count: usize,
    body: Vec<u8>,
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let n = self.request_count.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_count {
            ResponseTemplate::new(500).set_body_bytes(b"internal server error".to_vec())
        } else {
            ResponseTemplate::new(200).set_body_raw(self.body.clone(), "application/pdf")
        }
    }
}

fn pdf_body() -> Vec<u8> {
    let mut body = b"%PDF-1.7\n".to_vec();
    body.resize(4096, b'x');
    body
}

fn zip_body() -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer.start_file("sujet.pdf", options).unwrap();
        writer.write_all(&pdf_body()).unwrap();
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

fn job(url: String, filename: &str) -> DownloadJob {
    DownloadJob::new(
        url,
        DocumentMetadata {
            filename: Some(filename.to_string()),
            year: Some(2024),
            discipline: Some(Discipline::Mathematiques),
            ..DocumentMetadata::default()
        },
    )
}

fn subject_dir(root: &Path) -> PathBuf {
    root.join("2024").join("MATHEMATIQUES")
}

struct Run {
    result: BatchResult,
    records: Vec<DownloadRecord>,
    failures: Vec<FailureRecord>,
    elapsed: Duration,
}

/// Builds an engine on a blocking thread and runs `jobs` through it.
async fn run_batch(
    jobs: Vec<DownloadJob>,
    output_dir: PathBuf,
    delay: Duration,
    workers: usize,
) -> Result<Run, Box<dyn std::error::Error>> {
    let run = tokio::task::spawn_blocking(move || -> Result<Run, String> {
        let client = HttpClient::new(ClientOptions::default()).map_err(|e| e.to_string())?;
        let engine = DownloadEngine::new(
            Arc::new(client),
            Arc::new(RateGate::new(delay)),
            RetryPolicy::new(3, 2.0).with_sleeper(Arc::new(NoSleep)),
            EngineSettings::new(output_dir),
        );
        let started = Instant::now();
        let result = engine.batch(&jobs, workers).map_err(|e| e.to_string())?;
        Ok(Run {
            result,
            records: engine.history().records(),
            failures: engine.history().failures(),
            elapsed: started.elapsed(),
        })
    })
    .await??;
    Ok(run)
}

// ==================== Basic Download Tests ====================

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_downloads_pdf_into_layout() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/document/1/download"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_body(), "application/pdf"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let output = TempDir::new()?;
    let url = format!("{}/document/1/download", mock_server.uri());
    let run = run_batch(
        vec![job(url.clone(), "sujet.pdf")],
        output.path().to_path_buf(),
        Duration::ZERO,
        2,
    )
    .await?;

    let expected = subject_dir(output.path()).join("sujet.pdf");
    assert_eq!(run.result.successful, vec![expected.clone()]);
    assert!(run.result.failed.is_empty());
    assert_eq!(std::fs::read(&expected)?, pdf_body());
    assert_eq!(run.records.len(), 1);
    assert_eq!(run.records[0].url, url);
    assert_eq!(run.records[0].size, 4096);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_skips_valid_existing_file() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_body(), "application/pdf"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let output = TempDir::new()?;
    let dir = subject_dir(output.path());
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("sujet.pdf"), pdf_body())?;

    let url = format!("{}/document/1/download", mock_server.uri());
    let run = run_batch(
        vec![job(url, "sujet.pdf")],
        output.path().to_path_buf(),
        Duration::ZERO,
        1,
    )
    .await?;

    assert_eq!(run.result.successful, vec![dir.join("sujet.pdf")]);
    assert!(run.records.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_replaces_invalid_existing_file() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_body(), "application/pdf"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let output = TempDir::new()?;
    let dir = subject_dir(output.path());
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("sujet.pdf"), b"%PDF tiny")?;

    let url = format!("{}/document/1/download", mock_server.uri());
    let run = run_batch(
        vec![job(url.clone(), "sujet.pdf")],
        output.path().to_path_buf(),
        Duration::ZERO,
        1,
    )
    .await?;

    assert_eq!(run.result.successful, vec![dir.join("sujet.pdf")]);
    assert_eq!(run.records.len(), 1);
    assert_eq!(run.records[0].url, url);
    assert_eq!(std::fs::metadata(dir.join("sujet.pdf"))?.len(), 4096);
    Ok(())
}

// ==================== Type Detection Tests ====================

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_renames_sniffed_zip_and_expands_it() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/document/2/download"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(zip_body(), "application/octet-stream"),
        )
        .mount(&mock_server)
        .await;

    let output = TempDir::new()?;
    let url = format!("{}/document/2/download", mock_server.uri());
    let run = run_batch(
        vec![job(url, "annexes.pdf")],
        output.path().to_path_buf(),
        Duration::ZERO,
        1,
    )
    .await?;

    let dir = subject_dir(output.path());
    assert_eq!(run.result.successful, vec![dir.join("annexes.zip")]);
    assert!(!dir.join("annexes.pdf").exists());
    assert!(dir.join("annexes").join("sujet.pdf").is_file());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_reuses_file_at_corrected_path() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(zip_body(), "application/octet-stream"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let output = TempDir::new()?;
    let dir = subject_dir(output.path());
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("annexes.zip"), zip_body())?;

    let url = format!("{}/document/2/download", mock_server.uri());
    let run = run_batch(
        vec![job(url, "annexes.pdf")],
        output.path().to_path_buf(),
        Duration::ZERO,
        1,
    )
    .await?;

    assert_eq!(run.result.successful, vec![dir.join("annexes.zip")]);
    assert!(!dir.join("annexes.pdf").exists());
    assert_eq!(run.records.len(), 1);
    assert!(
        dir.join("annexes").join("sujet.pdf").is_file(),
        "archive at corrected path should be expanded"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_removes_file_failing_validation() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"<html>oops</html>".to_vec(), "application/pdf"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let output = TempDir::new()?;
    let url = format!("{}/document/3/download", mock_server.uri());
    let run = run_batch(
        vec![job(url.clone(), "sujet.pdf")],
        output.path().to_path_buf(),
        Duration::ZERO,
        1,
    )
    .await?;

    assert_eq!(run.result.failed, vec![url]);
    assert!(!subject_dir(output.path()).join("sujet.pdf").exists());
    assert_eq!(run.failures.len(), 1);
    assert!(run.failures[0].error.contains("validation"));
    Ok(())
}

// ==================== Retry Tests ====================

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_retries_server_errors() -> TestResult {
    let mock_server = require_mock_server!();
    let request_count = Arc::new(AtomicUsize::new(0));
    Mock::given(method("GET"))
        .and(path("/document/4/download"))
        .respond_with(FlakyResponder {
            request_count: Arc::clone(&request_count),
            fail_count: 2,
            body: pdf_body(),
        })
        .mount(&mock_server)
        .await;

    let output = TempDir::new()?;
    let url = format!("{}/document/4/download", mock_server.uri());
    let run = run_batch(
        vec![job(url, "sujet.pdf")],
        output.path().to_path_buf(),
        Duration::ZERO,
        1,
    )
    .await?;

    assert_eq!(request_count.load(Ordering::SeqCst), 3);
    assert_eq!(run.result.successful.len(), 1);
    assert!(run.failures.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_does_not_retry_not_found() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let output = TempDir::new()?;
    let url = format!("{}/document/5/download", mock_server.uri());
    let run = run_batch(
        vec![job(url.clone(), "sujet.pdf")],
        output.path().to_path_buf(),
        Duration::ZERO,
        1,
    )
    .await?;

    assert_eq!(run.result.failed, vec![url]);
    assert!(run.failures[0].error.contains("HTTP 404"));
    Ok(())
}

// ==================== Batch Policy Tests ====================

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_rejects_duplicate_urls() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_body(), "application/pdf"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let output = TempDir::new()?;
    let url = format!("{}/document/6/download", mock_server.uri());
    let run = run_batch(
        vec![job(url.clone(), "a.pdf"), job(url.clone(), "b.pdf")],
        output.path().to_path_buf(),
        Duration::ZERO,
        2,
    )
    .await?;

    assert_eq!(run.result.successful.len(), 1);
    assert_eq!(run.result.failed, vec![url]);
    assert!(subject_dir(output.path()).join("a.pdf").exists());
    assert!(!subject_dir(output.path()).join("b.pdf").exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_rate_gate_spaces_requests_across_workers() -> TestResult {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(pdf_body(), "application/pdf"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let output = TempDir::new()?;
    let jobs = (1..=3)
        .map(|i| {
            job(
                format!("{}/document/{i}/download", mock_server.uri()),
                &format!("sujet_{i}.pdf"),
            )
        })
        .collect();
    let run = run_batch(
        jobs,
        output.path().to_path_buf(),
        Duration::from_millis(200),
        3,
    )
    .await?;

    assert_eq!(run.result.successful.len(), 3);
    assert!(
        run.elapsed >= Duration::from_millis(400),
        "three starts need two full gaps, took {:?}",
        run.elapsed
    );
    Ok(())
}
