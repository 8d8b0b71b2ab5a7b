//! Batch deduplication tests.
//!
//! Documents are plain text read through `PlainTextExtractor` (or a test
//! extractor), so no pdfium library is needed.

use chrono::{DateTime, TimeZone, Utc};
use loandoc_ident::pipeline::extract::{Extraction, PlainTextExtractor, TextExtractor};
use loandoc_ident::{
    scan_directory, scan_documents, BatchEntry, DocIdentError, DocumentError, EngineConfig, Role,
    ScanProgressCallback,
};
use std::fs::File;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn at(minutes: i64) -> Option<DateTime<Utc>> {
    Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + chrono::Duration::minutes(minutes))
}

fn text_config() -> loandoc_ident::EngineConfigBuilder {
    EngineConfig::builder()
        .extractor(Arc::new(PlainTextExtractor))
        .visual_fingerprints(false)
        .reference_year(2024)
}

const STATEMENT: &str = "First National Bank monthly statement for account ending 4421. \
Statement period 02/01/2024 through 02/29/2024. Closing balance $12,480.22.";

const PAYSTUB: &str = "Acme Corp earnings statement. Pay date 03/15/2024. \
Gross pay $4,200.00, net pay $3,115.40, year to date gross $21,000.00.";

/// Sleeps longer than any test timeout before extracting.
struct SlowExtractor;

impl TextExtractor for SlowExtractor {
    fn extract(&self, bytes: &[u8], password: Option<&str>) -> Extraction {
        std::thread::sleep(Duration::from_secs(2));
        PlainTextExtractor.extract(bytes, password)
    }
}

/// Panics on documents starting with "boom".
struct FragileExtractor;

impl TextExtractor for FragileExtractor {
    fn extract(&self, bytes: &[u8], password: Option<&str>) -> Extraction {
        if bytes.starts_with(b"boom") {
            panic!("corrupt cross-reference table");
        }
        PlainTextExtractor.extract(bytes, password)
    }
}

#[derive(Default)]
struct Counter {
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    total: AtomicUsize,
}

impl ScanProgressCallback for Counter {
    fn on_scan_start(&self, total_documents: usize) {
        self.total.store(total_documents, Ordering::SeqCst);
    }
    fn on_document_start(&self, _identifier: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_document_complete(&self, _identifier: &str, _page_count: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_document_error(&self, _identifier: &str, _error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn hello_world_batch() {
    let config = text_config().min_extractable_chars(0).build().unwrap();
    let entries = vec![
        BatchEntry::from_bytes("a.txt", b"Hello World".to_vec(), at(10)),
        BatchEntry::from_bytes("b.txt", b"Hello World".to_vec(), at(5)),
        BatchEntry::from_bytes("c.txt", b"Goodbye World".to_vec(), at(0)),
    ];

    let report = scan_documents(entries, &config).await.unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.hash_groups.len(), 2);
    let sizes: Vec<usize> = report.hash_groups.values().map(|g| g.len()).collect();
    assert!(sizes.contains(&1) && sizes.contains(&2));
    assert_eq!(report.unique_total(), 2);
    assert_eq!(report.duplicate, 1);

    // b.txt was modified earlier, so it is the master.
    assert_eq!(report.document("b.txt").unwrap().role, Role::Master);
    assert_eq!(report.document("b.txt").unwrap().supersedes, vec!["a.txt"]);
    assert_eq!(report.document("a.txt").unwrap().master.as_deref(), Some("b.txt"));
    assert_eq!(report.document("c.txt").unwrap().role, Role::Unique);
}

#[tokio::test]
async fn classification_ignores_input_order() {
    let config = text_config().concurrency(3).build().unwrap();
    let entries = vec![
        BatchEntry::from_bytes("stmt-feb.pdf", STATEMENT.as_bytes().to_vec(), at(30)),
        BatchEntry::from_bytes("stmt-feb-reupload.pdf", STATEMENT.as_bytes().to_vec(), at(1)),
        BatchEntry::from_bytes("stmt-feb-copy.pdf", STATEMENT.as_bytes().to_vec(), at(20)),
        BatchEntry::from_bytes("paystub.pdf", PAYSTUB.as_bytes().to_vec(), at(0)),
    ];
    let mut reversed = entries.clone();
    reversed.reverse();

    let forward = scan_documents(entries, &config).await.unwrap();
    let backward = scan_documents(reversed, &config).await.unwrap();

    assert_eq!(forward.hash_groups, backward.hash_groups);
    let roles = |r: &loandoc_ident::BatchReport| {
        r.documents
            .iter()
            .map(|d| (d.identifier.clone(), d.role))
            .collect::<Vec<_>>()
    };
    assert_eq!(roles(&forward), roles(&backward));
    assert_eq!(
        forward.document("stmt-feb-reupload.pdf").unwrap().role,
        Role::Master
    );
    assert_eq!(forward.master, 1);
    assert_eq!(forward.duplicate, 2);
}

#[tokio::test]
async fn short_identical_texts_are_never_linked() {
    let config = text_config().build().unwrap();
    let entries = vec![
        BatchEntry::from_bytes("sig-1.pdf", b"Borrower signature".to_vec(), at(0)),
        BatchEntry::from_bytes("sig-2.pdf", b"Borrower signature".to_vec(), at(1)),
        BatchEntry::from_bytes("blank.pdf", Vec::new(), at(2)),
    ];

    let report = scan_documents(entries, &config).await.unwrap();

    assert_eq!(report.unique, 3);
    assert!(report.hash_groups.is_empty());
    for doc in &report.documents {
        assert!(!doc.extractable);
        assert!(doc.content_fingerprint.is_none());
        assert!(doc.supersedes.is_empty());
        assert!(doc.master.is_none());
    }
}

#[tokio::test]
async fn inferred_dates_are_recorded() {
    let config = text_config().build().unwrap();
    let entries = vec![BatchEntry::from_bytes(
        "stmt.pdf",
        STATEMENT.as_bytes().to_vec(),
        at(0),
    )];

    let report = scan_documents(entries, &config).await.unwrap();
    assert_eq!(
        report.documents[0].inferred_date,
        chrono::NaiveDate::from_ymd_opt(2024, 2, 29)
    );
}

#[tokio::test]
async fn unreadable_file_becomes_error_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = text_config().build().unwrap();
    let entries = vec![
        BatchEntry::from_path("gone.pdf", dir.path().join("gone.pdf")),
        BatchEntry::from_bytes("paystub.pdf", PAYSTUB.as_bytes().to_vec(), at(0)),
    ];

    let report = scan_documents(entries, &config).await.unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.error, 1);
    assert_eq!(report.unique, 1);
    let gone = report.document("gone.pdf").unwrap();
    assert_eq!(gone.role, Role::Error);
    assert_eq!(gone.page_count, 0);
    assert!(matches!(gone.error, Some(DocumentError::Io { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_document_times_out() {
    let config = EngineConfig::builder()
        .extractor(Arc::new(SlowExtractor))
        .visual_fingerprints(false)
        .document_timeout_secs(1)
        .build()
        .unwrap();
    let entries = vec![BatchEntry::from_bytes("huge.pdf", PAYSTUB.as_bytes().to_vec(), at(0))];

    let report = scan_documents(entries, &config).await.unwrap();

    assert_eq!(report.error, 1);
    assert!(matches!(
        report.documents[0].error,
        Some(DocumentError::Timeout { secs: 1, .. })
    ));
}

#[tokio::test]
async fn panicking_extractor_is_isolated() {
    let config = EngineConfig::builder()
        .extractor(Arc::new(FragileExtractor))
        .visual_fingerprints(false)
        .build()
        .unwrap();
    let entries = vec![
        BatchEntry::from_bytes("bad.pdf", b"boom".to_vec(), at(0)),
        BatchEntry::from_bytes("good.pdf", PAYSTUB.as_bytes().to_vec(), at(0)),
    ];

    let report = scan_documents(entries, &config).await.unwrap();

    assert!(matches!(
        report.document("bad.pdf").unwrap().error,
        Some(DocumentError::Panicked { .. })
    ));
    assert_eq!(report.document("good.pdf").unwrap().role, Role::Unique);
}

#[tokio::test]
async fn counts_sum_to_total() {
    let config = text_config().build().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let entries = vec![
        BatchEntry::from_bytes("a", STATEMENT.as_bytes().to_vec(), at(0)),
        BatchEntry::from_bytes("b", STATEMENT.as_bytes().to_vec(), at(1)),
        BatchEntry::from_bytes("c", PAYSTUB.as_bytes().to_vec(), at(2)),
        BatchEntry::from_bytes("d", b"short".to_vec(), at(3)),
        BatchEntry::from_path("e", dir.path().join("missing")),
    ];

    let report = scan_documents(entries, &config).await.unwrap();

    assert_eq!(report.total, 5);
    assert_eq!(
        report.unique + report.master + report.duplicate + report.error,
        report.total
    );
}

#[tokio::test]
async fn progress_callback_sees_every_document() {
    let counter = Arc::new(Counter::default());
    let config = text_config()
        .progress_callback(counter.clone())
        .build()
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let entries = vec![
        BatchEntry::from_bytes("a", STATEMENT.as_bytes().to_vec(), at(0)),
        BatchEntry::from_bytes("b", PAYSTUB.as_bytes().to_vec(), at(0)),
        BatchEntry::from_path("c", dir.path().join("missing")),
    ];

    scan_documents(entries, &config).await.unwrap();

    assert_eq!(counter.total.load(Ordering::SeqCst), 3);
    assert_eq!(counter.started.load(Ordering::SeqCst), 3);
    assert_eq!(counter.completed.load(Ordering::SeqCst), 2);
    assert_eq!(counter.failed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeated_identifier_is_rejected() {
    let config = text_config().build().unwrap();
    let entries = vec![
        BatchEntry::from_bytes("stmt.pdf", STATEMENT.as_bytes().to_vec(), at(0)),
        BatchEntry::from_bytes("paystub.pdf", PAYSTUB.as_bytes().to_vec(), at(1)),
        BatchEntry::from_bytes("stmt.pdf", PAYSTUB.as_bytes().to_vec(), at(2)),
    ];

    let err = scan_documents(entries, &config).await.unwrap_err();
    assert!(
        matches!(err, DocIdentError::DuplicateIdentifier { ref identifier } if identifier == "stmt.pdf"),
        "got: {err}"
    );
}

// ── Directory scans ──────────────────────────────────────────────────────────

fn write_with_mtime(path: &std::path::Path, body: &str, secs_after_epoch: u64) {
    std::fs::write(path, body).unwrap();
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs_after_epoch))
        .unwrap();
}

#[tokio::test]
async fn directory_scan_uses_file_modification_times() {
    let dir = tempfile::tempdir().unwrap();
    write_with_mtime(&dir.path().join("statement-v2.txt"), STATEMENT, 1_700_000_500);
    write_with_mtime(&dir.path().join("statement.txt"), STATEMENT, 1_700_000_000);
    write_with_mtime(&dir.path().join("paystub.txt"), PAYSTUB, 1_700_000_100);
    write_with_mtime(&dir.path().join("ignored.pdf"), PAYSTUB, 1_700_000_100);

    let config = text_config().extensions(["txt"]).build().unwrap();
    let report = scan_directory(dir.path(), &config).await.unwrap();

    assert_eq!(report.total, 3);
    let ids: Vec<_> = report.documents.iter().map(|d| d.identifier.as_str()).collect();
    assert_eq!(ids, vec!["paystub.txt", "statement-v2.txt", "statement.txt"]);
    assert_eq!(report.document("statement.txt").unwrap().role, Role::Master);
    assert_eq!(
        report.document("statement-v2.txt").unwrap().master.as_deref(),
        Some("statement.txt")
    );
    assert_eq!(report.document("paystub.txt").unwrap().size_bytes, PAYSTUB.len() as u64);
}

#[tokio::test]
async fn missing_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = text_config().build().unwrap();
    let err = scan_directory(dir.path().join("no-such-loan"), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, DocIdentError::DirectoryNotFound { .. }));
}

#[tokio::test]
async fn empty_directory_gives_empty_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = text_config().build().unwrap();
    let report = scan_directory(dir.path(), &config).await.unwrap();
    assert_eq!(report.total, 0);
    assert!(report.hash_groups.is_empty());
}
