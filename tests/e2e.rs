//! End-to-end tests against real PDFs through pdfium.
//!
//! These tests need a pdfium library and PDF files in `./test_cases/`.
//! They are gated behind the `E2E_ENABLED` environment variable so they do
//! not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/path/to/libpdfium.so cargo test --test e2e -- --nocapture

use loandoc_ident::pipeline::similarity;
use loandoc_ident::{inspect_file, scan_directory, EngineConfig, Role};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Route library logs through the test harness; `RUST_LOG=debug` for detail.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Skip this test if E2E_ENABLED is not set *or* nothing exists at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        init_tracing();
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test input not found: {}", p.display());
            return;
        }
        p
    }};
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_scan_directory() {
    let dir = e2e_skip_unless_ready!(test_cases_dir());
    let config = EngineConfig::default();

    let report = scan_directory(&dir, &config).await.expect("scan failed");

    println!(
        "{} documents: {} unique, {} master, {} duplicate, {} error in {}ms",
        report.total, report.unique, report.master, report.duplicate, report.error, report.duration_ms
    );
    assert_eq!(
        report.unique + report.master + report.duplicate + report.error,
        report.total
    );
    for doc in report.with_role(Role::Unique).chain(report.with_role(Role::Master)) {
        if doc.extractable {
            assert_eq!(doc.content_fingerprint.as_ref().map(|f| f.len()), Some(64));
        }
    }
}

#[tokio::test]
async fn test_copy_is_a_duplicate() {
    let dir = e2e_skip_unless_ready!(test_cases_dir());
    let Some(original) = std::fs::read_dir(&dir)
        .expect("list test_cases")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().and_then(|e| e.to_str()) == Some("pdf"))
    else {
        println!("SKIP — no PDF in {}", dir.display());
        return;
    };

    let work = tempfile::tempdir().unwrap();
    std::fs::copy(&original, work.path().join("original.pdf")).unwrap();
    std::fs::copy(&original, work.path().join("reupload.pdf")).unwrap();

    let report = scan_directory(work.path(), &EngineConfig::default())
        .await
        .expect("scan failed");

    let a = report.document("original.pdf").unwrap();
    let b = report.document("reupload.pdf").unwrap();
    assert_eq!(a.visual_fingerprint, b.visual_fingerprint);
    assert!(a.visual_fingerprint.is_some(), "first page should render");
    if a.extractable {
        assert_eq!(report.duplicate, 1);
        assert_eq!(report.master, 1);
    } else {
        assert_eq!(report.unique, 2);
    }
}

#[tokio::test]
async fn test_fingerprint_single_file() {
    let dir = e2e_skip_unless_ready!(test_cases_dir());
    let Some(pdf) = std::fs::read_dir(&dir)
        .expect("list test_cases")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().and_then(|e| e.to_str()) == Some("pdf"))
    else {
        println!("SKIP — no PDF in {}", dir.display());
        return;
    };

    let record = inspect_file(&pdf, &EngineConfig::default())
        .await
        .expect("inspect failed");
    println!("{}", serde_json::to_string_pretty(&record).unwrap());

    assert!(record.page_count > 0);
    let fp = record.visual_fingerprint.expect("visual fingerprint");
    assert!(similarity::are_similar(Some(&fp), Some(&fp), 0));
    for (_, hash) in fp.kinds() {
        assert_eq!(hash.len(), 64);
    }
}
