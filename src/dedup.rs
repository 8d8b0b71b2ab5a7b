//! Batch deduplication: per-document fingerprinting, then a single fold.
//!
//! ## Two phases
//!
//! 1. **Map** — every document is read, extracted, hashed, dated and
//!    (optionally) visually fingerprinted on its own, in a bounded pool of
//!    blocking workers. No document's processing looks at another's.
//! 2. **Reduce** — [`reduce`] sorts the independent records, buckets them by
//!    content fingerprint and assigns roles on one thread. Derived state on
//!    the incoming records is discarded first, so the result depends only on
//!    the fingerprints and file metadata.
//!
//! ## Failure policy
//!
//! A document that cannot be read, times out, or crashes its worker is
//! recorded with role `error` and counted, never grouped. Only an
//! inaccessible batch root fails the whole call.

use crate::config::EngineConfig;
use crate::error::{DocIdentError, DocumentError};
use crate::output::{BatchReport, DocumentRecord, HashGroup, Role};
use crate::pipeline::extract::{PdfiumTextExtractor, TextExtractor};
use crate::pipeline::fingerprint::{PdfiumFingerprinter, VisualFingerprinter};
use crate::pipeline::input::{self, BatchEntry, DocumentSource};
use crate::pipeline::{dates, hash};
use chrono::{Datelike, NaiveDate};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Scan every accepted document under `dir` and classify it.
///
/// # Errors
/// Returns `Err` only when `dir` is missing, not a directory, or cannot be
/// listed, or when the default pdfium extractor cannot be bound.
pub async fn scan_directory(
    dir: impl AsRef<Path>,
    config: &EngineConfig,
) -> Result<BatchReport, DocIdentError> {
    let dir = dir.as_ref();
    info!("Starting batch scan: {}", dir.display());
    let entries = input::list_batch(dir, config)?;
    scan_documents(entries, config).await
}

/// Synchronous wrapper around [`scan_directory`].
///
/// Creates a temporary tokio runtime internally.
pub fn scan_directory_sync(
    dir: impl AsRef<Path>,
    config: &EngineConfig,
) -> Result<BatchReport, DocIdentError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocIdentError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(scan_directory(dir, config))
}

/// Classify an explicit list of documents.
///
/// Identifiers must be unique within the list; a repeated identifier fails
/// the batch with [`DocIdentError::DuplicateIdentifier`] before any work.
pub async fn scan_documents(
    entries: Vec<BatchEntry>,
    config: &EngineConfig,
) -> Result<BatchReport, DocIdentError> {
    let start = Instant::now();
    let mut seen = BTreeSet::new();
    if let Some(entry) = entries.iter().find(|e| !seen.insert(e.identifier.as_str())) {
        return Err(DocIdentError::DuplicateIdentifier {
            identifier: entry.identifier.clone(),
        });
    }
    let stages = Stages::from_config(config)?;
    let total = entries.len();

    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_start(total);
    }

    let records: Vec<DocumentRecord> = stream::iter(entries.into_iter().map(|entry| {
        let stages = stages.clone();
        let config = config.clone();
        async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_start(&entry.identifier);
            }
            let record = process_document(entry, &stages, &config).await;
            if let Some(ref cb) = config.progress_callback {
                match &record.error {
                    None => cb.on_document_complete(&record.identifier, record.page_count),
                    Some(e) => cb.on_document_error(&record.identifier, &e.to_string()),
                }
            }
            record
        }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    let mut report = reduce(records);
    report.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Batch complete: {} documents, {} unique, {} master, {} duplicate, {} error, {}ms",
        report.total,
        report.unique,
        report.master,
        report.duplicate,
        report.error,
        report.duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_complete(report.total, report.error);
    }

    Ok(report)
}

/// Fingerprint a single file without grouping it.
///
/// The returned record has role `unique` unless the file failed, in which
/// case it has role `error`. Used for one-off inspection and comparison.
pub async fn inspect_file(
    path: impl AsRef<Path>,
    config: &EngineConfig,
) -> Result<DocumentRecord, DocIdentError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(DocIdentError::FileUnreadable {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a regular file"),
        });
    }
    let identifier = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let stages = Stages::from_config(config)?;
    let entry = BatchEntry::from_path(identifier, path);
    Ok(process_document(entry, &stages, config).await)
}

// ── Map phase ────────────────────────────────────────────────────────────

/// The per-document collaborators, shared by all workers.
#[derive(Clone)]
struct Stages {
    extractor: Arc<dyn TextExtractor>,
    fingerprinter: Option<Arc<dyn VisualFingerprinter>>,
}

impl Stages {
    fn from_config(config: &EngineConfig) -> Result<Self, DocIdentError> {
        let extractor: Arc<dyn TextExtractor> = match config.extractor {
            Some(ref e) => Arc::clone(e),
            None => Arc::new(PdfiumTextExtractor::new()?),
        };
        let fingerprinter: Option<Arc<dyn VisualFingerprinter>> = if config.visual_fingerprints {
            Some(match config.fingerprinter {
                Some(ref f) => Arc::clone(f),
                None => Arc::new(PdfiumFingerprinter::from_config(config)),
            })
        } else {
            None
        };
        Ok(Self {
            extractor,
            fingerprinter,
        })
    }
}

/// Immutable facts computed for one readable document.
struct Analysis {
    page_count: usize,
    extractable: bool,
    content_fingerprint: Option<String>,
    inferred_date: Option<NaiveDate>,
    visual_fingerprint: Option<crate::output::VisualFingerprint>,
}

async fn process_document(
    entry: BatchEntry,
    stages: &Stages,
    config: &EngineConfig,
) -> DocumentRecord {
    let path = entry.path();
    let BatchEntry {
        identifier,
        source,
        size_bytes,
        modified,
    } = entry;

    let bytes = match source {
        DocumentSource::Bytes(b) => b,
        DocumentSource::File(p) => match tokio::fs::read(&p).await {
            Ok(b) => b,
            Err(e) => {
                warn!("{}: read failed: {}", identifier, e);
                let error = DocumentError::Io {
                    document: identifier.clone(),
                    detail: e.to_string(),
                };
                return DocumentRecord::failed(identifier, path, size_bytes, modified, error);
            }
        },
    };

    let stages = stages.clone();
    let password = config.password.clone();
    let min_chars = config.min_extractable_chars;
    let reference_year = config
        .reference_year
        .unwrap_or_else(|| chrono::Local::now().year());
    let budget = Duration::from_secs(config.document_timeout_secs);

    let task = tokio::task::spawn_blocking(move || {
        analyse(&bytes, &stages, password.as_deref(), min_chars, reference_year)
    });

    let analysis = match tokio::time::timeout(budget, task).await {
        Ok(Ok(analysis)) => analysis,
        Ok(Err(join_err)) => {
            warn!("{}: worker panicked: {}", identifier, join_err);
            let error = DocumentError::Panicked {
                document: identifier.clone(),
                detail: join_err.to_string(),
            };
            return DocumentRecord::failed(identifier, path, size_bytes, modified, error);
        }
        Err(_) => {
            warn!(
                "{}: timed out after {}s",
                identifier, config.document_timeout_secs
            );
            let error = DocumentError::Timeout {
                document: identifier.clone(),
                secs: config.document_timeout_secs,
            };
            return DocumentRecord::failed(identifier, path, size_bytes, modified, error);
        }
    };

    debug!(
        "{}: {} pages, extractable={}, date={:?}, visual={}",
        identifier,
        analysis.page_count,
        analysis.extractable,
        analysis.inferred_date,
        analysis.visual_fingerprint.is_some()
    );

    DocumentRecord {
        identifier,
        path,
        size_bytes,
        modified,
        page_count: analysis.page_count,
        extractable: analysis.extractable,
        content_fingerprint: analysis.content_fingerprint,
        visual_fingerprint: analysis.visual_fingerprint,
        inferred_date: analysis.inferred_date,
        role: Role::Unique,
        master: None,
        supersedes: Vec::new(),
        cluster: None,
        error: None,
    }
}

/// Blocking body of the map phase for one document.
fn analyse(
    bytes: &[u8],
    stages: &Stages,
    password: Option<&str>,
    min_chars: usize,
    reference_year: i32,
) -> Analysis {
    let extraction = stages.extractor.extract(bytes, password);
    let extractable = extraction.is_extractable(min_chars);
    let content_fingerprint = if extractable {
        hash::content_fingerprint(extraction.text.as_deref())
    } else {
        None
    };
    let inferred_date = extraction
        .text
        .as_deref()
        .and_then(|t| dates::latest_date_as_of(t, reference_year));
    let visual_fingerprint = stages
        .fingerprinter
        .as_ref()
        .and_then(|f| f.fingerprint(bytes, password));

    Analysis {
        page_count: extraction.page_count,
        extractable,
        content_fingerprint,
        inferred_date,
        visual_fingerprint,
    }
}

// ── Reduce phase ─────────────────────────────────────────────────────────

/// Fold independent per-document records into a classified batch.
///
/// Any role, master link or superseded list already on the records is
/// discarded and derived again, so calling `reduce` on a previous report's
/// documents reproduces that report's classification.
pub fn reduce(mut records: Vec<DocumentRecord>) -> BatchReport {
    records.sort_by(|a, b| a.identifier.cmp(&b.identifier));

    let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, record) in records.iter_mut().enumerate() {
        record.master = None;
        record.supersedes.clear();
        if record.error.is_some() {
            record.role = Role::Error;
            continue;
        }
        record.role = Role::Unique;
        // Non-extractable documents never carry a fingerprint; they stay
        // unique and ungrouped.
        if let (true, Some(fp)) = (record.extractable, record.content_fingerprint.as_ref()) {
            buckets.entry(fp.clone()).or_default().push(idx);
        }
    }

    let mut hash_groups = BTreeMap::new();
    for (fingerprint, members) in buckets {
        let group = resolve_group(&mut records, &fingerprint, &members);
        hash_groups.insert(fingerprint, group);
    }

    let count = |role: Role| records.iter().filter(|r| r.role == role).count();
    BatchReport {
        total: records.len(),
        unique: count(Role::Unique),
        master: count(Role::Master),
        duplicate: count(Role::Duplicate),
        error: count(Role::Error),
        hash_groups,
        documents: records,
        duration_ms: 0,
    }
}

/// Assign roles within one hash group and describe it.
fn resolve_group(records: &mut [DocumentRecord], fingerprint: &str, members: &[usize]) -> HashGroup {
    if let [only] = members {
        return HashGroup {
            fingerprint: fingerprint.to_string(),
            members: vec![records[*only].identifier.clone()],
            master: None,
        };
    }

    let master_idx = *members
        .iter()
        .min_by(|&&a, &&b| master_key(&records[a]).cmp(&master_key(&records[b])))
        .unwrap_or(&members[0]);
    let master_id = records[master_idx].identifier.clone();

    let mut superseded: Vec<String> = members
        .iter()
        .filter(|&&i| i != master_idx)
        .map(|&i| records[i].identifier.clone())
        .collect();
    superseded.sort();

    for &i in members.iter().filter(|&&i| i != master_idx) {
        records[i].role = Role::Duplicate;
        records[i].master = Some(master_id.clone());
    }
    records[master_idx].role = Role::Master;
    records[master_idx].supersedes = superseded.clone();

    debug!(
        "Hash group {}…: master {} supersedes {:?}",
        &fingerprint[..fingerprint.len().min(12)],
        master_id,
        superseded
    );

    let mut ordered = Vec::with_capacity(members.len());
    ordered.push(master_id.clone());
    ordered.extend(superseded);
    HashGroup {
        fingerprint: fingerprint.to_string(),
        members: ordered,
        master: Some(master_id),
    }
}

/// Earliest modification time wins; unknown times sort last; ties fall back
/// to identifier order.
fn master_key(record: &DocumentRecord) -> (bool, Option<chrono::DateTime<chrono::Utc>>, &str) {
    (
        record.modified.is_none(),
        record.modified,
        record.identifier.as_str(),
    )
}
