//! Batch input: enumerate the documents of one loan file.
//!
//! A batch is either a directory on disk or a caller-supplied list of
//! in-memory documents. Listing only touches filesystem metadata; bytes are
//! read later, per document, so an unreadable file becomes an `error`
//! record instead of aborting the listing. The only fatal outcome is a
//! batch root that is missing, not a directory, or cannot be listed.

use crate::config::EngineConfig;
use crate::error::DocIdentError;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where a document's bytes come from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// A file read at processing time.
    File(PathBuf),
    /// Bytes already held by the caller.
    Bytes(Vec<u8>),
}

/// One document of a batch, before any processing.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    /// Path relative to the batch root, `/`-separated; unique in the batch.
    pub identifier: String,
    pub source: DocumentSource,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl BatchEntry {
    /// An in-memory document.
    pub fn from_bytes(
        identifier: impl Into<String>,
        bytes: Vec<u8>,
        modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            size_bytes: bytes.len() as u64,
            source: DocumentSource::Bytes(bytes),
            modified,
        }
    }

    /// A file on disk, with size and modification time taken from its
    /// metadata when available.
    pub fn from_path(identifier: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (size_bytes, modified) = match std::fs::metadata(&path) {
            Ok(meta) => (meta.len(), meta.modified().ok().map(DateTime::<Utc>::from)),
            Err(e) => {
                debug!("No metadata for {}: {}", path.display(), e);
                (0, None)
            }
        };
        Self {
            identifier: identifier.into(),
            source: DocumentSource::File(path),
            size_bytes,
            modified,
        }
    }

    /// Path recorded on the output record.
    pub fn path(&self) -> PathBuf {
        match &self.source {
            DocumentSource::File(p) => p.clone(),
            DocumentSource::Bytes(_) => PathBuf::from(&self.identifier),
        }
    }
}

/// List the documents under `root` whose extension the config accepts.
///
/// Entries are sorted by identifier. Subdirectories are descended only when
/// `config.recursive` is set; an unreadable subdirectory is skipped with a
/// warning.
pub fn list_batch(root: &Path, config: &EngineConfig) -> Result<Vec<BatchEntry>, DocIdentError> {
    if !root.exists() {
        return Err(DocIdentError::DirectoryNotFound {
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(DocIdentError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let mut entries = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let listing = match std::fs::read_dir(&dir) {
            Ok(listing) => listing,
            Err(source) if dir == root => {
                return Err(DocIdentError::DirectoryUnreadable {
                    path: root.to_path_buf(),
                    source,
                })
            }
            Err(e) => {
                warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                continue;
            }
        };

        for item in listing {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            let path = item.path();
            if path.is_dir() {
                if config.recursive {
                    pending.push(path);
                }
                continue;
            }
            let accepted = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| config.accepts_extension(e))
                .unwrap_or(false);
            if !accepted {
                continue;
            }
            let identifier = relative_identifier(root, &path);
            entries.push(BatchEntry::from_path(identifier, path));
        }
    }

    entries.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    info!("Listed {} documents under {}", entries.len(), root.display());
    Ok(entries)
}

/// `path` relative to `root`, components joined with `/`.
fn relative_identifier(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
