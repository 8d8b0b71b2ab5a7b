//! Output records handed to downstream persistence and analysis.
//!
//! Everything here is plain data: fingerprints are immutable facts computed
//! once per document, while [`Role`], `master`, `supersedes` and the cluster
//! link are derived state that every run of the engine recomputes from
//! scratch.

use crate::error::DocumentError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Classification of one document within its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The only member of its hash group, or exempt from hash grouping.
    Unique,
    /// The representative of a hash group with two or more members.
    Master,
    /// Byte-identical extracted text to its group's master.
    Duplicate,
    /// Could not be read or processed; excluded from all grouping.
    Error,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Unique => "unique",
            Role::Master => "master",
            Role::Duplicate => "duplicate",
            Role::Error => "error",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three perceptual hashes of a document's first page, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualFingerprint {
    /// Frequency-domain (DCT) hash.
    pub phash: String,
    /// Gradient-difference hash.
    pub dhash: String,
    /// Block-average hash.
    pub ahash: String,
}

impl VisualFingerprint {
    /// The hashes paired with their kind name, in a fixed order.
    pub fn kinds(&self) -> [(&'static str, &str); 3] {
        [
            ("phash", self.phash.as_str()),
            ("dhash", self.dhash.as_str()),
            ("ahash", self.ahash.as_str()),
        ]
    }
}

/// Identity record for a single document of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Path relative to the batch root, `/`-separated.
    pub identifier: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// File modification time; `None` when the platform does not report it.
    pub modified: Option<DateTime<Utc>>,
    /// 0 when extraction failed.
    pub page_count: usize,
    /// Trimmed extracted text is longer than the configured minimum.
    pub extractable: bool,
    /// SHA-256 of the extracted text. Present only when `extractable`.
    pub content_fingerprint: Option<String>,
    /// `None` when rasterisation failed or was disabled.
    pub visual_fingerprint: Option<VisualFingerprint>,
    /// Latest calendar date found in the extracted text.
    pub inferred_date: Option<NaiveDate>,
    pub role: Role,
    /// For duplicates: identifier of the group's master.
    pub master: Option<String>,
    /// For masters: identifiers of the duplicates they supersede, sorted.
    #[serde(default)]
    pub supersedes: Vec<String>,
    /// Id of the version cluster this document belongs to, if any.
    pub cluster: Option<String>,
    pub error: Option<DocumentError>,
}

impl DocumentRecord {
    /// A record for a document that failed before any fingerprint was taken.
    pub fn failed(
        identifier: String,
        path: PathBuf,
        size_bytes: u64,
        modified: Option<DateTime<Utc>>,
        error: DocumentError,
    ) -> Self {
        Self {
            identifier,
            path,
            size_bytes,
            modified,
            page_count: 0,
            extractable: false,
            content_fingerprint: None,
            visual_fingerprint: None,
            inferred_date: None,
            role: Role::Error,
            master: None,
            supersedes: Vec::new(),
            cluster: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.role == Role::Error
    }
}

/// All documents sharing one content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashGroup {
    pub fingerprint: String,
    /// Member identifiers, master first, then the rest sorted.
    pub members: Vec<String>,
    /// Set when the group has two or more members.
    pub master: Option<String>,
}

impl HashGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Batch-level result of a deduplication run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Documents scanned, errors included.
    pub total: usize,
    pub unique: usize,
    pub master: usize,
    pub duplicate: usize,
    pub error: usize,
    /// Every document, sorted by identifier.
    pub documents: Vec<DocumentRecord>,
    /// Content fingerprint → group.
    pub hash_groups: BTreeMap<String, HashGroup>,
    pub duration_ms: u64,
}

impl BatchReport {
    /// Distinct documents after exact deduplication: uniques plus masters.
    pub fn unique_total(&self) -> usize {
        self.unique + self.master
    }

    /// Look up a record by identifier.
    ///
    /// Reports built by this crate keep `documents` sorted; a deserialised
    /// report that is not falls back to a linear scan.
    pub fn document(&self, identifier: &str) -> Option<&DocumentRecord> {
        self.documents
            .binary_search_by(|d| d.identifier.as_str().cmp(identifier))
            .ok()
            .map(|i| &self.documents[i])
            .or_else(|| self.documents.iter().find(|d| d.identifier == identifier))
    }

    /// Records with a given role, in identifier order.
    pub fn with_role(&self, role: Role) -> impl Iterator<Item = &DocumentRecord> {
        self.documents.iter().filter(move |d| d.role == role)
    }
}
