//! Error types for the loandoc-ident library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`DocIdentError`] — **Fatal**: the batch cannot be processed at all
//!   (input directory missing, invalid configuration, pdfium unavailable).
//!   Returned as `Err(DocIdentError)` from the top-level entry points.
//!
//! * [`DocumentError`] — **Non-fatal**: one document could not be read or
//!   timed out while rendering. Stored inside
//!   [`crate::output::DocumentRecord`] with role `error`; every other
//!   document in the batch is classified normally.
//!
//! * [`ResolveError`] — **Non-fatal**: a version cluster could not be
//!   resolved (confirmation call failed, response malformed or rejected).
//!   Carried by [`crate::resolve::ResolutionOutcome::NeedsRetry`]; the
//!   cluster's prior canonical marking is left untouched.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the loandoc-ident library.
///
/// Per-document failures use [`DocumentError`] and per-cluster failures use
/// [`ResolveError`]; neither is propagated here.
#[derive(Debug, Error)]
pub enum DocIdentError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The batch directory does not exist.
    #[error("Batch directory not found: '{path}'\nCheck the path exists and is readable.")]
    DirectoryNotFound { path: PathBuf },

    /// The batch location exists but is not a directory.
    #[error("'{path}' is not a directory")]
    NotADirectory { path: PathBuf },

    /// The batch directory could not be listed.
    #[error("Failed to list batch directory '{path}': {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single input file given on the command line could not be read.
    #[error("Failed to read '{path}': {source}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Two batch entries share an identifier.
    #[error("Duplicate document identifier in batch: '{identifier}'")]
    DuplicateIdentifier { identifier: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library in the working\n\
directory, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document.
///
/// A document carrying one of these is classified `error`, counted in the
/// batch totals, and excluded from every grouping step.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum DocumentError {
    /// The file could not be read from disk.
    #[error("'{document}': read failed: {detail}")]
    Io { document: String, detail: String },

    /// Extraction or rendering exceeded the per-document time budget.
    #[error("'{document}': processing timed out after {secs}s")]
    Timeout { document: String, secs: u64 },

    /// The blocking worker for this document panicked.
    #[error("'{document}': worker panicked: {detail}")]
    Panicked { document: String, detail: String },
}

/// Why a version cluster was left unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ResolveError {
    /// The confirmation call failed on every attempt.
    #[error("confirmation call failed after {attempts} attempts: {detail}")]
    OracleFailed { attempts: u32, detail: String },

    /// The response could not be parsed as the expected JSON shape.
    #[error("confirmation response is malformed: {detail}")]
    MalformedResponse { detail: String },

    /// The response parsed but contradicts the cluster (unknown members,
    /// duplicate entities, no canonical document).
    #[error("confirmation response rejected: {detail}")]
    InvalidResolution { detail: String },
}

/// Failure reported by a [`crate::resolve::ClusterOracle`].
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct OracleError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_not_found_display() {
        let e = DocIdentError::DirectoryNotFound {
            path: PathBuf::from("/loans/1234"),
        };
        assert!(e.to_string().contains("/loans/1234"), "got: {e}");
    }

    #[test]
    fn timeout_display() {
        let e = DocumentError::Timeout {
            document: "appraisal.pdf".into(),
            secs: 30,
        };
        let msg = e.to_string();
        assert!(msg.contains("appraisal.pdf"));
        assert!(msg.contains("30s"));
    }

    #[test]
    fn oracle_failed_display() {
        let e = ResolveError::OracleFailed {
            attempts: 4,
            detail: "HTTP 503".into(),
        };
        assert!(e.to_string().contains("4 attempts"));
        assert!(e.to_string().contains("503"));
    }

    #[test]
    fn document_error_serialises() {
        let e = DocumentError::Io {
            document: "w2.pdf".into(),
            detail: "permission denied".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: DocumentError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
