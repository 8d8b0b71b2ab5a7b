//! # loandoc-ident
//!
//! Document identity and version resolution for mortgage loan files.
//!
//! ## Why this crate?
//!
//! A loan file collects the same paperwork many times over: re-uploaded
//! bank statements, re-signed disclosures, a borrower's and a co-borrower's
//! copy of the same form. Downstream analysis should read each logical
//! document once, in its latest version. This crate decides which files are
//! exact copies, which are related, and which copy is canonical.
//!
//! ## Pipeline Overview
//!
//! ```text
//! loan directory
//!  │
//!  ├─ 1. Input        list documents, size + modification time
//!  ├─ 2. Extract      text layer + page count via pdfium (spawn_blocking)
//!  ├─ 3. Fingerprint  SHA-256 of text, three perceptual hashes of page 1
//!  ├─ 4. Date         latest plausible date in the text
//!  ├─ 5. Reduce       hash groups → unique / master / duplicate / error
//!  ├─ 6. Seed         hash, visual and hint links → candidate clusters
//!  └─ 7. Resolve      LLM confirmation → one canonical document per entity
//! ```
//!
//! Steps 1–5 need no network access. Step 7 is the only network-bound step
//! and never guesses: an unconfirmed cluster is reported as needing retry.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loandoc_ident::{scan_directory, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let report = scan_directory("loans/1042", &config).await?;
//!     println!(
//!         "{} documents: {} distinct, {} duplicates, {} unreadable",
//!         report.total,
//!         report.unique_total(),
//!         report.duplicate,
//!         report.error
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `loandoc` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! loandoc-ident = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod dedup;
pub mod error;
pub mod grouping;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod resolve;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EngineConfig, EngineConfigBuilder};
pub use dedup::{inspect_file, reduce, scan_directory, scan_directory_sync, scan_documents};
pub use error::{DocIdentError, DocumentError, OracleError, ResolveError};
pub use grouping::{seed_clusters, ClusterCandidate, GroupingHint, LinkSignal};
pub use output::{BatchReport, DocumentRecord, HashGroup, Role, VisualFingerprint};
pub use pipeline::input::BatchEntry;
pub use progress::{NoopScanCallback, ProgressCallback, ScanProgressCallback};
pub use resolve::{
    annotate_report, build_clusters, select_primary, ClusterKind, ClusterMember, ClusterOracle,
    LlmOracle, ResolutionOutcome, VersionCluster, VersionResolver,
};
