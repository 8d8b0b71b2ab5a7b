//! Progress-callback trait for per-document scan events.
//!
//! Inject an [`Arc<dyn ScanProgressCallback>`] via
//! [`crate::config::EngineConfigBuilder::progress_callback`] to receive
//! events as the engine works through a batch. Callers can forward them to
//! a terminal progress bar, a channel or a job table without the library
//! knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use loandoc_ident::{EngineConfig, ScanProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct DoneCounter(AtomicUsize);
//!
//! impl ScanProgressCallback for DoneCounter {
//!     fn on_document_complete(&self, _identifier: &str, _page_count: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = EngineConfig::builder()
//!     .progress_callback(Arc::new(DoneCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the deduplication engine as it processes each document.
///
/// Documents are processed concurrently, so `on_document_*` may be called
/// from several threads at once and in any order. All methods default to
/// no-ops.
pub trait ScanProgressCallback: Send + Sync {
    /// Called once, after the batch has been listed.
    fn on_scan_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called before a document is read.
    fn on_document_start(&self, identifier: &str) {
        let _ = identifier;
    }

    /// Called when extraction and fingerprinting finished for a document.
    fn on_document_complete(&self, identifier: &str, page_count: usize) {
        let _ = (identifier, page_count);
    }

    /// Called when a document is classified `error`.
    fn on_document_error(&self, identifier: &str, error: &str) {
        let _ = (identifier, error);
    }

    /// Called once, after roles have been assigned.
    fn on_scan_complete(&self, total_documents: usize, error_count: usize) {
        let _ = (total_documents, error_count);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopScanCallback;

impl ScanProgressCallback for NoopScanCallback {}

/// Convenience alias matching the type stored in [`crate::config::EngineConfig`].
pub type ProgressCallback = Arc<dyn ScanProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        total: AtomicUsize,
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        reported_errors: AtomicUsize,
    }

    impl ScanProgressCallback for TrackingCallback {
        fn on_scan_start(&self, total_documents: usize) {
            self.total.store(total_documents, Ordering::SeqCst);
        }

        fn on_document_start(&self, _identifier: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _identifier: &str, _page_count: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_error(&self, _identifier: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_scan_complete(&self, _total_documents: usize, error_count: usize) {
            self.reported_errors.store(error_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopScanCallback;
        cb.on_scan_start(2);
        cb.on_document_start("a.pdf");
        cb.on_document_complete("a.pdf", 3);
        cb.on_document_error("b.pdf", "timed out");
        cb.on_scan_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_scan_start(3);
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            tracker.on_document_start(name);
        }
        tracker.on_document_complete("a.pdf", 1);
        tracker.on_document_complete("b.pdf", 2);
        tracker.on_document_error("c.pdf", "read failed");
        tracker.on_scan_complete(3, 1);

        assert_eq!(tracker.total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.reported_errors.load(Ordering::SeqCst), 1);
    }
}
