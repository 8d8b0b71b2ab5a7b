//! Text extraction: document bytes → page-concatenated text and page count.
//!
//! Extraction never fails past this boundary. A corrupt or unsupported file
//! yields [`Extraction::failed`] (no text, zero pages), which the engine
//! treats as a classification input: the document is not extractable and is
//! therefore exempt from hash grouping.

use crate::error::DocIdentError;
use crate::pipeline::pdfium;
use tracing::{debug, warn};

/// Result of running a [`TextExtractor`] over one document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extraction {
    /// Page texts joined with `\n`; `None` when extraction failed.
    pub text: Option<String>,
    /// 0 when extraction failed.
    pub page_count: usize,
}

impl Extraction {
    pub fn new(text: impl Into<String>, page_count: usize) -> Self {
        Self {
            text: Some(text.into()),
            page_count,
        }
    }

    /// The outcome for an unreadable document.
    pub fn failed() -> Self {
        Self::default()
    }

    /// Trimmed text is strictly longer than `min_chars` characters.
    pub fn is_extractable(&self, min_chars: usize) -> bool {
        is_extractable(self.text.as_deref(), min_chars)
    }
}

/// Trimmed `text` is strictly longer than `min_chars` characters.
pub fn is_extractable(text: Option<&str>, min_chars: usize) -> bool {
    text.map(|t| t.trim().chars().count() > min_chars)
        .unwrap_or(false)
}

/// Pulls text out of a document.
///
/// Implementations are called from blocking worker threads, one document
/// per call, and must be stateless across calls.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], password: Option<&str>) -> Extraction;
}

/// Text-layer extraction through pdfium.
///
/// Scanned PDFs without a text layer produce `Some("")` with the real page
/// count; only unparseable files produce [`Extraction::failed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumTextExtractor;

impl PdfiumTextExtractor {
    /// Verify that pdfium can be bound before any document is touched.
    pub fn new() -> Result<Self, DocIdentError> {
        pdfium::bind()?;
        Ok(Self)
    }
}

impl TextExtractor for PdfiumTextExtractor {
    fn extract(&self, bytes: &[u8], password: Option<&str>) -> Extraction {
        let pdfium = match pdfium::bind() {
            Ok(p) => p,
            Err(e) => {
                warn!("pdfium unavailable in worker: {}", e);
                return Extraction::failed();
            }
        };

        let document = match pdfium.load_pdf_from_byte_slice(bytes, password) {
            Ok(d) => d,
            Err(e) => {
                debug!("PDF load failed: {:?}", e);
                return Extraction::failed();
            }
        };

        let pages = document.pages();
        let page_count = pages.len() as usize;
        let mut texts = Vec::with_capacity(page_count);
        for (idx, page) in pages.iter().enumerate() {
            match page.text() {
                Ok(text) => texts.push(text.all()),
                Err(e) => {
                    debug!("Text layer of page {} unreadable: {:?}", idx + 1, e);
                    return Extraction::failed();
                }
            }
        }

        Extraction {
            text: Some(texts.join("\n")),
            page_count,
        }
    }
}

/// Treats the bytes as UTF-8 text (lossy), pages separated by form feeds.
///
/// Used for text sidecars produced by an external OCR step, where the
/// sidecar stands in for the scanned PDF it was made from.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], _password: Option<&str>) -> Extraction {
        let text = String::from_utf8_lossy(bytes).into_owned();
        let page_count = if text.is_empty() {
            0
        } else {
            text.split('\u{000C}').count()
        };
        let text = text.replace('\u{000C}', "\n");
        Extraction {
            text: Some(text),
            page_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extractability_uses_trimmed_length() {
        let padded = format!("   {}   ", "x".repeat(50));
        assert!(!is_extractable(Some(&padded), 50));
        assert!(is_extractable(Some(&"x".repeat(51)), 50));
        assert!(!is_extractable(None, 0));
        assert!(!is_extractable(Some("   "), 0));
    }

    #[test]
    fn failed_extraction_is_empty() {
        let e = Extraction::failed();
        assert_eq!(e.text, None);
        assert_eq!(e.page_count, 0);
        assert!(!e.is_extractable(0));
    }

    #[test]
    fn plain_text_counts_form_feed_pages() {
        let e = PlainTextExtractor.extract(b"page one\x0cpage two\x0cpage three", None);
        assert_eq!(e.page_count, 3);
        assert_eq!(e.text.as_deref(), Some("page one\npage two\npage three"));
    }

    #[test]
    fn plain_text_empty_file_has_no_pages() {
        let e = PlainTextExtractor.extract(b"", None);
        assert_eq!(e.page_count, 0);
        assert_eq!(e.text.as_deref(), Some(""));
    }

    #[test]
    fn plain_text_is_lossy_on_invalid_utf8() {
        let e = PlainTextExtractor.extract(&[0x66, 0x6f, 0xff, 0x6f], None);
        assert!(e.text.unwrap().starts_with("fo"));
    }
}
