//! Configuration for batch identity scans and version resolution.
//!
//! All engine behaviour is controlled through [`EngineConfig`], built via
//! [`EngineConfigBuilder`]. Thresholds that downstream decisions were tuned
//! against (similarity threshold, extractability minimum, hash size) live
//! here next to the operational knobs so a run can be reproduced from its
//! logged configuration alone.

use crate::error::DocIdentError;
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::fingerprint::VisualFingerprinter;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Upper bound on confirmation retries; backoff doubles per attempt.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Configuration for a batch scan and for cluster resolution.
///
/// # Example
/// ```rust
/// use loandoc_ident::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .concurrency(4)
///     .similarity_threshold(6)
///     .visual_fingerprints(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.min_extractable_chars, 50);
/// ```
#[derive(Clone)]
pub struct EngineConfig {
    /// Documents processed at once. Default: available parallelism.
    pub concurrency: usize,

    /// Wall-clock budget for extracting and rasterising one document, in
    /// seconds. Default: 30.
    ///
    /// A malformed PDF can keep pdfium busy indefinitely; a document that
    /// exceeds the budget is classified `error` and not retried. The blocking
    /// worker is abandoned, not cancelled: it keeps its thread in tokio's
    /// blocking pool until pdfium returns.
    pub document_timeout_secs: u64,

    /// Longest edge of the first-page raster, in pixels. Default: 800.
    ///
    /// Perceptual hashes downsample to a 16×16 grid, so layout is all that
    /// matters; full fidelity only costs render time.
    pub raster_max_pixels: u32,

    /// Perceptual hash grid edge. Default: 16 (256 bits per hash).
    pub hash_size: u32,

    /// Maximum per-kind hash distance still counted as a match. Default: 5.
    pub similarity_threshold: usize,

    /// Trimmed text must be longer than this many characters for a document
    /// to be hashed. Default: 50.
    pub min_extractable_chars: usize,

    /// Compute visual fingerprints during scans. Default: true.
    pub visual_fingerprints: bool,

    /// File extensions (lowercase, without dot) included in a batch.
    /// Default: `["pdf"]`.
    pub extensions: Vec<String>,

    /// Descend into subdirectories of the batch root. Default: false.
    pub recursive: bool,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Pre-constructed text extractor. Default: pdfium.
    pub extractor: Option<Arc<dyn TextExtractor>>,

    /// Pre-constructed visual fingerprinter. Default: pdfium + img_hash.
    pub fingerprinter: Option<Arc<dyn VisualFingerprinter>>,

    /// Reference year for the date plausibility window. Default: current year.
    pub reference_year: Option<i32>,

    // ── Resolution ────────────────────────────────────────────────────────
    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for confirmation calls. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens in a confirmation response. Default: 2048.
    pub max_tokens: usize,

    /// Retries after a failed confirmation call. Default: 3, at most
    /// [`MAX_RETRIES_LIMIT`].
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout for confirmation calls in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Optional progress callback for scans.
    pub progress_callback: Option<ProgressCallback>,
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            document_timeout_secs: 30,
            raster_max_pixels: 800,
            hash_size: 16,
            similarity_threshold: 5,
            min_extractable_chars: 50,
            visual_fingerprints: true,
            extensions: vec!["pdf".to_string()],
            recursive: false,
            password: None,
            extractor: None,
            fingerprinter: None,
            reference_year: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 2048,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("concurrency", &self.concurrency)
            .field("document_timeout_secs", &self.document_timeout_secs)
            .field("raster_max_pixels", &self.raster_max_pixels)
            .field("hash_size", &self.hash_size)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("min_extractable_chars", &self.min_extractable_chars)
            .field("visual_fingerprints", &self.visual_fingerprints)
            .field("extensions", &self.extensions)
            .field("recursive", &self.recursive)
            .field("extractor", &self.extractor.as_ref().map(|_| "<dyn TextExtractor>"))
            .field(
                "fingerprinter",
                &self.fingerprinter.as_ref().map(|_| "<dyn VisualFingerprinter>"),
            )
            .field("reference_year", &self.reference_year)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl EngineConfig {
    /// Create a new builder for `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether `ext` (any case, without dot) is part of a batch.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn document_timeout_secs(mut self, secs: u64) -> Self {
        self.config.document_timeout_secs = secs.max(1);
        self
    }

    pub fn raster_max_pixels(mut self, px: u32) -> Self {
        self.config.raster_max_pixels = px.clamp(64, 4000);
        self
    }

    pub fn hash_size(mut self, size: u32) -> Self {
        self.config.hash_size = size;
        self
    }

    pub fn similarity_threshold(mut self, threshold: usize) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    pub fn min_extractable_chars(mut self, n: usize) -> Self {
        self.config.min_extractable_chars = n;
        self
    }

    pub fn visual_fingerprints(mut self, v: bool) -> Self {
        self.config.visual_fingerprints = v;
        self
    }

    pub fn extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.extensions = exts
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn recursive(mut self, v: bool) -> Self {
        self.config.recursive = v;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.config.extractor = Some(extractor);
        self
    }

    pub fn fingerprinter(mut self, fingerprinter: Arc<dyn VisualFingerprinter>) -> Self {
        self.config.fingerprinter = Some(fingerprinter);
        self
    }

    pub fn reference_year(mut self, year: i32) -> Self {
        self.config.reference_year = Some(year);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES_LIMIT);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EngineConfig, DocIdentError> {
        let c = &self.config;
        if !(8..=64).contains(&c.hash_size) {
            return Err(DocIdentError::InvalidConfig(format!(
                "hash size must be 8–64, got {}",
                c.hash_size
            )));
        }
        if c.extensions.is_empty() {
            return Err(DocIdentError::InvalidConfig(
                "at least one file extension is required".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(DocIdentError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
