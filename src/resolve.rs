//! Version resolution: confirm a candidate cluster and mark its canonical
//! document per entity.
//!
//! ## Why an oracle?
//!
//! Hash and visual links say documents are *related*; they cannot say which
//! copy is the borrower's latest signed version. That judgment is delegated
//! to a [`ClusterOracle`] (in production an LLM, see [`LlmOracle`]) whose
//! answer is treated as untrusted input: it is parsed, validated against the
//! cluster, and only then applied.
//!
//! ## Reset-then-set
//!
//! A successful response replaces all derived cluster state in one
//! assignment: every member starts from "not canonical", then the returned
//! canonical documents are marked. A failed or rejected response leaves the
//! cluster exactly as it was and yields [`ResolutionOutcome::NeedsRetry`].
//!
//! ## Retry Strategy
//!
//! Only the oracle call is retried, with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`) and a per-call timeout. A response
//! that arrives but fails to parse or validate is not retried; re-asking
//! the same question rarely fixes a schema violation.

use crate::config::EngineConfig;
use crate::error::{DocIdentError, OracleError, ResolveError};
use crate::grouping::ClusterCandidate;
use crate::output::BatchReport;
use crate::prompts::{confirmation_user_message, CONFIRMATION_SYSTEM_PROMPT};
use chrono::NaiveDate;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Entity used when the oracle does not name one.
pub const DEFAULT_ENTITY: &str = "primary";

/// Per-document structured metadata from earlier analysis, by identifier.
pub type MetadataMap = BTreeMap<String, serde_json::Value>;

/// How the members of a cluster relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterKind {
    /// Revisions of the same document.
    Version,
    /// Copies of the same document.
    Duplicate,
    /// Same document type, different documents.
    Distinct,
}

/// One document inside a [`VersionCluster`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMember {
    pub identifier: String,
    pub page_count: usize,
    pub inferred_date: Option<NaiveDate>,
    /// Structured fields from earlier analysis; `null` when none.
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub canonical: bool,
    /// Entity this member is canonical for.
    pub entity: Option<String>,
    pub signed: Option<bool>,
    pub document_date: Option<NaiveDate>,
}

/// A group of related documents and, once resolved, its canonical choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionCluster {
    pub id: String,
    pub label: Option<String>,
    pub kind: Option<ClusterKind>,
    pub entity_labels: Vec<String>,
    pub rationale: Option<String>,
    /// Entity → canonical member identifier. Empty until resolved.
    pub canonical: BTreeMap<String, String>,
    pub members: Vec<ClusterMember>,
}

impl VersionCluster {
    /// An unresolved cluster for `candidate`, with member facts taken from
    /// `report` and `metadata`.
    pub fn from_candidate(
        id: impl Into<String>,
        candidate: &ClusterCandidate,
        report: &BatchReport,
        metadata: &MetadataMap,
    ) -> Self {
        let members = candidate
            .members
            .iter()
            .map(|identifier| {
                let record = report.document(identifier);
                ClusterMember {
                    identifier: identifier.clone(),
                    page_count: record.map(|r| r.page_count).unwrap_or(0),
                    inferred_date: record.and_then(|r| r.inferred_date),
                    metadata: metadata
                        .get(identifier)
                        .cloned()
                        .unwrap_or(serde_json::Value::Null),
                    canonical: false,
                    entity: None,
                    signed: None,
                    document_date: None,
                }
            })
            .collect();
        Self {
            id: id.into(),
            label: candidate.label.clone(),
            kind: None,
            entity_labels: Vec::new(),
            rationale: None,
            canonical: BTreeMap::new(),
            members,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.canonical.is_empty()
    }

    pub fn member(&self, identifier: &str) -> Option<&ClusterMember> {
        self.members.iter().find(|m| m.identifier == identifier)
    }

    /// Members currently marked canonical, in member order.
    pub fn canonical_members(&self) -> impl Iterator<Item = &ClusterMember> {
        self.members.iter().filter(|m| m.canonical)
    }
}

/// Number the candidates `cluster-001`, `cluster-002`, … in their given order.
pub fn build_clusters(
    candidates: &[ClusterCandidate],
    report: &BatchReport,
    metadata: &MetadataMap,
) -> Vec<VersionCluster> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            VersionCluster::from_candidate(format!("cluster-{:03}", i + 1), c, report, metadata)
        })
        .collect()
}

/// Record each document's cluster id on the batch report.
///
/// Cluster links from any earlier run are cleared first.
pub fn annotate_report(report: &mut BatchReport, clusters: &[VersionCluster]) {
    let mut cluster_of: BTreeMap<&str, &str> = BTreeMap::new();
    for cluster in clusters {
        for member in &cluster.members {
            cluster_of.insert(member.identifier.as_str(), cluster.id.as_str());
        }
    }
    for record in &mut report.documents {
        record.cluster = cluster_of
            .get(record.identifier.as_str())
            .map(|id| id.to_string());
    }
}

/// The canonical member downstream analysis should read first: latest
/// inferred date, then most pages, then lowest identifier.
pub fn select_primary(cluster: &VersionCluster) -> Option<&ClusterMember> {
    cluster.canonical_members().max_by(|a, b| {
        a.inferred_date
            .cmp(&b.inferred_date)
            .then(a.page_count.cmp(&b.page_count))
            .then(b.identifier.cmp(&a.identifier))
    })
}

// ── Oracle ───────────────────────────────────────────────────────────────

/// What the oracle is told about one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub identifier: String,
    pub page_count: usize,
    pub inferred_date: Option<NaiveDate>,
    pub metadata: serde_json::Value,
}

/// One confirmation question.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationRequest {
    pub cluster_id: String,
    pub label_hint: Option<String>,
    pub documents: Vec<DocumentSummary>,
}

impl ConfirmationRequest {
    pub fn for_cluster(cluster: &VersionCluster) -> Self {
        Self {
            cluster_id: cluster.id.clone(),
            label_hint: cluster.label.clone(),
            documents: cluster
                .members
                .iter()
                .map(|m| DocumentSummary {
                    identifier: m.identifier.clone(),
                    page_count: m.page_count,
                    inferred_date: m.inferred_date,
                    metadata: m.metadata.clone(),
                })
                .collect(),
        }
    }
}

/// External judge of a candidate cluster. Returns the raw response body.
pub trait ClusterOracle: Send + Sync {
    fn confirm(
        &self,
        request: &ConfirmationRequest,
    ) -> impl Future<Output = Result<String, OracleError>> + Send;
}

/// [`ClusterOracle`] backed by an `edgequake_llm` chat provider.
pub struct LlmOracle {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &EngineConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }

    /// Resolve the provider from `config` and the environment.
    pub fn from_config(config: &EngineConfig) -> Result<Self, DocIdentError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }
}

impl ClusterOracle for LlmOracle {
    async fn confirm(&self, request: &ConfirmationRequest) -> Result<String, OracleError> {
        let user = confirmation_user_message(request)
            .map_err(|e| OracleError(format!("failed to encode request: {e}")))?;
        let messages = vec![
            ChatMessage::system(CONFIRMATION_SYSTEM_PROMPT),
            ChatMessage::user(&user),
        ];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| OracleError(e.to_string()))?;
        debug!(
            "{}: {} input tokens, {} output tokens",
            request.cluster_id, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

fn build_options(config: &EngineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DocIdentError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocIdentError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`), API key from the
///    environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI** when `OPENAI_API_KEY` is set, then full auto-detection via
///    [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &EngineConfig) -> Result<Arc<dyn LLMProvider>, DocIdentError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DocIdentError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

// ── Response handling ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OracleResponse {
    label: String,
    kind: ClusterKind,
    #[serde(default)]
    entity_labels: Vec<String>,
    canonical: Vec<CanonicalChoice>,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    annotations: Vec<Annotation>,
}

#[derive(Debug, Deserialize)]
struct CanonicalChoice {
    #[serde(default)]
    entity: Option<String>,
    document: String,
}

#[derive(Debug, Deserialize)]
struct Annotation {
    document: String,
    #[serde(default)]
    signed: Option<bool>,
    #[serde(default)]
    document_date: Option<String>,
}

static RE_JSON_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*?)\n?```$").unwrap());

fn parse_response(body: &str) -> Result<OracleResponse, ResolveError> {
    let body = body.trim().trim_start_matches('\u{feff}');
    let json = match RE_JSON_FENCES.captures(body) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => body,
    };
    serde_json::from_str(json).map_err(|e| ResolveError::MalformedResponse {
        detail: e.to_string(),
    })
}

fn entity_name(entity: Option<&str>) -> String {
    match entity.map(str::trim) {
        Some(e) if !e.is_empty() => e.to_string(),
        _ => DEFAULT_ENTITY.to_string(),
    }
}

fn invalid(detail: impl Into<String>) -> ResolveError {
    ResolveError::InvalidResolution {
        detail: detail.into(),
    }
}

/// Validate `response` against `cluster` and, only if it is consistent,
/// replace the cluster's derived state with it.
fn apply_response(
    cluster: &mut VersionCluster,
    response: OracleResponse,
) -> Result<BTreeMap<String, String>, ResolveError> {
    let label = response.label.trim();
    if label.is_empty() {
        return Err(invalid("empty label"));
    }
    if response.canonical.is_empty() {
        return Err(invalid("no canonical document"));
    }

    let members: BTreeSet<&str> = cluster.members.iter().map(|m| m.identifier.as_str()).collect();
    let mut canonical: BTreeMap<String, String> = BTreeMap::new();
    let mut chosen: BTreeSet<&str> = BTreeSet::new();
    for choice in &response.canonical {
        let document = choice.document.as_str();
        if !members.contains(document) {
            return Err(invalid(format!("'{document}' is not a member of {}", cluster.id)));
        }
        if !chosen.insert(document) {
            return Err(invalid(format!("'{document}' is canonical for two entities")));
        }
        let entity = entity_name(choice.entity.as_deref());
        if canonical.insert(entity.clone(), document.to_string()).is_some() {
            return Err(invalid(format!("entity '{entity}' has two canonical documents")));
        }
    }

    let mut entity_labels: Vec<String> = Vec::new();
    for entity in response
        .entity_labels
        .iter()
        .map(|e| entity_name(Some(e)))
        .chain(canonical.keys().cloned())
    {
        if !entity_labels.contains(&entity) {
            entity_labels.push(entity);
        }
    }
    if let Some(missing) = entity_labels.iter().find(|e| !canonical.contains_key(*e)) {
        return Err(invalid(format!("entity '{missing}' has no canonical document")));
    }

    let mut annotations: BTreeMap<&str, &Annotation> = BTreeMap::new();
    for a in &response.annotations {
        if members.contains(a.document.as_str()) {
            annotations.insert(a.document.as_str(), a);
        } else {
            debug!("{}: ignoring annotation for '{}'", cluster.id, a.document);
        }
    }

    let entity_of: BTreeMap<&str, &str> = canonical
        .iter()
        .map(|(entity, doc)| (doc.as_str(), entity.as_str()))
        .collect();

    let next_members: Vec<ClusterMember> = cluster
        .members
        .iter()
        .map(|m| {
            let annotation = annotations.get(m.identifier.as_str());
            let entity = entity_of.get(m.identifier.as_str()).map(|e| e.to_string());
            ClusterMember {
                canonical: entity.is_some(),
                entity,
                signed: annotation.and_then(|a| a.signed),
                document_date: annotation
                    .and_then(|a| a.document_date.as_deref())
                    .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok()),
                ..m.clone()
            }
        })
        .collect();

    *cluster = VersionCluster {
        id: cluster.id.clone(),
        label: Some(label.to_string()),
        kind: Some(response.kind),
        entity_labels,
        rationale: Some(response.rationale.trim().to_string()).filter(|r| !r.is_empty()),
        canonical: canonical.clone(),
        members: next_members,
    };
    Ok(canonical)
}

// ── Resolver ─────────────────────────────────────────────────────────────

/// Result of resolving one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// The cluster's canonical marking was replaced.
    Resolved {
        cluster_id: String,
        canonical: BTreeMap<String, String>,
        attempts: u32,
    },
    /// The cluster was left untouched and should be resolved again later.
    NeedsRetry {
        cluster_id: String,
        reason: ResolveError,
    },
}

impl ResolutionOutcome {
    pub fn cluster_id(&self) -> &str {
        match self {
            Self::Resolved { cluster_id, .. } | Self::NeedsRetry { cluster_id, .. } => cluster_id,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

/// Confirms clusters through a [`ClusterOracle`] and applies the answers.
pub struct VersionResolver<O> {
    oracle: O,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: u64,
    concurrency: usize,
}

impl<O: ClusterOracle> VersionResolver<O> {
    pub fn new(oracle: O, config: &EngineConfig) -> Self {
        Self {
            oracle,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
            concurrency: config.concurrency.max(1),
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Resolve one cluster in place.
    pub async fn resolve(&self, cluster: &mut VersionCluster) -> ResolutionOutcome {
        let request = ConfirmationRequest::for_cluster(cluster);
        let result = match self.confirm_with_retry(&request).await {
            Ok((body, attempts)) => parse_response(&body)
                .and_then(|response| apply_response(cluster, response))
                .map(|canonical| (canonical, attempts)),
            Err(e) => Err(e),
        };

        match result {
            Ok((canonical, attempts)) => {
                info!(
                    "{}: resolved as {:?} ({} canonical)",
                    cluster.id,
                    cluster.kind,
                    canonical.len()
                );
                ResolutionOutcome::Resolved {
                    cluster_id: cluster.id.clone(),
                    canonical,
                    attempts,
                }
            }
            Err(reason) => {
                warn!("{}: left unresolved: {}", cluster.id, reason);
                ResolutionOutcome::NeedsRetry {
                    cluster_id: cluster.id.clone(),
                    reason,
                }
            }
        }
    }

    /// Resolve several clusters concurrently. Outcomes are returned in
    /// cluster order.
    pub async fn resolve_all(&self, clusters: &mut [VersionCluster]) -> Vec<ResolutionOutcome> {
        stream::iter(clusters.iter_mut().map(|cluster| self.resolve(cluster)))
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn confirm_with_retry(
        &self,
        request: &ConfirmationRequest,
    ) -> Result<(String, u32), ResolveError> {
        let mut last_err = String::from("no attempt made");
        let budget = Duration::from_secs(self.api_timeout_secs);

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    request.cluster_id, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(budget, self.oracle.confirm(request)).await {
                Ok(Ok(body)) => return Ok((body, attempt + 1)),
                Ok(Err(e)) => {
                    warn!(
                        "{}: attempt {} failed: {}",
                        request.cluster_id,
                        attempt + 1,
                        e
                    );
                    last_err = e.to_string();
                }
                Err(_) => {
                    warn!(
                        "{}: attempt {} timed out after {}s",
                        request.cluster_id,
                        attempt + 1,
                        self.api_timeout_secs
                    );
                    last_err = format!("timed out after {}s", self.api_timeout_secs);
                }
            }
        }

        Err(ResolveError::OracleFailed {
            attempts: self.max_retries + 1,
            detail: last_err,
        })
    }
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, saturating.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}
