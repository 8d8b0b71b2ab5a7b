//! Prompts for LLM-based version confirmation.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: the response schema the resolver parses
//!    is spelled out in exactly one place, next to the text that asks for it.
//!
//! 2. **Testability**: unit tests can inspect prompts and request bodies
//!    directly without a live provider.

use crate::resolve::ConfirmationRequest;

/// System prompt for confirming one candidate version cluster.
///
/// The response shape described here must stay in sync with
/// `OracleResponse` in [`crate::resolve`].
pub const CONFIRMATION_SYSTEM_PROMPT: &str = r#"You are reviewing documents from a single mortgage loan file. You will receive a JSON object describing a group of documents that automated checks believe are related: exact copies, successive versions of the same form, or distinct documents of the same type.

For each document you get its identifier, page count, the latest date found in its text (may be null), and any structured fields previously extracted from it.

Decide:

1. LABEL
   - A short human-readable name for the group (e.g. "Uniform Residential Loan Application")

2. KIND
   - "duplicate": the documents are copies of the same document
   - "version": the documents are revisions of the same document
   - "distinct": the documents are the same type but not the same document

3. ENTITIES
   - The parties the documents belong to (e.g. "borrower", "co-borrower")
   - Use a single entity "primary" when the documents are not party-specific

4. CANONICAL
   - For each entity, exactly one document identifier: the latest and most complete version
   - Only use identifiers from the input

5. ANNOTATIONS
   - For any document, whether it is signed and the date it was signed or issued (YYYY-MM-DD)

Respond with ONLY a JSON object, no commentary, in this exact shape:

{
  "label": "string",
  "kind": "version" | "duplicate" | "distinct",
  "entity_labels": ["string"],
  "canonical": [{"entity": "string", "document": "identifier"}],
  "rationale": "string",
  "annotations": [{"document": "identifier", "signed": true | false | null, "document_date": "YYYY-MM-DD" | null}]
}"#;

/// Build the user message carrying the cluster description.
pub fn confirmation_user_message(request: &ConfirmationRequest) -> Result<String, serde_json::Error> {
    let body = serde_json::to_string_pretty(request)?;
    Ok(format!("Documents to review:\n\n{}", body))
}
