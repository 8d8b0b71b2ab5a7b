//! Per-document stages of the identity engine.
//!
//! Each submodule implements one step and is pure apart from the scoped
//! raster workspace of [`fingerprint`], so the engine can run them for many
//! documents in parallel and fold the results afterwards.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ hash ─────────┐
//!   │          └──────▶ dates ────────┼──▶ DocumentRecord
//!   └───────▶ fingerprint ──▶ similarity (pairwise, later)
//! ```
//!
//! 1. [`input`]       — list the batch and read bytes per document
//! 2. [`extract`]     — text layer and page count (pdfium or plain text)
//! 3. [`hash`]        — SHA-256 content fingerprint of extractable text
//! 4. [`dates`]       — latest plausible date mentioned in the text
//! 5. [`fingerprint`] — three perceptual hashes of the first page
//! 6. [`similarity`]  — character-wise distance and the 2-of-3 verdict

pub mod dates;
pub mod extract;
pub mod fingerprint;
pub mod hash;
pub mod input;
pub mod pdfium;
pub mod similarity;
