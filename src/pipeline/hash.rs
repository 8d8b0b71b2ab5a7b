//! Content fingerprints: SHA-256 over the UTF-8 bytes of extracted text.
//!
//! This is the only definition of "identical content" in the crate. Absent
//! or empty text has no fingerprint, so non-extractable documents can never
//! be clustered together by accident.

use sha2::{Digest, Sha256};

/// Length of a content fingerprint in hex characters.
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// Hash `text` with SHA-256 and return the lowercase hex digest.
///
/// Returns `None` for absent or empty text.
///
/// ```rust
/// use loandoc_ident::pipeline::hash::content_fingerprint;
///
/// let fp = content_fingerprint(Some("Closing Disclosure")).unwrap();
/// assert_eq!(fp.len(), 64);
/// assert_eq!(content_fingerprint(Some("")), None);
/// ```
pub fn content_fingerprint(text: Option<&str>) -> Option<String> {
    let text = text?;
    if text.is_empty() {
        return None;
    }
    Some(hex::encode(Sha256::digest(text.as_bytes())))
}
