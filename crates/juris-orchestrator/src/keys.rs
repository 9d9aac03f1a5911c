//! Content-addressed analysis keys.
//!
//! A key is the SHA-256 of the sorted document hashes, the model version
//! tag, the prompt signature and the case's last mutation time. Each
//! component is written with a label and a length prefix, so no choice of
//! component values can make two different inputs serialize identically.
//!
//! Keys are point-in-time: a new mutation on the case produces a new key and
//! the old entries simply stop being requested until their TTL runs out.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Mutation component used when the case has never been mutated.
pub const NO_MUTATION: &str = "no-mutation";

/// Errors from key derivation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// There are no documents to key on.
    #[error("Cannot derive an analysis key from an empty document set")]
    EmptyDocumentSet,

    /// A document hash was blank.
    #[error("Document hash at position {0} is empty")]
    EmptyHash(usize),
}

/// Opaque, fixed-length analysis key (64 hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisKey(String);

impl AnalysisKey {
    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnalysisKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AnalysisKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// SHA-256 hex digest of a prompt template.
///
/// Editing a template changes its signature and therefore every key derived
/// with it.
pub fn prompt_signature(template: &str) -> String {
    format!("{:x}", Sha256::digest(template.as_bytes()))
}

/// Derives analysis keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisKeyGenerator;

impl AnalysisKeyGenerator {
    /// Derives the key for a document set under a model and prompt
    /// configuration at a point in the case's history.
    ///
    /// The order of `document_hashes` does not matter; duplicates count once.
    ///
    /// # Errors
    /// Returns `KeyError` if the document set is empty or contains a blank hash.
    pub fn derive_key<S: AsRef<str>>(
        document_hashes: &[S],
        model_version: &str,
        prompt_signature: &str,
        last_mutation_at: Option<DateTime<Utc>>,
    ) -> Result<AnalysisKey, KeyError> {
        if document_hashes.is_empty() {
            return Err(KeyError::EmptyDocumentSet);
        }
        if let Some(position) = document_hashes.iter().position(|h| h.as_ref().trim().is_empty()) {
            return Err(KeyError::EmptyHash(position));
        }

        let mut hashes: Vec<&str> = document_hashes.iter().map(|h| h.as_ref()).collect();
        hashes.sort_unstable();
        hashes.dedup();

        let mutation = last_mutation_at.map_or_else(
            || NO_MUTATION.to_string(),
            |at| at.to_rfc3339_opts(SecondsFormat::Micros, true),
        );

        let mut hasher = Sha256::new();
        write_component(&mut hasher, "documents", &hashes.len().to_string());
        for hash in &hashes {
            write_component(&mut hasher, "document", hash);
        }
        write_component(&mut hasher, "model", model_version);
        write_component(&mut hasher, "prompt", prompt_signature);
        write_component(&mut hasher, "mutation", &mutation);

        Ok(AnalysisKey(format!("{:x}", hasher.finalize())))
    }
}

fn write_component(hasher: &mut Sha256, label: &str, value: &str) {
    hasher.update(label.as_bytes());
    hasher.update(b"=");
    hasher.update(value.len().to_string().as_bytes());
    hasher.update(b":");
    hasher.update(value.as_bytes());
    hasher.update(b"\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_key_shape() {
        let key = AnalysisKeyGenerator::derive_key(&["h1"], "v1", "p1", None).unwrap();
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let none: [&str; 0] = [];
        assert_eq!(
            AnalysisKeyGenerator::derive_key(&none, "v1", "p1", None),
            Err(KeyError::EmptyDocumentSet)
        );
        assert_eq!(
            AnalysisKeyGenerator::derive_key(&["h1", " "], "v1", "p1", None),
            Err(KeyError::EmptyHash(1))
        );
    }

    #[test]
    fn test_mutation_sentinel_differs_from_any_timestamp() {
        let without = AnalysisKeyGenerator::derive_key(&["h1"], "v1", "p1", None).unwrap();
        let with = AnalysisKeyGenerator::derive_key(&["h1"], "v1", "p1", at(1)).unwrap();
        assert_ne!(without, with);
    }

    #[test]
    fn test_component_boundaries_are_unambiguous() {
        let a = AnalysisKeyGenerator::derive_key(&["ab"], "c", "p", None).unwrap();
        let b = AnalysisKeyGenerator::derive_key(&["a"], "bc", "p", None).unwrap();
        let c = AnalysisKeyGenerator::derive_key(&["a", "b"], "c", "p", None).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_duplicates_count_once() {
        let once = AnalysisKeyGenerator::derive_key(&["h1", "h2"], "v1", "p1", None).unwrap();
        let twice = AnalysisKeyGenerator::derive_key(&["h2", "h1", "h1"], "v1", "p1", None).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_prompt_signature_tracks_template() {
        assert_eq!(prompt_signature("Summarize"), prompt_signature("Summarize"));
        assert_ne!(prompt_signature("Summarize"), prompt_signature("Summarize."));
        assert_eq!(prompt_signature("").len(), 64);
    }
}
