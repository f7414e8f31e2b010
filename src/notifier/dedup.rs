//! Bounded ledger of event signatures that have already been surfaced.
//!
//! Insertion order is preserved and eviction is oldest-first once the ledger
//! grows past [`MAX_PROCESSED_SIGNATURES`]. Lookups do not refresh an entry.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const MAX_PROCESSED_SIGNATURES: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Deduplicator {
    signatures: VecDeque<String>,
    capacity: usize,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Deduplicator::with_capacity(MAX_PROCESSED_SIGNATURES)
    }
}

impl Deduplicator {
    pub fn with_capacity(capacity: usize) -> Self {
        Deduplicator {
            signatures: VecDeque::new(),
            capacity,
        }
    }

    pub fn is_processed(&self, signature: &str) -> bool {
        self.signatures.iter().any(|s| s == signature)
    }

    pub fn mark_processed(&mut self, signature: impl Into<String>) {
        self.signatures.push_back(signature.into());
        while self.signatures.len() > self.capacity {
            self.signatures.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.signatures.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for Deduplicator {
    fn from(signatures: Vec<String>) -> Self {
        let mut ledger = Deduplicator::default();
        for sig in signatures {
            ledger.mark_processed(sig);
        }
        ledger
    }
}

impl From<Deduplicator> for Vec<String> {
    fn from(ledger: Deduplicator) -> Self {
        ledger.signatures.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_and_detects_signatures() {
        let mut ledger = Deduplicator::default();
        assert!(!ledger.is_processed("goal:42:1-0"));
        ledger.mark_processed("goal:42:1-0");
        assert!(ledger.is_processed("goal:42:1-0"));
        assert!(!ledger.is_processed("goal:42:2-0"));
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut ledger = Deduplicator::default();
        for i in 0..=MAX_PROCESSED_SIGNATURES {
            ledger.mark_processed(format!("sig:{i}"));
        }
        assert_eq!(ledger.len(), MAX_PROCESSED_SIGNATURES);
        assert!(!ledger.is_processed("sig:0"));
        assert!(ledger.is_processed("sig:1"));
        assert!(ledger.is_processed(&format!("sig:{MAX_PROCESSED_SIGNATURES}")));
    }

    #[test]
    fn lookup_does_not_refresh_recency() {
        let mut ledger = Deduplicator::with_capacity(2);
        ledger.mark_processed("a");
        ledger.mark_processed("b");
        assert!(ledger.is_processed("a"));
        ledger.mark_processed("c");
        assert!(!ledger.is_processed("a"));
        assert_eq!(ledger.iter().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn persists_as_plain_list() {
        let mut ledger = Deduplicator::default();
        ledger.mark_processed("status:1:in_play");
        ledger.mark_processed("goal:1:1-0");
        let json = serde_json::to_string(&ledger).unwrap();
        assert_eq!(json, r#"["status:1:in_play","goal:1:1-0"]"#);
        let back: Deduplicator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ledger);
    }

    #[test]
    fn oversized_persisted_list_is_truncated_on_load() {
        let sigs: Vec<String> = (0..600).map(|i| format!("s{i}")).collect();
        let ledger = Deduplicator::from(sigs);
        assert_eq!(ledger.len(), MAX_PROCESSED_SIGNATURES);
        assert!(ledger.is_processed("s599"));
        assert!(!ledger.is_processed("s99"));
    }
}
