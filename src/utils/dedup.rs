//! Identifier-based deduplication within one harvest run.

use std::collections::HashSet;

use crate::models::Record;

/// Tracks the identifiers admitted so far in a run.
///
/// Scoped to a single run; nothing is persisted between runs.
#[derive(Debug, Default, Clone)]
pub struct Deduplicator {
    seen: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time an identifier is offered, false afterwards
    pub fn admit(&mut self, record: &Record) -> bool {
        self.admit_id(&record.identifier)
    }

    /// Same as [`admit`](Self::admit) for a bare identifier
    pub fn admit_id(&mut self, identifier: &str) -> bool {
        if self.seen.contains(identifier) {
            return false;
        }
        self.seen.insert(identifier.to_string())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.seen.contains(identifier)
    }

    /// Number of distinct identifiers admitted
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Remove repeated identifiers, keeping the first occurrence of each in order
pub fn dedup_ids(ids: Vec<String>) -> Vec<String> {
    let mut dedup = Deduplicator::new();
    ids.into_iter().filter(|id| dedup.admit_id(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordBuilder, SourceType};

    fn record(id: &str) -> Record {
        RecordBuilder::new(id, SourceType::Scopus).build()
    }

    #[test]
    fn test_admit_is_idempotent() {
        let mut dedup = Deduplicator::new();
        let r = record("2-s2.0-1");

        assert!(dedup.admit(&r));
        assert!(!dedup.admit(&r));
        assert!(!dedup.admit(&r.clone()));
        assert_eq!(dedup.len(), 1);
        assert!(dedup.contains("2-s2.0-1"));
    }

    #[test]
    fn test_admission_order_is_stable() {
        let mut dedup = Deduplicator::new();
        let admitted: Vec<_> = ["3", "1", "3", "2", "1", "4"]
            .iter()
            .map(|id| record(id))
            .filter(|r| dedup.admit(r))
            .map(|r| r.identifier)
            .collect();

        assert_eq!(admitted, vec!["3", "1", "2", "4"]);
    }

    #[test]
    fn test_dedup_ids() {
        let ids = vec!["9".to_string(), "8".to_string(), "9".to_string()];
        assert_eq!(dedup_ids(ids), vec!["9", "8"]);
        assert!(dedup_ids(Vec::new()).is_empty());
    }
}
