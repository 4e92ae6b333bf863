//! Metadata Table
//!
//! Process-local mapping from computed backend path to request options.
//! Never persisted and never read back from the backend.

use crate::traits::Metadata;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub(crate) struct MetadataTable {
    entries: HashMap<String, Metadata>,
    /// Insertion order, only tracked when bounded.
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl MetadataTable {
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    pub(crate) fn get(&self, path: &str) -> Metadata {
        self.entries.get(path).cloned().unwrap_or_default()
    }

    pub(crate) fn insert(&mut self, path: String, metadata: Metadata) {
        let Some(capacity) = self.capacity else {
            self.entries.insert(path, metadata);
            return;
        };
        if capacity == 0 {
            return;
        }
        if self.entries.contains_key(&path) {
            self.entries.insert(path, metadata);
            return;
        }
        while self.entries.len() >= capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            tracing::debug!(path = %oldest, "evicted metadata entry");
        }
        self.order.push_back(path.clone());
        self.entries.insert(path, metadata);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("ContentType".into(), json!(value));
        m
    }

    #[test]
    fn test_missing_entry_is_empty() {
        let table = MetadataTable::new(None);
        assert!(table.get("nope").is_empty());
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let mut table = MetadataTable::new(None);
        for i in 0..100 {
            table.insert(format!("k{i}"), meta("a"));
        }
        assert_eq!(table.len(), 100);
    }

    #[test]
    fn test_bounded_evicts_oldest() {
        let mut table = MetadataTable::new(Some(2));
        table.insert("a".into(), meta("a"));
        table.insert("b".into(), meta("b"));
        table.insert("a".into(), meta("a2"));
        table.insert("c".into(), meta("c"));

        assert_eq!(table.len(), 2);
        assert!(table.get("a").is_empty());
        assert_eq!(table.get("b"), meta("b"));
        assert_eq!(table.get("c"), meta("c"));
    }
}
