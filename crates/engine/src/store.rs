//! Append-only observation store.
//!
//! Observations are keyed by step index and written once. Later writes for
//! the same index are refused, so with duplicate indices every reference
//! resolves to the first step that ran under that index.

use std::collections::BTreeMap;

use stepforge_core::tool::ToolOutput;

#[derive(Debug, Clone, Default)]
pub struct ObservationStore {
    observations: BTreeMap<usize, ToolOutput>,
}

impl ObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the observation for `index`.
    ///
    /// Returns `false` (and keeps the existing value) when `index` already
    /// has one.
    pub fn record(&mut self, index: usize, output: ToolOutput) -> bool {
        if self.observations.contains_key(&index) {
            tracing::debug!(index, "Observation already recorded; keeping the first");
            return false;
        }
        self.observations.insert(index, output);
        true
    }

    pub fn get(&self, index: usize) -> Option<&ToolOutput> {
        self.observations.get(&index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.observations.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Observations in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ToolOutput)> {
        self.observations.iter().map(|(i, o)| (*i, o))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_once() {
        let mut store = ObservationStore::new();
        assert!(store.record(1, ToolOutput::from("first")));
        assert!(!store.record(1, ToolOutput::from("second")));
        assert_eq!(store.get(1).unwrap().render(), "first");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn iterates_in_index_order() {
        let mut store = ObservationStore::new();
        store.record(3, ToolOutput::from(3_i64));
        store.record(1, ToolOutput::from(1_i64));
        let order: Vec<usize> = store.iter().map(|(i, _)| i).collect();
        assert_eq!(order, vec![1, 3]);
        assert!(store.contains(3));
        assert!(!store.contains(2));
    }
}
