//! Nested-call lineage bookkeeping.
//!
//! Every entry into an embedded pipeline (an `if` gate, a `try` branch, a
//! pipeline-valued config key) pushes a branch level. Trace records carry
//! the stack so tooling can tell apart repeated entries of the same
//! branch within one run.

use crate::trace::Branch;
use dashmap::DashMap;
use std::fmt::Write as _;

/// Immutable lineage of nested pipeline entries, outermost first.
///
/// Extension is by copy so sibling branches never share a stack.
#[derive(Debug, Clone, Default)]
pub struct BranchStack {
    branches: Vec<Branch>,
}

impl BranchStack {
    /// The root pipeline's (empty) lineage.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns a copy extended with one level, with the entry counter
    /// drawn from the run's counters.
    #[must_use]
    pub fn enter(&self, key: &str, counters: &BranchCounters) -> Self {
        let counter = counters.next(&self.qualify(key));
        let mut branches = self.branches.clone();
        branches.push(Branch::new(key, counter));
        Self { branches }
    }

    /// Returns the levels, outermost first.
    #[must_use]
    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    /// Clones the levels for a trace record.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Branch> {
        self.branches.clone()
    }

    /// The counter key for entering `key` from this stack.
    ///
    /// Qualified by the full lineage so `try` entered from two different
    /// parents counts independently.
    fn qualify(&self, key: &str) -> String {
        let mut qualified = String::new();
        for branch in &self.branches {
            let _ = write!(qualified, "{}:{}/", branch.key, branch.counter);
        }
        qualified.push_str(key);
        qualified
    }
}

/// Per-run branch entry counters.
#[derive(Debug, Default)]
pub struct BranchCounters {
    counters: DashMap<String, u64>,
}

impl BranchCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next zero-based counter for a qualified branch key.
    fn next(&self, key: &str) -> u64 {
        let mut entry = self.counters.entry(key.to_string()).or_insert(0);
        let counter = *entry;
        *entry += 1;
        counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_repeated_entries_count_up() {
        let counters = BranchCounters::new();
        let root = BranchStack::root();

        let first = root.enter("try", &counters);
        let second = root.enter("try", &counters);

        assert_eq!(first.branches(), &[Branch::new("try", 0)]);
        assert_eq!(second.branches(), &[Branch::new("try", 1)]);
    }

    #[test]
    fn test_counters_are_scoped_to_the_parent_lineage() {
        let counters = BranchCounters::new();
        let root = BranchStack::root();

        let try0 = root.enter("try", &counters);
        let try1 = root.enter("try", &counters);

        // Same key entered under different parents starts at zero each.
        assert_eq!(try0.enter("if", &counters).branches().last(), Some(&Branch::new("if", 0)));
        assert_eq!(try1.enter("if", &counters).branches().last(), Some(&Branch::new("if", 0)));
    }

    #[test]
    fn test_extension_does_not_mutate_the_parent() {
        let counters = BranchCounters::new();
        let root = BranchStack::root();
        let child = root.enter("catch", &counters);

        assert!(root.branches().is_empty());
        assert_eq!(child.branches().len(), 1);
    }
}
