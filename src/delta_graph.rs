//! Bookkeeping of choice combinations that are known to be unbounded.
//!
//! Whenever a loop correction turns a monomial into `i`, the deltas of that
//! monomial form a *path*: a partial choice assignment under which the
//! function has no polynomial bound. The delta graph collects these paths
//! and simplifies them:
//!
//! - a path that contains another stored path is redundant,
//! - *fusion*: if `R ∪ {δ(c,k)}` is infinite for every recorded case `c` of
//!   operation `k`, then `R` alone is infinite.
//!
//! Once the empty path is derived, every assignment is infinite and the
//! analysis may stop early.

use std::collections::BTreeSet;

use log::debug;

use crate::registry::ChoiceRegistry;
use crate::types::Delta;

#[derive(Debug, Clone, Default)]
pub struct DeltaGraph {
    paths: BTreeSet<Vec<Delta>>,
}

impl DeltaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &[Delta]> + '_ {
        self.paths.iter().map(|p| p.as_slice())
    }

    /// Whether every assignment is infinite.
    pub fn is_infinite(&self) -> bool {
        self.paths.contains(&Vec::new())
    }

    /// Whether some stored path is included in `path`.
    pub fn covers(&self, path: &[Delta]) -> bool {
        self.paths.iter().any(|p| is_subset(p, path))
    }

    /// Records an infinite path (sorted by operation, as in a monomial).
    ///
    /// Returns `true` if the graph changed.
    pub fn insert(&mut self, path: &[Delta]) -> bool {
        if self.covers(path) {
            return false;
        }
        self.paths.retain(|p| !is_subset(path, p));
        self.paths.insert(path.to_vec());
        true
    }

    /// Applies fusion until no new path can be derived.
    pub fn fusion(&mut self, registry: &ChoiceRegistry) {
        if self.is_infinite() {
            return;
        }
        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut derived: Vec<Vec<Delta>> = Vec::new();
            for path in &self.paths {
                for (i, d) in path.iter().enumerate() {
                    let mut rest = path.clone();
                    rest.remove(i);
                    if derived.contains(&rest) || self.covers(&rest) {
                        continue;
                    }
                    let mut cases = registry.cases(d.op).peekable();
                    if cases.peek().is_none() {
                        continue;
                    }
                    let all_infinite = cases.all(|c| {
                        let mut candidate = rest.clone();
                        let pos = candidate.partition_point(|x| x.op < d.op);
                        candidate.insert(pos, Delta::new(c, d.op.id()));
                        self.covers(&candidate)
                    });
                    if all_infinite {
                        derived.push(rest);
                    }
                }
            }
            if derived.is_empty() {
                break;
            }
            let mut changed = false;
            for path in derived {
                changed |= self.insert(&path);
            }
            if !changed || self.is_infinite() {
                break;
            }
        }
        debug!(
            "delta graph fusion: {} paths after {} rounds{}",
            self.paths.len(),
            rounds,
            if self.is_infinite() { " (infinite)" } else { "" }
        );
    }
}

/// Both slices must be sorted.
fn is_subset(small: &[Delta], big: &[Delta]) -> bool {
    if small.len() > big.len() {
        return false;
    }
    let mut j = 0;
    for d in small {
        while j < big.len() && big[j] < *d {
            j += 1;
        }
        if j == big.len() || big[j] != *d {
            return false;
        }
        j += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::registry::OperationKind;

    fn path(deltas: &[(u32, u32)]) -> Vec<Delta> {
        let mut p: Vec<Delta> = deltas.iter().map(|&d| Delta::from(d)).collect();
        p.sort();
        p
    }

    fn registry(ops: usize, cases: u32) -> ChoiceRegistry {
        let mut reg = ChoiceRegistry::new();
        for _ in 0..ops {
            reg.new_operation_with_cases(OperationKind::Assignment, cases);
        }
        reg
    }

    #[test]
    fn test_insert_keeps_minimal_paths() {
        let mut dg = DeltaGraph::new();
        assert!(dg.insert(&path(&[(0, 0), (1, 1)])));
        assert!(!dg.insert(&path(&[(0, 0), (1, 1), (2, 2)])));
        assert!(dg.insert(&path(&[(0, 0)])));
        assert_eq!(dg.len(), 1);
        assert!(dg.covers(&path(&[(0, 0), (2, 1)])));
        assert!(!dg.covers(&path(&[(1, 0)])));
    }

    #[test]
    fn test_fusion_single_operation() {
        let reg = registry(1, 3);
        let mut dg = DeltaGraph::new();
        dg.insert(&path(&[(0, 0)]));
        dg.insert(&path(&[(1, 0)]));
        dg.fusion(&reg);
        assert!(!dg.is_infinite());
        dg.insert(&path(&[(2, 0)]));
        dg.fusion(&reg);
        assert!(dg.is_infinite());
    }

    #[test]
    fn test_fusion_with_common_suffix() {
        let reg = registry(4, 4);
        let mut dg = DeltaGraph::new();
        dg.insert(&path(&[(0, 0), (0, 1)]));
        for c in 0..4 {
            dg.insert(&path(&[(c, 0), (1, 1), (3, 2)]));
        }
        dg.fusion(&reg);
        assert!(!dg.is_infinite());
        let paths: Vec<&[Delta]> = dg.paths().collect();
        assert_eq!(paths.len(), 2);
        assert!(dg.covers(&path(&[(1, 1), (3, 2)])));
    }

    #[test]
    fn test_fusion_cascades() {
        let reg = registry(2, 2);
        let mut dg = DeltaGraph::new();
        for a in 0..2 {
            for b in 0..2 {
                dg.insert(&path(&[(a, 0), (b, 1)]));
            }
        }
        dg.fusion(&reg);
        assert!(dg.is_infinite());
    }

    #[test]
    fn test_subset() {
        assert!(is_subset(&[], &path(&[(0, 0)])));
        assert!(is_subset(&path(&[(1, 2)]), &path(&[(0, 0), (1, 2)])));
        assert!(!is_subset(&path(&[(1, 2)]), &path(&[(0, 0), (0, 2)])));
    }
}
