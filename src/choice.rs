//! Choice solver: which assignments of derivation cases avoid `i` everywhere.
//!
//! An *infinite path* is a set of deltas under which some entry of the final
//! relation is `i`. A concrete assignment (one case per operation) is
//! admissible iff it falsifies every infinite path, i.e. disagrees with at
//! least one delta of each path.
//!
//! Instead of enumerating the Cartesian product of all domains, the solver
//! searches for *choice vectors*: per operation, a set of allowed cases. A
//! vector denotes every assignment in the product of its sets, and all of
//! them are admissible. The search picks, for each path, one delta to forbid
//! (removing that case from the operation's set), skipping paths that are
//! already falsified and pruning branches where a set would become empty.
//! Only maximal vectors are kept.
//!
//! Before searching, the paths are simplified with the same minimality and
//! fusion rules as the [`DeltaGraph`]. If simplification derives the empty
//! path, no assignment is admissible and no search happens at all.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use log::debug;
use num_bigint::BigUint;

use crate::delta_graph::DeltaGraph;
use crate::error::{AnalysisError, Result};
use crate::registry::ChoiceRegistry;
use crate::types::Delta;

/// Per operation, the set of allowed cases.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ChoiceVector(Vec<BTreeSet<u32>>);

impl ChoiceVector {
    pub fn new(sets: Vec<BTreeSet<u32>>) -> Self {
        ChoiceVector(sets)
    }

    /// Vector allowing every recorded case.
    pub fn full(domains: &[BTreeSet<u32>]) -> Self {
        ChoiceVector(domains.to_vec())
    }

    pub fn sets(&self) -> &[BTreeSet<u32>] {
        &self.0
    }

    pub fn allowed(&self, op: usize) -> Option<&BTreeSet<u32>> {
        self.0.get(op)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the concrete assignment belongs to this vector.
    pub fn contains(&self, assignment: &[u32]) -> bool {
        assignment.len() == self.0.len() && self.0.iter().zip(assignment).all(|(s, c)| s.contains(c))
    }

    /// Component-wise inclusion: every assignment of `other` is one of ours.
    pub fn includes(&self, other: &ChoiceVector) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| b.is_subset(a))
    }

    pub fn to_vecs(&self) -> Vec<Vec<u32>> {
        self.0.iter().map(|s| s.iter().copied().collect()).collect()
    }

    fn falsifies(&self, path: &[Delta]) -> bool {
        path.iter().any(|d| match self.0.get(d.op.index()) {
            Some(allowed) => !allowed.contains(&d.case.id()),
            None => false,
        })
    }
}

impl fmt::Display for ChoiceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, set) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            let cases: Vec<String> = set.iter().map(|c| c.to_string()).collect();
            write!(f, "{{{}}}", cases.join(","))?;
        }
        write!(f, "]")
    }
}

/// The admissible choices of one function.
#[derive(Debug, Clone)]
pub struct Choices {
    domains: Vec<BTreeSet<u32>>,
    paths: Vec<Vec<Delta>>,
    vectors: Vec<ChoiceVector>,
}

impl Choices {
    /// Solves for the given infinite paths over the registry's domains.
    ///
    /// Fails with [`AnalysisError::ChoiceExplosion`] when the search visits
    /// more than `limit` candidate vectors.
    pub fn generate<I>(registry: &ChoiceRegistry, paths: I, limit: usize) -> Result<Choices>
    where
        I: IntoIterator<Item = Vec<Delta>>,
    {
        let mut dg = DeltaGraph::new();
        for path in paths {
            dg.insert(&path);
        }
        Self::from_delta_graph(registry, dg, limit)
    }

    /// Same as [`generate`][Choices::generate], starting from already
    /// collected paths.
    pub fn from_delta_graph(registry: &ChoiceRegistry, mut dg: DeltaGraph, limit: usize) -> Result<Choices> {
        dg.fusion(registry);
        let domains = registry.domains();
        let mut paths: Vec<Vec<Delta>> = dg.paths().map(|p| p.to_vec()).collect();

        if dg.is_infinite() {
            debug!("Choice solver: empty path derived, no admissible choice");
            return Ok(Choices {
                domains,
                paths,
                vectors: Vec::new(),
            });
        }

        // Short paths constrain the most; handle them first.
        paths.sort_by_key(|p| p.len());

        let mut search = Search {
            paths: &paths,
            limit,
            visited: 0,
            found: Vec::new(),
        };
        search.run(0, ChoiceVector::full(&domains))?;
        let visited = search.visited;
        let vectors = maximal(search.found);
        debug!(
            "Choice solver: {} paths, {} candidates visited, {} vectors",
            paths.len(),
            visited,
            vectors.len()
        );

        Ok(Choices {
            domains,
            paths,
            vectors,
        })
    }

    /// No admissible assignment exists.
    pub fn is_infinite(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &[ChoiceVector] {
        &self.vectors
    }

    /// Simplified infinite paths the vectors were computed from.
    pub fn paths(&self) -> &[Vec<Delta>] {
        &self.paths
    }

    pub fn domains(&self) -> &[BTreeSet<u32>] {
        &self.domains
    }

    /// Whether a concrete assignment (indexed by operation) is admissible.
    pub fn is_valid(&self, assignment: &[u32]) -> bool {
        self.vectors.iter().any(|v| v.contains(assignment))
    }

    /// Some admissible assignment: the smallest case of each set of the
    /// first vector.
    pub fn first(&self) -> Option<Vec<u32>> {
        self.vectors.iter().find_map(|v| {
            v.sets()
                .iter()
                .map(|s| s.iter().next().copied())
                .collect::<Option<Vec<u32>>>()
        })
    }

    /// Lazily enumerates every admissible assignment exactly once.
    pub fn assignments(&self) -> Assignments<'_> {
        Assignments {
            vectors: &self.vectors,
            current: 0,
            odometer: None,
        }
    }

    /// Number of admissible assignments.
    pub fn count_assignments(&self) -> BigUint {
        let alive: Vec<usize> = (0..self.vectors.len()).collect();
        let mut cache = HashMap::new();
        self.count_from(0, alive, &mut cache)
    }

    /// Cases of one operation are grouped by the set of vectors they keep
    /// alive, so the count never enumerates concrete assignments.
    fn count_from(&self, op: usize, alive: Vec<usize>, cache: &mut HashMap<(usize, Vec<usize>), BigUint>) -> BigUint {
        if alive.is_empty() {
            return BigUint::ZERO;
        }
        if op == self.domains.len() {
            return BigUint::from(1u32);
        }
        if let Some(count) = cache.get(&(op, alive.clone())) {
            return count.clone();
        }

        let mut groups: BTreeMap<Vec<usize>, u64> = BTreeMap::new();
        for case in &self.domains[op] {
            let survivors: Vec<usize> = alive
                .iter()
                .copied()
                .filter(|&i| self.vectors[i].0.get(op).is_some_and(|s| s.contains(case)))
                .collect();
            *groups.entry(survivors).or_insert(0) += 1;
        }

        let mut total = BigUint::ZERO;
        for (survivors, size) in groups {
            total += self.count_from(op + 1, survivors, cache) * BigUint::from(size);
        }
        cache.insert((op, alive), total.clone());
        total
    }

    /// Admissible choices that additionally pick `case` at operation `op`.
    pub fn restricted(&self, op: usize, case: u32) -> Choices {
        let vectors = self
            .vectors
            .iter()
            .filter(|v| v.allowed(op).is_some_and(|s| s.contains(&case)))
            .map(|v| {
                let mut v = v.clone();
                v.0[op] = BTreeSet::from([case]);
                v
            })
            .collect();
        Choices {
            domains: self.domains.clone(),
            paths: self.paths.clone(),
            vectors: maximal(vectors),
        }
    }
}

impl fmt::Display for Choices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            return write!(f, "no admissible choice");
        }
        for (i, v) in self.vectors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", v)?;
        }
        Ok(())
    }
}

struct Search<'a> {
    paths: &'a [Vec<Delta>],
    limit: usize,
    visited: usize,
    found: Vec<ChoiceVector>,
}

impl Search<'_> {
    fn run(&mut self, index: usize, current: ChoiceVector) -> Result<()> {
        self.visited += 1;
        if self.visited > self.limit {
            log::warn!("Choice search gave up after {} candidates", self.limit);
            return Err(AnalysisError::ChoiceExplosion { limit: self.limit });
        }

        let Some(path) = self.paths.get(index) else {
            self.found.push(current);
            return Ok(());
        };
        if current.falsifies(path) {
            return self.run(index + 1, current);
        }

        for d in path {
            let op = d.op.index();
            match current.allowed(op) {
                Some(allowed) if allowed.len() > 1 => {
                    let mut next = current.clone();
                    next.0[op].remove(&d.case.id());
                    self.run(index + 1, next)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Deduplicates and drops vectors included in another one.
fn maximal(mut vectors: Vec<ChoiceVector>) -> Vec<ChoiceVector> {
    vectors.sort();
    vectors.dedup();
    let keep: Vec<bool> = (0..vectors.len())
        .map(|i| !(0..vectors.len()).any(|j| j != i && vectors[j].includes(&vectors[i])))
        .collect();
    vectors.into_iter().zip(keep).filter(|(_, k)| *k).map(|(v, _)| v).collect()
}

/// Iterator over admissible assignments, see [`Choices::assignments`].
pub struct Assignments<'a> {
    vectors: &'a [ChoiceVector],
    current: usize,
    odometer: Option<Odometer>,
}

struct Odometer {
    sets: Vec<Vec<u32>>,
    positions: Vec<usize>,
    done: bool,
}

impl Odometer {
    fn new(vector: &ChoiceVector) -> Self {
        let sets: Vec<Vec<u32>> = vector.to_vecs();
        let done = sets.iter().any(|s| s.is_empty());
        let positions = vec![0; sets.len()];
        Odometer { sets, positions, done }
    }

    fn next(&mut self) -> Option<Vec<u32>> {
        if self.done {
            return None;
        }
        let item = self.positions.iter().zip(&self.sets).map(|(&p, s)| s[p]).collect();
        let mut k = self.positions.len();
        loop {
            if k == 0 {
                self.done = true;
                break;
            }
            k -= 1;
            self.positions[k] += 1;
            if self.positions[k] < self.sets[k].len() {
                break;
            }
            self.positions[k] = 0;
        }
        Some(item)
    }
}

impl Iterator for Assignments<'_> {
    type Item = Vec<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        let vectors = self.vectors;
        loop {
            let current = self.current;
            let vector = vectors.get(current)?;
            let odometer = self.odometer.get_or_insert_with(|| Odometer::new(vector));
            match odometer.next() {
                // Already produced by an earlier vector.
                Some(a) if vectors[..current].iter().any(|v| v.contains(&a)) => {}
                Some(a) => return Some(a),
                None => {
                    self.current += 1;
                    self.odometer = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::registry::OperationKind;

    fn registry(ops: usize, cases: u32) -> ChoiceRegistry {
        let mut reg = ChoiceRegistry::new();
        for _ in 0..ops {
            reg.new_operation_with_cases(OperationKind::Assignment, cases);
        }
        reg
    }

    /// Deltas given as `(case, op)` pairs.
    fn paths(input: &[&[(u32, u32)]]) -> Vec<Vec<Delta>> {
        input
            .iter()
            .map(|p| {
                let mut p: Vec<Delta> = p.iter().map(|&d| Delta::from(d)).collect();
                p.sort();
                p
            })
            .collect()
    }

    fn as_vecs(choices: &Choices) -> BTreeSet<Vec<Vec<u32>>> {
        choices.vectors().iter().map(|v| v.to_vecs()).collect()
    }

    #[test]
    fn test_no_paths_allows_everything() {
        let reg = registry(2, 3);
        let choices = Choices::generate(&reg, Vec::new(), 1000).unwrap();
        assert!(!choices.is_infinite());
        assert_eq!(choices.vectors().len(), 1);
        assert_eq!(choices.first(), Some(vec![0, 0]));
        assert_eq!(choices.count_assignments(), BigUint::from(9u32));
    }

    #[test]
    fn test_no_operations() {
        let reg = ChoiceRegistry::new();
        let choices = Choices::generate(&reg, Vec::new(), 1000).unwrap();
        assert_eq!(choices.first(), Some(vec![]));
        assert_eq!(choices.assignments().count(), 1);

        let choices = Choices::generate(&reg, vec![vec![]], 1000).unwrap();
        assert!(choices.is_infinite());
        assert_eq!(choices.first(), None);
    }

    #[test]
    fn test_parameterized_domains() {
        let reg = registry(3, 4);
        let inf = paths(&[
            &[(0, 0), (0, 1)],
            &[(0, 0), (1, 1), (3, 2)],
            &[(1, 0), (1, 1), (3, 2)],
            &[(2, 0), (1, 1), (3, 2)],
            &[(3, 0), (1, 1), (3, 2)],
        ]);
        let choices = Choices::generate(&reg, inf, 1000).unwrap();
        assert_eq!(choices.paths().len(), 2);

        let expected: BTreeSet<Vec<Vec<u32>>> = [
            vec![vec![1, 2, 3], vec![0, 2, 3], vec![0, 1, 2, 3]],
            vec![vec![1, 2, 3], vec![0, 1, 2, 3], vec![0, 1, 2]],
            vec![vec![0, 1, 2, 3], vec![2, 3], vec![0, 1, 2, 3]],
            vec![vec![0, 1, 2, 3], vec![1, 2, 3], vec![0, 1, 2]],
        ]
        .into_iter()
        .collect();
        assert_eq!(as_vecs(&choices), expected);

        // 64 assignments, 4 satisfy each of the two disjoint paths.
        assert_eq!(choices.count_assignments(), BigUint::from(56u32));
        assert_eq!(choices.assignments().count(), 56);
    }

    #[test]
    fn test_infinite_by_fusion() {
        let reg = registry(4, 3);
        let inf = paths(&[&[(0, 3)], &[(1, 3)], &[(2, 3)]]);
        let choices = Choices::generate(&reg, inf, 1000).unwrap();
        assert!(choices.is_infinite());
        assert_eq!(choices.count_assignments(), BigUint::ZERO);
        assert_eq!(choices.assignments().next(), None);
        assert_eq!(choices.to_string(), "no admissible choice");
    }

    #[test]
    fn test_is_valid() {
        let reg = registry(2, 3);
        let inf = paths(&[&[(0, 1)], &[(1, 0), (2, 1)]]);
        let choices = Choices::generate(&reg, inf, 1000).unwrap();

        for invalid in [[0, 0], [1, 0], [2, 0], [1, 2]] {
            assert!(!choices.is_valid(&invalid), "{:?} should be invalid", invalid);
        }
        for valid in [[0, 1], [1, 1], [2, 1], [0, 2], [2, 2]] {
            assert!(choices.is_valid(&valid), "{:?} should be valid", valid);
        }
        assert_eq!(choices.count_assignments(), BigUint::from(5u32));

        let all: BTreeSet<Vec<u32>> = choices.assignments().collect();
        assert_eq!(all.len(), 5);
        assert!(all.iter().all(|a| choices.is_valid(a)));
    }

    #[test]
    fn test_result_is_minimal() {
        let reg = registry(3, 3);
        let inf = paths(&[&[(0, 0)], &[(1, 0)], &[(2, 1), (1, 2)], &[(2, 0), (1, 1), (1, 2)]]);
        let choices = Choices::generate(&reg, inf, 1000).unwrap();
        let vectors = as_vecs(&choices);

        assert!(vectors.contains(&vec![vec![2], vec![0, 1, 2], vec![0, 2]]));
        assert!(vectors.contains(&vec![vec![2], vec![0], vec![0, 1, 2]]));
        assert!(!vectors.contains(&vec![vec![2], vec![0, 1], vec![0, 2]]));
        assert!(!vectors.contains(&vec![vec![2], vec![0, 2], vec![0, 2]]));
        assert_eq!(vectors.len(), 2);
    }

    #[test]
    fn test_first_is_valid() {
        let reg = registry(2, 3);
        let inf = paths(&[&[(0, 0)], &[(0, 1), (1, 0)]]);
        let choices = Choices::generate(&reg, inf, 1000).unwrap();
        let first = choices.first().unwrap();
        assert!(choices.is_valid(&first));
    }

    #[test]
    fn test_restricted() {
        let reg = registry(2, 3);
        let inf = paths(&[&[(0, 1)], &[(1, 0), (2, 1)]]);
        let choices = Choices::generate(&reg, inf, 1000).unwrap();

        let only_one = choices.restricted(0, 1);
        assert_eq!(only_one.assignments().collect::<Vec<_>>(), vec![vec![1, 1]]);

        let none = choices.restricted(1, 0);
        assert!(none.is_infinite());
    }

    #[test]
    fn test_explosion() {
        let reg = registry(6, 3);
        let inf = paths(&[
            &[(0, 0), (0, 1)],
            &[(0, 2), (0, 3)],
            &[(0, 4), (0, 5)],
            &[(1, 0), (1, 1)],
            &[(1, 2), (1, 3)],
        ]);
        let err = Choices::generate(&reg, inf, 4).unwrap_err();
        assert_eq!(err, AnalysisError::ChoiceExplosion { limit: 4 });
    }

    #[test]
    fn test_display() {
        let v = ChoiceVector::new(vec![BTreeSet::from([0, 2]), BTreeSet::from([1])]);
        assert_eq!(v.to_string(), "[{0,2},{1}]");
        assert!(v.contains(&[2, 1]));
        assert!(!v.contains(&[1, 1]));
        assert!(!v.contains(&[0]));
    }
}
