//! Choice registry: the arena of derivation operations of one function.
//!
//! Every operation is referenced by its [`OpIndex`] from the deltas of
//! monomials, never by pointer, so relations can be cloned and compared
//! without touching the registry.

use std::collections::BTreeSet;
use std::fmt;

use crate::types::OpIndex;

/// What introduced an operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OperationKind {
    /// Arithmetic assignment with several derivations.
    Assignment,
    /// Conditional; case 0 is the `then` branch, case 1 the `else` branch.
    Branch,
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    cases: BTreeSet<u32>,
}

impl Operation {
    pub fn cases(&self) -> &BTreeSet<u32> {
        &self.cases
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChoiceRegistry {
    operations: Vec<Operation>,
}

impl ChoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh operation with no recorded cases yet.
    pub fn new_operation(&mut self, kind: OperationKind) -> OpIndex {
        let index = OpIndex::from(self.operations.len());
        self.operations.push(Operation {
            kind,
            cases: BTreeSet::new(),
        });
        index
    }

    /// Allocates an operation and records cases `0..count`.
    pub fn new_operation_with_cases(&mut self, kind: OperationKind, count: u32) -> OpIndex {
        let op = self.new_operation(kind);
        for case in 0..count {
            self.record_case(op, case);
        }
        op
    }

    /// Registers `case` as a possible outcome of `op`.
    ///
    /// # Panics
    ///
    /// Panics if `op` was not allocated by this registry.
    pub fn record_case(&mut self, op: OpIndex, case: u32) {
        let len = self.operations.len();
        let operation = self
            .operations
            .get_mut(op.index())
            .unwrap_or_else(|| panic!("Operation {} is not allocated (registry has {})", op, len));
        operation.cases.insert(case);
    }

    pub fn operation(&self, op: OpIndex) -> Option<&Operation> {
        self.operations.get(op.index())
    }

    /// Recorded cases of `op`; empty if `op` is unknown.
    pub fn cases(&self, op: OpIndex) -> impl Iterator<Item = u32> + '_ {
        self.operation(op).into_iter().flat_map(|o| o.cases.iter().copied())
    }

    pub fn case_count(&self, op: OpIndex) -> usize {
        self.operation(op).map_or(0, |o| o.cases.len())
    }

    /// Number of allocated operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Index the next allocated operation will get.
    pub fn next_index(&self) -> OpIndex {
        OpIndex::from(self.operations.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = (OpIndex, &Operation)> + '_ {
        self.operations.iter().enumerate().map(|(i, o)| (OpIndex::from(i), o))
    }

    /// Per-operation domains, indexed by operation.
    pub fn domains(&self) -> Vec<BTreeSet<u32>> {
        self.operations.iter().map(|o| o.cases.clone()).collect()
    }
}

impl fmt::Display for ChoiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (op, operation) in self.iter() {
            let cases: Vec<String> = operation.cases.iter().map(|c| c.to_string()).collect();
            writeln!(f, "{}: {:?} {{{}}}", op, operation.kind, cases.join(","))?;
        }
        Ok(())
    }
}
