//! Type-safe wrappers for derivation choices and program variables.
//!
//! This module provides newtype wrappers that enforce compile-time distinction
//! between operation indices and case indices, which are both small integers
//! and are easily mixed up when building indicator terms.
use std::fmt;

/// Index of a derivation operation (0-indexed).
///
/// Every syntactic construct that admits several derivations (an arithmetic
/// assignment, a conditional) allocates a fresh operation in the
/// [`ChoiceRegistry`][crate::registry::ChoiceRegistry].
///
/// # Invariants
///
/// - Operation indices are allocated monotonically and never reused
///   within the analysis of one function.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct OpIndex(u32);

impl OpIndex {
    /// Creates a new operation index.
    pub fn new(index: u32) -> Self {
        OpIndex(index)
    }

    /// Returns the raw index as a `u32`.
    pub fn id(self) -> u32 {
        self.0
    }

    /// Returns the raw index as a `usize`, for indexing into arenas.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the next operation index.
    pub fn next(self) -> Self {
        OpIndex(self.0 + 1)
    }
}

impl fmt::Display for OpIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for OpIndex {
    fn from(index: usize) -> Self {
        OpIndex(index as u32)
    }
}

/// Index of a derivation case at some operation (0-indexed).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CaseIndex(u32);

impl CaseIndex {
    /// Creates a new case index.
    pub fn new(index: u32) -> Self {
        CaseIndex(index)
    }

    /// Returns the raw index as a `u32`.
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CaseIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CaseIndex {
    fn from(index: u32) -> Self {
        CaseIndex(index)
    }
}

/// An indicator term `δ(case, op)`: "at operation `op`, case `case` was selected".
///
/// Deltas are ordered by operation first, then by case, so that a sorted list
/// of deltas holds at most one run per operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Delta {
    pub op: OpIndex,
    pub case: CaseIndex,
}

impl Delta {
    pub fn new(case: u32, op: u32) -> Self {
        Delta {
            op: OpIndex::new(op),
            case: CaseIndex::new(case),
        }
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "δ({},{})", self.case, self.op)
    }
}

impl From<(u32, u32)> for Delta {
    /// Builds a delta from a `(case, op)` pair.
    fn from((case, op): (u32, u32)) -> Self {
        Delta::new(case, op)
    }
}

/// How a variable entered the function scope.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum DeclKind {
    /// Formal parameter.
    Param,
    /// Local declaration.
    #[default]
    Local,
    /// Referenced but never declared (global, or missing from the front end's list).
    Free,
}

/// A named slot in the analyzed function. Identity is the name.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Variable {
    pub name: String,
    pub kind: DeclKind,
}

impl Variable {
    pub fn new(name: impl Into<String>, kind: DeclKind) -> Self {
        Variable { name: name.into(), kind }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Variable::new(name, DeclKind::Param)
    }

    pub fn local(name: impl Into<String>) -> Self {
        Variable::new(name, DeclKind::Local)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
