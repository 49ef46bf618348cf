//! Monomials: a growth label qualified by a product of indicator terms.
//!
//! A monomial `w·δ(0,1)·δ(2,4)` reads "weak-polynomial flow, provided case 0
//! is chosen at operation 1 and case 2 at operation 4". The deltas are kept
//! sorted by operation index and a monomial never holds two deltas for the
//! same operation: such a product denotes two incompatible derivations and
//! is zero.

use std::cmp::Ordering;
use std::fmt;

use crate::semiring::{combine_seq, Label};
use crate::types::{Delta, OpIndex};

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Monomial {
    pub label: Label,
    deltas: Vec<Delta>,
}

impl Monomial {
    /// Unqualified monomial.
    pub fn new(label: Label) -> Self {
        Monomial { label, deltas: Vec::new() }
    }

    /// Monomial qualified by the given deltas.
    ///
    /// Returns `None` if two deltas select different cases of the same operation.
    pub fn with_deltas(label: Label, deltas: impl IntoIterator<Item = Delta>) -> Option<Self> {
        let mut deltas: Vec<Delta> = deltas.into_iter().collect();
        deltas.sort();
        deltas.dedup();
        if deltas.windows(2).any(|w| w[0].op == w[1].op) {
            return None;
        }
        Some(Monomial { label, deltas })
    }

    pub fn deltas(&self) -> &[Delta] {
        &self.deltas
    }

    pub fn is_zero(&self) -> bool {
        self.label.is_zero()
    }

    /// Case selected at `op` by this monomial, if it is constrained.
    pub fn case_at(&self, op: OpIndex) -> Option<u32> {
        self.deltas
            .binary_search_by(|d| d.op.cmp(&op))
            .ok()
            .map(|i| self.deltas[i].case.id())
    }

    /// Product of two monomials.
    ///
    /// Returns `None` when the product is zero, either because a label is
    /// [`Label::Zero`] or because the deltas are incompatible.
    pub fn times(&self, other: &Monomial) -> Option<Monomial> {
        let label = combine_seq(self.label, other.label);
        if label.is_zero() {
            return None;
        }
        let deltas = merge_deltas(&self.deltas, &other.deltas)?;
        Some(Monomial { label, deltas })
    }

    /// Multiplies the monomial by a single delta.
    pub fn qualify(&self, delta: Delta) -> Option<Monomial> {
        let deltas = merge_deltas(&self.deltas, &[delta])?;
        Some(Monomial {
            label: self.label,
            deltas,
        })
    }

    /// Whether every delta of `self` also occurs in `other`.
    pub fn deltas_included_in(&self, other: &Monomial) -> bool {
        if self.deltas.len() > other.deltas.len() {
            return false;
        }
        let mut it = other.deltas.iter();
        'outer: for d in &self.deltas {
            for e in it.by_ref() {
                match e.cmp(d) {
                    Ordering::Less => continue,
                    Ordering::Equal => continue 'outer,
                    Ordering::Greater => return false,
                }
            }
            return false;
        }
        true
    }

    /// Whether `self` makes `other` redundant inside a sum.
    ///
    /// `self` is active under every assignment that activates `other`
    /// and contributes a label at least as large.
    pub fn subsumes(&self, other: &Monomial) -> bool {
        self.label >= other.label && self.deltas_included_in(other)
    }

    /// Whether the assignment (indexed by operation) satisfies every delta.
    ///
    /// Operations beyond the end of the assignment are unconstrained by it
    /// and therefore not satisfied.
    pub fn is_satisfied_by(&self, assignment: &[u32]) -> bool {
        self.deltas
            .iter()
            .all(|d| assignment.get(d.op.index()) == Some(&d.case.id()))
    }

    /// Label of the monomial under the assignment.
    pub fn eval(&self, assignment: &[u32]) -> Label {
        if self.is_satisfied_by(assignment) {
            self.label
        } else {
            Label::Zero
        }
    }

    /// Lexicographic order on delta lists, shorter prefix first.
    pub fn cmp_deltas(&self, other: &Monomial) -> Ordering {
        self.deltas.cmp(&other.deltas)
    }
}

fn merge_deltas(a: &[Delta], b: &[Delta]) -> Option<Vec<Delta>> {
    let mut result = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let (x, y) = (a[i], b[j]);
        match x.op.cmp(&y.op) {
            Ordering::Less => {
                result.push(x);
                i += 1;
            }
            Ordering::Greater => {
                result.push(y);
                j += 1;
            }
            Ordering::Equal => {
                if x.case != y.case {
                    return None;
                }
                result.push(x);
                i += 1;
                j += 1;
            }
        }
    }
    result.extend_from_slice(&a[i..]);
    result.extend_from_slice(&b[j..]);
    Some(result)
}

impl fmt::Display for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)?;
        for d in &self.deltas {
            write!(f, ".{}", d)?;
        }
        Ok(())
    }
}
