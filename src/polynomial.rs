//! Polynomials over the growth semiring.
//!
//! A polynomial is a finite sum of [`Monomial`]s. Polynomials are always kept
//! in normal form:
//!
//! - monomials with label `0` are dropped,
//! - monomials with equal delta lists are merged (labels are joined),
//! - a monomial is dropped when another one *subsumes* it, i.e. has a subset of
//!   its deltas and a label at least as large,
//! - the remaining monomials are sorted by their delta lists.
//!
//! Normalization commutes with both sum and product, so structural equality of
//! normal forms is a sound equality test for the fixpoint loop, and the
//! algebraic laws of the semiring carry over to polynomials.

use std::fmt;

use crate::monomial::Monomial;
use crate::semiring::{combine_choice, Label};
use crate::types::{Delta, OpIndex};

#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct Polynomial {
    monomials: Vec<Monomial>,
}

impl Polynomial {
    /// The empty sum.
    pub fn zero() -> Self {
        Polynomial { monomials: Vec::new() }
    }

    /// Unqualified polynomial with a single label.
    pub fn constant(label: Label) -> Self {
        Self::from_monomials([Monomial::new(label)])
    }

    /// Polynomial `Σₖ labels[k]·δ(k, op)`, one monomial per derivation case.
    pub fn from_cases(op: OpIndex, labels: &[Label]) -> Self {
        Self::from_monomials(labels.iter().enumerate().filter_map(|(case, &label)| {
            Monomial::with_deltas(label, [Delta::new(case as u32, op.id())])
        }))
    }

    pub fn from_monomials(monomials: impl IntoIterator<Item = Monomial>) -> Self {
        Polynomial {
            monomials: normalize(monomials.into_iter().collect()),
        }
    }

    pub fn monomials(&self) -> &[Monomial] {
        &self.monomials
    }

    pub fn len(&self) -> usize {
        self.monomials.len()
    }

    pub fn is_zero(&self) -> bool {
        self.monomials.is_empty()
    }

    /// The largest label over all monomials, regardless of their deltas.
    pub fn max_label(&self) -> Label {
        self.monomials.iter().map(|m| m.label).max().unwrap_or(Label::Zero)
    }

    pub fn add(&self, other: &Polynomial) -> Polynomial {
        if other.is_zero() {
            return self.clone();
        }
        if self.is_zero() {
            return other.clone();
        }
        let monomials = self.monomials.iter().chain(other.monomials.iter()).cloned().collect();
        Polynomial {
            monomials: normalize(monomials),
        }
    }

    pub fn times(&self, other: &Polynomial) -> Polynomial {
        if self.is_zero() || other.is_zero() {
            return Polynomial::zero();
        }
        if self.monomials.len() * other.monomials.len() > 1000 {
            log::debug!("large product: {} x {} monomials", self.len(), other.len());
        }
        let mut products = Vec::with_capacity(self.monomials.len() * other.monomials.len());
        for a in &self.monomials {
            for b in &other.monomials {
                if let Some(m) = a.times(b) {
                    products.push(m);
                }
            }
        }
        Polynomial {
            monomials: normalize(products),
        }
    }

    /// Multiplies every monomial by `delta`.
    pub fn qualify(&self, delta: Delta) -> Polynomial {
        Self::from_monomials(self.monomials.iter().filter_map(|m| m.qualify(delta)))
    }

    /// Rebuilds the polynomial with every monomial passed through `f`.
    pub fn map(&self, f: impl FnMut(&Monomial) -> Monomial) -> Polynomial {
        Self::from_monomials(self.monomials.iter().map(f))
    }

    /// Effective label under a full assignment (indexed by operation).
    pub fn eval(&self, assignment: &[u32]) -> Label {
        let mut result = Label::Zero;
        for m in &self.monomials {
            result = combine_choice(result, m.eval(assignment));
            if result.is_infinite() {
                break;
            }
        }
        result
    }

    /// Delta lists of all monomials carrying the given label.
    pub fn deltas_with_label(&self, label: Label) -> impl Iterator<Item = &[Delta]> + '_ {
        self.monomials
            .iter()
            .filter(move |m| m.label == label)
            .map(|m| m.deltas())
    }
}

fn normalize(mut monomials: Vec<Monomial>) -> Vec<Monomial> {
    monomials.retain(|m| !m.is_zero());
    if monomials.len() < 2 {
        return monomials;
    }

    // Merge equal delta lists.
    monomials.sort_by(|a, b| a.cmp_deltas(b));
    let mut merged: Vec<Monomial> = Vec::with_capacity(monomials.len());
    for m in monomials {
        match merged.last_mut() {
            Some(last) if last.deltas() == m.deltas() => {
                last.label = combine_choice(last.label, m.label);
            }
            _ => merged.push(m),
        }
    }

    // Drop subsumed monomials. A monomial can only be subsumed by one with
    // fewer deltas, so visiting by increasing length is enough.
    merged.sort_by(|a, b| a.deltas().len().cmp(&b.deltas().len()).then_with(|| a.cmp_deltas(b)));
    let mut result: Vec<Monomial> = Vec::with_capacity(merged.len());
    for m in merged {
        if !result.iter().any(|r| r.subsumes(&m)) {
            result.push(m);
        }
    }
    result.sort_by(|a, b| a.cmp_deltas(b));
    result
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.monomials.is_empty() {
            return write!(f, "0");
        }
        for (i, m) in self.monomials.iter().enumerate() {
            if i > 0 {
                write!(f, "+")?;
            }
            write!(f, "{}", m)?;
        }
        Ok(())
    }
}
