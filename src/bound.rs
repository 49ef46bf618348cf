//! Symbolic bounds read off a relation evaluated under one assignment.
//!
//! For a target variable `x`, the column of `x` in the evaluated matrix
//! sorts every source variable into the class of its flow. The bound has the
//! shape of the calculus' honest polynomial
//!
//! ```text
//! x' ≤ max(x̄, p(ȳ)) + q(z̄)
//! ```
//!
//! where `x̄` are the `m` sources, `ȳ` the `w` sources and `z̄` the `p` sources.
//! Empty groups are left out, so a weak-only bound reads `p(ȳ)`.

use std::fmt;

use crate::relation::LabelMatrix;
use crate::semiring::Label;

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Bound {
    pub max: Vec<String>,
    pub weak: Vec<String>,
    pub poly: Vec<String>,
}

impl Bound {
    /// Reads the bound of column `dst`; `None` if an `i` flows into it.
    pub fn from_column(matrix: &LabelMatrix, dst: usize) -> Option<Bound> {
        let mut bound = Bound::default();
        for (i, name) in matrix.variables.iter().enumerate() {
            match matrix.get(i, dst) {
                Label::Zero => {}
                Label::Max => bound.max.push(name.clone()),
                Label::Weak => bound.weak.push(name.clone()),
                Label::Poly => bound.poly.push(name.clone()),
                Label::Infinite => return None,
            }
        }
        Some(bound)
    }

    /// Most severe class of the bound.
    pub fn class(&self) -> Label {
        if !self.poly.is_empty() {
            Label::Poly
        } else if !self.weak.is_empty() {
            Label::Weak
        } else if !self.max.is_empty() {
            Label::Max
        } else {
            Label::Zero
        }
    }

    /// Bound by a constant.
    pub fn is_constant(&self) -> bool {
        self.max.is_empty() && self.weak.is_empty() && self.poly.is_empty()
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_constant() {
            return write!(f, "0");
        }
        let weak = format!("p({})", self.weak.join(","));
        let mut terms = Vec::new();
        if !self.max.is_empty() {
            let mut inner = self.max.clone();
            if !self.weak.is_empty() {
                inner.push(weak);
            }
            terms.push(format!("max({})", inner.join(",")));
        } else if !self.weak.is_empty() {
            terms.push(weak);
        }
        if !self.poly.is_empty() {
            terms.push(format!("q({})", self.poly.join(",")));
        }
        write!(f, "{}", terms.join(" + "))
    }
}
