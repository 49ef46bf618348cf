//! Indexed relations: square matrices of polynomials over a variable ordering.
//!
//! `matrix[i][j]` describes how the value of variable `i` *before* the
//! fragment flows into the value of variable `j` *after* it (row = source,
//! column = target). An empty polynomial means no flow.
//!
//! Relations over different orderings are brought onto a common ordering by
//! [`Relation::homogenize`], which pads missing rows and columns with the
//! identity. The plain [`compose`][Relation::compose] and
//! [`join`][Relation::join] entry points homogenize automatically; their
//! `_aligned` counterparts reject mismatched orderings instead.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use log::debug;

use crate::delta_graph::DeltaGraph;
use crate::error::{AnalysisError, Result};
use crate::monomial::Monomial;
use crate::polynomial::Polynomial;
use crate::semiring::Label;
use crate::types::Delta;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Relation {
    variables: Vec<String>,
    matrix: Vec<Vec<Polynomial>>,
}

impl Relation {
    /// Relation with no flow at all.
    pub fn zero<S: AsRef<str>>(variables: &[S]) -> Self {
        let variables: Vec<String> = variables.iter().map(|v| v.as_ref().to_string()).collect();
        let n = variables.len();
        Relation {
            variables,
            matrix: vec![vec![Polynomial::zero(); n]; n],
        }
    }

    /// Every variable keeps its value: `m` on the diagonal.
    pub fn identity<S: AsRef<str>>(variables: &[S]) -> Self {
        let mut rel = Self::zero(variables);
        for i in 0..rel.len() {
            rel.matrix[i][i] = Polynomial::constant(Label::Max);
        }
        rel
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == name)
    }

    pub fn get(&self, src: usize, dst: usize) -> &Polynomial {
        &self.matrix[src][dst]
    }

    pub fn set(&mut self, src: usize, dst: usize, value: Polynomial) {
        self.matrix[src][dst] = value;
    }

    /// Entry by variable names, if both are in scope.
    pub fn entry(&self, src: &str, dst: &str) -> Option<&Polynomial> {
        Some(self.get(self.index_of(src)?, self.index_of(dst)?))
    }

    /// Column of a target variable.
    pub fn column(&self, dst: usize) -> impl Iterator<Item = &Polynomial> + '_ {
        self.matrix.iter().map(move |row| &row[dst])
    }

    /// Replaces the whole column of `dst`.
    ///
    /// # Panics
    ///
    /// Panics if the column length does not match the relation size.
    pub fn replace_column(&mut self, dst: usize, column: Vec<Polynomial>) {
        assert_eq!(column.len(), self.len(), "Column length must match relation size");
        for (row, value) in self.matrix.iter_mut().zip(column) {
            row[dst] = value;
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Relation::identity(&self.variables)
    }

    /// Union of two orderings: `a` first, then the names of `b` missing from `a`.
    pub fn union_variables(a: &[String], b: &[String]) -> Vec<String> {
        let mut result = a.to_vec();
        let seen: HashSet<&String> = a.iter().collect();
        result.extend(b.iter().filter(|v| !seen.contains(v)).cloned());
        result
    }

    /// Re-indexes the relation onto `variables`, a superset of its own
    /// variables; new rows and columns are identity.
    pub fn homogenize<S: AsRef<str>>(&self, variables: &[S]) -> Result<Relation> {
        let target: Vec<String> = variables.iter().map(|v| v.as_ref().to_string()).collect();
        if self.variables.iter().any(|v| !target.contains(v)) {
            return Err(AnalysisError::scope_mismatch(&self.variables, &target));
        }
        Ok(self.extend_to(&target))
    }

    fn extend_to(&self, target: &[String]) -> Relation {
        if self.variables == target {
            return self.clone();
        }
        let positions: Vec<Option<usize>> = target.iter().map(|v| self.index_of(v)).collect();
        let mut rel = Relation::identity(target);
        for (i, pi) in positions.iter().enumerate() {
            let Some(pi) = *pi else { continue };
            for (j, pj) in positions.iter().enumerate() {
                let Some(pj) = *pj else { continue };
                rel.matrix[i][j] = self.matrix[pi][pj].clone();
            }
        }
        rel
    }

    fn check_aligned(&self, other: &Relation) -> Result<()> {
        if self.variables != other.variables {
            return Err(AnalysisError::scope_mismatch(&self.variables, &other.variables));
        }
        Ok(())
    }

    /// Sequential composition over the same ordering: `self` then `other`.
    pub fn compose_aligned(&self, other: &Relation) -> Result<Relation> {
        self.check_aligned(other)?;
        Ok(self.product(other))
    }

    /// Sequential composition, homogenizing both sides to the union ordering.
    pub fn compose(&self, other: &Relation) -> Relation {
        let variables = Self::union_variables(&self.variables, &other.variables);
        self.extend_to(&variables).product(&other.extend_to(&variables))
    }

    fn product(&self, other: &Relation) -> Relation {
        let n = self.len();
        let mut matrix = vec![vec![Polynomial::zero(); n]; n];
        for (i, row) in matrix.iter_mut().enumerate() {
            for j in 0..n {
                let a = &self.matrix[i][j];
                if a.is_zero() {
                    continue;
                }
                for (k, cell) in row.iter_mut().enumerate() {
                    let b = &other.matrix[j][k];
                    if b.is_zero() {
                        continue;
                    }
                    *cell = cell.add(&a.times(b));
                }
            }
        }
        Relation {
            variables: self.variables.clone(),
            matrix,
        }
    }

    /// Entrywise sum over the same ordering.
    pub fn join_aligned(&self, other: &Relation) -> Result<Relation> {
        self.check_aligned(other)?;
        Ok(self.sum(other))
    }

    /// Entrywise sum, homogenizing both sides to the union ordering.
    pub fn join(&self, other: &Relation) -> Relation {
        let variables = Self::union_variables(&self.variables, &other.variables);
        self.extend_to(&variables).sum(&other.extend_to(&variables))
    }

    fn sum(&self, other: &Relation) -> Relation {
        let matrix = self
            .matrix
            .iter()
            .zip(&other.matrix)
            .map(|(r1, r2)| r1.iter().zip(r2).map(|(a, b)| a.add(b)).collect())
            .collect();
        Relation {
            variables: self.variables.clone(),
            matrix,
        }
    }

    /// Multiplies every entry by `delta`.
    pub fn qualify(&self, delta: Delta) -> Relation {
        Relation {
            variables: self.variables.clone(),
            matrix: self
                .matrix
                .iter()
                .map(|row| row.iter().map(|p| p.qualify(delta)).collect())
                .collect(),
        }
    }

    /// Reflexive-transitive closure: iterates `R ← R ⊕ R·self` from the
    /// identity until nothing changes.
    ///
    /// At most `max_iterations` changing steps are taken; the closing step
    /// that confirms convergence is not counted.
    pub fn fixpoint(&self, max_iterations: usize) -> Result<Relation> {
        let mut current = Relation::identity(&self.variables);
        let mut iterations = 0;
        loop {
            let next = current.sum(&current.product(self));
            if next == current {
                break;
            }
            if iterations >= max_iterations {
                log::warn!("Fixpoint did not converge after {} iterations", iterations);
                return Err(AnalysisError::FixpointDivergence { iterations });
            }
            current = next;
            iterations += 1;
        }
        debug!("Fixpoint converged after {} iterations", iterations);
        Ok(current)
    }

    /// Correction for unbounded iteration (`while`).
    ///
    /// Every `p` monomial, and every `w` monomial on the diagonal, becomes
    /// `i`; the deltas of each such monomial are recorded in `dg`.
    pub fn while_correction(&mut self, dg: &mut DeltaGraph) {
        for (i, row) in self.matrix.iter_mut().enumerate() {
            for (j, poly) in row.iter_mut().enumerate() {
                let needs_fix = poly
                    .monomials()
                    .iter()
                    .any(|m| m.label == Label::Poly || (i == j && m.label == Label::Weak));
                if !needs_fix {
                    continue;
                }
                *poly = poly.map(|m| {
                    if m.label == Label::Poly || (i == j && m.label == Label::Weak) {
                        dg.insert(m.deltas());
                        make_infinite(m)
                    } else {
                        m.clone()
                    }
                });
            }
        }
    }

    /// Correction for iteration bounded by the value of `x` (`loop x { … }`).
    ///
    /// Diagonal `p` monomials become `i` (recorded in `dg`). Then, for every
    /// target column carrying a `w` or `p` monomial, a `p` monomial with the
    /// same deltas is added to the flow from `x`.
    ///
    /// # Panics
    ///
    /// Panics if `x` is not in scope.
    pub fn loop_correction(&mut self, x: &str, dg: &mut DeltaGraph) {
        let xi = self
            .index_of(x)
            .unwrap_or_else(|| panic!("Loop variable '{}' must be in scope", x));

        for i in 0..self.len() {
            let poly = &self.matrix[i][i];
            if !poly.monomials().iter().any(|m| m.label == Label::Poly) {
                continue;
            }
            self.matrix[i][i] = poly.map(|m| {
                if m.label == Label::Poly {
                    dg.insert(m.deltas());
                    make_infinite(m)
                } else {
                    m.clone()
                }
            });
        }

        for j in 0..self.len() {
            let extra: Vec<Monomial> = self
                .column(j)
                .flat_map(|p| p.monomials())
                .filter(|m| m.label == Label::Weak || m.label == Label::Poly)
                .map(|m| {
                    let mut m = m.clone();
                    m.label = Label::Poly;
                    m
                })
                .collect();
            if extra.is_empty() {
                continue;
            }
            let added = Polynomial::from_monomials(extra);
            self.matrix[xi][j] = self.matrix[xi][j].add(&added);
        }
    }

    /// Delta lists of all `i` monomials.
    pub fn infinite_paths(&self) -> BTreeSet<Vec<Delta>> {
        self.matrix
            .iter()
            .flatten()
            .flat_map(|p| p.deltas_with_label(Label::Infinite))
            .map(|d| d.to_vec())
            .collect()
    }

    /// Delta lists of the monomials of column `dst` whose label is at least `min`.
    pub fn column_paths_at_least(&self, dst: usize, min: Label) -> BTreeSet<Vec<Delta>> {
        self.column(dst)
            .flat_map(|p| p.monomials())
            .filter(|m| m.label >= min)
            .map(|m| m.deltas().to_vec())
            .collect()
    }

    /// Pairs `(src, dst)` with an `i` monomial, restricted to the given targets.
    pub fn infinite_flows(&self, targets: &[String]) -> Vec<(String, String)> {
        let mut flows = Vec::new();
        for (i, row) in self.matrix.iter().enumerate() {
            for (j, poly) in row.iter().enumerate() {
                if !targets.contains(&self.variables[j]) {
                    continue;
                }
                if poly.monomials().iter().any(|m| m.label.is_infinite()) {
                    flows.push((self.variables[i].clone(), self.variables[j].clone()));
                }
            }
        }
        flows
    }

    /// Evaluates every entry under a full assignment (indexed by operation).
    pub fn apply_choice(&self, assignment: &[u32]) -> LabelMatrix {
        LabelMatrix {
            variables: self.variables.clone(),
            labels: self
                .matrix
                .iter()
                .map(|row| row.iter().map(|p| p.eval(assignment)).collect())
                .collect(),
        }
    }

    /// Renames variables; returns `None` if two variables end up with the same name.
    pub fn rename(&self, mut f: impl FnMut(&str) -> String) -> Option<Relation> {
        let variables: Vec<String> = self.variables.iter().map(|v| f(v)).collect();
        let unique: HashSet<&String> = variables.iter().collect();
        if unique.len() != variables.len() {
            return None;
        }
        Some(Relation {
            variables,
            matrix: self.matrix.clone(),
        })
    }
}

fn make_infinite(m: &Monomial) -> Monomial {
    let mut m = m.clone();
    m.label = Label::Infinite;
    m
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.variables.iter().map(|v| v.len()).max().unwrap_or(0);
        for (i, row) in self.matrix.iter().enumerate() {
            write!(f, "{:>width$} |", self.variables[i], width = width)?;
            for poly in row {
                write!(f, " {}", poly)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// A relation evaluated under one choice assignment: plain labels.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LabelMatrix {
    pub variables: Vec<String>,
    pub labels: Vec<Vec<Label>>,
}

impl LabelMatrix {
    pub fn get(&self, src: usize, dst: usize) -> Label {
        self.labels[src][dst]
    }

    /// Most severe label flowing into `dst`.
    pub fn column_max(&self, dst: usize) -> Label {
        self.labels.iter().map(|row| row[dst]).max().unwrap_or(Label::Zero)
    }

    pub fn has_infinite(&self) -> bool {
        self.labels.iter().flatten().any(|l| l.is_infinite())
    }
}

impl fmt::Display for LabelMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.variables.iter().map(|v| v.len()).max().unwrap_or(0);
        for (i, row) in self.labels.iter().enumerate() {
            write!(f, "{:>width$} |", self.variables[i], width = width)?;
            for label in row {
                write!(f, " {}", label)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
