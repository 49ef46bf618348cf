//! # mwp-rs: growth-bound analysis with the mwp flow calculus
//!
//! **`mwp-rs`** analyzes imperative functions and derives, for every variable,
//! a symbolic bound on how fast its value can grow relative to the inputs.
//! Bounds are expressed with the ordered growth classes
//! `0 < m < w < p < i` (no flow, maximum, weak polynomial, polynomial,
//! infinite).
//!
//! ## How it works
//!
//! Every statement is compiled into a [`Relation`][crate::relation::Relation]:
//! a square matrix over the statement's variables whose entries are
//! polynomials of growth labels. Where the calculus admits several
//! derivations (an arithmetic assignment, a conditional), a fresh operation is
//! allocated in the [`ChoiceRegistry`][crate::registry::ChoiceRegistry] and
//! each monomial records the derivation case it depends on as an indicator
//! term `δ(case, op)`.
//!
//! - sequences compose relations (matrix product over the semiring),
//! - conditionals join them,
//! - loops take a fixpoint and then mark unbounded flows with `i`.
//!
//! Finally the [`choice`] solver looks for assignments of derivation cases
//! under which no `i` remains. If there is none, the function is unbounded.
//!
//! ## Basic Usage
//!
//! ```rust
//! use mwp_rs::analysis::analyze_function;
//! use mwp_rs::ast::{Expr, Function, Stmt};
//! use mwp_rs::config::AnalysisConfig;
//! use mwp_rs::semiring::Label;
//!
//! // void f(int x, int z) { int y = x + z; }
//! let f = Function::with_params(
//!     "f",
//!     &["x", "z"],
//!     vec![Stmt::decl("y", Some(Expr::add(Expr::var("x"), Expr::var("z"))))],
//! );
//!
//! let result = analyze_function(&f, &AnalysisConfig::default()).unwrap();
//! assert!(result.is_bounded());
//! assert_eq!(result.growth("x"), Some(Label::Max));
//! assert_eq!(result.growth("y"), Some(Label::Weak));
//! ```
//!
//! ## Core Components
//!
//! - **[`semiring`]**, **[`monomial`]**, **[`polynomial`]**: the label algebra.
//! - **[`relation`]**: matrices of polynomials, composition, fixpoints.
//! - **[`compiler`]**: statements to relations.
//! - **[`choice`]**: admissible derivation choices.
//! - **[`classify`]** and **[`analysis`]**: verdicts per function and per program.

pub mod analysis;
pub mod ast;
pub mod bound;
pub mod choice;
pub mod classify;
pub mod compiler;
pub mod config;
pub mod delta_graph;
pub mod error;
pub mod monomial;
pub mod polynomial;
pub mod registry;
pub mod relation;
pub mod semiring;
pub mod types;
