//! Error types and non-fatal diagnostics.

use std::fmt;

use thiserror::Error;

/// Failure of the analysis of one function.
///
/// Unsupported syntax is normally recovered from (see [`Diagnostic`]); it only
/// surfaces as an error when the analysis runs in strict mode.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum AnalysisError {
    #[error("unsupported construct in '{function}': {construct}")]
    UnsupportedConstruct { function: String, construct: String },

    #[error("relations over different variable orderings: {left:?} vs {right:?}")]
    ScopeMismatch { left: Vec<String>, right: Vec<String> },

    #[error("fixpoint did not converge after {iterations} iterations")]
    FixpointDivergence { iterations: usize },

    #[error("choice search exceeded {limit} candidate vectors")]
    ChoiceExplosion { limit: usize },

    #[error("invalid summary for callee '{callee}': {reason}")]
    InvalidSummary { callee: String, reason: String },
}

impl AnalysisError {
    pub fn scope_mismatch(left: &[String], right: &[String]) -> Self {
        AnalysisError::ScopeMismatch {
            left: left.to_vec(),
            right: right.to_vec(),
        }
    }

    pub fn invalid_summary(callee: impl Into<String>, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidSummary {
            callee: callee.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// A construct the calculus does not cover, replaced by a no-op.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Diagnostic {
    /// Rendering of the offending statement or expression.
    pub construct: String,
    pub reason: String,
}

impl Diagnostic {
    pub fn unsupported(construct: impl Into<String>, reason: impl Into<String>) -> Self {
        Diagnostic {
            construct: construct.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported syntax `{}`: {}", self.construct, self.reason)
    }
}
