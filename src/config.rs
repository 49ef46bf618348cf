//! Analysis configuration.

/// Configuration options for the analysis of a function.
///
/// Use `AnalysisConfig::default()` for standard settings, and the `with_*`
/// methods to adjust individual options.
///
/// # Examples
///
/// ```
/// use mwp_rs::config::AnalysisConfig;
///
/// let config = AnalysisConfig::default()
///     .with_fin(true)
///     .with_max_fixpoint_iterations(50);
/// assert!(config.fin);
/// assert!(!config.strict);
/// ```
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AnalysisConfig {
    /// Always run to completion, even after the function is known to be
    /// unbounded (default: false)
    pub fin: bool,
    /// Reject functions containing unsupported syntax instead of skipping
    /// those statements (default: false)
    pub strict: bool,
    /// Cap on changing fixpoint steps per loop (default: 1000)
    pub max_fixpoint_iterations: usize,
    /// Cap on candidate choice vectors explored by the choice solver
    /// (default: 100000)
    pub max_choice_vectors: usize,
    /// Qualify each branch of a conditional by its own indicator term
    /// (default: true). When false, branches are joined plainly.
    pub branch_indicators: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fin: false,
            strict: false,
            max_fixpoint_iterations: 1000,
            max_choice_vectors: 100_000,
            branch_indicators: true,
        }
    }
}

impl AnalysisConfig {
    pub fn with_fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_max_fixpoint_iterations(mut self, iterations: usize) -> Self {
        self.max_fixpoint_iterations = iterations;
        self
    }

    pub fn with_max_choice_vectors(mut self, limit: usize) -> Self {
        self.max_choice_vectors = limit;
        self
    }

    pub fn with_branch_indicators(mut self, enabled: bool) -> Self {
        self.branch_indicators = enabled;
        self
    }
}
