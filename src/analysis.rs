//! Entry points: analysis of one function, of a whole program, and of the
//! loops of a function taken one at a time.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::ast::{Function, Program, Stmt};
use crate::bound::Bound;
use crate::choice::Choices;
use crate::classify::{Classifier, VariableBound, Verdict};
use crate::compiler::{StatementCompiler, SummaryProvider};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Diagnostic, Result};
use crate::relation::Relation;
use crate::semiring::Label;

/// Outcome of the analysis of one function.
#[derive(Debug, Clone)]
pub struct FunctionResult {
    pub name: String,
    /// Variable ordering of every relation of the function.
    pub variables: Vec<String>,
    pub verdict: Verdict,
    /// Number of derivation operations allocated.
    pub operations: usize,
    pub diagnostics: Vec<Diagnostic>,
    /// The compiler stopped as soon as every choice was known to be infinite.
    pub early_exit: bool,
    pub elapsed: Duration,
}

impl FunctionResult {
    pub fn is_bounded(&self) -> bool {
        self.verdict.is_bounded()
    }

    /// Admissible choices of a bounded function.
    pub fn choices(&self) -> Option<&Choices> {
        match &self.verdict {
            Verdict::Bounded(b) => Some(&b.choices),
            Verdict::Unbounded(_) => None,
        }
    }

    /// Least growth class of `variable` in a bounded function.
    pub fn growth(&self, variable: &str) -> Option<Label> {
        match &self.verdict {
            Verdict::Bounded(b) => b.variables.iter().find(|v| v.name == variable).map(|v| v.growth),
            Verdict::Unbounded(_) => None,
        }
    }

    /// Bound of `variable` under the reported assignment.
    pub fn bound(&self, variable: &str) -> Option<&Bound> {
        match &self.verdict {
            Verdict::Bounded(b) => b.variables.iter().find(|v| v.name == variable).map(|v| &v.bound),
            Verdict::Unbounded(_) => None,
        }
    }
}

/// Results of a batch, in program order.
#[derive(Debug, Default)]
pub struct ProgramResult {
    pub functions: Vec<FunctionResult>,
    /// Functions whose analysis failed, with the reason.
    pub errors: Vec<(String, AnalysisError)>,
}

impl ProgramResult {
    pub fn get(&self, name: &str) -> Option<&FunctionResult> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn bounded(&self) -> impl Iterator<Item = &FunctionResult> + '_ {
        self.functions.iter().filter(|f| f.is_bounded())
    }
}

/// Outcome of the analysis of one loop on its own.
#[derive(Debug, Clone)]
pub struct LoopResult {
    /// The loop, rendered as source.
    pub source: String,
    pub variables: Vec<String>,
    /// Some choice bounds every variable at once.
    pub bounded: bool,
    /// Per variable, its growth and bound, or `None` when it fails or
    /// depends on a failing variable.
    pub verdicts: Vec<(String, Option<VariableBound>)>,
    pub diagnostics: Vec<Diagnostic>,
    pub elapsed: Duration,
}

impl LoopResult {
    fn verdict(&self, variable: &str) -> Option<&VariableBound> {
        self.verdicts
            .iter()
            .find(|(name, _)| name == variable)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn growth(&self, variable: &str) -> Option<Label> {
        self.verdict(variable).map(|v| v.growth)
    }

    pub fn bound(&self, variable: &str) -> Option<&Bound> {
        self.verdict(variable).map(|v| &v.bound)
    }
}

/// Loop results of one function, in source order.
#[derive(Debug, Clone)]
pub struct FunctionLoops {
    pub name: String,
    pub loops: Vec<LoopResult>,
}

/// Runs the analysis with a fixed configuration and optional callee summaries.
pub struct Analyzer<'a> {
    config: AnalysisConfig,
    summaries: Option<&'a dyn SummaryProvider>,
}

impl<'a> Analyzer<'a> {
    pub fn new(config: AnalysisConfig) -> Self {
        Analyzer { config, summaries: None }
    }

    pub fn with_summaries(mut self, summaries: &'a dyn SummaryProvider) -> Self {
        self.summaries = Some(summaries);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn analyze_function(&self, function: &Function) -> Result<FunctionResult> {
        info!("Analyzing function '{}'", function.name);
        let start = Instant::now();

        let mut compiler = StatementCompiler::new(&self.config);
        if let Some(summaries) = self.summaries {
            compiler = compiler.with_summaries(summaries);
        }
        let compilation = compiler.compile_function(function)?;
        debug!(
            "Compiled '{}': {} variables, {} operations",
            function.name,
            compilation.relation.len(),
            compilation.registry.len()
        );

        let classifier = Classifier::new(
            &compilation.relation,
            &compilation.registry,
            self.config.max_choice_vectors,
        );
        let verdict = if compilation.complete {
            classifier.classify(&compilation.delta_graph)?
        } else {
            classifier.unbounded_early()
        };

        let elapsed = start.elapsed();
        if verdict.is_bounded() {
            info!("Function '{}' is bounded ({:.2?})", function.name, elapsed);
        } else {
            info!("Function '{}' is unbounded ({:.2?})", function.name, elapsed);
        }

        Ok(FunctionResult {
            name: function.name.clone(),
            variables: compilation.relation.variables().to_vec(),
            verdict,
            operations: compilation.registry.len(),
            diagnostics: compilation.diagnostics,
            early_exit: compilation.early_exit,
            elapsed,
        })
    }

    /// Analyzes every loop of `function` as a unit of its own, nested loops
    /// included. Each loop is compiled to the end; in strict mode loops with
    /// unsupported constructs are left out.
    pub fn analyze_loops(&self, function: &Function) -> Result<FunctionLoops> {
        info!("Analyzing loops of '{}'", function.name);
        let mut loops = Vec::new();
        for stmt in function.loops() {
            if self.config.strict {
                let survey = StatementCompiler::new(&self.config);
                if !survey.unsupported_constructs(std::slice::from_ref(stmt))?.is_empty() {
                    debug!("Leaving out unsupported loop `{}`", stmt);
                    continue;
                }
            }
            loops.push(self.inspect_loop(stmt)?);
        }
        debug!("Analyzed {} loops of '{}'", loops.len(), function.name);
        Ok(FunctionLoops {
            name: function.name.clone(),
            loops,
        })
    }

    fn inspect_loop(&self, stmt: &Stmt) -> Result<LoopResult> {
        let start = Instant::now();
        let mut variables = Vec::new();
        stmt.collect_variables(&mut variables);

        let config = self.config.clone().with_fin(true);
        let mut compiler = StatementCompiler::new(&config);
        if let Some(summaries) = self.summaries {
            compiler = compiler.with_summaries(summaries);
        }
        let step = compiler.compile(stmt)?;
        let relation = Relation::identity(&variables).compose(&step.relation);

        let classifier = Classifier::new(&relation, compiler.registry(), config.max_choice_vectors);
        let (bounded, verdicts) = match classifier.classify(compiler.delta_graph())? {
            Verdict::Bounded(b) => (
                true,
                b.variables.into_iter().map(|v| (v.name.clone(), Some(v))).collect(),
            ),
            Verdict::Unbounded(u) => (false, u.variables),
        };

        let elapsed = start.elapsed();
        info!(
            "Loop `{}` is {} ({:.2?})",
            stmt,
            if bounded { "bounded" } else { "unbounded" },
            elapsed
        );
        Ok(LoopResult {
            source: stmt.to_string(),
            variables: relation.variables().to_vec(),
            bounded,
            verdicts,
            diagnostics: compiler.diagnostics().to_vec(),
            elapsed,
        })
    }

    /// Analyzes every function independently, in parallel.
    ///
    /// A failing function does not stop the others.
    pub fn analyze_program(&self, program: &Program) -> ProgramResult {
        info!("Analyzing {} functions", program.functions.len());
        let outcomes: Vec<(String, Result<FunctionResult>)> = program
            .functions
            .par_iter()
            .map(|f| (f.name.clone(), self.analyze_function(f)))
            .collect();

        let mut result = ProgramResult::default();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(r) => result.functions.push(r),
                Err(e) => {
                    warn!("Analysis of '{}' failed: {}", name, e);
                    result.errors.push((name, e));
                }
            }
        }
        result
    }
}

/// Analyzes one function without callee summaries.
pub fn analyze_function(function: &Function, config: &AnalysisConfig) -> Result<FunctionResult> {
    Analyzer::new(config.clone()).analyze_function(function)
}

/// Analyzes every loop of `function` without callee summaries.
pub fn analyze_loops(function: &Function, config: &AnalysisConfig) -> Result<FunctionLoops> {
    Analyzer::new(config.clone()).analyze_loops(function)
}

/// Analyzes every function of `program` without callee summaries.
pub fn analyze_program(program: &Program, config: &AnalysisConfig) -> ProgramResult {
    Analyzer::new(config.clone()).analyze_program(program)
}
