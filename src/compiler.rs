//! Statement compiler: from statements to relations.
//!
//! Each statement compiles to a [`Relation`] over the variables it touches.
//! Sequences compose, conditionals join, and loops are closed by a fixpoint
//! followed by a loop correction. Arithmetic assignments and conditionals
//! allocate operations in the [`ChoiceRegistry`]; their derivation cases
//! appear as deltas in the produced monomials.
//!
//! Constructs outside the calculus are replaced by the identity and reported
//! as [`Diagnostic`]s. In strict mode they reject the whole function instead.
//!
//! # Assignments
//!
//! | right-hand side               | flow into `x`                              |
//! |-------------------------------|--------------------------------------------|
//! | constant, `!y`, `sizeof y`    | none                                       |
//! | `y`, `+y`                     | `m` from `y`                               |
//! | `y ± c`, `y * c`, `-y`, `y++` | `m` from `y` in all three cases            |
//! | `y * z`                       | `w` from both in all three cases           |
//! | `v₁ + … + vₙ`                 | case `k`: `m` from `vₖ`, `p` from the rest; case `n`: `w` from all |

use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};

use crate::ast::{BinOp, Expr, Function, NaryOp, Stmt, UnaryOp};
use crate::config::AnalysisConfig;
use crate::delta_graph::DeltaGraph;
use crate::error::{AnalysisError, Diagnostic, Result};
use crate::polynomial::Polynomial;
use crate::registry::{ChoiceRegistry, OperationKind};
use crate::relation::Relation;
use crate::semiring::Label;
use crate::types::Delta;

/// Precomputed relation of a callee.
///
/// The relation ranges over the formal parameters and, optionally, a return
/// slot `ret`, which stands for the returned value.
#[derive(Debug, Clone)]
pub struct FunctionSummary {
    pub params: Vec<String>,
    pub ret: Option<String>,
    pub relation: Relation,
}

impl FunctionSummary {
    pub fn new(params: Vec<String>, ret: Option<String>, relation: Relation) -> Self {
        FunctionSummary { params, ret, relation }
    }
}

/// Source of callee summaries, shared by all functions of a batch.
pub trait SummaryProvider: Sync {
    fn summary(&self, callee: &str) -> Option<&FunctionSummary>;
}

impl SummaryProvider for HashMap<String, FunctionSummary> {
    fn summary(&self, callee: &str) -> Option<&FunctionSummary> {
        self.get(callee)
    }
}

/// Relation of one statement.
#[derive(Debug, Clone)]
pub struct Step {
    pub relation: Relation,
    /// Every choice is already known to be infinite.
    pub exit: bool,
}

impl Step {
    fn new(relation: Relation) -> Self {
        Step { relation, exit: false }
    }

    fn noop() -> Self {
        Step::new(Relation::identity::<String>(&[]))
    }
}

/// Everything the compiler produced for one function.
#[derive(Debug, Clone)]
pub struct Compilation {
    /// Relation of the whole body; partial if `early_exit` stopped the compiler.
    pub relation: Relation,
    pub registry: ChoiceRegistry,
    pub delta_graph: DeltaGraph,
    pub diagnostics: Vec<Diagnostic>,
    pub early_exit: bool,
    /// Whether every statement was compiled.
    pub complete: bool,
}

enum AssignForm<'e> {
    /// `x = x`
    Skip,
    Constant,
    Copy(&'e str),
    Arith { product: bool, operands: Vec<&'e str> },
}

enum Effect<'e> {
    Nothing,
    Assign(&'e str, AssignForm<'e>),
    Call {
        target: Option<&'e str>,
        callee: &'e str,
        args: &'e [Expr],
    },
}

enum CallForm {
    Ignored,
    Relation(Relation),
    Unsupported(String),
}

const IGNORED_CALLS: [&str; 2] = ["assert", "assume"];

fn atom(expr: &Expr) -> std::result::Result<Option<&str>, String> {
    match expr.strip_casts() {
        Expr::Const(_) => Ok(None),
        Expr::Var(name) => Ok(Some(name.as_str())),
        e => Err(format!("nested expression `{}`", e)),
    }
}

fn assign_form<'e>(target: &str, value: &'e Expr) -> std::result::Result<AssignForm<'e>, String> {
    match value.strip_casts() {
        Expr::Const(_) => Ok(AssignForm::Constant),
        Expr::Var(y) if y == target => Ok(AssignForm::Skip),
        Expr::Var(y) => Ok(AssignForm::Copy(y.as_str())),
        Expr::Unary(op, inner) => {
            match op {
                UnaryOp::Not | UnaryOp::SizeOf => return Ok(AssignForm::Constant),
                UnaryOp::AddrOf | UnaryOp::Deref => return Err("pointer operation".to_string()),
                UnaryOp::BitNot => return Err("bitwise operator `~`".to_string()),
                _ => {}
            }
            let Some(y) = atom(inner)? else {
                return Ok(AssignForm::Constant);
            };
            match op {
                UnaryOp::Plus if y == target => Ok(AssignForm::Skip),
                UnaryOp::Plus => Ok(AssignForm::Copy(y)),
                UnaryOp::Neg => Ok(AssignForm::Arith {
                    product: true,
                    operands: vec![y],
                }),
                _ => Ok(AssignForm::Arith {
                    product: false,
                    operands: vec![y],
                }),
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let product = match op {
                BinOp::Add | BinOp::Sub => false,
                BinOp::Mul => true,
                op => return Err(format!("operator `{}`", op.symbol())),
            };
            let operands: Vec<&str> = [atom(lhs)?, atom(rhs)?].into_iter().flatten().collect();
            Ok(arith(product, operands))
        }
        Expr::Nary(op, args) => {
            let mut operands = Vec::new();
            for a in args {
                if let Some(v) = atom(a)? {
                    operands.push(v);
                }
            }
            Ok(arith(*op == NaryOp::Product, operands))
        }
        Expr::Call(..) => Err("call nested in an expression".to_string()),
        Expr::Cast(_) | Expr::Opaque(_) => Err("expression outside the calculus".to_string()),
    }
}

fn arith(product: bool, operands: Vec<&str>) -> AssignForm<'_> {
    if operands.is_empty() {
        AssignForm::Constant
    } else {
        AssignForm::Arith { product, operands }
    }
}

fn assign_effect<'e>(target: &'e str, value: &'e Expr) -> std::result::Result<Effect<'e>, String> {
    match value.strip_casts() {
        Expr::Call(callee, args) => Ok(Effect::Call {
            target: Some(target),
            callee,
            args,
        }),
        _ => Ok(Effect::Assign(target, assign_form(target, value)?)),
    }
}

/// Effect of an expression evaluated for its side effects.
fn expr_effect(expr: &Expr) -> std::result::Result<Effect<'_>, String> {
    match expr.strip_casts() {
        Expr::Const(_) | Expr::Var(_) => Ok(Effect::Nothing),
        Expr::Unary(op, inner) if op.is_inc_dec() => match atom(inner)? {
            Some(x) => Ok(Effect::Assign(
                x,
                AssignForm::Arith {
                    product: false,
                    operands: vec![x],
                },
            )),
            None => Ok(Effect::Nothing),
        },
        Expr::Unary(..) => Ok(Effect::Nothing),
        Expr::Call(callee, args) => Ok(Effect::Call {
            target: None,
            callee,
            args,
        }),
        e => Err(format!("expression statement `{}`", e)),
    }
}

/// Label of operand occurrence `k` (out of `n`) in derivation case `case`.
fn occurrence_label(product: bool, n: usize, k: usize, case: usize) -> Label {
    if n == 1 {
        Label::Max
    } else if product || case == n {
        Label::Weak
    } else if case == k {
        Label::Max
    } else {
        Label::Poly
    }
}

pub struct StatementCompiler<'a> {
    config: &'a AnalysisConfig,
    summaries: Option<&'a dyn SummaryProvider>,
    registry: ChoiceRegistry,
    delta_graph: DeltaGraph,
    diagnostics: Vec<Diagnostic>,
    /// Number of enclosing loop bodies.
    loop_depth: usize,
}

impl<'a> StatementCompiler<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        StatementCompiler {
            config,
            summaries: None,
            registry: ChoiceRegistry::new(),
            delta_graph: DeltaGraph::new(),
            diagnostics: Vec::new(),
            loop_depth: 0,
        }
    }

    pub fn with_summaries(mut self, summaries: &'a dyn SummaryProvider) -> Self {
        self.summaries = Some(summaries);
        self
    }

    pub fn registry(&self) -> &ChoiceRegistry {
        &self.registry
    }

    pub fn delta_graph(&self) -> &DeltaGraph {
        &self.delta_graph
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Compiles the body of `function`, starting from the identity over its
    /// whole scope.
    pub fn compile_function(mut self, function: &Function) -> Result<Compilation> {
        let scope: Vec<String> = function.scope().into_iter().map(|v| v.name).collect();

        if self.config.strict {
            if let Some(d) = self.unsupported_constructs(&function.body)?.into_iter().next() {
                warn!("Rejecting '{}': {}", function.name, d);
                return Err(AnalysisError::UnsupportedConstruct {
                    function: function.name.clone(),
                    construct: d.construct,
                });
            }
        }

        let mut relation = Relation::identity(&scope);
        let mut early_exit = false;
        for stmt in &function.body {
            let step = self.compile(stmt)?;
            relation = relation.compose(&step.relation);
            if step.exit {
                early_exit = true;
                if !self.config.fin {
                    break;
                }
            }
        }
        let complete = self.config.fin || !early_exit;

        Ok(Compilation {
            relation,
            registry: self.registry,
            delta_graph: self.delta_graph,
            diagnostics: self.diagnostics,
            early_exit,
            complete,
        })
    }

    /// Compiles one statement.
    pub fn compile(&mut self, stmt: &Stmt) -> Result<Step> {
        match stmt {
            Stmt::Assign { target, value } => match assign_effect(target, value) {
                Ok(effect) => self.compile_effect(stmt, effect),
                Err(reason) => Ok(self.unsupported(stmt, reason)),
            },
            Stmt::Decl { name, init: Some(value) } => match assign_effect(name, value) {
                Ok(effect) => self.compile_effect(stmt, effect),
                Err(reason) => Ok(self.unsupported(stmt, reason)),
            },
            Stmt::Expr(expr) => match expr_effect(expr) {
                Ok(effect) => self.compile_effect(stmt, effect),
                Err(reason) => Ok(self.unsupported(stmt, reason)),
            },
            Stmt::Block(stmts) => self.compile_block(stmts),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.compile_if(cond, then_branch, else_branch.as_deref()),
            Stmt::While { cond, body } | Stmt::DoWhile { body, cond } => self.compile_while(cond, body),
            Stmt::Loop { bound, body } => {
                if body.assigned_variables().contains(bound) {
                    return Ok(self.unsupported(stmt, format!("loop bound `{}` is modified by the body", bound)));
                }
                self.compile_loop(bound, body)
            }
            Stmt::Decl { init: None, .. }
            | Stmt::Return(_)
            | Stmt::Break
            | Stmt::Continue
            | Stmt::Empty => Ok(Step::noop()),
            Stmt::Opaque(_) => Ok(self.unsupported(stmt, "statement outside the calculus")),
        }
    }

    fn compile_block(&mut self, stmts: &[Stmt]) -> Result<Step> {
        let mut relation = Relation::identity::<String>(&[]);
        let mut exit = false;
        for s in stmts {
            let step = self.compile(s)?;
            relation = relation.compose(&step.relation);
            if step.exit {
                exit = true;
                if !self.config.fin {
                    break;
                }
            }
        }
        Ok(Step { relation, exit })
    }

    /// Inside a loop body a branch is taken anew on every iteration, so one
    /// branch operation cannot stand for all of them: the join is plain.
    fn compile_if(&mut self, cond: &Expr, then_branch: &Stmt, else_branch: Option<&Stmt>) -> Result<Step> {
        let op = if self.config.branch_indicators && self.loop_depth == 0 {
            Some(self.registry.new_operation_with_cases(OperationKind::Branch, 2))
        } else {
            None
        };

        let then_step = self.compile(then_branch)?;
        if then_step.exit && !self.config.fin {
            return Ok(then_step);
        }
        let else_step = match else_branch {
            Some(s) => self.compile(s)?,
            None => Step::noop(),
        };
        if else_step.exit && !self.config.fin {
            return Ok(else_step);
        }

        let mut vars = Relation::union_variables(then_step.relation.variables(), else_step.relation.variables());
        cond.collect_variables(&mut vars);
        let t = then_step.relation.homogenize(&vars)?;
        let e = else_step.relation.homogenize(&vars)?;
        let relation = match op {
            Some(op) => t
                .qualify(Delta::new(0, op.id()))
                .join_aligned(&e.qualify(Delta::new(1, op.id())))?,
            None => t.join_aligned(&e)?,
        };
        Ok(Step {
            relation,
            exit: then_step.exit || else_step.exit,
        })
    }

    fn compile_loop_body(&mut self, body: &Stmt) -> Result<Step> {
        self.loop_depth += 1;
        let step = self.compile(body);
        self.loop_depth -= 1;
        step
    }

    fn compile_while(&mut self, cond: &Expr, body: &Stmt) -> Result<Step> {
        let step = self.compile_loop_body(body)?;
        if step.exit && !self.config.fin {
            return Ok(step);
        }
        let mut vars = step.relation.variables().to_vec();
        cond.collect_variables(&mut vars);
        let body_relation = step.relation.homogenize(&vars)?;
        let mut closure = body_relation.fixpoint(self.config.max_fixpoint_iterations)?;
        closure.while_correction(&mut self.delta_graph);
        Ok(self.close_loop(closure, step.exit))
    }

    fn compile_loop(&mut self, bound: &str, body: &Stmt) -> Result<Step> {
        let step = self.compile_loop_body(body)?;
        if step.exit && !self.config.fin {
            return Ok(step);
        }
        let vars = Relation::union_variables(step.relation.variables(), &[bound.to_string()]);
        let body_relation = step.relation.homogenize(&vars)?;
        let mut closure = body_relation.fixpoint(self.config.max_fixpoint_iterations)?;
        closure.loop_correction(bound, &mut self.delta_graph);
        Ok(self.close_loop(closure, step.exit))
    }

    fn close_loop(&mut self, relation: Relation, exit: bool) -> Step {
        self.delta_graph.fusion(&self.registry);
        let infinite = self.delta_graph.is_infinite();
        if infinite && !exit {
            warn!("Delta graph infinite, exiting");
        }
        Step {
            relation,
            exit: exit || infinite,
        }
    }

    fn compile_effect(&mut self, stmt: &Stmt, effect: Effect<'_>) -> Result<Step> {
        match effect {
            Effect::Nothing => Ok(Step::noop()),
            Effect::Assign(target, form) => {
                let relation = self.assignment(target, form);
                debug!("Compiled `{}` over {:?}", stmt, relation.variables());
                Ok(Step::new(relation))
            }
            Effect::Call { target, callee, args } => match self.resolve_call(target, callee, args)? {
                CallForm::Ignored => Ok(Step::noop()),
                CallForm::Relation(relation) => {
                    debug!("Applied summary of '{}' at `{}`", callee, stmt);
                    Ok(Step::new(relation))
                }
                CallForm::Unsupported(reason) => Ok(self.unsupported(stmt, reason)),
            },
        }
    }

    fn assignment(&mut self, target: &str, form: AssignForm<'_>) -> Relation {
        match form {
            AssignForm::Skip => Relation::identity::<String>(&[]),
            AssignForm::Constant => Relation::zero(&[target]),
            AssignForm::Copy(y) => {
                let mut relation = Relation::identity(&[target, y]);
                relation.replace_column(0, vec![Polynomial::zero(), Polynomial::constant(Label::Max)]);
                relation
            }
            AssignForm::Arith { product, operands } => {
                let n = operands.len();
                let num_cases = if n == 1 || product { 3 } else { n + 1 };
                let op = self
                    .registry
                    .new_operation_with_cases(OperationKind::Assignment, num_cases as u32);

                let mut vars = vec![target];
                for &v in &operands {
                    if !vars.contains(&v) {
                        vars.push(v);
                    }
                }
                let column = vars
                    .iter()
                    .map(|v| {
                        let occurrences: Vec<usize> = (0..n).filter(|&k| operands[k] == *v).collect();
                        if occurrences.is_empty() {
                            return Polynomial::zero();
                        }
                        let labels: Vec<Label> = (0..num_cases)
                            .map(|case| {
                                occurrences
                                    .iter()
                                    .map(|&k| occurrence_label(product, n, k, case))
                                    .max()
                                    .unwrap_or(Label::Zero)
                            })
                            .collect();
                        Polynomial::from_cases(op, &labels)
                    })
                    .collect();

                let mut relation = Relation::identity(&vars);
                relation.replace_column(0, column);
                relation
            }
        }
    }

    fn resolve_call(&self, target: Option<&str>, callee: &str, args: &[Expr]) -> Result<CallForm> {
        if IGNORED_CALLS.iter().any(|&c| c == callee) {
            return Ok(CallForm::Ignored);
        }
        let Some(summary) = self.summaries.and_then(|s| s.summary(callee)) else {
            return Ok(CallForm::Unsupported(format!("no summary for callee '{}'", callee)));
        };

        if summary.params.len() != args.len() {
            return Err(AnalysisError::invalid_summary(
                callee,
                format!("expects {} arguments, got {}", summary.params.len(), args.len()),
            ));
        }
        for v in summary.relation.variables() {
            if !summary.params.contains(v) && summary.ret.as_ref() != Some(v) {
                return Err(AnalysisError::invalid_summary(
                    callee,
                    format!("relation mentions '{}', which is neither a parameter nor the return slot", v),
                ));
            }
        }

        let mut actuals: Vec<Option<&str>> = Vec::with_capacity(args.len());
        for arg in args {
            match atom(arg) {
                Ok(value) => actuals.push(value),
                Err(reason) => return Ok(CallForm::Unsupported(format!("argument: {}", reason))),
            }
        }

        // Arguments are passed by value: only the target changes.
        let Some(target) = target else {
            return Ok(CallForm::Ignored);
        };
        let mut vars = vec![target];
        for &a in actuals.iter().flatten() {
            if !vars.contains(&a) {
                vars.push(a);
            }
        }

        let ret = summary.ret.as_deref().and_then(|r| summary.relation.index_of(r));
        let mut column = vec![Polynomial::zero(); vars.len()];
        if let Some(ret) = ret {
            for (param, actual) in summary.params.iter().zip(&actuals) {
                let (Some(actual), Some(src)) = (actual, summary.relation.index_of(param)) else {
                    continue;
                };
                if let Some(row) = vars.iter().position(|v| v == actual) {
                    column[row] = column[row].add(summary.relation.get(src, ret));
                }
            }
        }

        let mut relation = Relation::identity(&vars);
        relation.replace_column(0, column);
        Ok(CallForm::Relation(relation))
    }

    fn unsupported(&mut self, construct: &dyn fmt::Display, reason: impl Into<String>) -> Step {
        let d = Diagnostic::unsupported(construct.to_string(), reason);
        warn!("Skipping {}", d);
        self.diagnostics.push(d);
        Step::noop()
    }

    /// Constructs of `body` the compiler would skip, without compiling anything.
    pub fn unsupported_constructs(&self, body: &[Stmt]) -> Result<Vec<Diagnostic>> {
        let mut out = Vec::new();
        for s in body {
            self.survey(s, &mut out)?;
        }
        Ok(out)
    }

    fn survey(&self, stmt: &Stmt, out: &mut Vec<Diagnostic>) -> Result<()> {
        let effect = match stmt {
            Stmt::Assign { target, value } => assign_effect(target, value),
            Stmt::Decl { name, init: Some(value) } => assign_effect(name, value),
            Stmt::Expr(expr) => expr_effect(expr),
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.survey(s, out)?;
                }
                return Ok(());
            }
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                self.survey(then_branch, out)?;
                if let Some(e) = else_branch {
                    self.survey(e, out)?;
                }
                return Ok(());
            }
            Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => return self.survey(body, out),
            Stmt::Loop { bound, body } => {
                if body.assigned_variables().contains(bound) {
                    out.push(Diagnostic::unsupported(
                        stmt.to_string(),
                        format!("loop bound `{}` is modified by the body", bound),
                    ));
                    return Ok(());
                }
                return self.survey(body, out);
            }
            Stmt::Opaque(_) => Err("statement outside the calculus".to_string()),
            Stmt::Decl { init: None, .. }
            | Stmt::Return(_)
            | Stmt::Break
            | Stmt::Continue
            | Stmt::Empty => Ok(Effect::Nothing),
        };
        match effect {
            Err(reason) => out.push(Diagnostic::unsupported(stmt.to_string(), reason)),
            Ok(Effect::Call { target, callee, args }) => {
                if let CallForm::Unsupported(reason) = self.resolve_call(target, callee, args)? {
                    out.push(Diagnostic::unsupported(stmt.to_string(), reason));
                }
            }
            Ok(_) => {}
        }
        Ok(())
    }
}
