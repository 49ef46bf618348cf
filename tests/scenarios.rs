//! End-to-end scenarios for the analysis.
//!
//! Each test builds the AST a C front end would produce for a small function
//! and checks the verdict.

use std::collections::{BTreeSet, HashMap};

use mwp_rs::analysis::{analyze_function, analyze_loops, analyze_program, Analyzer};
use mwp_rs::ast::{BinOp, Expr, Function, Program, Stmt, UnaryOp};
use mwp_rs::classify::Verdict;
use mwp_rs::compiler::FunctionSummary;
use mwp_rs::config::AnalysisConfig;
use mwp_rs::error::AnalysisError;
use mwp_rs::polynomial::Polynomial;
use mwp_rs::relation::Relation;
use mwp_rs::semiring::Label;
use num_bigint::BigUint;
use test_log::test;

fn v(name: &str) -> Expr {
    Expr::var(name)
}

fn c(value: i64) -> Expr {
    Expr::constant(value)
}

fn lt(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinOp::Lt, a, b)
}

/// ```c
/// while (X1 < 10) { X0 = X1 * X0; X1 = X1 + X0; }
/// ```
fn infinite_2c(tail: Vec<Stmt>) -> Function {
    let mut body = vec![Stmt::while_loop(
        lt(v("X1"), c(10)),
        Stmt::block(vec![
            Stmt::assign("X0", Expr::mul(v("X1"), v("X0"))),
            Stmt::assign("X1", Expr::add(v("X1"), v("X0"))),
        ]),
    )];
    body.extend(tail);
    Function::with_params("infinite_2c", &["X0", "X1"], body)
}

// ─── Straight-line code ────────────────────────────────────────────────────────

#[test]
fn sum_is_weak_polynomial() {
    let f = Function::with_params("f", &["x", "y", "z"], vec![Stmt::assign("y", Expr::add(v("x"), v("z")))]);
    let result = analyze_function(&f, &AnalysisConfig::default()).unwrap();

    assert!(result.is_bounded());
    assert!(result.diagnostics.is_empty());
    assert_eq!(result.growth("x"), Some(Label::Max));
    assert_eq!(result.growth("y"), Some(Label::Weak));
    assert_eq!(result.growth("z"), Some(Label::Max));

    let Verdict::Bounded(b) = &result.verdict else {
        panic!("expected a bounded verdict");
    };
    // Every derivation of the sum is admissible.
    assert_eq!(b.choices.count_assignments(), BigUint::from(3u32));
    assert_eq!(b.relation.entry("x", "x").unwrap(), &Polynomial::constant(Label::Max));
    assert_eq!(b.relation.entry("z", "z").unwrap(), &Polynomial::constant(Label::Max));
}

#[test]
fn mutual_growth_without_loop_is_bounded() {
    let f = Function::with_params(
        "not_infinite_2c",
        &["X0", "X1"],
        vec![
            Stmt::assign("X0", Expr::mul(v("X1"), v("X0"))),
            Stmt::assign("X1", Expr::add(v("X1"), v("X0"))),
        ],
    );
    let result = analyze_function(&f, &AnalysisConfig::default()).unwrap();
    assert!(result.is_bounded());
    assert_eq!(result.operations, 2);
    assert_eq!(result.growth("X0"), Some(Label::Weak));
    assert_eq!(result.growth("X1"), Some(Label::Weak));
}

#[test]
fn declarations_and_increments() {
    // int f(int n) { int i = 0; int s = n; i++; s = s * 2; return s; }
    let f = Function::with_params(
        "f",
        &["n"],
        vec![
            Stmt::decl("i", Some(c(0))),
            Stmt::decl("s", Some(v("n"))),
            Stmt::Expr(Expr::unary(UnaryOp::PostInc, v("i"))),
            Stmt::assign("s", Expr::mul(v("s"), c(2))),
            Stmt::Return(Some(v("s"))),
        ],
    );
    let result = analyze_function(&f, &AnalysisConfig::default()).unwrap();
    assert!(result.is_bounded());
    assert_eq!(result.variables, vec!["n", "i", "s"]);
    assert_eq!(result.growth("i"), Some(Label::Zero));
    assert_eq!(result.growth("s"), Some(Label::Max));
    assert_eq!(result.bound("s").unwrap().to_string(), "max(n)");
}

// ─── Conditionals ──────────────────────────────────────────────────────────────

#[test]
fn branches_are_joined() {
    // if (c > 0) { y = x; } else { y = z; }
    let f = Function::with_params(
        "branch",
        &["c", "x", "y", "z"],
        vec![Stmt::if_else(
            Expr::binary(BinOp::Gt, v("c"), c(0)),
            Stmt::assign("y", v("x")),
            Stmt::assign("y", v("z")),
        )],
    );
    let result = analyze_function(&f, &AnalysisConfig::default()).unwrap();
    let Verdict::Bounded(b) = &result.verdict else {
        panic!("expected a bounded verdict");
    };
    assert_eq!(b.relation.entry("x", "y").unwrap().to_string(), "m.δ(0,0)");
    assert_eq!(b.relation.entry("z", "y").unwrap().to_string(), "m.δ(1,0)");
    assert!(b.relation.entry("y", "y").unwrap().is_zero());
    assert_eq!(b.choices.assignments().count(), 2);
    assert_eq!(result.growth("y"), Some(Label::Max));
}

#[test]
fn infinite_loop_in_one_branch_is_unbounded() {
    // if (c) { while (x < 10) { x = x + y; y = y + x; } } else { x = y; }
    let looping = Stmt::while_loop(
        lt(v("x"), c(10)),
        Stmt::block(vec![
            Stmt::assign("x", Expr::add(v("x"), v("y"))),
            Stmt::assign("y", Expr::add(v("y"), v("x"))),
        ]),
    );
    let f = Function::with_params(
        "branch_loop",
        &["c", "x", "y"],
        vec![Stmt::if_else(v("c"), looping, Stmt::assign("x", v("y")))],
    );
    // Infinite paths found inside a branch are not tied to the branch taken.
    let result = analyze_function(&f, &AnalysisConfig::default()).unwrap();
    assert!(!result.is_bounded());
    assert!(result.early_exit);
}

#[test]
fn branch_inside_loop_is_taken_on_every_iteration() {
    // while (c) { if (d) { x = x * y; } }
    let f = Function::with_params(
        "grow_sometimes",
        &["c", "d", "x", "y"],
        vec![Stmt::while_loop(
            v("c"),
            Stmt::if_then(v("d"), Stmt::assign("x", Expr::mul(v("x"), v("y")))),
        )],
    );
    let result = analyze_function(&f, &AnalysisConfig::default()).unwrap();
    assert!(!result.is_bounded());
    let plain = analyze_function(&f, &AnalysisConfig::default().with_branch_indicators(false)).unwrap();
    assert!(!plain.is_bounded());
}

#[test]
fn branch_inside_loop_without_growth_is_bounded() {
    // while (c) { if (d) { x = y; } else { x = z; } }
    let f = Function::with_params(
        "pick",
        &["c", "d", "x", "y", "z"],
        vec![Stmt::while_loop(
            v("c"),
            Stmt::if_else(v("d"), Stmt::assign("x", v("y")), Stmt::assign("x", v("z"))),
        )],
    );
    let result = analyze_function(&f, &AnalysisConfig::default()).unwrap();
    assert!(result.is_bounded());
    assert_eq!(result.operations, 0);
    assert_eq!(result.growth("x"), Some(Label::Max));
}

// ─── Loops ─────────────────────────────────────────────────────────────────────

#[test]
fn loop_with_mutual_growth_is_infinite() {
    let result = analyze_function(&infinite_2c(vec![]), &AnalysisConfig::default()).unwrap();
    assert!(!result.is_bounded());
    assert!(result.early_exit);
    assert!(result.choices().is_none());
}

#[test]
fn early_exit_agrees_with_full_run() {
    let tail = vec![Stmt::assign("X0", c(0)), Stmt::assign("X1", Expr::add(v("X1"), c(1)))];
    let early = analyze_function(&infinite_2c(tail.clone()), &AnalysisConfig::default()).unwrap();
    let full = analyze_function(&infinite_2c(tail), &AnalysisConfig::default().with_fin(true)).unwrap();

    assert!(!early.is_bounded());
    assert!(!full.is_bounded());
    assert!(early.early_exit && full.early_exit);
    // Only the full run compiled the trailing statements.
    assert_eq!(early.operations, 2);
    assert_eq!(full.operations, 3);

    let (Verdict::Unbounded(early), Verdict::Unbounded(full)) = (&early.verdict, &full.verdict) else {
        panic!("expected unbounded verdicts");
    };
    assert!(early.relation.is_none());
    assert!(full.relation.is_some());
    assert_eq!(full.variables.len(), 2);
}

#[test]
fn loop_result_reports_infinite_flows() {
    let config = AnalysisConfig::default().with_fin(true);
    let result = analyze_function(&infinite_2c(vec![]), &config).unwrap();
    let Verdict::Unbounded(u) = &result.verdict else {
        panic!("expected an unbounded verdict");
    };
    assert!(u.infinite_flows.contains(&("X0".to_string(), "X0".to_string())));
}

#[test]
fn loop_sum_needs_the_weak_derivation() {
    // while (X > 0) { X1 = X2 + X3; }
    let f = Function::with_params(
        "example3_1",
        &["X", "X1", "X2", "X3"],
        vec![Stmt::while_loop(
            Expr::binary(BinOp::Gt, v("X"), c(0)),
            Stmt::assign("X1", Expr::add(v("X2"), v("X3"))),
        )],
    );
    let result = analyze_function(&f, &AnalysisConfig::default()).unwrap();
    let choices = result.choices().expect("bounded");
    let all: Vec<Vec<u32>> = choices.assignments().collect();
    assert_eq!(all, vec![vec![2]]);
    assert_eq!(result.growth("X1"), Some(Label::Weak));
    // The loop may not run at all, so X1 also keeps its own value.
    assert_eq!(result.bound("X1").unwrap().to_string(), "max(X1,p(X2,X3))");
}

#[test]
fn do_while_behaves_like_while() {
    let body = Stmt::block(vec![
        Stmt::assign("X0", Expr::mul(v("X1"), v("X0"))),
        Stmt::assign("X1", Expr::add(v("X1"), v("X0"))),
    ]);
    let f = Function::with_params("dw", &["X0", "X1"], vec![Stmt::do_while(body, lt(v("X1"), c(10)))]);
    let result = analyze_function(&f, &AnalysisConfig::default()).unwrap();
    assert!(!result.is_bounded());
}

#[test]
fn bounded_loop_is_polynomial_in_its_bound() {
    // for (i = 0; i < n; i++) { x = x + y; }  as  loop n { x = x + y; }
    let f = Function::with_params(
        "accumulate",
        &["n", "x", "y"],
        vec![Stmt::bounded_loop("n", Stmt::assign("x", Expr::add(v("x"), v("y"))))],
    );
    let result = analyze_function(&f, &AnalysisConfig::default()).unwrap();
    assert!(result.is_bounded());
    assert_eq!(result.growth("x"), Some(Label::Poly));
    assert_eq!(result.growth("y"), Some(Label::Max));
    // Case 1 makes x depend polynomially on itself, which is infinite.
    assert!(!result.choices().unwrap().is_valid(&[1]));
}

#[test]
fn fixpoint_cap_is_a_hard_failure() {
    let config = AnalysisConfig::default().with_max_fixpoint_iterations(1);
    let err = analyze_function(&infinite_2c(vec![]), &config).unwrap_err();
    assert_eq!(err, AnalysisError::FixpointDivergence { iterations: 1 });
}

// ─── Unsupported syntax ────────────────────────────────────────────────────────

fn with_pointer() -> Function {
    Function::with_params(
        "pointer",
        &["x", "y"],
        vec![
            Stmt::assign("x", Expr::unary(UnaryOp::AddrOf, v("y"))),
            Stmt::assign("y", Expr::add(v("x"), v("y"))),
        ],
    )
}

#[test]
fn unsupported_statement_is_skipped() {
    let result = analyze_function(&with_pointer(), &AnalysisConfig::default()).unwrap();
    assert!(result.is_bounded());
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].construct, "x = &y;");
    assert_eq!(result.operations, 1);
}

#[test]
fn strict_mode_rejects_unsupported_statement() {
    let config = AnalysisConfig::default().with_strict(true);
    let err = analyze_function(&with_pointer(), &config).unwrap_err();
    assert_eq!(
        err,
        AnalysisError::UnsupportedConstruct {
            function: "pointer".to_string(),
            construct: "x = &y;".to_string(),
        }
    );
}

// ─── Calls and batches ─────────────────────────────────────────────────────────

#[test]
fn call_uses_summary() {
    // int square(int a) { return a * a; }
    let mut relation = Relation::identity(&["a", "ret"]);
    relation.replace_column(1, vec![Polynomial::constant(Label::Weak), Polynomial::zero()]);
    let summaries = HashMap::from([(
        "square".to_string(),
        FunctionSummary::new(vec!["a".to_string()], Some("ret".to_string()), relation),
    )]);

    let f = Function::with_params(
        "caller",
        &["x"],
        vec![Stmt::decl("y", Some(Expr::call("square", vec![v("x")])))],
    );
    let analyzer = Analyzer::new(AnalysisConfig::default()).with_summaries(&summaries);
    let result = analyzer.analyze_function(&f).unwrap();
    assert!(result.diagnostics.is_empty());
    assert_eq!(result.growth("y"), Some(Label::Weak));
    assert_eq!(result.bound("y").unwrap().to_string(), "p(x)");

    // Without the summary the call is skipped.
    let result = analyze_function(&f, &AnalysisConfig::default()).unwrap();
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.growth("y"), Some(Label::Max));
}

#[test]
fn call_assigning_its_argument() {
    // int twice(int a) { return a + a; }   x = twice(x);
    let mut relation = Relation::identity(&["a", "ret"]);
    relation.replace_column(1, vec![Polynomial::constant(Label::Poly), Polynomial::zero()]);
    let summaries = HashMap::from([(
        "twice".to_string(),
        FunctionSummary::new(vec!["a".to_string()], Some("ret".to_string()), relation),
    )]);

    let f = Function::with_params(
        "caller",
        &["x"],
        vec![Stmt::assign("x", Expr::call("twice", vec![v("x")]))],
    );
    let analyzer = Analyzer::new(AnalysisConfig::default()).with_summaries(&summaries);
    let result = analyzer.analyze_function(&f).unwrap();
    assert!(result.diagnostics.is_empty());
    assert_eq!(result.growth("x"), Some(Label::Poly));
    assert_eq!(result.bound("x").unwrap().to_string(), "q(x)");
}

#[test]
fn program_results_follow_program_order() {
    let names = ["a", "b", "c", "d", "e", "f"];
    let functions: Vec<Function> = names
        .iter()
        .map(|&n| Function::with_params(n, &["x", "y"], vec![Stmt::assign("x", Expr::add(v("x"), v("y")))]))
        .chain(std::iter::once(infinite_2c(vec![])))
        .collect();
    let result = analyze_program(&Program::new(functions), &AnalysisConfig::default());

    assert!(result.errors.is_empty());
    let order: Vec<&str> = result.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c", "d", "e", "f", "infinite_2c"]);
    let bounded: BTreeSet<&str> = result.bounded().map(|f| f.name.as_str()).collect();
    assert_eq!(bounded.len(), names.len());
    assert!(!result.get("infinite_2c").unwrap().is_bounded());
}

// ─── Loop analysis ─────────────────────────────────────────────────────────────

#[test]
fn loop_analysis_reports_independent_variables() {
    // while (n > 0) { x = x * x; y = y + 1; z = x; }
    let f = Function::with_params(
        "mixed",
        &["n", "x", "y", "z"],
        vec![Stmt::while_loop(
            Expr::binary(BinOp::Gt, v("n"), c(0)),
            Stmt::block(vec![
                Stmt::assign("x", Expr::mul(v("x"), v("x"))),
                Stmt::assign("y", Expr::add(v("y"), c(1))),
                Stmt::assign("z", v("x")),
            ]),
        )],
    );
    let result = analyze_loops(&f, &AnalysisConfig::default()).unwrap();
    assert_eq!(result.name, "mixed");
    assert_eq!(result.loops.len(), 1);

    let l = &result.loops[0];
    assert!(!l.bounded);
    assert!(l.source.starts_with("while (n > 0)"));
    assert_eq!(l.variables, vec!["n", "x", "y", "z"]);
    assert_eq!(l.growth("x"), None);
    assert_eq!(l.growth("y"), Some(Label::Max));
    assert_eq!(l.growth("n"), Some(Label::Max));
    // z copies x, which has no bound.
    assert_eq!(l.growth("z"), None);
    assert_eq!(l.bound("y").unwrap().to_string(), "max(y)");
}

#[test]
fn loop_analysis_lifts_nested_loops() {
    // while (n > 0) { while (m > 0) { m = m - 1; } n = n - 1; }
    let inner = Stmt::while_loop(
        Expr::binary(BinOp::Gt, v("m"), c(0)),
        Stmt::assign("m", Expr::sub(v("m"), c(1))),
    );
    let outer = Stmt::while_loop(
        Expr::binary(BinOp::Gt, v("n"), c(0)),
        Stmt::block(vec![inner, Stmt::assign("n", Expr::sub(v("n"), c(1)))]),
    );
    let f = Function::with_params("nested", &["n", "m"], vec![outer]);
    let result = analyze_loops(&f, &AnalysisConfig::default()).unwrap();
    assert_eq!(result.loops.len(), 2);
    assert!(result.loops.iter().all(|l| l.bounded));
    assert_eq!(result.loops[1].variables, vec!["m"]);
    assert_eq!(result.loops[0].growth("n"), Some(Label::Max));
    assert_eq!(result.loops[1].growth("m"), Some(Label::Max));
}

#[test]
fn strict_loop_analysis_leaves_out_unsupported_loops() {
    let f = Function::with_params(
        "f",
        &["n", "x"],
        vec![
            Stmt::while_loop(v("n"), Stmt::Opaque("goto out;".to_string())),
            Stmt::bounded_loop("n", Stmt::assign("x", c(0))),
        ],
    );
    let relaxed = analyze_loops(&f, &AnalysisConfig::default()).unwrap();
    assert_eq!(relaxed.loops.len(), 2);
    assert_eq!(relaxed.loops[0].diagnostics.len(), 1);

    let strict = analyze_loops(&f, &AnalysisConfig::default().with_strict(true)).unwrap();
    assert_eq!(strict.loops.len(), 1);
    assert!(strict.loops[0].source.starts_with("loop n"));
}
