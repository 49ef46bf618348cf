use clap::{Parser, ValueEnum};

use mwp_rs::analysis::{Analyzer, FunctionLoops, FunctionResult};
use mwp_rs::ast::{BinOp, Expr, Function, Program, Stmt};
use mwp_rs::classify::Verdict;
use mwp_rs::config::AnalysisConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Sample {
    /// `y = x + z`
    Sum,
    /// Two variables growing into each other inside a loop.
    Infinite,
    /// Same variables, but the loop only grows one of them.
    NotInfinite,
    /// Loop accumulating a sum, bounded only by the weak derivation.
    Accumulate,
    /// Conditional with a squaring branch.
    Branch,
    /// `loop n { y = y + 1; }`
    Bounded,
    /// Every sample, analyzed in parallel.
    All,
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Sample function to analyze.
    #[arg(value_enum, default_value = "all")]
    sample: Sample,

    /// Finish compiling even when the result is known to be unbounded.
    #[clap(long)]
    fin: bool,

    /// Reject functions with unsupported statements.
    #[clap(long)]
    strict: bool,

    /// Maximum number of fixpoint iterations.
    #[clap(long, value_name = "INT", default_value = "1000")]
    max_iterations: usize,

    /// Print the final relation of each function.
    #[clap(long)]
    relation: bool,

    /// Analyze every loop on its own instead of whole functions.
    #[clap(long)]
    loops: bool,
}

fn v(name: &str) -> Expr {
    Expr::var(name)
}

fn sample(which: Sample) -> Vec<Function> {
    match which {
        Sample::Sum => vec![Function::with_params(
            "sum",
            &["x", "z"],
            vec![Stmt::decl("y", Some(Expr::add(v("x"), v("z"))))],
        )],
        Sample::Infinite => vec![Function::with_params(
            "infinite",
            &["x", "y", "n"],
            vec![Stmt::while_loop(
                Expr::binary(BinOp::Lt, v("x"), v("n")),
                Stmt::block(vec![
                    Stmt::assign("x", Expr::add(v("x"), v("y"))),
                    Stmt::assign("y", Expr::add(v("y"), v("x"))),
                ]),
            )],
        )],
        Sample::NotInfinite => vec![Function::with_params(
            "not_infinite",
            &["x", "y", "n"],
            vec![Stmt::while_loop(
                Expr::binary(BinOp::Lt, v("x"), v("n")),
                Stmt::block(vec![
                    Stmt::assign("x", Expr::add(v("x"), v("y"))),
                    Stmt::assign("y", v("y")),
                ]),
            )],
        )],
        Sample::Accumulate => vec![Function::with_params(
            "accumulate",
            &["X1", "X2", "X3"],
            vec![Stmt::while_loop(
                Expr::binary(BinOp::Lt, v("X2"), v("X1")),
                Stmt::assign("X1", Expr::add(v("X2"), v("X3"))),
            )],
        )],
        Sample::Branch => vec![Function::with_params(
            "branch",
            &["x", "y"],
            vec![Stmt::if_else(
                Expr::binary(BinOp::Gt, v("x"), Expr::constant(0)),
                Stmt::assign("y", Expr::mul(v("x"), v("x"))),
                Stmt::assign("y", Expr::add(v("y"), Expr::constant(1))),
            )],
        )],
        Sample::Bounded => vec![Function::with_params(
            "bounded",
            &["n", "y"],
            vec![Stmt::bounded_loop(
                "n",
                Stmt::assign("y", Expr::add(v("y"), Expr::constant(1))),
            )],
        )],
        Sample::All => [
            Sample::Sum,
            Sample::Infinite,
            Sample::NotInfinite,
            Sample::Accumulate,
            Sample::Branch,
            Sample::Bounded,
        ]
        .into_iter()
        .flat_map(sample)
        .collect(),
    }
}

fn report(result: &FunctionResult, show_relation: bool) {
    println!("--- {} ---", result.name);
    println!(
        "variables = {:?}, operations = {}, early exit = {}, time = {:.3} ms",
        result.variables,
        result.operations,
        result.early_exit,
        result.elapsed.as_secs_f64() * 1000.0
    );
    for d in &result.diagnostics {
        println!("  warning: {}", d);
    }
    match &result.verdict {
        Verdict::Bounded(b) => {
            if show_relation {
                println!("relation =\n{}", b.relation);
            }
            println!("choices = {}", b.choices);
            println!("admissible assignments = {}", b.choices.count_assignments());
            println!("assignment = {:?}", b.assignment);
            for var in &b.variables {
                println!("  {}' <= {}  [{}]", var.name, var.bound, var.growth);
            }
        }
        Verdict::Unbounded(u) => {
            if show_relation {
                if let Some(relation) = &u.relation {
                    println!("relation =\n{}", relation);
                }
            }
            println!("UNBOUNDED");
            for (src, dst) in &u.infinite_flows {
                println!("  {} -> {}", src, dst);
            }
            for (name, verdict) in &u.variables {
                match verdict {
                    Some(v) => println!("  {}' <= {}  [{}]", name, v.bound, v.growth),
                    None => println!("  {}: unknown", name),
                }
            }
        }
    }
}

fn report_loops(result: &FunctionLoops) {
    println!("--- {}: {} loops ---", result.name, result.loops.len());
    for l in &result.loops {
        println!("{}", l.source);
        println!("  {}", if l.bounded { "bounded" } else { "UNBOUNDED" });
        for (name, verdict) in &l.verdicts {
            match verdict {
                Some(v) => println!("  {}' <= {}  [{}]", name, v.bound, v.growth),
                None => println!("  {}: unknown", name),
            }
        }
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let config = AnalysisConfig::default()
        .with_fin(args.fin)
        .with_strict(args.strict)
        .with_max_fixpoint_iterations(args.max_iterations);

    let program = Program::new(sample(args.sample));
    for f in &program.functions {
        println!("{}:", f.name);
        for stmt in &f.body {
            println!("    {}", stmt);
        }
    }

    let analyzer = Analyzer::new(config);
    if args.loops {
        for f in &program.functions {
            report_loops(&analyzer.analyze_loops(f)?);
        }
        println!("Done in {:.3} s", time_total.elapsed().as_secs_f64());
        return Ok(());
    }

    let result = analyzer.analyze_program(&program);
    for f in &result.functions {
        report(f, args.relation);
    }
    for (name, error) in &result.errors {
        println!("--- {} --- failed: {}", name, error);
    }

    println!(
        "{} of {} functions bounded",
        result.bounded().count(),
        program.functions.len()
    );

    let time_total = time_total.elapsed();
    println!("Done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
