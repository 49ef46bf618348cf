//! Abstract syntax consumed by the analysis.
//!
//! The front end (a C parser, typically) lowers each function into this
//! small imperative language. Everything the flow calculus does not cover is
//! still representable (as [`Expr::Opaque`], [`Stmt::Opaque`], or an
//! operator the analysis rejects), so that the compiler can skip it with a
//! diagnostic instead of failing.

use std::collections::HashSet;
use std::fmt;

use crate::types::{DeclKind, Variable};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    SizeOf,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
    AddrOf,
    Deref,
}

impl UnaryOp {
    pub fn is_inc_dec(self) -> bool {
        matches!(self, UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

/// Operators with any number of operands.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NaryOp {
    Sum,
    Product,
}

/// Syntactic shape of an expression.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Shape {
    Atom,
    Unary,
    Binary,
    Nary,
    Other,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Expr {
    Const(i64),
    Var(String),
    Cast(Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Nary(NaryOp, Vec<Expr>),
    Call(String, Vec<Expr>),
    /// Anything else, kept as source text.
    Opaque(String),
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn constant(value: i64) -> Self {
        Expr::Const(value)
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Expr::Unary(op, Box::new(expr))
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinOp::Mul, lhs, rhs)
    }

    pub fn cast(expr: Expr) -> Self {
        Expr::Cast(Box::new(expr))
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call(callee.into(), args)
    }

    pub fn shape(&self) -> Shape {
        match self {
            Expr::Const(_) | Expr::Var(_) => Shape::Atom,
            Expr::Cast(inner) => inner.shape(),
            Expr::Unary(..) => Shape::Unary,
            Expr::Binary(..) => Shape::Binary,
            Expr::Nary(..) => Shape::Nary,
            Expr::Call(..) | Expr::Opaque(_) => Shape::Other,
        }
    }

    /// The expression with all outer casts removed.
    pub fn strip_casts(&self) -> &Expr {
        match self {
            Expr::Cast(inner) => inner.strip_casts(),
            e => e,
        }
    }

    /// Appends referenced variable names, in order of first appearance.
    pub fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Expr::Const(_) | Expr::Opaque(_) => {}
            Expr::Var(name) => push_unique(out, name),
            Expr::Cast(e) | Expr::Unary(_, e) => e.collect_variables(out),
            Expr::Binary(_, a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
            Expr::Nary(_, args) | Expr::Call(_, args) => {
                for a in args {
                    a.collect_variables(out);
                }
            }
        }
    }

    /// Variables modified by evaluating the expression (`x++`, `--x`).
    fn collect_assigned(&self, out: &mut Vec<String>) {
        match self {
            Expr::Unary(op, e) if op.is_inc_dec() => {
                if let Expr::Var(name) = e.strip_casts() {
                    push_unique(out, name);
                }
            }
            Expr::Cast(e) | Expr::Unary(_, e) => e.collect_assigned(out),
            Expr::Binary(_, a, b) => {
                a.collect_assigned(out);
                b.collect_assigned(out);
            }
            Expr::Nary(_, args) | Expr::Call(_, args) => {
                for a in args {
                    a.collect_assigned(out);
                }
            }
            Expr::Const(_) | Expr::Var(_) | Expr::Opaque(_) => {}
        }
    }
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|v| v == name) {
        out.push(name.to_string());
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Cast(e) => write!(f, "(int){}", e),
            Expr::Unary(op, e) => match op {
                UnaryOp::Neg => write!(f, "-{}", e),
                UnaryOp::Plus => write!(f, "+{}", e),
                UnaryOp::Not => write!(f, "!{}", e),
                UnaryOp::BitNot => write!(f, "~{}", e),
                UnaryOp::SizeOf => write!(f, "sizeof({})", e),
                UnaryOp::PreInc => write!(f, "++{}", e),
                UnaryOp::PreDec => write!(f, "--{}", e),
                UnaryOp::PostInc => write!(f, "{}++", e),
                UnaryOp::PostDec => write!(f, "{}--", e),
                UnaryOp::AddrOf => write!(f, "&{}", e),
                UnaryOp::Deref => write!(f, "*{}", e),
            },
            Expr::Binary(op, a, b) => write!(f, "{} {} {}", a, op.symbol(), b),
            Expr::Nary(op, args) => {
                let sep = match op {
                    NaryOp::Sum => " + ",
                    NaryOp::Product => " * ",
                };
                let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}", parts.join(sep))
            }
            Expr::Call(callee, args) => {
                let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", callee, parts.join(", "))
            }
            Expr::Opaque(text) => write!(f, "{}", text),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Stmt {
    Assign {
        target: String,
        value: Expr,
    },
    Decl {
        name: String,
        init: Option<Expr>,
    },
    /// Expression evaluated for its side effects (`x++;`, `f(x);`).
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    /// Iteration bounded by the value of `bound`, which the body must not modify.
    Loop {
        bound: String,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Empty,
    /// Anything else, kept as source text.
    Opaque(String),
}

impl Stmt {
    pub fn assign(target: impl Into<String>, value: Expr) -> Self {
        Stmt::Assign {
            target: target.into(),
            value,
        }
    }

    pub fn decl(name: impl Into<String>, init: Option<Expr>) -> Self {
        Stmt::Decl { name: name.into(), init }
    }

    pub fn block(stmts: Vec<Stmt>) -> Self {
        Stmt::Block(stmts)
    }

    pub fn if_then(cond: Expr, then_branch: Stmt) -> Self {
        Stmt::If {
            cond,
            then_branch: Box::new(then_branch),
            else_branch: None,
        }
    }

    pub fn if_else(cond: Expr, then_branch: Stmt, else_branch: Stmt) -> Self {
        Stmt::If {
            cond,
            then_branch: Box::new(then_branch),
            else_branch: Some(Box::new(else_branch)),
        }
    }

    pub fn while_loop(cond: Expr, body: Stmt) -> Self {
        Stmt::While {
            cond,
            body: Box::new(body),
        }
    }

    pub fn do_while(body: Stmt, cond: Expr) -> Self {
        Stmt::DoWhile {
            body: Box::new(body),
            cond,
        }
    }

    pub fn bounded_loop(bound: impl Into<String>, body: Stmt) -> Self {
        Stmt::Loop {
            bound: bound.into(),
            body: Box::new(body),
        }
    }

    /// Appends referenced variable names, in order of first appearance.
    pub fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Stmt::Assign { target, value } => {
                push_unique(out, target);
                value.collect_variables(out);
            }
            Stmt::Decl { name, init } => {
                push_unique(out, name);
                if let Some(e) = init {
                    e.collect_variables(out);
                }
            }
            Stmt::Expr(e) => e.collect_variables(out),
            Stmt::Return(e) => {
                if let Some(e) = e {
                    e.collect_variables(out);
                }
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    s.collect_variables(out);
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                cond.collect_variables(out);
                then_branch.collect_variables(out);
                if let Some(e) = else_branch {
                    e.collect_variables(out);
                }
            }
            Stmt::While { cond, body } | Stmt::DoWhile { body, cond } => {
                cond.collect_variables(out);
                body.collect_variables(out);
            }
            Stmt::Loop { bound, body } => {
                push_unique(out, bound);
                body.collect_variables(out);
            }
            Stmt::Break | Stmt::Continue | Stmt::Empty | Stmt::Opaque(_) => {}
        }
    }

    /// Variables the statement may modify.
    pub fn assigned_variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_assigned(&mut out);
        out
    }

    fn collect_assigned(&self, out: &mut Vec<String>) {
        match self {
            Stmt::Assign { target, value } => {
                push_unique(out, target);
                value.collect_assigned(out);
            }
            Stmt::Decl { name, init } => {
                if let Some(e) = init {
                    push_unique(out, name);
                    e.collect_assigned(out);
                }
            }
            Stmt::Expr(e) => e.collect_assigned(out),
            Stmt::Block(stmts) => {
                for s in stmts {
                    s.collect_assigned(out);
                }
            }
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                then_branch.collect_assigned(out);
                if let Some(e) = else_branch {
                    e.collect_assigned(out);
                }
            }
            Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::Loop { body, .. } => {
                body.collect_assigned(out)
            }
            Stmt::Return(_) | Stmt::Break | Stmt::Continue | Stmt::Empty | Stmt::Opaque(_) => {}
        }
    }

    pub fn is_loop(&self) -> bool {
        matches!(self, Stmt::While { .. } | Stmt::DoWhile { .. } | Stmt::Loop { .. })
    }

    /// Loops of the statement in pre-order. A nested loop is listed on its
    /// own after the loop that contains it.
    pub fn loops(&self) -> Vec<&Stmt> {
        let mut out = Vec::new();
        self.collect_loops(&mut out);
        out
    }

    fn collect_loops<'s>(&'s self, out: &mut Vec<&'s Stmt>) {
        match self {
            Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::Loop { body, .. } => {
                out.push(self);
                body.collect_loops(out);
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    s.collect_loops(out);
                }
            }
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                then_branch.collect_loops(out);
                if let Some(e) = else_branch {
                    e.collect_loops(out);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assign { target, value } => write!(f, "{} = {};", target, value),
            Stmt::Decl { name, init: None } => write!(f, "int {};", name),
            Stmt::Decl { name, init: Some(e) } => write!(f, "int {} = {};", name, e),
            Stmt::Expr(e) => write!(f, "{};", e),
            Stmt::Block(stmts) => {
                write!(f, "{{")?;
                for s in stmts {
                    write!(f, " {}", s)?;
                }
                write!(f, " }}")
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                write!(f, "if ({}) {}", cond, then_branch)?;
                if let Some(e) = else_branch {
                    write!(f, " else {}", e)?;
                }
                Ok(())
            }
            Stmt::While { cond, body } => write!(f, "while ({}) {}", cond, body),
            Stmt::DoWhile { body, cond } => write!(f, "do {} while ({});", body, cond),
            Stmt::Loop { bound, body } => write!(f, "loop {} {}", bound, body),
            Stmt::Return(None) => write!(f, "return;"),
            Stmt::Return(Some(e)) => write!(f, "return {};", e),
            Stmt::Break => write!(f, "break;"),
            Stmt::Continue => write!(f, "continue;"),
            Stmt::Empty => write!(f, ";"),
            Stmt::Opaque(text) => write!(f, "{}", text),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Function {
    pub name: String,
    /// Variables declared by the front end (parameters first).
    pub variables: Vec<Variable>,
    pub body: Vec<Stmt>,
}

impl Function {
    pub fn new(name: impl Into<String>, variables: Vec<Variable>, body: Vec<Stmt>) -> Self {
        Function {
            name: name.into(),
            variables,
            body,
        }
    }

    /// Function whose parameters are the given names and whose locals are
    /// discovered from the body.
    pub fn with_params<S: AsRef<str>>(name: impl Into<String>, params: &[S], body: Vec<Stmt>) -> Self {
        let variables = params.iter().map(|p| Variable::param(p.as_ref())).collect();
        Function::new(name, variables, body)
    }

    /// The variable ordering of the analysis: declared variables first, then
    /// every other name referenced by the body, in order of first appearance.
    pub fn scope(&self) -> Vec<Variable> {
        let mut result: Vec<Variable> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for v in &self.variables {
            if seen.insert(v.name.clone()) {
                result.push(v.clone());
            }
        }
        let mut referenced = Vec::new();
        for s in &self.body {
            s.collect_variables(&mut referenced);
        }
        for name in referenced {
            if seen.insert(name.clone()) {
                let kind = if self.declares_local(&name) {
                    DeclKind::Local
                } else {
                    DeclKind::Free
                };
                result.push(Variable::new(name, kind));
            }
        }
        result
    }

    /// Every loop of the body, nested ones included.
    pub fn loops(&self) -> Vec<&Stmt> {
        self.body.iter().flat_map(|s| s.loops()).collect()
    }

    fn declares_local(&self, name: &str) -> bool {
        fn walk(s: &Stmt, name: &str) -> bool {
            match s {
                Stmt::Decl { name: n, .. } => n == name,
                Stmt::Block(stmts) => stmts.iter().any(|s| walk(s, name)),
                Stmt::If {
                    then_branch,
                    else_branch,
                    ..
                } => walk(then_branch, name) || else_branch.as_deref().is_some_and(|e| walk(e, name)),
                Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::Loop { body, .. } => walk(body, name),
                _ => false,
            }
        }
        self.body.iter().any(|s| walk(s, name))
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Program {
    pub functions: Vec<Function>,
}

impl Program {
    pub fn new(functions: Vec<Function>) -> Self {
        Program { functions }
    }
}
