//! Matrix Expression FLOP Optimizer
//!
//! This library takes a small matrix program -- a preamble declaring matrix
//! symbols with dimensions and structural properties, followed by an
//! expression -- and searches for an algebraically equivalent expression with
//! the lowest estimated floating-point cost, then emits NumPy code for it.
//!
//! # Example
//!
//! ```rust
//! use matrizer::optimize_source;
//!
//! let report = optimize_source("n = 1000\nA: n x n\nB: n x n\nx: n x 1\nA B x").unwrap();
//! assert_eq!(report.python, "np.dot(A, np.dot(B, x))");
//! assert!(report.cost_after <= report.cost_before);
//! ```

pub mod analyzer;
pub mod ast;
pub mod codegen;
pub mod error;
pub mod flops;
pub mod lexer;
pub mod parser;
pub mod preprocess;
pub mod rewrite;

pub use analyzer::{descriptor_of, resolve_preamble};
pub use ast::{BinOp, Expr, MProperty, Matrix, PreambleLine, PropSet, SymbolTable, TernOp, UnOp};
pub use codegen::emit;
pub use error::{OptError, OptResult};
pub use flops::flops;
pub use parser::{parse_expr, parse_program, ParsedProgram};
pub use preprocess::preprocess;
pub use rewrite::{optimize, Rewriter, DEFAULT_CLOSURE_LIMIT};

use serde::Serialize;

/// Result of optimizing one program
#[derive(Debug, Clone, Serialize)]
pub struct Optimization {
    /// FLOP count of the normalized input expression
    pub cost_before: u64,
    /// FLOP count of the chosen expression
    pub cost_after: u64,
    /// The chosen expression in source-like syntax
    pub expression: String,
    /// The chosen expression in NumPy syntax
    pub python: String,
    #[serde(skip)]
    pub tree: Expr,
}

/// Parse, resolve, normalize, and optimize a program source.
pub fn optimize_source(source: &str) -> OptResult<Optimization> {
    let program = parse_program(source)?;
    let table = resolve_preamble(&program.preamble)?;
    optimize_with_table(&program.expr, &table)
}

/// Optimize an already-parsed expression against a symbol table.
pub fn optimize_with_table(expr: &Expr, table: &SymbolTable) -> OptResult<Optimization> {
    let normalized = preprocess(expr, table)?;
    let cost_before = flops(&normalized, table)?;
    let (cost_after, tree) = rewrite::optimize(&normalized, table)?;
    Ok(Optimization {
        cost_before,
        cost_after,
        expression: tree.to_string(),
        python: emit(&tree),
        tree,
    })
}
