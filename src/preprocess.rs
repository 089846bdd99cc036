//! Normalization pass run before optimization
//!
//! Two local rewrites: identity leaves written as `I` get a concrete size
//! inferred from the surrounding operator, and products with a 1x1 operand
//! are reclassified as scalar products. The pass is idempotent.

use crate::analyzer::descriptor_of;
use crate::ast::{BinOp, Expr, Matrix, SymbolTable};
use crate::error::{OptError, OptResult};

/// Which side of a binary operator the identity placeholder sits on.
#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// Normalize an expression: size identity leaves, reclassify scalar products.
pub fn preprocess(expr: &Expr, table: &SymbolTable) -> OptResult<Expr> {
    match expr {
        Expr::Leaf(_) if expr.is_identity_placeholder() => Err(OptError::analysis(
            "identity matrix without contextual size",
        )),
        Expr::Leaf(_) | Expr::IdentityLeaf(_) | Expr::LiteralScalar(_) => Ok(expr.clone()),

        Expr::Branch1(op, t) => Ok(Expr::Branch1(*op, Box::new(preprocess(t, table)?))),

        Expr::Branch2(op, l, r) => preprocess_binary(*op, l, r, table),

        Expr::Branch3(..) => Err(OptError::analysis("ternary product in parser input")),

        Expr::Let {
            name,
            rhs,
            is_temp,
            body,
        } => {
            let rhs = preprocess(rhs, table)?;
            let bound = descriptor_of(&rhs, table)?;
            let mut scoped = table.clone();
            scoped.insert(*name, bound);
            let body = preprocess(body, &scoped)?;
            Ok(Expr::Let {
                name: *name,
                rhs: Box::new(rhs),
                is_temp: *is_temp,
                body: Box::new(body),
            })
        }
    }
}

fn preprocess_binary(op: BinOp, l: &Expr, r: &Expr, table: &SymbolTable) -> OptResult<Expr> {
    let (l, r) = match (l.is_identity_placeholder(), r.is_identity_placeholder()) {
        (true, true) => {
            return Err(OptError::analysis(format!(
                "identity matrix on both sides of {}",
                op
            )))
        }
        (false, true) => {
            let l = preprocess(l, table)?;
            let m = descriptor_of(&l, table)?;
            let n = identity_size(op, &m, Side::Right)?;
            (l, Expr::IdentityLeaf(n))
        }
        (true, false) => {
            let r = preprocess(r, table)?;
            let m = descriptor_of(&r, table)?;
            let n = identity_size(op, &m, Side::Left)?;
            (Expr::IdentityLeaf(n), r)
        }
        (false, false) => (preprocess(l, table)?, preprocess(r, table)?),
    };

    if op == BinOp::Product {
        let lm = descriptor_of(&l, table)?;
        if lm.is_scalar() {
            return Ok(Expr::scalar_product(l, r));
        }
        let rm = descriptor_of(&r, table)?;
        if rm.is_scalar() {
            return Ok(Expr::scalar_product(r, l));
        }
    }
    Ok(Expr::Branch2(op, Box::new(l), Box::new(r)))
}

/// Size of an identity operand given the descriptor of the other operand.
fn identity_size(op: BinOp, other: &Matrix, side: Side) -> OptResult<usize> {
    match (op, side) {
        (BinOp::Product, Side::Right) => Ok(other.cols),
        (BinOp::Product, Side::Left) => Ok(other.rows),
        (BinOp::Sum, _) => Ok(other.rows),
        (BinOp::LinSolve | BinOp::CholSolve, Side::Right) => Ok(other.rows),
        (BinOp::LinSolve | BinOp::CholSolve, Side::Left) => Ok(other.cols),
        (BinOp::ScalarProduct, _) => Err(OptError::analysis(
            "identity matrix in a scalar product",
        )),
    }
}
