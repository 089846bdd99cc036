//! FLOP cost model for matrix expressions
//!
//! Estimates the floating-point operations needed to evaluate an expression.
//! All divisions truncate. Shape or property failures in any sub-expression
//! surface as errors.

use crate::analyzer::descriptor_of;
use crate::ast::{BinOp, Expr, MProperty, SymbolTable, TernOp, UnOp};
use crate::error::OptResult;

/// Estimated FLOP count of evaluating an expression under a symbol table.
pub fn flops(expr: &Expr, table: &SymbolTable) -> OptResult<u64> {
    match expr {
        Expr::Leaf(_) | Expr::LiteralScalar(_) => Ok(0),

        Expr::IdentityLeaf(n) => Ok((n * n) as u64),

        Expr::Branch1(op, t) => {
            descriptor_of(expr, table)?;
            let inner = flops(t, table)?;
            let m = descriptor_of(t, table)?;
            let r = m.rows as u64;
            let cost = match op {
                UnOp::Inverse => {
                    if m.has(MProperty::LowerTriangular) {
                        (r * r + r) / 2
                    } else {
                        3 * r * r * r / 4
                    }
                }
                UnOp::Transpose => 1,
                UnOp::Negate => 0,
                UnOp::Chol => r * r * r / 3,
            };
            Ok(cost + inner)
        }

        Expr::Branch2(op, l, r) => {
            descriptor_of(expr, table)?;
            let left = flops(l, table)?;
            let right = flops(r, table)?;
            let lm = descriptor_of(l, table)?;
            let rm = descriptor_of(r, table)?;
            let cost = match op {
                BinOp::Product => {
                    let (r1, c1, c2) = (lm.rows as u64, lm.cols as u64, rm.cols as u64);
                    r1 * c2 * (2 * c1).saturating_sub(1)
                }
                BinOp::ScalarProduct => (rm.rows * rm.cols) as u64,
                BinOp::Sum => (lm.rows * lm.cols) as u64,
                BinOp::LinSolve => {
                    let (n, c) = (lm.rows as u64, rm.cols as u64);
                    2 * (n * n * n / 3 + c * n * n)
                }
                BinOp::CholSolve => {
                    let (n, c) = (lm.rows as u64, rm.cols as u64);
                    2 * c * n * n
                }
            };
            Ok(cost + left + right)
        }

        Expr::Branch3(TernOp::TernaryProduct, a, b, c) => {
            // Costed as the left-nested pair of products.
            let nested = Expr::product(
                Expr::product(a.as_ref().clone(), b.as_ref().clone()),
                c.as_ref().clone(),
            );
            flops(&nested, table)
        }

        Expr::Let {
            name, rhs, body, ..
        } => {
            let rhs_cost = flops(rhs, table)?;
            let bound = descriptor_of(rhs, table)?;
            let mut scoped = table.clone();
            scoped.insert(*name, bound);
            let body_cost = flops(body, &scoped)?;
            Ok(rhs_cost + body_cost + 1)
        }
    }
}
