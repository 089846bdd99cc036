//! NumPy code emission
//!
//! Renders an optimized expression in NumPy syntax. Let bindings become
//! assignment lines ahead of the final expression.

use crate::ast::{BinOp, Expr, TernOp, UnOp};

/// Emit an expression in NumPy syntax.
pub fn emit(expr: &Expr) -> String {
    match expr {
        Expr::Leaf(c) => c.to_string(),
        Expr::IdentityLeaf(n) => format!("np.eye({})", n),
        Expr::LiteralScalar(x) => format!("{}", x),

        Expr::Branch1(UnOp::Inverse, t) => format!("np.linalg.inv({})", emit(t)),
        Expr::Branch1(UnOp::Transpose, t) => format!("{}.T", emit_atom(t)),
        Expr::Branch1(UnOp::Negate, t) => format!("-{}", emit_atom(t)),
        Expr::Branch1(UnOp::Chol, t) => format!("np.linalg.cholesky({})", emit(t)),

        Expr::Branch2(BinOp::Product, l, r) => format!("np.dot({}, {})", emit(l), emit(r)),
        Expr::Branch2(BinOp::ScalarProduct, l, r) => {
            format!("{} * {}", emit_atom(l), emit_atom(r))
        }
        Expr::Branch2(BinOp::Sum, l, r) => format!("{} + {}", emit(l), emit(r)),
        Expr::Branch2(BinOp::LinSolve, a, b) => {
            format!("np.linalg.solve({}, {})", emit(a), emit(b))
        }
        Expr::Branch2(BinOp::CholSolve, l, b) => {
            // L L' z = b via two triangular solves.
            let factor = emit_atom(l);
            format!(
                "np.linalg.solve({}.T, np.linalg.solve({}, {}))",
                factor,
                factor,
                emit(b)
            )
        }

        Expr::Branch3(TernOp::TernaryProduct, a, b, c) => format!(
            "np.dot(np.dot({}, {}), {})",
            emit(a),
            emit(b),
            emit(c)
        ),

        Expr::Let {
            name,
            rhs,
            is_temp,
            body,
        } => {
            let marker = if *is_temp { "  # temp" } else { "" };
            format!("{} = {}{}\n{}", name, emit(rhs), marker, emit(body))
        }
    }
}

/// Wrap renderings that would bind wrong under a postfix or infix operator.
fn emit_atom(expr: &Expr) -> String {
    let rendered = emit(expr);
    let composite = matches!(
        expr,
        Expr::Branch2(BinOp::ScalarProduct | BinOp::Sum, _, _)
            | Expr::Branch1(UnOp::Negate, _)
            | Expr::Let { .. }
    );
    if composite {
        format!("({})", rendered)
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_leaves() {
        assert_eq!(emit(&Expr::Leaf('A')), "A");
        assert_eq!(emit(&Expr::IdentityLeaf(4)), "np.eye(4)");
        assert_eq!(emit(&Expr::LiteralScalar(2.5)), "2.5");
        assert_eq!(emit(&Expr::LiteralScalar(2.0)), "2");
    }

    #[test]
    fn test_emit_operators() {
        let a = Expr::Leaf('A');
        let b = Expr::Leaf('B');

        assert_eq!(
            emit(&Expr::product(a.clone(), b.clone())),
            "np.dot(A, B)"
        );
        assert_eq!(emit(&Expr::sum(a.clone(), b.clone())), "A + B");
        assert_eq!(emit(&Expr::inverse(a.clone())), "np.linalg.inv(A)");
        assert_eq!(emit(&Expr::transpose(a.clone())), "A.T");
        assert_eq!(emit(&Expr::negate(a.clone())), "-A");
        assert_eq!(emit(&Expr::chol(a.clone())), "np.linalg.cholesky(A)");
        assert_eq!(
            emit(&Expr::lin_solve(a.clone(), b.clone())),
            "np.linalg.solve(A, B)"
        );
        assert_eq!(
            emit(&Expr::scalar_product(Expr::LiteralScalar(3.0), a.clone())),
            "3 * A"
        );
    }

    #[test]
    fn test_emit_chol_solve_as_two_triangular_solves() {
        let expr = Expr::chol_solve(Expr::Leaf('L'), Expr::Leaf('b'));
        assert_eq!(
            emit(&expr),
            "np.linalg.solve(L.T, np.linalg.solve(L, b))"
        );
    }

    #[test]
    fn test_emit_ternary_product() {
        let expr = Expr::ternary_product(Expr::Leaf('A'), Expr::Leaf('B'), Expr::Leaf('C'));
        assert_eq!(emit(&expr), "np.dot(np.dot(A, B), C)");
    }

    #[test]
    fn test_emit_groups_ambiguous_children() {
        let expr = Expr::transpose(Expr::sum(Expr::Leaf('A'), Expr::Leaf('B')));
        assert_eq!(emit(&expr), "(A + B).T");

        let expr = Expr::scalar_product(
            Expr::LiteralScalar(2.0),
            Expr::sum(Expr::Leaf('A'), Expr::Leaf('B')),
        );
        assert_eq!(emit(&expr), "2 * (A + B)");
    }

    #[test]
    fn test_emit_nested_products_stay_nested() {
        let expr = Expr::product(
            Expr::Leaf('A'),
            Expr::product(Expr::Leaf('B'), Expr::Leaf('x')),
        );
        assert_eq!(emit(&expr), "np.dot(A, np.dot(B, x))");
    }

    #[test]
    fn test_emit_let_binding() {
        let expr = Expr::let_bound(
            'T',
            Expr::product(Expr::Leaf('A'), Expr::Leaf('B')),
            true,
            Expr::product(Expr::Leaf('T'), Expr::Leaf('T')),
        );
        assert_eq!(
            emit(&expr),
            "T = np.dot(A, B)  # temp\nnp.dot(T, T)"
        );

        let expr = Expr::let_bound('S', Expr::Leaf('A'), false, Expr::Leaf('S'));
        assert_eq!(emit(&expr), "S = A\nS");
    }
}
