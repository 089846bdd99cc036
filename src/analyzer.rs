//! Shape and property inference for matrix expressions
//!
//! Resolves preamble declarations into a symbol table and computes the
//! descriptor (dimensions plus structural properties) of any sub-expression
//! under that table.

use crate::ast::{
    BinOp, Expr, MProperty, Matrix, PreambleLine, PropSet, SymbolTable, TernOp, UnOp,
    IDENTITY_NAME,
};
use crate::error::{OptError, OptResult};
use std::collections::HashMap;

/// Resolve preamble lines into a symbol table.
///
/// Dimension symbols are collected first, then each matrix declaration is
/// resolved against them. Duplicate matrix names resolve last-writer-wins.
pub fn resolve_preamble(lines: &[PreambleLine]) -> OptResult<SymbolTable> {
    let mut dims: HashMap<char, usize> = HashMap::new();
    for line in lines {
        if let PreambleLine::Symbol { name, value } = line {
            dims.insert(*name, *value);
        }
    }

    let mut table = SymbolTable::new();
    for line in lines {
        if let PreambleLine::Matrix {
            name,
            rows,
            cols,
            props,
        } = line
        {
            if *name == IDENTITY_NAME {
                return Err(OptError::analysis(
                    "matrix name I is reserved for the identity",
                ));
            }
            let rows = resolve_dimension(rows, &dims)?;
            let cols = resolve_dimension(cols, &dims)?;

            // Declared posdef matrices are positive-definite in the
            // symmetric sense.
            let mut props = *props;
            if props.contains(MProperty::PosDef) {
                props.insert(MProperty::Symmetric);
            }
            if rows != cols && !props.is_empty() {
                return Err(OptError::analysis(format!(
                    "matrix {} declared {}x{} but {} requires a square matrix",
                    name, rows, cols, props
                )));
            }
            table.insert(*name, Matrix::new(rows, cols, props));
        }
    }
    Ok(table)
}

/// Resolve one dimension token: a full decimal literal, or a single-letter
/// symbol defined in the preamble.
fn resolve_dimension(token: &str, dims: &HashMap<char, usize>) -> OptResult<usize> {
    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        return token
            .parse()
            .map_err(|_| OptError::bad_dimension(token));
    }
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_ascii_alphabetic() => dims
            .get(&letter)
            .copied()
            .ok_or(OptError::UnboundName { name: letter }),
        _ => Err(OptError::bad_dimension(token)),
    }
}

/// Compute the matrix descriptor of an expression under a symbol table.
pub fn descriptor_of(expr: &Expr, table: &SymbolTable) -> OptResult<Matrix> {
    match expr {
        Expr::Leaf(name) => table
            .get(name)
            .copied()
            .ok_or(OptError::UnboundName { name: *name }),

        Expr::IdentityLeaf(n) => Ok(Matrix::new(*n, *n, PropSet::all())),

        Expr::LiteralScalar(_) => Ok(Matrix::new(
            1,
            1,
            PropSet::of(&[
                MProperty::Symmetric,
                MProperty::Diagonal,
                MProperty::LowerTriangular,
            ]),
        )),

        Expr::Branch1(op, t) => {
            let m = descriptor_of(t, table)?;
            unary_descriptor(*op, m, t)
        }

        Expr::Branch2(op, l, r) => {
            let lm = descriptor_of(l, table)?;
            let rm = descriptor_of(r, table)?;
            binary_descriptor(*op, lm, rm, l, r)
        }

        Expr::Branch3(TernOp::TernaryProduct, a, b, c) => {
            let am = descriptor_of(a, table)?;
            let bm = descriptor_of(b, table)?;
            let cm = descriptor_of(c, table)?;
            ternary_product_descriptor(am, bm, cm, a, b, c)
        }

        Expr::Let {
            name, rhs, body, ..
        } => {
            let bound = descriptor_of(rhs, table)?;
            let mut scoped = table.clone();
            scoped.insert(*name, bound);
            descriptor_of(body, &scoped)
        }
    }
}

fn unary_descriptor(op: UnOp, m: Matrix, operand: &Expr) -> OptResult<Matrix> {
    match op {
        UnOp::Inverse => {
            if !m.is_square() {
                return Err(OptError::InvalidOp { op, operand: m });
            }
            Ok(m)
        }
        UnOp::Transpose => {
            let props = m.props.intersect(PropSet::of(&[
                MProperty::Symmetric,
                MProperty::PosDef,
                MProperty::Diagonal,
            ]));
            Ok(Matrix::new(m.cols, m.rows, props))
        }
        UnOp::Negate => {
            if !m.is_square() {
                return Err(OptError::InvalidOp { op, operand: m });
            }
            let props = m
                .props
                .intersect(PropSet::of(&[MProperty::Symmetric, MProperty::Diagonal]));
            Ok(Matrix::new(m.rows, m.cols, props))
        }
        UnOp::Chol => {
            if !m.is_square() {
                return Err(OptError::InvalidOp { op, operand: m });
            }
            if !m.has(MProperty::PosDef) {
                return Err(OptError::WrongProperties1 {
                    op,
                    props: m.props,
                    operand: operand.clone(),
                });
            }
            let props = m
                .props
                .intersect(PropSet::of(&[MProperty::Diagonal]))
                .with(MProperty::LowerTriangular);
            Ok(Matrix::new(m.rows, m.cols, props))
        }
    }
}

fn binary_descriptor(
    op: BinOp,
    lm: Matrix,
    rm: Matrix,
    l: &Expr,
    r: &Expr,
) -> OptResult<Matrix> {
    let size_mismatch = || OptError::SizeMismatch {
        op,
        left: lm,
        right: rm,
        left_expr: l.clone(),
        right_expr: r.clone(),
    };

    match op {
        BinOp::Product => {
            if lm.cols != rm.rows {
                return Err(size_mismatch());
            }
            Ok(Matrix::new(lm.rows, rm.cols, product_props(l, r, lm.props, rm.props)))
        }
        BinOp::ScalarProduct => {
            if !lm.is_scalar() {
                return Err(size_mismatch());
            }
            let props = rm.props.intersect(PropSet::of(&[
                MProperty::Symmetric,
                MProperty::Diagonal,
                MProperty::LowerTriangular,
            ]));
            Ok(Matrix::new(rm.rows, rm.cols, props))
        }
        BinOp::Sum => {
            if lm.rows != rm.rows || lm.cols != rm.cols {
                return Err(size_mismatch());
            }
            Ok(Matrix::new(lm.rows, lm.cols, lm.props.intersect(rm.props)))
        }
        BinOp::LinSolve => {
            if !lm.is_square() || lm.rows != rm.rows {
                return Err(size_mismatch());
            }
            Ok(Matrix::new(lm.cols, rm.cols, PropSet::EMPTY))
        }
        BinOp::CholSolve => {
            if !lm.is_square() || lm.rows != rm.rows {
                return Err(size_mismatch());
            }
            if !lm.has(MProperty::LowerTriangular) {
                return Err(OptError::WrongProperties {
                    op,
                    left: lm.props,
                    right: rm.props,
                    left_expr: l.clone(),
                    right_expr: r.clone(),
                });
            }
            Ok(Matrix::new(lm.cols, rm.cols, PropSet::EMPTY))
        }
    }
}

/// True when one operand is syntactically the transpose of the other.
fn is_transpose_pair(l: &Expr, r: &Expr) -> bool {
    let l_is_rt = matches!(l, Expr::Branch1(UnOp::Transpose, inner) if inner.as_ref() == r);
    let r_is_lt = matches!(r, Expr::Branch1(UnOp::Transpose, inner) if inner.as_ref() == l);
    l_is_rt || r_is_lt
}

fn is_inverse_pair(l: &Expr, r: &Expr) -> bool {
    let l_is_ri = matches!(l, Expr::Branch1(UnOp::Inverse, inner) if inner.as_ref() == r);
    let r_is_li = matches!(r, Expr::Branch1(UnOp::Inverse, inner) if inner.as_ref() == l);
    l_is_ri || r_is_li
}

/// Properties of a two-factor product. Diagonal and lower-triangular
/// structure are closed under multiplication; positive-definiteness is
/// inferred from the syntactic pattern `M' M`.
fn product_props(l: &Expr, r: &Expr, pl: PropSet, pr: PropSet) -> PropSet {
    let mut props = pl
        .intersect(pr)
        .intersect(PropSet::of(&[MProperty::Diagonal, MProperty::LowerTriangular]));
    if is_transpose_pair(l, r) {
        props.insert(MProperty::PosDef);
        props.insert(MProperty::Symmetric);
    }
    props
}

fn ternary_product_descriptor(
    am: Matrix,
    bm: Matrix,
    cm: Matrix,
    a: &Expr,
    b: &Expr,
    c: &Expr,
) -> OptResult<Matrix> {
    if am.cols != bm.rows || bm.cols != cm.rows {
        return Err(OptError::SizeMismatchTern {
            op: TernOp::TernaryProduct,
            a: am,
            b: bm,
            c: cm,
        });
    }

    // Two sequential products, then the sandwich patterns that preserve
    // positive-definiteness: A' B A, A^-1 B A, and A B A with B posdef.
    let ab = Expr::product(a.clone(), b.clone());
    let ab_props = product_props(a, b, am.props, bm.props);
    let mut props = product_props(&ab, c, ab_props, cm.props);

    let sandwich = (is_transpose_pair(a, c) || is_inverse_pair(a, c))
        && bm.has(MProperty::PosDef);
    let congruent = am.has(MProperty::PosDef) && bm.has(MProperty::PosDef) && a == c;
    if sandwich || congruent {
        props.insert(MProperty::PosDef);
        props.insert(MProperty::Symmetric);
    }

    Ok(Matrix::new(am.rows, cm.cols, props))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn table_of(source: &str) -> SymbolTable {
        let program = parse_program(source).unwrap();
        resolve_preamble(&program.preamble).unwrap()
    }

    #[test]
    fn test_resolve_symbolic_dimensions() {
        let table = table_of("n = 100\nA: n x n\nA");
        assert_eq!(table[&'A'], Matrix::new(100, 100, PropSet::EMPTY));
    }

    #[test]
    fn test_resolve_unbound_symbol() {
        let program = parse_program("A: m x n\nA").unwrap();
        let err = resolve_preamble(&program.preamble).unwrap_err();
        assert_eq!(err, OptError::unbound('m'));
    }

    #[test]
    fn test_resolve_bad_dimension_token() {
        let err = resolve_dimension("mn", &HashMap::new()).unwrap_err();
        assert_eq!(err, OptError::bad_dimension("mn"));
    }

    #[test]
    fn test_resolve_posdef_implies_symmetric() {
        let table = table_of("A: 4 x 4 posdef\nA");
        assert!(table[&'A'].has(MProperty::Symmetric));
        assert!(table[&'A'].has(MProperty::PosDef));
    }

    #[test]
    fn test_resolve_square_property_on_rectangular() {
        let program = parse_program("A: 3 x 4 sym\nA").unwrap();
        assert!(matches!(
            resolve_preamble(&program.preamble),
            Err(OptError::Analysis { .. })
        ));
    }

    #[test]
    fn test_resolve_last_writer_wins() {
        let table = table_of("A: 2 x 2\nA: 3 x 3\nA");
        assert_eq!(table[&'A'].rows, 3);
    }

    #[test]
    fn test_descriptor_product_chain() {
        let table = table_of("A: 2 x 3\nB: 3 x 4\nA B");
        let expr = Expr::product(Expr::Leaf('A'), Expr::Leaf('B'));
        let m = descriptor_of(&expr, &table).unwrap();
        assert_eq!(m, Matrix::new(2, 4, PropSet::EMPTY));
    }

    #[test]
    fn test_descriptor_product_mismatch() {
        let table = table_of("A: 2 x 3\nB: 4 x 5\nA");
        let expr = Expr::product(Expr::Leaf('A'), Expr::Leaf('B'));
        assert!(matches!(
            descriptor_of(&expr, &table),
            Err(OptError::SizeMismatch { op: BinOp::Product, .. })
        ));
    }

    #[test]
    fn test_descriptor_gram_product_is_posdef() {
        // A' A with A: 100 x 50 comes out 50x50 symmetric posdef.
        let table = table_of("A: 100 x 50\nA");
        let expr = Expr::product(Expr::transpose(Expr::Leaf('A')), Expr::Leaf('A'));
        let m = descriptor_of(&expr, &table).unwrap();
        assert_eq!(m.rows, 50);
        assert_eq!(m.cols, 50);
        assert!(m.has(MProperty::PosDef));
        assert!(m.has(MProperty::Symmetric));
    }

    #[test]
    fn test_descriptor_diagonal_closed_under_product() {
        let table = table_of("D: 3 x 3 diag\nE: 3 x 3 diag\nD");
        let expr = Expr::product(Expr::Leaf('D'), Expr::Leaf('E'));
        let m = descriptor_of(&expr, &table).unwrap();
        assert!(m.has(MProperty::Diagonal));
        assert!(!m.has(MProperty::Symmetric));
    }

    #[test]
    fn test_descriptor_scalar_product() {
        let table = table_of("A: 3 x 3 sym\nA");
        let expr = Expr::scalar_product(Expr::LiteralScalar(2.0), Expr::Leaf('A'));
        let m = descriptor_of(&expr, &table).unwrap();
        assert_eq!((m.rows, m.cols), (3, 3));
        assert!(m.has(MProperty::Symmetric));
        assert!(!m.has(MProperty::PosDef));
    }

    #[test]
    fn test_descriptor_scalar_product_requires_scalar() {
        let table = table_of("A: 3 x 3\nB: 3 x 3\nA");
        let expr = Expr::scalar_product(Expr::Leaf('A'), Expr::Leaf('B'));
        assert!(matches!(
            descriptor_of(&expr, &table),
            Err(OptError::SizeMismatch {
                op: BinOp::ScalarProduct,
                ..
            })
        ));
    }

    #[test]
    fn test_descriptor_sum_intersects_properties() {
        let table = table_of("A: 3 x 3 posdef\nB: 3 x 3 sym\nA + B");
        let expr = Expr::sum(Expr::Leaf('A'), Expr::Leaf('B'));
        let m = descriptor_of(&expr, &table).unwrap();
        assert!(m.has(MProperty::Symmetric));
        assert!(!m.has(MProperty::PosDef));
    }

    #[test]
    fn test_descriptor_transpose_drops_lower_triangular() {
        let table = table_of("A: 4 x 4 posdef\nA");
        let chol = Expr::chol(Expr::Leaf('A'));
        let factor = descriptor_of(&chol, &table).unwrap();
        assert!(factor.has(MProperty::LowerTriangular));

        let transposed = descriptor_of(&Expr::transpose(chol), &table).unwrap();
        assert!(!transposed.has(MProperty::LowerTriangular));
    }

    #[test]
    fn test_descriptor_chol_requires_posdef() {
        let table = table_of("A: 4 x 4 sym\nA");
        let expr = Expr::chol(Expr::Leaf('A'));
        assert!(matches!(
            descriptor_of(&expr, &table),
            Err(OptError::WrongProperties1 { op: UnOp::Chol, .. })
        ));
    }

    #[test]
    fn test_descriptor_chol_solve_requires_lower_triangular() {
        let table = table_of("A: 4 x 4 posdef\nb: 4 x 1\nA");
        let expr = Expr::chol_solve(Expr::Leaf('A'), Expr::Leaf('b'));
        assert!(matches!(
            descriptor_of(&expr, &table),
            Err(OptError::WrongProperties {
                op: BinOp::CholSolve,
                ..
            })
        ));

        // Through the factor it goes through.
        let expr = Expr::chol_solve(Expr::chol(Expr::Leaf('A')), Expr::Leaf('b'));
        let m = descriptor_of(&expr, &table).unwrap();
        assert_eq!((m.rows, m.cols), (4, 1));
        assert!(m.props.is_empty());
    }

    #[test]
    fn test_descriptor_lin_solve() {
        let table = table_of("A: 4 x 4\nB: 4 x 2\nA");
        let expr = Expr::lin_solve(Expr::Leaf('A'), Expr::Leaf('B'));
        let m = descriptor_of(&expr, &table).unwrap();
        assert_eq!(m, Matrix::new(4, 2, PropSet::EMPTY));

        let bad = Expr::lin_solve(Expr::Leaf('B'), Expr::Leaf('A'));
        assert!(matches!(
            descriptor_of(&bad, &table),
            Err(OptError::SizeMismatch { op: BinOp::LinSolve, .. })
        ));
    }

    #[test]
    fn test_descriptor_inverse_and_negate_require_square() {
        let table = table_of("A: 3 x 4\nA");
        assert!(matches!(
            descriptor_of(&Expr::inverse(Expr::Leaf('A')), &table),
            Err(OptError::InvalidOp { op: UnOp::Inverse, .. })
        ));
        assert!(matches!(
            descriptor_of(&Expr::negate(Expr::Leaf('A')), &table),
            Err(OptError::InvalidOp { op: UnOp::Negate, .. })
        ));
    }

    #[test]
    fn test_descriptor_negate_drops_posdef() {
        let table = table_of("A: 3 x 3 posdef\nA");
        let m = descriptor_of(&Expr::negate(Expr::Leaf('A')), &table).unwrap();
        assert!(m.has(MProperty::Symmetric));
        assert!(!m.has(MProperty::PosDef));
    }

    #[test]
    fn test_descriptor_ternary_product() {
        let table = table_of("A: 2 x 3\nB: 3 x 4\nC: 4 x 5\nA");
        let expr = Expr::ternary_product(Expr::Leaf('A'), Expr::Leaf('B'), Expr::Leaf('C'));
        let m = descriptor_of(&expr, &table).unwrap();
        assert_eq!((m.rows, m.cols), (2, 5));
    }

    #[test]
    fn test_descriptor_ternary_sandwich_posdef() {
        let table = table_of("X: 4 x 3\nB: 4 x 4 posdef\nX");
        let expr = Expr::ternary_product(
            Expr::transpose(Expr::Leaf('X')),
            Expr::Leaf('B'),
            Expr::Leaf('X'),
        );
        let m = descriptor_of(&expr, &table).unwrap();
        assert_eq!((m.rows, m.cols), (3, 3));
        assert!(m.has(MProperty::PosDef));
    }

    #[test]
    fn test_descriptor_ternary_mismatch() {
        let table = table_of("A: 2 x 3\nB: 9 x 9\nC: 4 x 5\nA");
        let expr = Expr::ternary_product(Expr::Leaf('A'), Expr::Leaf('B'), Expr::Leaf('C'));
        assert!(matches!(
            descriptor_of(&expr, &table),
            Err(OptError::SizeMismatchTern { .. })
        ));
    }

    #[test]
    fn test_descriptor_let_scoping() {
        let table = table_of("A: 2 x 3\nA");
        let expr = Expr::let_bound(
            'T',
            Expr::transpose(Expr::Leaf('A')),
            false,
            Expr::product(Expr::Leaf('T'), Expr::Leaf('A')),
        );
        let m = descriptor_of(&expr, &table).unwrap();
        assert_eq!((m.rows, m.cols), (3, 3));

        // The binding does not leak out of the body.
        assert!(descriptor_of(&Expr::Leaf('T'), &table).is_err());
    }

    #[test]
    fn test_descriptor_square_properties_imply_square() {
        // Any inferred symmetric or diagonal descriptor is square.
        let table = table_of("A: 100 x 50\nD: 5 x 5 diag\nA");
        let exprs = vec![
            Expr::product(Expr::transpose(Expr::Leaf('A')), Expr::Leaf('A')),
            Expr::product(Expr::Leaf('D'), Expr::Leaf('D')),
            Expr::sum(Expr::Leaf('D'), Expr::Leaf('D')),
            Expr::chol(Expr::product(
                Expr::transpose(Expr::Leaf('A')),
                Expr::Leaf('A'),
            )),
        ];
        for expr in exprs {
            let m = descriptor_of(&expr, &table).unwrap();
            if m.has(MProperty::Symmetric) || m.has(MProperty::Diagonal) {
                assert!(m.is_square(), "{} is not square", m);
            }
        }
    }

    #[test]
    fn test_identity_leaf_descriptor() {
        let m = descriptor_of(&Expr::IdentityLeaf(7), &SymbolTable::new()).unwrap();
        assert_eq!(m, Matrix::new(7, 7, PropSet::all()));
    }

    #[test]
    fn test_reserved_identity_name() {
        let program = parse_program("I: 3 x 3\nI").unwrap();
        assert!(matches!(
            resolve_preamble(&program.preamble),
            Err(OptError::Analysis { .. })
        ));
    }
}
