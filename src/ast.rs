//! Expression trees and matrix descriptors
//!
//! The optimizer works on immutable expression trees. Every rewrite builds a
//! fresh tree; structural equality and hashing are what the rewrite rules and
//! the tabu set key on.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The leaf name reserved for contextually-sized identity matrices.
pub const IDENTITY_NAME: char = 'I';

/// Unary matrix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Inverse,
    Transpose,
    Negate,
    Chol,
}

/// Binary matrix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Product,
    ScalarProduct,
    Sum,
    LinSolve,
    CholSolve,
}

/// Ternary matrix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TernOp {
    TernaryProduct,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnOp::Inverse => write!(f, "inverse"),
            UnOp::Transpose => write!(f, "transpose"),
            UnOp::Negate => write!(f, "negate"),
            UnOp::Chol => write!(f, "chol"),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinOp::Product => write!(f, "product"),
            BinOp::ScalarProduct => write!(f, "scalar-product"),
            BinOp::Sum => write!(f, "sum"),
            BinOp::LinSolve => write!(f, "solve"),
            BinOp::CholSolve => write!(f, "chol-solve"),
        }
    }
}

impl fmt::Display for TernOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TernOp::TernaryProduct => write!(f, "ternary-product"),
        }
    }
}

/// Matrix expression tree
#[derive(Debug, Clone)]
pub enum Expr {
    /// Reference to a declared matrix
    Leaf(char),

    /// An n-by-n identity matrix with a concrete size
    IdentityLeaf(usize),

    /// A literal 1x1 value
    LiteralScalar(f64),

    Branch1(UnOp, Box<Expr>),
    Branch2(BinOp, Box<Expr>, Box<Expr>),
    Branch3(TernOp, Box<Expr>, Box<Expr>, Box<Expr>),

    /// Binds `name` to `rhs` in the scope of `body`; `is_temp` is consumed
    /// by emission only
    Let {
        name: char,
        rhs: Box<Expr>,
        is_temp: bool,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn product(left: Expr, right: Expr) -> Expr {
        Expr::Branch2(BinOp::Product, Box::new(left), Box::new(right))
    }

    pub fn scalar_product(scalar: Expr, matrix: Expr) -> Expr {
        Expr::Branch2(BinOp::ScalarProduct, Box::new(scalar), Box::new(matrix))
    }

    pub fn sum(left: Expr, right: Expr) -> Expr {
        Expr::Branch2(BinOp::Sum, Box::new(left), Box::new(right))
    }

    pub fn lin_solve(a: Expr, b: Expr) -> Expr {
        Expr::Branch2(BinOp::LinSolve, Box::new(a), Box::new(b))
    }

    pub fn chol_solve(l: Expr, b: Expr) -> Expr {
        Expr::Branch2(BinOp::CholSolve, Box::new(l), Box::new(b))
    }

    pub fn ternary_product(a: Expr, b: Expr, c: Expr) -> Expr {
        Expr::Branch3(TernOp::TernaryProduct, Box::new(a), Box::new(b), Box::new(c))
    }

    pub fn inverse(t: Expr) -> Expr {
        Expr::Branch1(UnOp::Inverse, Box::new(t))
    }

    pub fn transpose(t: Expr) -> Expr {
        Expr::Branch1(UnOp::Transpose, Box::new(t))
    }

    pub fn negate(t: Expr) -> Expr {
        Expr::Branch1(UnOp::Negate, Box::new(t))
    }

    pub fn chol(t: Expr) -> Expr {
        Expr::Branch1(UnOp::Chol, Box::new(t))
    }

    pub fn let_bound(name: char, rhs: Expr, is_temp: bool, body: Expr) -> Expr {
        Expr::Let {
            name,
            rhs: Box::new(rhs),
            is_temp,
            body: Box::new(body),
        }
    }

    /// True if this node is the unsized identity placeholder `I`.
    pub fn is_identity_placeholder(&self) -> bool {
        matches!(self, Expr::Leaf(c) if *c == IDENTITY_NAME)
    }
}

// Scalars compare and hash by bit pattern so that Eq and Hash agree.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expr::Leaf(a), Expr::Leaf(b)) => a == b,
            (Expr::IdentityLeaf(a), Expr::IdentityLeaf(b)) => a == b,
            (Expr::LiteralScalar(a), Expr::LiteralScalar(b)) => a.to_bits() == b.to_bits(),
            (Expr::Branch1(op_a, t_a), Expr::Branch1(op_b, t_b)) => op_a == op_b && t_a == t_b,
            (Expr::Branch2(op_a, l_a, r_a), Expr::Branch2(op_b, l_b, r_b)) => {
                op_a == op_b && l_a == l_b && r_a == r_b
            }
            (Expr::Branch3(op_a, a1, b1, c1), Expr::Branch3(op_b, a2, b2, c2)) => {
                op_a == op_b && a1 == a2 && b1 == b2 && c1 == c2
            }
            (
                Expr::Let {
                    name: n1,
                    rhs: r1,
                    is_temp: t1,
                    body: b1,
                },
                Expr::Let {
                    name: n2,
                    rhs: r2,
                    is_temp: t2,
                    body: b2,
                },
            ) => n1 == n2 && t1 == t2 && r1 == r2 && b1 == b2,
            _ => false,
        }
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Expr::Leaf(c) => {
                state.write_u8(0);
                c.hash(state);
            }
            Expr::IdentityLeaf(n) => {
                state.write_u8(1);
                n.hash(state);
            }
            Expr::LiteralScalar(x) => {
                state.write_u8(2);
                x.to_bits().hash(state);
            }
            Expr::Branch1(op, t) => {
                state.write_u8(3);
                op.hash(state);
                t.hash(state);
            }
            Expr::Branch2(op, l, r) => {
                state.write_u8(4);
                op.hash(state);
                l.hash(state);
                r.hash(state);
            }
            Expr::Branch3(op, a, b, c) => {
                state.write_u8(5);
                op.hash(state);
                a.hash(state);
                b.hash(state);
                c.hash(state);
            }
            Expr::Let {
                name,
                rhs,
                is_temp,
                body,
            } => {
                state.write_u8(6);
                name.hash(state);
                is_temp.hash(state);
                rhs.hash(state);
                body.hash(state);
            }
        }
    }
}

// Children that would read ambiguously without parentheses.
struct Grouped<'a>(&'a Expr);

impl fmt::Display for Grouped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let composite = matches!(
            self.0,
            Expr::Branch2(BinOp::Product | BinOp::ScalarProduct | BinOp::Sum, _, _)
                | Expr::Branch3(..)
                | Expr::Branch1(UnOp::Negate, _)
                | Expr::Let { .. }
        );
        if composite {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Leaf(c) => write!(f, "{}", c),
            Expr::IdentityLeaf(_) => write!(f, "I"),
            Expr::LiteralScalar(x) => write!(f, "{}", x),
            Expr::Branch1(UnOp::Inverse, t) => write!(f, "{}^-1", Grouped(t)),
            Expr::Branch1(UnOp::Transpose, t) => write!(f, "{}'", Grouped(t)),
            Expr::Branch1(UnOp::Negate, t) => write!(f, "-{}", Grouped(t)),
            Expr::Branch1(UnOp::Chol, t) => write!(f, "chol({})", t),
            Expr::Branch2(BinOp::Product, l, r) => write!(f, "{} {}", Grouped(l), Grouped(r)),
            Expr::Branch2(BinOp::ScalarProduct, l, r) => {
                write!(f, "{} * {}", Grouped(l), Grouped(r))
            }
            Expr::Branch2(BinOp::Sum, l, r) => write!(f, "{} + {}", Grouped(l), Grouped(r)),
            Expr::Branch2(BinOp::LinSolve, a, b) => write!(f, "solve({}, {})", a, b),
            Expr::Branch2(BinOp::CholSolve, a, b) => write!(f, "chol_solve({}, {})", a, b),
            Expr::Branch3(TernOp::TernaryProduct, a, b, c) => {
                write!(f, "{} {} {}", Grouped(a), Grouped(b), Grouped(c))
            }
            Expr::Let {
                name, rhs, body, ..
            } => write!(f, "let {} = {} in {}", name, rhs, body),
        }
    }
}

/// Structural properties a matrix can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MProperty {
    Symmetric,
    PosDef,
    Diagonal,
    LowerTriangular,
}

impl MProperty {
    /// Canonical ordering used for every external rendering.
    pub const ALL: [MProperty; 4] = [
        MProperty::Symmetric,
        MProperty::PosDef,
        MProperty::Diagonal,
        MProperty::LowerTriangular,
    ];

    fn bit(self) -> u8 {
        match self {
            MProperty::Symmetric => 0b0001,
            MProperty::PosDef => 0b0010,
            MProperty::Diagonal => 0b0100,
            MProperty::LowerTriangular => 0b1000,
        }
    }

    fn name(self) -> &'static str {
        match self {
            MProperty::Symmetric => "symmetric",
            MProperty::PosDef => "posdef",
            MProperty::Diagonal => "diag",
            MProperty::LowerTriangular => "ltri",
        }
    }
}

/// Small bitset over the four matrix properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PropSet(u8);

impl PropSet {
    pub const EMPTY: PropSet = PropSet(0);

    pub fn new() -> Self {
        PropSet(0)
    }

    pub fn of(props: &[MProperty]) -> Self {
        props.iter().copied().collect()
    }

    /// All four properties set; the descriptor of an identity matrix.
    pub fn all() -> Self {
        PropSet::of(&MProperty::ALL)
    }

    pub fn insert(&mut self, prop: MProperty) {
        self.0 |= prop.bit();
    }

    pub fn with(mut self, prop: MProperty) -> Self {
        self.insert(prop);
        self
    }

    pub fn contains(self, prop: MProperty) -> bool {
        self.0 & prop.bit() != 0
    }

    pub fn intersect(self, other: PropSet) -> PropSet {
        PropSet(self.0 & other.0)
    }

    pub fn union(self, other: PropSet) -> PropSet {
        PropSet(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate in canonical order.
    pub fn iter(self) -> impl Iterator<Item = MProperty> {
        MProperty::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl FromIterator<MProperty> for PropSet {
    fn from_iter<I: IntoIterator<Item = MProperty>>(iter: I) -> Self {
        let mut set = PropSet::new();
        for prop in iter {
            set.insert(prop);
        }
        set
    }
}

impl fmt::Display for PropSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, prop) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", prop.name())?;
        }
        write!(f, "]")
    }
}

impl Serialize for PropSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for PropSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let props = Vec::<MProperty>::deserialize(deserializer)?;
        Ok(props.into_iter().collect())
    }
}

/// Resolved matrix descriptor: concrete dimensions plus properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub props: PropSet,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, props: PropSet) -> Self {
        Self { rows, cols, props }
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn is_scalar(&self) -> bool {
        self.rows == 1 && self.cols == 1
    }

    pub fn has(&self, prop: MProperty) -> bool {
        self.props.contains(prop)
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.props.is_empty() {
            write!(f, "{}x{}", self.rows, self.cols)
        } else {
            write!(f, "{}x{} {}", self.rows, self.cols, self.props)
        }
    }
}

/// One line of the program preamble
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreambleLine {
    /// `A: n x m props` -- dimension tokens stay raw until resolution
    Matrix {
        name: char,
        rows: String,
        cols: String,
        props: PropSet,
    },
    /// `n = 100` or `n ~ 100`
    Symbol { name: char, value: usize },
    Blank,
}

/// Mapping from single-character matrix names to resolved descriptors
pub type SymbolTable = HashMap<char, Matrix>;
