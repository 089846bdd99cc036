//! Error types for the matrix expression optimizer

use crate::ast::{BinOp, Expr, Matrix, PropSet, TernOp, UnOp};
use thiserror::Error;

/// Result type for analysis and optimization operations
pub type OptResult<T> = Result<T, OptError>;

/// Analysis and optimization errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptError {
    #[error("size mismatch in {op}: {left_expr} is {left}, {right_expr} is {right}")]
    SizeMismatch {
        op: BinOp,
        left: Matrix,
        right: Matrix,
        left_expr: Expr,
        right_expr: Expr,
    },

    #[error("size mismatch in {op}: operands are {a}, {b}, {c}")]
    SizeMismatchTern {
        op: TernOp,
        a: Matrix,
        b: Matrix,
        c: Matrix,
    },

    #[error("invalid {op} of a {operand} matrix")]
    InvalidOp { op: UnOp, operand: Matrix },

    #[error("wrong properties for {op}: {left_expr} has {left}, {right_expr} has {right}")]
    WrongProperties {
        op: BinOp,
        left: PropSet,
        right: PropSet,
        left_expr: Expr,
        right_expr: Expr,
    },

    #[error("wrong properties for {op}: {operand} has {props}")]
    WrongProperties1 {
        op: UnOp,
        props: PropSet,
        operand: Expr,
    },

    #[error("unbound name: {name}")]
    UnboundName { name: char },

    #[error("bad dimension: {token}")]
    BadDimension { token: String },

    #[error("analysis error: {message}")]
    Analysis { message: String },

    #[error("parse error: {message}")]
    Parse { message: String },
}

impl OptError {
    pub fn analysis(message: impl Into<String>) -> Self {
        OptError::Analysis {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        OptError::Parse {
            message: message.into(),
        }
    }

    pub fn unbound(name: char) -> Self {
        OptError::UnboundName { name }
    }

    pub fn bad_dimension(token: impl Into<String>) -> Self {
        OptError::BadDimension {
            token: token.into(),
        }
    }
}
