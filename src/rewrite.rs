//! Cost-directed rewriting of matrix expressions
//!
//! Enumerates the closure of an expression under a small set of algebraic
//! rules and picks the cheapest tree by FLOP count. Every rule preserves the
//! multiset of leaves, so the closure of a finite tree is finite; a tabu set
//! of visited trees makes the breadth-first walk terminate.

use crate::ast::{BinOp, Expr, SymbolTable, TernOp, UnOp};
use crate::error::{OptError, OptResult};
use crate::flops::flops;
use std::collections::{HashSet, VecDeque};

/// Default bound on the number of distinct trees the search will visit.
pub const DEFAULT_CLOSURE_LIMIT: usize = 65_536;

type Rule = fn(&Expr) -> Option<Expr>;

/// `(l c) r  ->  l (c r)`
fn assoc_mult_left(expr: &Expr) -> Option<Expr> {
    if let Expr::Branch2(BinOp::Product, lc, r) = expr {
        if let Expr::Branch2(BinOp::Product, l, c) = lc.as_ref() {
            return Some(Expr::product(
                l.as_ref().clone(),
                Expr::product(c.as_ref().clone(), r.as_ref().clone()),
            ));
        }
    }
    None
}

/// `l (c r)  ->  (l c) r`
fn assoc_mult_right(expr: &Expr) -> Option<Expr> {
    if let Expr::Branch2(BinOp::Product, l, cr) = expr {
        if let Expr::Branch2(BinOp::Product, c, r) = cr.as_ref() {
            return Some(Expr::product(
                Expr::product(l.as_ref().clone(), c.as_ref().clone()),
                r.as_ref().clone(),
            ));
        }
    }
    None
}

/// `a b + a c  ->  a (b + c)`
fn common_factor_left(expr: &Expr) -> Option<Expr> {
    if let Expr::Branch2(BinOp::Sum, left, right) = expr {
        if let (
            Expr::Branch2(BinOp::Product, l1, l2),
            Expr::Branch2(BinOp::Product, r1, r2),
        ) = (left.as_ref(), right.as_ref())
        {
            if l1 == r1 {
                return Some(Expr::product(
                    l1.as_ref().clone(),
                    Expr::sum(l2.as_ref().clone(), r2.as_ref().clone()),
                ));
            }
        }
    }
    None
}

/// `a c + b c  ->  (a + b) c`
fn common_factor_right(expr: &Expr) -> Option<Expr> {
    if let Expr::Branch2(BinOp::Sum, left, right) = expr {
        if let (
            Expr::Branch2(BinOp::Product, l1, l2),
            Expr::Branch2(BinOp::Product, r1, r2),
        ) = (left.as_ref(), right.as_ref())
        {
            if l2 == r2 {
                return Some(Expr::product(
                    Expr::sum(l1.as_ref().clone(), r1.as_ref().clone()),
                    l2.as_ref().clone(),
                ));
            }
        }
    }
    None
}

const RULES: [Rule; 4] = [
    assoc_mult_left,
    assoc_mult_right,
    common_factor_left,
    common_factor_right,
];

/// One step of the path from a focused subtree back to the root.
enum Crumb {
    Unary(UnOp),
    BinaryLeft(BinOp, Expr),
    BinaryRight(BinOp, Expr),
    TernaryA(TernOp, Expr, Expr),
    TernaryB(TernOp, Expr, Expr),
    TernaryC(TernOp, Expr, Expr),
    LetRhs {
        name: char,
        is_temp: bool,
        body: Expr,
    },
    LetBody {
        name: char,
        is_temp: bool,
        rhs: Expr,
    },
}

/// Stitch a rewritten focus back into the whole tree along its breadcrumbs.
fn rebuild(mut focus: Expr, path: &[Crumb]) -> Expr {
    for crumb in path.iter().rev() {
        focus = match crumb {
            Crumb::Unary(op) => Expr::Branch1(*op, Box::new(focus)),
            Crumb::BinaryLeft(op, right) => {
                Expr::Branch2(*op, Box::new(focus), Box::new(right.clone()))
            }
            Crumb::BinaryRight(op, left) => {
                Expr::Branch2(*op, Box::new(left.clone()), Box::new(focus))
            }
            Crumb::TernaryA(op, b, c) => Expr::Branch3(
                *op,
                Box::new(focus),
                Box::new(b.clone()),
                Box::new(c.clone()),
            ),
            Crumb::TernaryB(op, a, c) => Expr::Branch3(
                *op,
                Box::new(a.clone()),
                Box::new(focus),
                Box::new(c.clone()),
            ),
            Crumb::TernaryC(op, a, b) => Expr::Branch3(
                *op,
                Box::new(a.clone()),
                Box::new(b.clone()),
                Box::new(focus),
            ),
            Crumb::LetRhs {
                name,
                is_temp,
                body,
            } => Expr::Let {
                name: *name,
                rhs: Box::new(focus),
                is_temp: *is_temp,
                body: Box::new(body.clone()),
            },
            Crumb::LetBody {
                name,
                is_temp,
                rhs,
            } => Expr::Let {
                name: *name,
                rhs: Box::new(rhs.clone()),
                is_temp: *is_temp,
                body: Box::new(focus),
            },
        };
    }
    focus
}

/// Every whole tree reachable by one rule application at one position.
fn single_step_rewrites(expr: &Expr) -> Vec<Expr> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    visit(expr, &mut path, &mut out);
    out
}

fn visit(focus: &Expr, path: &mut Vec<Crumb>, out: &mut Vec<Expr>) {
    for rule in RULES {
        if let Some(rewritten) = rule(focus) {
            out.push(rebuild(rewritten, path));
        }
    }

    match focus {
        Expr::Leaf(_) | Expr::IdentityLeaf(_) | Expr::LiteralScalar(_) => {}
        Expr::Branch1(op, t) => {
            path.push(Crumb::Unary(*op));
            visit(t, path, out);
            path.pop();
        }
        Expr::Branch2(op, l, r) => {
            path.push(Crumb::BinaryLeft(*op, r.as_ref().clone()));
            visit(l, path, out);
            path.pop();

            path.push(Crumb::BinaryRight(*op, l.as_ref().clone()));
            visit(r, path, out);
            path.pop();
        }
        Expr::Branch3(op, a, b, c) => {
            path.push(Crumb::TernaryA(*op, b.as_ref().clone(), c.as_ref().clone()));
            visit(a, path, out);
            path.pop();

            path.push(Crumb::TernaryB(*op, a.as_ref().clone(), c.as_ref().clone()));
            visit(b, path, out);
            path.pop();

            path.push(Crumb::TernaryC(*op, a.as_ref().clone(), b.as_ref().clone()));
            visit(c, path, out);
            path.pop();
        }
        Expr::Let {
            name,
            rhs,
            is_temp,
            body,
        } => {
            path.push(Crumb::LetRhs {
                name: *name,
                is_temp: *is_temp,
                body: body.as_ref().clone(),
            });
            visit(rhs, path, out);
            path.pop();

            path.push(Crumb::LetBody {
                name: *name,
                is_temp: *is_temp,
                rhs: rhs.as_ref().clone(),
            });
            visit(body, path, out);
            path.pop();
        }
    }
}

/// Rewrite-closure search with cost-based selection
pub struct Rewriter {
    closure_limit: usize,
}

impl Rewriter {
    pub fn new() -> Self {
        Self {
            closure_limit: DEFAULT_CLOSURE_LIMIT,
        }
    }

    pub fn with_closure_limit(mut self, limit: usize) -> Self {
        self.closure_limit = limit;
        self
    }

    /// The full set of trees reachable from `root`, in insertion order.
    pub fn closure(&self, root: &Expr) -> OptResult<Vec<Expr>> {
        let mut seen: HashSet<Expr> = HashSet::new();
        let mut order: Vec<Expr> = Vec::new();
        let mut queue: VecDeque<Expr> = VecDeque::new();

        seen.insert(root.clone());
        order.push(root.clone());
        queue.push_back(root.clone());

        while let Some(tree) = queue.pop_front() {
            for next in single_step_rewrites(&tree) {
                if seen.contains(&next) {
                    continue;
                }
                if order.len() >= self.closure_limit {
                    return Err(OptError::analysis("search space exceeded"));
                }
                seen.insert(next.clone());
                order.push(next.clone());
                queue.push_back(next);
            }
        }
        Ok(order)
    }

    /// Minimum-FLOP tree over the closure of `expr`, with its cost.
    ///
    /// Candidates are costed in insertion order and ties keep the earliest,
    /// so the result is deterministic and re-optimizing a result returns it
    /// unchanged.
    pub fn optimize(&self, expr: &Expr, table: &SymbolTable) -> OptResult<(u64, Expr)> {
        let candidates = self.closure(expr)?;
        let mut best_cost = flops(&candidates[0], table)?;
        let mut best = &candidates[0];
        for tree in &candidates[1..] {
            let cost = flops(tree, table)?;
            if cost < best_cost {
                best_cost = cost;
                best = tree;
            }
        }
        Ok((best_cost, best.clone()))
    }
}

impl Default for Rewriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Optimize with the default search bounds.
pub fn optimize(expr: &Expr, table: &SymbolTable) -> OptResult<(u64, Expr)> {
    Rewriter::new().optimize(expr, table)
}
