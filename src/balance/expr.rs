use crate::error::SamplingError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

/// Arithmetic operators available in balancing formulas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
        }
    }

    fn apply(&self, left: f64, right: f64) -> f64 {
        match self {
            BinaryOp::Add => left + right,
            BinaryOp::Sub => left - right,
            BinaryOp::Mul => left * right,
            BinaryOp::Div => left / right,
        }
    }
}

/// Symbolic formula evaluated later by the materializer, once per draw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expr {
    Literal(f64),
    /// Reference to a named parameter
    Param(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn lit(value: f64) -> Self {
        Expr::Literal(value)
    }

    pub fn param(name: impl Into<String>) -> Self {
        Expr::Param(name.into())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Evaluate against a parameter lookup
    pub fn eval<F>(&self, lookup: &F) -> Result<f64, SamplingError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        match self {
            Expr::Literal(v) => Ok(*v),
            Expr::Param(name) => {
                lookup(name).ok_or_else(|| SamplingError::UnknownParameter(name.clone()))
            }
            Expr::Binary { op, left, right } => {
                Ok(op.apply(left.eval(lookup)?, right.eval(lookup)?))
            }
        }
    }

    /// Names of every parameter referenced by this formula
    pub fn references(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Param(name) => {
                out.insert(name.as_str());
            }
            Expr::Binary { left, right, .. } => {
                left.collect_references(out);
                right.collect_references(out);
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            _ => 3,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Param(name) => f.write_str(name),
            Expr::Binary { op, left, right } => {
                let prec = op.precedence();
                if left.precedence() < prec {
                    write!(f, "({})", left)?;
                } else {
                    write!(f, "{}", left)?;
                }
                write!(f, " {} ", op.symbol())?;
                // Right operand of - and / binds tighter than its parent
                let right_needs_parens = match op {
                    BinaryOp::Sub | BinaryOp::Div => right.precedence() <= prec,
                    _ => right.precedence() < prec,
                };
                if right_needs_parens {
                    write!(f, "({})", right)
                } else {
                    write!(f, "{}", right)
                }
            }
        }
    }
}

macro_rules! impl_expr_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }
    };
}

impl_expr_op!(Add, add, BinaryOp::Add);
impl_expr_op!(Sub, sub, BinaryOp::Sub);
impl_expr_op!(Mul, mul, BinaryOp::Mul);
impl_expr_op!(Div, div, BinaryOp::Div);

/// Ordered list of additive terms
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Terms(Vec<Expr>);

impl Terms {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, term: Expr) {
        self.0.push(term);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of the terms, or the literal `on_empty` when there are none
    pub fn total_or(self, on_empty: f64) -> Expr {
        match self.non_empty() {
            Some(terms) => terms.total(),
            None => Expr::lit(on_empty),
        }
    }

    pub fn non_empty(self) -> Option<NonEmptyTerms> {
        let mut iter = self.0.into_iter();
        let first = iter.next()?;
        Some(NonEmptyTerms {
            first,
            rest: iter.collect(),
        })
    }
}

/// Term list guaranteed to hold at least one term
#[derive(Debug, Clone, PartialEq)]
pub struct NonEmptyTerms {
    first: Expr,
    rest: Vec<Expr>,
}

impl NonEmptyTerms {
    pub fn len(&self) -> usize {
        1 + self.rest.len()
    }

    pub fn total(&self) -> Expr {
        self.rest
            .iter()
            .cloned()
            .fold(self.first.clone(), |acc, term| acc + term)
    }
}
