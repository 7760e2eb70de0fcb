//! Syntax tree for a single expression
//!
//! Mirrors the grammar closely; no name resolution happens here.

use disputeql_ir::CmpOp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    List(Vec<Expr>),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Argument>,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// Call argument; positional when `keyword` is absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub keyword: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `~`
    Invert,
    /// `-`
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    BitAnd,
    BitOr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Expr {
    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name(name.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::Str(value.into()))
    }
}
