//! # Expression Collaborator Interface
//!
//! CHECK constraints evaluate a boolean expression against a candidate row.
//! The engine treats expressions as opaque, side-effect-free evaluators; SQL
//! parsing and the full expression language live outside this crate. The
//! node set here (column reference, literal, comparison, NOT/AND/OR,
//! IS NULL) is what the constraint engine and its tests need.
//!
//! Comparison follows SQL three-valued semantics: any comparison against
//! NULL yields UNKNOWN, and only an expression that evaluates to FALSE
//! fails a CHECK constraint.

use crate::rows::Row;
use crate::types::{TriBool, Value};
use eyre::Result;
use hashbrown::HashSet;
use std::fmt;

pub trait Expression: Send + Sync + fmt::Debug {
    /// Evaluates against a row. NULL results are legal and map to UNKNOWN
    /// in boolean position.
    fn evaluate(&self, row: &Row) -> Result<Value>;

    /// Reports which column ordinals this expression reads. The catalog
    /// uses this to block column drops that would break a constraint.
    fn collect_columns(&self, out: &mut HashSet<usize>);

    /// Expression text for error messages.
    fn sql(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

#[derive(Debug)]
pub struct ColumnRef {
    column: usize,
    name: String,
}

impl ColumnRef {
    pub fn new(column: usize, name: impl Into<String>) -> Self {
        Self {
            column,
            name: name.into(),
        }
    }
}

impl Expression for ColumnRef {
    fn evaluate(&self, row: &Row) -> Result<Value> {
        Ok(row.value(self.column).cloned().unwrap_or(Value::Null))
    }

    fn collect_columns(&self, out: &mut HashSet<usize>) {
        out.insert(self.column);
    }

    fn sql(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug)]
pub struct Literal(pub Value);

impl Expression for Literal {
    fn evaluate(&self, _row: &Row) -> Result<Value> {
        Ok(self.0.clone())
    }

    fn collect_columns(&self, _out: &mut HashSet<usize>) {}

    fn sql(&self) -> String {
        self.0.to_string()
    }
}

#[derive(Debug)]
pub struct Compare {
    op: CompareOp,
    left: Box<dyn Expression>,
    right: Box<dyn Expression>,
}

impl Compare {
    pub fn new(op: CompareOp, left: Box<dyn Expression>, right: Box<dyn Expression>) -> Self {
        Self { op, left, right }
    }
}

impl Expression for Compare {
    fn evaluate(&self, row: &Row) -> Result<Value> {
        let l = self.left.evaluate(row)?;
        let r = self.right.evaluate(row)?;
        let result = match l.partial_compare(&r) {
            None => TriBool::Unknown,
            Some(ord) => {
                let holds = match self.op {
                    CompareOp::Eq => ord.is_eq(),
                    CompareOp::Ne => ord.is_ne(),
                    CompareOp::Lt => ord.is_lt(),
                    CompareOp::Le => ord.is_le(),
                    CompareOp::Gt => ord.is_gt(),
                    CompareOp::Ge => ord.is_ge(),
                };
                if holds {
                    TriBool::True
                } else {
                    TriBool::False
                }
            }
        };
        Ok(result.to_value())
    }

    fn collect_columns(&self, out: &mut HashSet<usize>) {
        self.left.collect_columns(out);
        self.right.collect_columns(out);
    }

    fn sql(&self) -> String {
        format!("{} {} {}", self.left.sql(), self.op.symbol(), self.right.sql())
    }
}

#[derive(Debug)]
pub struct Not(pub Box<dyn Expression>);

impl Expression for Not {
    fn evaluate(&self, row: &Row) -> Result<Value> {
        let v = self.0.evaluate(row)?;
        Ok(TriBool::from_value(&v).negate().to_value())
    }

    fn collect_columns(&self, out: &mut HashSet<usize>) {
        self.0.collect_columns(out);
    }

    fn sql(&self) -> String {
        format!("NOT ({})", self.0.sql())
    }
}

#[derive(Debug)]
pub struct And(pub Box<dyn Expression>, pub Box<dyn Expression>);

impl Expression for And {
    fn evaluate(&self, row: &Row) -> Result<Value> {
        let l = TriBool::from_value(&self.0.evaluate(row)?);
        let r = TriBool::from_value(&self.1.evaluate(row)?);
        Ok(l.and(r).to_value())
    }

    fn collect_columns(&self, out: &mut HashSet<usize>) {
        self.0.collect_columns(out);
        self.1.collect_columns(out);
    }

    fn sql(&self) -> String {
        format!("({}) AND ({})", self.0.sql(), self.1.sql())
    }
}

#[derive(Debug)]
pub struct Or(pub Box<dyn Expression>, pub Box<dyn Expression>);

impl Expression for Or {
    fn evaluate(&self, row: &Row) -> Result<Value> {
        let l = TriBool::from_value(&self.0.evaluate(row)?);
        let r = TriBool::from_value(&self.1.evaluate(row)?);
        Ok(l.or(r).to_value())
    }

    fn collect_columns(&self, out: &mut HashSet<usize>) {
        self.0.collect_columns(out);
        self.1.collect_columns(out);
    }

    fn sql(&self) -> String {
        format!("({}) OR ({})", self.0.sql(), self.1.sql())
    }
}

#[derive(Debug)]
pub struct IsNull {
    inner: Box<dyn Expression>,
    negated: bool,
}

impl IsNull {
    pub fn new(inner: Box<dyn Expression>, negated: bool) -> Self {
        Self { inner, negated }
    }
}

impl Expression for IsNull {
    fn evaluate(&self, row: &Row) -> Result<Value> {
        let v = self.inner.evaluate(row)?;
        Ok(Value::Bool(v.is_null() != self.negated))
    }

    fn collect_columns(&self, out: &mut HashSet<usize>) {
        self.inner.collect_columns(out);
    }

    fn sql(&self) -> String {
        if self.negated {
            format!("{} IS NOT NULL", self.inner.sql())
        } else {
            format!("{} IS NULL", self.inner.sql())
        }
    }
}

/// Shorthand used across tests: `column >= literal`.
pub fn column_cmp(column: usize, name: &str, op: CompareOp, value: Value) -> Box<dyn Expression> {
    Box::new(Compare::new(
        op,
        Box::new(ColumnRef::new(column, name)),
        Box::new(Literal(value)),
    ))
}
