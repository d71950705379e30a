//! Constraint expressions.
//!
//! An [`Expression`] is a postfix program of [`Op`]s run on a small stack
//! machine. Evaluation produces exactly one [`Term`]; a rule keeps a binding
//! only when every expression evaluates to `Bool(true)`.

use log::trace;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::{ExpressionError, Result};
use crate::symbol::{SymbolTable, TemporarySymbolTable};
use crate::term::Term;

/// A postfix op program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expression {
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    /// Pushes a literal, or the bound value of a variable.
    Value(Term),
    Unary(Unary),
    Binary(Binary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unary {
    Negate,
    Parens,
    Length,
}

impl Unary {
    fn evaluate(
        &self,
        value: Term,
        symbols: &TemporarySymbolTable,
    ) -> std::result::Result<Term, ExpressionError> {
        match (self, value) {
            (Unary::Negate, Term::Bool(b)) => Ok(Term::Bool(!b)),
            (Unary::Parens, t) => Ok(t),
            (Unary::Length, Term::Str(i)) => symbols
                .get_symbol(i)
                .map(|s| Term::Integer(s.len() as i64))
                .ok_or(ExpressionError::UnknownSymbol(i)),
            (Unary::Length, Term::Bytes(b)) => Ok(Term::Integer(b.len() as i64)),
            (Unary::Length, Term::Set(s)) => Ok(Term::Integer(s.len() as i64)),
            _ => Err(ExpressionError::InvalidType),
        }
    }

    pub fn print(&self, value: String) -> String {
        match self {
            Unary::Negate => format!("!{}", value),
            Unary::Parens => format!("({})", value),
            Unary::Length => format!("{}.length()", value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Binary {
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
    Equal,
    NotEqual,
    Contains,
    Prefix,
    Suffix,
    Regex,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Intersection,
    Union,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
}

impl Binary {
    /// Applies the operator. Integer arithmetic wraps on overflow.
    fn evaluate(
        &self,
        left: Term,
        right: Term,
        symbols: &mut TemporarySymbolTable,
    ) -> std::result::Result<Term, ExpressionError> {
        match (self, left, right) {
            // integer
            (Binary::LessThan, Term::Integer(i), Term::Integer(j)) => Ok(Term::Bool(i < j)),
            (Binary::GreaterThan, Term::Integer(i), Term::Integer(j)) => Ok(Term::Bool(i > j)),
            (Binary::LessOrEqual, Term::Integer(i), Term::Integer(j)) => Ok(Term::Bool(i <= j)),
            (Binary::GreaterOrEqual, Term::Integer(i), Term::Integer(j)) => Ok(Term::Bool(i >= j)),
            (Binary::Equal, Term::Integer(i), Term::Integer(j)) => Ok(Term::Bool(i == j)),
            (Binary::NotEqual, Term::Integer(i), Term::Integer(j)) => Ok(Term::Bool(i != j)),
            (Binary::Add, Term::Integer(i), Term::Integer(j)) => Ok(Term::Integer(i.wrapping_add(j))),
            (Binary::Sub, Term::Integer(i), Term::Integer(j)) => Ok(Term::Integer(i.wrapping_sub(j))),
            (Binary::Mul, Term::Integer(i), Term::Integer(j)) => Ok(Term::Integer(i.wrapping_mul(j))),
            (Binary::Div, Term::Integer(_), Term::Integer(0)) => Err(ExpressionError::DivideByZero),
            (Binary::Div, Term::Integer(i), Term::Integer(j)) => Ok(Term::Integer(i.wrapping_div(j))),
            (Binary::BitwiseAnd, Term::Integer(i), Term::Integer(j)) => Ok(Term::Integer(i & j)),
            (Binary::BitwiseOr, Term::Integer(i), Term::Integer(j)) => Ok(Term::Integer(i | j)),
            (Binary::BitwiseXor, Term::Integer(i), Term::Integer(j)) => Ok(Term::Integer(i ^ j)),

            // string
            (Binary::Equal, Term::Str(i), Term::Str(j)) => Ok(Term::Bool(i == j)),
            (Binary::NotEqual, Term::Str(i), Term::Str(j)) => Ok(Term::Bool(i != j)),
            (
                op @ (Binary::Prefix | Binary::Suffix | Binary::Contains | Binary::Regex | Binary::Add),
                Term::Str(i),
                Term::Str(j),
            ) => {
                let left = symbols
                    .get_symbol(i)
                    .ok_or(ExpressionError::UnknownSymbol(i))?
                    .to_string();
                let right = symbols
                    .get_symbol(j)
                    .ok_or(ExpressionError::UnknownSymbol(j))?
                    .to_string();
                match op {
                    Binary::Prefix => Ok(Term::Bool(left.starts_with(&right))),
                    Binary::Suffix => Ok(Term::Bool(left.ends_with(&right))),
                    Binary::Contains => Ok(Term::Bool(left.contains(&right))),
                    Binary::Regex => match Regex::new(&right) {
                        Ok(re) => Ok(Term::Bool(re.is_match(&left))),
                        Err(e) => Err(ExpressionError::InvalidRegex(e.to_string())),
                    },
                    _ => {
                        let concatenated = left + &right;
                        Ok(Term::Str(symbols.insert(&concatenated)))
                    }
                }
            }

            // date
            (Binary::LessThan, Term::Date(i), Term::Date(j)) => Ok(Term::Bool(i < j)),
            (Binary::GreaterThan, Term::Date(i), Term::Date(j)) => Ok(Term::Bool(i > j)),
            (Binary::LessOrEqual, Term::Date(i), Term::Date(j)) => Ok(Term::Bool(i <= j)),
            (Binary::GreaterOrEqual, Term::Date(i), Term::Date(j)) => Ok(Term::Bool(i >= j)),
            (Binary::Equal, Term::Date(i), Term::Date(j)) => Ok(Term::Bool(i == j)),
            (Binary::NotEqual, Term::Date(i), Term::Date(j)) => Ok(Term::Bool(i != j)),

            // bytes
            (Binary::Equal, Term::Bytes(i), Term::Bytes(j)) => Ok(Term::Bool(i == j)),
            (Binary::NotEqual, Term::Bytes(i), Term::Bytes(j)) => Ok(Term::Bool(i != j)),

            // set
            (Binary::Equal, Term::Set(s), Term::Set(t)) => Ok(Term::Bool(s == t)),
            (Binary::NotEqual, Term::Set(s), Term::Set(t)) => Ok(Term::Bool(s != t)),
            (Binary::Intersection, Term::Set(s), Term::Set(t)) => {
                Ok(Term::Set(s.intersection(&t).cloned().collect()))
            }
            (Binary::Union, Term::Set(s), Term::Set(t)) => {
                Ok(Term::Set(s.union(&t).cloned().collect::<BTreeSet<_>>()))
            }
            (Binary::Contains, Term::Set(s), Term::Set(t)) => Ok(Term::Bool(s.is_superset(&t))),
            (Binary::Contains, Term::Set(s), element) => match element {
                Term::Variable(_) => Err(ExpressionError::InvalidType),
                element => Ok(Term::Bool(s.contains(&element))),
            },

            // boolean
            (Binary::And, Term::Bool(a), Term::Bool(b)) => Ok(Term::Bool(a && b)),
            (Binary::Or, Term::Bool(a), Term::Bool(b)) => Ok(Term::Bool(a || b)),
            (Binary::Equal, Term::Bool(a), Term::Bool(b)) => Ok(Term::Bool(a == b)),
            (Binary::NotEqual, Term::Bool(a), Term::Bool(b)) => Ok(Term::Bool(a != b)),

            _ => Err(ExpressionError::InvalidType),
        }
    }

    pub fn print(&self, left: String, right: String) -> String {
        match self {
            Binary::LessThan => format!("{} < {}", left, right),
            Binary::GreaterThan => format!("{} > {}", left, right),
            Binary::LessOrEqual => format!("{} <= {}", left, right),
            Binary::GreaterOrEqual => format!("{} >= {}", left, right),
            Binary::Equal => format!("{} == {}", left, right),
            Binary::NotEqual => format!("{} != {}", left, right),
            Binary::Contains => format!("{}.contains({})", left, right),
            Binary::Prefix => format!("{}.starts_with({})", left, right),
            Binary::Suffix => format!("{}.ends_with({})", left, right),
            Binary::Regex => format!("{}.matches({})", left, right),
            Binary::Add => format!("{} + {}", left, right),
            Binary::Sub => format!("{} - {}", left, right),
            Binary::Mul => format!("{} * {}", left, right),
            Binary::Div => format!("{} / {}", left, right),
            Binary::And => format!("{} && {}", left, right),
            Binary::Or => format!("{} || {}", left, right),
            Binary::Intersection => format!("{}.intersection({})", left, right),
            Binary::Union => format!("{}.union({})", left, right),
            Binary::BitwiseAnd => format!("{} & {}", left, right),
            Binary::BitwiseOr => format!("{} | {}", left, right),
            Binary::BitwiseXor => format!("{} ^ {}", left, right),
        }
    }
}

impl Expression {
    pub fn new(ops: Vec<Op>) -> Self {
        Self { ops }
    }

    /// Runs the program against a complete variable binding.
    pub fn evaluate(
        &self,
        values: &HashMap<u32, Term>,
        symbols: &mut TemporarySymbolTable,
    ) -> std::result::Result<Term, ExpressionError> {
        let mut stack: Vec<Term> = Vec::new();

        for op in &self.ops {
            match op {
                Op::Value(Term::Variable(i)) => match values.get(i) {
                    Some(term) => stack.push(term.clone()),
                    None => return Err(ExpressionError::UnknownVariable(*i)),
                },
                Op::Value(term) => stack.push(term.clone()),
                Op::Unary(unary) => {
                    let value = stack.pop().ok_or(ExpressionError::InvalidStack)?;
                    stack.push(unary.evaluate(value, symbols)?);
                }
                Op::Binary(binary) => {
                    let right = stack.pop().ok_or(ExpressionError::InvalidStack)?;
                    let left = stack.pop().ok_or(ExpressionError::InvalidStack)?;
                    stack.push(binary.evaluate(left, right, symbols)?);
                }
            }
        }

        match (stack.pop(), stack.is_empty()) {
            (Some(result), true) => Ok(result),
            _ => Err(ExpressionError::InvalidStack),
        }
    }

    /// Renders the program in infix form; `None` if the program is malformed.
    pub fn print(&self, symbols: &SymbolTable) -> Option<String> {
        let mut stack: Vec<String> = Vec::new();

        for op in &self.ops {
            match op {
                Op::Value(term) => stack.push(symbols.print_term(term)),
                Op::Unary(unary) => {
                    let value = stack.pop()?;
                    stack.push(unary.print(value));
                }
                Op::Binary(binary) => {
                    let right = stack.pop()?;
                    let left = stack.pop()?;
                    stack.push(binary.print(left, right));
                }
            }
        }

        if stack.len() == 1 {
            stack.pop()
        } else {
            None
        }
    }

    /// Ids of the variables referenced by the program.
    pub fn variables(&self) -> impl Iterator<Item = u32> + '_ {
        self.ops.iter().filter_map(|op| match op {
            Op::Value(Term::Variable(v)) => Some(*v),
            _ => None,
        })
    }

    pub fn translate(&self, from: &SymbolTable, to: &mut SymbolTable) -> Result<Expression> {
        let ops = self
            .ops
            .iter()
            .map(|op| {
                Ok(match op {
                    Op::Value(term) => Op::Value(term.translate(from, to)?),
                    other => other.clone(),
                })
            })
            .collect::<Result<_>>()?;
        Ok(Expression { ops })
    }
}

/// Outcome of filtering one binding through a rule's expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Keep,
    Reject,
}

/// Evaluates every expression against `values`.
///
/// Non-fatal failures (type mismatch, unbound variable, division by zero,
/// bad regex) reject the binding; a malformed program is returned as
/// [`crate::Error::Execution`].
pub fn filter(
    expressions: &[Expression],
    values: &HashMap<u32, Term>,
    symbols: &SymbolTable,
) -> Result<Filter> {
    if expressions.is_empty() {
        return Ok(Filter::Keep);
    }

    let mut temporary = TemporarySymbolTable::new(symbols);
    for expression in expressions {
        match expression.evaluate(values, &mut temporary) {
            Ok(Term::Bool(true)) => {}
            Ok(_) => return Ok(Filter::Reject),
            Err(e) if e.is_fatal() => return Err(crate::Error::Execution(e)),
            Err(e) => {
                trace!("expression rejected binding: {}", e);
                return Ok(Filter::Reject);
            }
        }
    }
    Ok(Filter::Keep)
}
