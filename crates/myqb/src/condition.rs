//! WHERE / HAVING / join condition primitives.

use crate::builder::SubqueryHandle;
use crate::error::{DbError, DbResult};
use crate::sql::SqlBuf;
use crate::value::{Params, Value, forward_value_from};
use std::fmt;
use std::str::FromStr;

/// Comparison operator.
///
/// Parsed case-insensitively from the usual SQL spelling:
///
/// ```
/// use myqb::Op;
///
/// assert_eq!("not  in".parse::<Op>().unwrap(), Op::NotIn);
/// assert_eq!("<>".parse::<Op>().unwrap(), Op::Ne);
/// assert!("~~".parse::<Op>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    /// `<=>`
    NullSafeEq,
    Like,
    NotLike,
    In,
    NotIn,
    Between,
    NotBetween,
    Exists,
    NotExists,
    Is,
    IsNot,
    Regexp,
    NotRegexp,
}

impl Op {
    pub fn as_sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::NullSafeEq => "<=>",
            Op::Like => "LIKE",
            Op::NotLike => "NOT LIKE",
            Op::In => "IN",
            Op::NotIn => "NOT IN",
            Op::Between => "BETWEEN",
            Op::NotBetween => "NOT BETWEEN",
            Op::Exists => "EXISTS",
            Op::NotExists => "NOT EXISTS",
            Op::Is => "IS",
            Op::IsNot => "IS NOT",
            Op::Regexp => "REGEXP",
            Op::NotRegexp => "NOT REGEXP",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Op {
    type Err = DbError;

    fn from_str(s: &str) -> DbResult<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        let op = match normalized.as_str() {
            "=" => Op::Eq,
            "!=" | "<>" => Op::Ne,
            "<" => Op::Lt,
            "<=" => Op::Lte,
            ">" => Op::Gt,
            ">=" => Op::Gte,
            "<=>" => Op::NullSafeEq,
            "LIKE" => Op::Like,
            "NOT LIKE" => Op::NotLike,
            "IN" => Op::In,
            "NOT IN" => Op::NotIn,
            "BETWEEN" => Op::Between,
            "NOT BETWEEN" => Op::NotBetween,
            "EXISTS" => Op::Exists,
            "NOT EXISTS" => Op::NotExists,
            "IS" => Op::Is,
            "IS NOT" => Op::IsNot,
            "REGEXP" | "RLIKE" => Op::Regexp,
            "NOT REGEXP" | "NOT RLIKE" => Op::NotRegexp,
            _ => return Err(DbError::validation(format!("unknown operator: {s:?}"))),
        };
        Ok(op)
    }
}

/// How a condition attaches to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connective {
    #[default]
    And,
    Or,
}

impl Connective {
    pub fn as_sql(self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    List(Vec<Value>),
    Subquery(SubqueryHandle),
    /// Operator given together with the value; overrides the call's operator.
    Keyed(Op, Box<Operand>),
}

impl Operand {
    pub fn list<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        Operand::List(values.into_iter().map(Into::into).collect())
    }

    pub fn keyed(op: Op, operand: impl Into<Operand>) -> Self {
        Operand::Keyed(op, Box::new(operand.into()))
    }
}

forward_value_from!(Operand, Operand::Value);

impl From<Vec<Value>> for Operand {
    fn from(values: Vec<Value>) -> Self {
        Operand::List(values)
    }
}

impl From<SubqueryHandle> for Operand {
    fn from(sub: SubqueryHandle) -> Self {
        Operand::Subquery(sub)
    }
}

/// The body of one condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: Op,
        operand: Operand,
    },
    /// Caller-written SQL with its own placeholders and values.
    Raw { expr: String, params: Params },
}

impl Predicate {
    /// Build a comparison, resolving a keyed operand and checking that the
    /// operand fits the operator.
    pub fn compare(column: impl Into<String>, op: Op, operand: impl Into<Operand>) -> DbResult<Self> {
        let (op, operand) = match operand.into() {
            Operand::Keyed(keyed_op, inner) => (keyed_op, *inner),
            other => (op, other),
        };
        let column = column.into();

        match (op, &operand) {
            (_, Operand::Keyed(..)) => {
                return Err(DbError::validation("nested operator mappings are not supported"));
            }
            (Op::Between | Op::NotBetween, Operand::List(values)) if values.len() != 2 => {
                return Err(DbError::validation(format!(
                    "{op} on {column} needs exactly 2 values, got {}",
                    values.len()
                )));
            }
            (Op::Between | Op::NotBetween, Operand::List(_)) => {}
            (Op::Between | Op::NotBetween, _) => {
                return Err(DbError::validation(format!("{op} on {column} needs 2 values")));
            }
            (Op::In | Op::NotIn, Operand::List(_) | Operand::Subquery(_)) => {}
            (Op::In | Op::NotIn, _) => {
                return Err(DbError::validation(format!(
                    "{op} on {column} needs a list or a subquery"
                )));
            }
            (Op::Exists | Op::NotExists, Operand::Subquery(_)) => {}
            (Op::Exists | Op::NotExists, _) => {
                return Err(DbError::validation(format!("{op} needs a subquery")));
            }
            (_, Operand::List(_)) => {
                return Err(DbError::validation(format!(
                    "operator {op} on {column} does not take a list"
                )));
            }
            _ => {}
        }

        Ok(Predicate::Compare {
            column,
            op,
            operand,
        })
    }

    pub fn raw(expr: impl Into<String>, params: Params) -> Self {
        Predicate::Raw {
            expr: expr.into(),
            params,
        }
    }

    pub(crate) fn write(&self, sql: &mut SqlBuf) {
        match self {
            Predicate::Raw { expr, params } => {
                sql.push_raw_bound(expr, params);
            }
            Predicate::Compare {
                column,
                op,
                operand,
            } => {
                if !column.is_empty() {
                    sql.push(column).push(" ");
                }
                sql.push(op.as_sql());
                match operand {
                    Operand::Value(Value::Null) => {
                        sql.push(" NULL");
                    }
                    Operand::Value(v) => {
                        sql.push(" ").push_bind(v.clone());
                    }
                    Operand::List(values) => match op {
                        Op::Between | Op::NotBetween => {
                            sql.push(" ").push_bind(values[0].clone());
                            sql.push(" AND ").push_bind(values[1].clone());
                        }
                        _ => {
                            sql.push(" (").push_bind_list(values).push(")");
                        }
                    },
                    Operand::Subquery(sub) => {
                        sql.push(" ").push_subquery(sub);
                    }
                    // Resolved in `Predicate::compare`.
                    Operand::Keyed(..) => {}
                }
            }
        }
    }
}

/// A predicate plus its connective.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub connective: Connective,
    pub predicate: Predicate,
}

impl Condition {
    pub fn new(connective: Connective, predicate: Predicate) -> Self {
        Self {
            connective,
            predicate,
        }
    }
}

/// Write conditions joined by their connectives; the first one's connective
/// is dropped.
pub(crate) fn write_conditions(sql: &mut SqlBuf, conditions: &[Condition]) {
    for (i, cond) in conditions.iter().enumerate() {
        if i > 0 {
            sql.push(" ").push(cond.connective.as_sql()).push(" ");
        }
        cond.predicate.write(sql);
    }
}
