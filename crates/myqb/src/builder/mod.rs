//! Clause builders shared by [`Db`](crate::Db) and [`SubQuery`].
//!
//! Clause methods only record state; nothing is sent to the server until a
//! terminal operation runs. Methods that validate their input return
//! `DbResult<&mut Self>`, the rest return `&mut Self` for chaining.
//!
//! ```
//! use myqb::{Clauses, SubQuery};
//!
//! let mut q = SubQuery::new("t_");
//! q.and_where("active", 1)
//!     .where_in("role", ["admin", "editor"])
//!     .order_by("created", "desc")
//!     .unwrap();
//! let sub = q.get("users", 10, "id");
//! assert_eq!(
//!     sub.query,
//!     "SELECT id FROM t_users WHERE active = ? AND role IN (?, ?) ORDER BY created DESC LIMIT 10"
//! );
//! assert_eq!(sub.params.len(), 3);
//! ```

pub(crate) mod compile;
mod subquery;


pub use subquery::SubQuery;

use crate::condition::{Condition, Connective, Op, Operand, Predicate};
use crate::error::{DbError, DbResult};
use crate::sql::{
    escape_string, prefix_quoted_tables, sanitize_field_value, sanitize_group_field,
    sanitize_order_field,
};
use crate::state::{Direction, Join, JoinTable, JoinType, OptionArg, QueryOption, QueryState};
use crate::value::{Params, Value};

/// A compiled subquery, ready to be used as an operand, a join table or a
/// payload value. Its parameters travel with it.
#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryHandle {
    pub query: String,
    pub params: Params,
    pub alias: Option<String>,
}

/// Custom ordering for [`Clauses::order_by_custom`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomOrder {
    /// `FIELD(field, "a", "b", ...)`
    Fields(Vec<String>),
    /// `field REGEXP 'pattern'`
    Pattern(String),
}

impl CustomOrder {
    pub fn fields<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        CustomOrder::Fields(values.into_iter().map(Into::into).collect())
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        CustomOrder::Pattern(pattern.into())
    }
}

fn eq(column: &str, value: Value) -> Predicate {
    Predicate::Compare {
        column: column.to_string(),
        op: Op::Eq,
        operand: Operand::Value(value),
    }
}

/// Fluent clause construction over a [`QueryState`].
pub trait Clauses {
    fn state_mut(&mut self) -> &mut QueryState;

    /// Table-name prefix applied to joined tables.
    fn prefix(&self) -> &str;

    // ── WHERE ────────────────────────────────────────────────────────────

    /// `AND column = ?`
    fn and_where(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        let cond = Condition::new(Connective::And, eq(column, value.into()));
        self.state_mut().wheres.push(cond);
        self
    }

    /// `OR column = ?`
    fn or_where(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        let cond = Condition::new(Connective::Or, eq(column, value.into()));
        self.state_mut().wheres.push(cond);
        self
    }

    /// `AND column <op> operand` with the operator given as SQL text.
    fn where_op(&mut self, column: &str, op: &str, operand: impl Into<Operand>) -> DbResult<&mut Self> {
        let pred = Predicate::compare(column, op.parse()?, operand)?;
        self.state_mut().wheres.push(Condition::new(Connective::And, pred));
        Ok(self)
    }

    /// `OR column <op> operand`
    fn or_where_op(
        &mut self,
        column: &str,
        op: &str,
        operand: impl Into<Operand>,
    ) -> DbResult<&mut Self> {
        let pred = Predicate::compare(column, op.parse()?, operand)?;
        self.state_mut().wheres.push(Condition::new(Connective::Or, pred));
        Ok(self)
    }

    fn where_in(&mut self, column: &str, values: impl IntoIterator<Item = impl Into<Value>>) -> &mut Self {
        let pred = Predicate::Compare {
            column: column.to_string(),
            op: Op::In,
            operand: Operand::list(values),
        };
        self.state_mut().wheres.push(Condition::new(Connective::And, pred));
        self
    }

    fn where_not_in(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> &mut Self {
        let pred = Predicate::Compare {
            column: column.to_string(),
            op: Op::NotIn,
            operand: Operand::list(values),
        };
        self.state_mut().wheres.push(Condition::new(Connective::And, pred));
        self
    }

    fn where_between(&mut self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> &mut Self {
        let pred = Predicate::Compare {
            column: column.to_string(),
            op: Op::Between,
            operand: Operand::List(vec![low.into(), high.into()]),
        };
        self.state_mut().wheres.push(Condition::new(Connective::And, pred));
        self
    }

    /// `column IS NULL`
    fn where_null(&mut self, column: &str) -> &mut Self {
        let pred = Predicate::Compare {
            column: column.to_string(),
            op: Op::Is,
            operand: Operand::Value(Value::Null),
        };
        self.state_mut().wheres.push(Condition::new(Connective::And, pred));
        self
    }

    /// `column IS NOT NULL`
    fn where_not_null(&mut self, column: &str) -> &mut Self {
        let pred = Predicate::Compare {
            column: column.to_string(),
            op: Op::IsNot,
            operand: Operand::Value(Value::Null),
        };
        self.state_mut().wheres.push(Condition::new(Connective::And, pred));
        self
    }

    fn where_exists(&mut self, sub: SubqueryHandle) -> &mut Self {
        let pred = Predicate::Compare {
            column: String::new(),
            op: Op::Exists,
            operand: Operand::Subquery(sub),
        };
        self.state_mut().wheres.push(Condition::new(Connective::And, pred));
        self
    }

    fn where_not_exists(&mut self, sub: SubqueryHandle) -> &mut Self {
        let pred = Predicate::Compare {
            column: String::new(),
            op: Op::NotExists,
            operand: Operand::Subquery(sub),
        };
        self.state_mut().wheres.push(Condition::new(Connective::And, pred));
        self
    }

    /// Raw SQL condition without parameters.
    fn where_raw(&mut self, expr: &str) -> &mut Self {
        let pred = Predicate::raw(expr, Params::new());
        self.state_mut().wheres.push(Condition::new(Connective::And, pred));
        self
    }

    /// Raw SQL condition whose `?` placeholders take `params` in order.
    fn where_raw_bind(&mut self, expr: &str, params: impl Into<Params>) -> &mut Self {
        let pred = Predicate::raw(expr, params.into());
        self.state_mut().wheres.push(Condition::new(Connective::And, pred));
        self
    }

    fn or_where_raw(&mut self, expr: &str, params: impl Into<Params>) -> &mut Self {
        let pred = Predicate::raw(expr, params.into());
        self.state_mut().wheres.push(Condition::new(Connective::Or, pred));
        self
    }

    // ── HAVING ───────────────────────────────────────────────────────────

    fn having(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        let cond = Condition::new(Connective::And, eq(column, value.into()));
        self.state_mut().havings.push(cond);
        self
    }

    fn or_having(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        let cond = Condition::new(Connective::Or, eq(column, value.into()));
        self.state_mut().havings.push(cond);
        self
    }

    fn having_op(&mut self, column: &str, op: &str, operand: impl Into<Operand>) -> DbResult<&mut Self> {
        let pred = Predicate::compare(column, op.parse()?, operand)?;
        self.state_mut().havings.push(Condition::new(Connective::And, pred));
        Ok(self)
    }

    fn or_having_op(
        &mut self,
        column: &str,
        op: &str,
        operand: impl Into<Operand>,
    ) -> DbResult<&mut Self> {
        let pred = Predicate::compare(column, op.parse()?, operand)?;
        self.state_mut().havings.push(Condition::new(Connective::Or, pred));
        Ok(self)
    }

    fn having_raw(&mut self, expr: &str, params: impl Into<Params>) -> &mut Self {
        let pred = Predicate::raw(expr, params.into());
        self.state_mut().havings.push(Condition::new(Connective::And, pred));
        self
    }

    // ── JOIN ─────────────────────────────────────────────────────────────

    /// `<kind> JOIN <prefix><table> ON <condition>`.
    ///
    /// `kind` is one of `""`, `LEFT`, `RIGHT`, `OUTER`, `INNER`,
    /// `LEFT OUTER`, `RIGHT OUTER`, `NATURAL`. A condition containing `USING`
    /// is written without `ON`.
    fn join(&mut self, table: &str, condition: &str, kind: &str) -> DbResult<&mut Self> {
        let kind: JoinType = kind.parse()?;
        let table = JoinTable::Name(format!("{}{}", self.prefix(), table));
        self.state_mut().joins.push(Join {
            kind,
            table,
            condition: condition.to_string(),
        });
        Ok(self)
    }

    /// Join a derived table.
    fn join_subquery(&mut self, sub: SubqueryHandle, condition: &str, kind: &str) -> DbResult<&mut Self> {
        let kind: JoinType = kind.parse()?;
        self.state_mut().joins.push(Join {
            kind,
            table: JoinTable::Subquery(sub),
            condition: condition.to_string(),
        });
        Ok(self)
    }

    /// Extra `AND column = ?` on the join of `table`.
    fn join_where(&mut self, table: &str, column: &str, value: impl Into<Value>) -> &mut Self {
        let key = format!("{}{}", self.prefix(), table);
        let cond = Condition::new(Connective::And, eq(column, value.into()));
        self.state_mut().join_conditions_mut(key).push(cond);
        self
    }

    /// Extra `OR column = ?` on the join of `table`.
    fn join_or_where(&mut self, table: &str, column: &str, value: impl Into<Value>) -> &mut Self {
        let key = format!("{}{}", self.prefix(), table);
        let cond = Condition::new(Connective::Or, eq(column, value.into()));
        self.state_mut().join_conditions_mut(key).push(cond);
        self
    }

    fn join_where_op(
        &mut self,
        table: &str,
        column: &str,
        op: &str,
        operand: impl Into<Operand>,
    ) -> DbResult<&mut Self> {
        let pred = Predicate::compare(column, op.parse()?, operand)?;
        let key = format!("{}{}", self.prefix(), table);
        self.state_mut()
            .join_conditions_mut(key)
            .push(Condition::new(Connective::And, pred));
        Ok(self)
    }

    // ── ORDER / GROUP ────────────────────────────────────────────────────

    /// Add an ORDER BY term. `direction` must be `ASC` or `DESC`.
    fn order_by(&mut self, field: &str, direction: &str) -> DbResult<&mut Self> {
        let direction: Direction = direction.parse()?;
        let field = prefix_quoted_tables(&sanitize_order_field(field), self.prefix());
        let direction = if field.replace(' ', "").eq_ignore_ascii_case("rand()") {
            Direction::None
        } else {
            direction
        };
        self.state_mut().push_order(field, direction);
        Ok(self)
    }

    /// ORDER BY a fixed value list or a regular expression match.
    fn order_by_custom(&mut self, field: &str, direction: &str, custom: CustomOrder) -> DbResult<&mut Self> {
        let direction: Direction = direction.parse()?;
        let field = prefix_quoted_tables(&sanitize_order_field(field), self.prefix());
        let expr = match custom {
            CustomOrder::Fields(values) if values.is_empty() => {
                return Err(DbError::validation("custom field order needs at least one value"));
            }
            CustomOrder::Fields(values) => {
                let values: Vec<String> = values.iter().map(|v| sanitize_field_value(v)).collect();
                format!("FIELD ({field}, \"{}\")", values.join("\",\""))
            }
            CustomOrder::Pattern(pattern) => {
                format!("{field} REGEXP '{}'", escape_string(&pattern))
            }
        };
        self.state_mut().push_order(expr, direction);
        Ok(self)
    }

    fn group_by(&mut self, field: &str) -> &mut Self {
        let field = sanitize_group_field(field);
        self.state_mut().group_by.push(field);
        self
    }

    // ── Options and locking ──────────────────────────────────────────────

    /// Add statement modifiers (`DISTINCT`, `SQL_NO_CACHE`, ...) or the flags
    /// `NESTJOIN`, `FOR UPDATE`, `LOCK IN SHARE MODE`. Nothing is applied if
    /// any option is unknown.
    fn set_query_option(&mut self, options: &[&str]) -> DbResult<&mut Self> {
        let parsed = options
            .iter()
            .map(|o| o.parse::<OptionArg>())
            .collect::<DbResult<Vec<_>>>()?;
        let state = self.state_mut();
        for arg in parsed {
            match arg {
                OptionArg::Modifier(option) => state.add_option(option),
                OptionArg::NestJoin => state.nest_join = true,
                OptionArg::ForUpdate => state.for_update = true,
                OptionArg::LockInShareMode => state.lock_in_share_mode = true,
            }
        }
        Ok(self)
    }

    /// Ask the server to count all matching rows regardless of LIMIT.
    fn with_total_count(&mut self) -> &mut Self {
        self.state_mut().add_option(QueryOption::SqlCalcFoundRows);
        self
    }

    fn for_update(&mut self) -> &mut Self {
        self.state_mut().for_update = true;
        self
    }

    fn lock_in_share_mode(&mut self) -> &mut Self {
        self.state_mut().lock_in_share_mode = true;
        self
    }
}
