//! Accumulated clause state of the statement being built.

use crate::builder::SubqueryHandle;
use crate::condition::Condition;
use crate::data::DataValue;
use crate::error::{DbError, DbResult};
use crate::row::Materializer;
use std::str::FromStr;

/// Everything the clause builders have collected since the last terminal
/// operation. Taken (and thereby reset) by every terminal call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    pub(crate) wheres: Vec<Condition>,
    pub(crate) havings: Vec<Condition>,
    pub(crate) joins: Vec<Join>,
    /// Extra conditions per joined table, keyed by the prefixed table string.
    pub(crate) join_conditions: Vec<(String, Vec<Condition>)>,
    pub(crate) order_by: Vec<OrderBy>,
    pub(crate) group_by: Vec<String>,
    pub(crate) options: Vec<QueryOption>,
    pub(crate) materializer: Materializer,
    pub(crate) map_key: Option<String>,
    pub(crate) for_update: bool,
    pub(crate) lock_in_share_mode: bool,
    pub(crate) nest_join: bool,
    /// Prefixed main table of the last compiled statement.
    pub(crate) table_name: Option<String>,
    pub(crate) on_duplicate: Option<OnDuplicate>,
}

impl QueryState {
    /// Whether nothing has been accumulated.
    pub fn is_pristine(&self) -> bool {
        *self == QueryState::default()
    }

    pub fn wheres(&self) -> &[Condition] {
        &self.wheres
    }

    pub fn havings(&self) -> &[Condition] {
        &self.havings
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    pub fn options(&self) -> &[QueryOption] {
        &self.options
    }

    pub fn materializer(&self) -> Materializer {
        self.materializer
    }

    pub fn map_key(&self) -> Option<&str> {
        self.map_key.as_deref()
    }

    pub fn has_option(&self, option: QueryOption) -> bool {
        self.options.contains(&option)
    }

    pub(crate) fn add_option(&mut self, option: QueryOption) {
        if !self.options.contains(&option) {
            self.options.push(option);
        }
    }

    pub(crate) fn join_conditions_mut(&mut self, table: String) -> &mut Vec<Condition> {
        let idx = match self.join_conditions.iter().position(|(t, _)| *t == table) {
            Some(idx) => idx,
            None => {
                self.join_conditions.push((table, Vec::new()));
                self.join_conditions.len() - 1
            }
        };
        &mut self.join_conditions[idx].1
    }

    pub(crate) fn join_conditions_for(&self, table: &str) -> &[Condition] {
        self.join_conditions
            .iter()
            .find(|(t, _)| t == table)
            .map(|(_, conds)| conds.as_slice())
            .unwrap_or(&[])
    }

    /// Add an ORDER BY term; re-ordering an existing expression replaces its
    /// direction in place.
    pub(crate) fn push_order(&mut self, expr: String, direction: Direction) {
        match self.order_by.iter_mut().find(|o| o.expr == expr) {
            Some(existing) => existing.direction = direction,
            None => self.order_by.push(OrderBy { expr, direction }),
        }
    }
}

/// Row limit of a statement.
///
/// Converts from a count (`10`) or an `(offset, count)` pair (`(20, 10)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Limit {
    #[default]
    All,
    Count(u64),
    Range { offset: u64, count: u64 },
}

impl Limit {
    pub fn range(offset: u64, count: u64) -> Self {
        Limit::Range { offset, count }
    }
}

fn clamp(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

impl From<u64> for Limit {
    fn from(n: u64) -> Self {
        Limit::Count(n)
    }
}

impl From<u32> for Limit {
    fn from(n: u32) -> Self {
        Limit::Count(u64::from(n))
    }
}

impl From<usize> for Limit {
    fn from(n: usize) -> Self {
        Limit::Count(n as u64)
    }
}

impl From<i32> for Limit {
    fn from(n: i32) -> Self {
        Limit::Count(clamp(i64::from(n)))
    }
}

impl From<i64> for Limit {
    fn from(n: i64) -> Self {
        Limit::Count(clamp(n))
    }
}

impl From<(u64, u64)> for Limit {
    fn from((offset, count): (u64, u64)) -> Self {
        Limit::Range { offset, count }
    }
}

impl From<(i32, i32)> for Limit {
    fn from((offset, count): (i32, i32)) -> Self {
        Limit::Range {
            offset: clamp(i64::from(offset)),
            count: clamp(i64::from(count)),
        }
    }
}

impl<T: Into<Limit>> From<Option<T>> for Limit {
    fn from(limit: Option<T>) -> Self {
        limit.map_or(Limit::All, Into::into)
    }
}

/// Join kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// Plain `JOIN`
    Plain,
    Left,
    Right,
    Outer,
    Inner,
    LeftOuter,
    RightOuter,
    Natural,
}

impl JoinType {
    /// Keyword placed before `JOIN` (empty for a plain join).
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinType::Plain => "",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Outer => "OUTER",
            JoinType::Inner => "INNER",
            JoinType::LeftOuter => "LEFT OUTER",
            JoinType::RightOuter => "RIGHT OUTER",
            JoinType::Natural => "NATURAL",
        }
    }
}

impl FromStr for JoinType {
    type Err = DbError;

    fn from_str(s: &str) -> DbResult<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        let kind = match normalized.as_str() {
            "" => JoinType::Plain,
            "LEFT" => JoinType::Left,
            "RIGHT" => JoinType::Right,
            "OUTER" => JoinType::Outer,
            "INNER" => JoinType::Inner,
            "LEFT OUTER" => JoinType::LeftOuter,
            "RIGHT OUTER" => JoinType::RightOuter,
            "NATURAL" => JoinType::Natural,
            _ => return Err(DbError::validation(format!("wrong JOIN type: {s}"))),
        };
        Ok(kind)
    }
}

/// The joined table: a (prefixed) name or a subquery.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinTable {
    Name(String),
    Subquery(SubqueryHandle),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinType,
    pub table: JoinTable,
    pub condition: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
    /// No direction; used for `RAND()`.
    None,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
            Direction::None => "",
        }
    }
}

impl FromStr for Direction {
    type Err = DbError;

    fn from_str(s: &str) -> DbResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(Direction::Asc),
            "DESC" => Ok(Direction::Desc),
            _ => Err(DbError::validation(format!("wrong order direction: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub expr: String,
    pub direction: Direction,
}

/// Statement modifiers placed right after the verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOption {
    All,
    Distinct,
    DistinctRow,
    HighPriority,
    StraightJoin,
    SqlSmallResult,
    SqlBigResult,
    SqlBufferResult,
    SqlCache,
    SqlNoCache,
    SqlCalcFoundRows,
    LowPriority,
    Ignore,
    Quick,
}

impl QueryOption {
    pub fn as_sql(self) -> &'static str {
        match self {
            QueryOption::All => "ALL",
            QueryOption::Distinct => "DISTINCT",
            QueryOption::DistinctRow => "DISTINCTROW",
            QueryOption::HighPriority => "HIGH_PRIORITY",
            QueryOption::StraightJoin => "STRAIGHT_JOIN",
            QueryOption::SqlSmallResult => "SQL_SMALL_RESULT",
            QueryOption::SqlBigResult => "SQL_BIG_RESULT",
            QueryOption::SqlBufferResult => "SQL_BUFFER_RESULT",
            QueryOption::SqlCache => "SQL_CACHE",
            QueryOption::SqlNoCache => "SQL_NO_CACHE",
            QueryOption::SqlCalcFoundRows => "SQL_CALC_FOUND_ROWS",
            QueryOption::LowPriority => "LOW_PRIORITY",
            QueryOption::Ignore => "IGNORE",
            QueryOption::Quick => "QUICK",
        }
    }
}

/// A parsed `set_query_option` argument: a modifier or a state flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OptionArg {
    Modifier(QueryOption),
    NestJoin,
    ForUpdate,
    LockInShareMode,
}

impl FromStr for OptionArg {
    type Err = DbError;

    fn from_str(s: &str) -> DbResult<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_uppercase();
        let arg = match normalized.as_str() {
            "ALL" => OptionArg::Modifier(QueryOption::All),
            "DISTINCT" => OptionArg::Modifier(QueryOption::Distinct),
            "DISTINCTROW" => OptionArg::Modifier(QueryOption::DistinctRow),
            "HIGH_PRIORITY" => OptionArg::Modifier(QueryOption::HighPriority),
            "STRAIGHT_JOIN" => OptionArg::Modifier(QueryOption::StraightJoin),
            "SQL_SMALL_RESULT" => OptionArg::Modifier(QueryOption::SqlSmallResult),
            "SQL_BIG_RESULT" => OptionArg::Modifier(QueryOption::SqlBigResult),
            "SQL_BUFFER_RESULT" => OptionArg::Modifier(QueryOption::SqlBufferResult),
            "SQL_CACHE" => OptionArg::Modifier(QueryOption::SqlCache),
            "SQL_NO_CACHE" => OptionArg::Modifier(QueryOption::SqlNoCache),
            "SQL_CALC_FOUND_ROWS" => OptionArg::Modifier(QueryOption::SqlCalcFoundRows),
            "LOW_PRIORITY" => OptionArg::Modifier(QueryOption::LowPriority),
            "IGNORE" => OptionArg::Modifier(QueryOption::Ignore),
            "QUICK" => OptionArg::Modifier(QueryOption::Quick),
            "NESTJOIN" | "MYSQLI_NESTJOIN" => OptionArg::NestJoin,
            "FOR UPDATE" => OptionArg::ForUpdate,
            "LOCK IN SHARE MODE" => OptionArg::LockInShareMode,
            _ => return Err(DbError::validation(format!("wrong query option: {s}"))),
        };
        Ok(arg)
    }
}

/// `LOCK TABLES` lock method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMethod {
    #[default]
    Write,
    Read,
}

impl LockMethod {
    pub fn as_sql(self) -> &'static str {
        match self {
            LockMethod::Read => "READ",
            LockMethod::Write => "WRITE",
        }
    }
}

impl FromStr for LockMethod {
    type Err = DbError;

    fn from_str(s: &str) -> DbResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ" => Ok(LockMethod::Read),
            "WRITE" => Ok(LockMethod::Write),
            _ => Err(DbError::validation(format!("bad lock type: {s}"))),
        }
    }
}

/// One column of an `ON DUPLICATE KEY UPDATE` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateColumn {
    /// `col = ?` bound to the value being inserted for `col`.
    Reuse(String),
    /// `col = <value>`
    Set(String, DataValue),
}

impl DuplicateColumn {
    pub fn set(column: impl Into<String>, value: impl Into<DataValue>) -> Self {
        DuplicateColumn::Set(column.into(), value.into())
    }
}

impl From<&str> for DuplicateColumn {
    fn from(column: &str) -> Self {
        DuplicateColumn::Reuse(column.to_string())
    }
}

impl From<String> for DuplicateColumn {
    fn from(column: String) -> Self {
        DuplicateColumn::Reuse(column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnDuplicate {
    pub columns: Vec<DuplicateColumn>,
    /// Column refreshed with `LAST_INSERT_ID(col)` so the id of an updated row is reported.
    pub last_insert_id: Option<String>,
}
