//! Insert / update payloads and SQL function values.

use crate::builder::SubqueryHandle;
use crate::error::{DbError, DbResult};
use crate::value::{Params, Value, forward_value_from};
use regex::Regex;
use std::sync::OnceLock;

/// Ordered column → value payload for `insert`, `replace` and `update`.
///
/// ```
/// use myqb::{Data, Func};
///
/// let data = Data::new()
///     .set("login", "admin")
///     .set("active", true)
///     .set("visits", Func::inc(1));
/// assert_eq!(data.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Data {
    entries: Vec<(String, DataValue)>,
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Data::insert`].
    pub fn set(mut self, column: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Set a column, replacing an earlier value for the same column in place.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<DataValue>) -> &mut Self {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((column, value)),
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&DataValue> {
        self.entries.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataValue)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<DataValue>> FromIterator<(K, V)> for Data {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut data = Data::new();
        for (k, v) in iter {
            data.insert(k, v);
        }
        data
    }
}

/// A payload value.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// Bound as `?`
    Value(Value),
    /// Inlined as `(subquery) alias`
    Subquery(SubqueryHandle),
    /// Inlined SQL function
    Func(Func),
}

forward_value_from!(DataValue, DataValue::Value);

impl From<SubqueryHandle> for DataValue {
    fn from(sub: SubqueryHandle) -> Self {
        DataValue::Subquery(sub)
    }
}

impl From<Func> for DataValue {
    fn from(func: Func) -> Self {
        DataValue::Func(func)
    }
}

/// SQL function values for payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Func {
    /// `col+N` / `col-N`
    Increment(i64),
    /// Raw SQL with its own placeholders.
    Expr { sql: String, params: Params },
    /// `!col`, or `!expr` when an expression is given.
    Not(Option<String>),
}

impl Func {
    /// `col = col + n`
    pub fn inc(n: i64) -> Self {
        Func::Increment(n)
    }

    /// `col = col - n`
    pub fn dec(n: i64) -> Self {
        Func::Increment(n.saturating_neg())
    }

    /// Boolean negation of the column itself (`None`) or of an expression.
    pub fn not(expr: Option<&str>) -> Self {
        Func::Not(expr.map(str::to_string))
    }

    /// Raw SQL expression with bound parameters, e.g. `Func::expr("SHA1(?)", ["secret"])`.
    pub fn expr(sql: impl Into<String>, params: impl Into<Params>) -> Self {
        Func::Expr {
            sql: sql.into(),
            params: params.into(),
        }
    }

    /// `NOW()` shifted by `diff` (see [`interval`]); an empty `diff` means plain `NOW()`.
    pub fn now(diff: &str) -> DbResult<Self> {
        Ok(Func::Expr {
            sql: interval(diff, "NOW()")?,
            params: Params::new(),
        })
    }
}

/// Append an interval to `func`.
///
/// `diff` is `[+|-]N[unit]` with unit one of `s`, `m`, `h`, `d` (default),
/// `M`, `Y`:
///
/// ```
/// assert_eq!(myqb::interval("-1d", "NOW()").unwrap(), "NOW() - interval 1 day");
/// assert_eq!(myqb::interval("10 m", "created").unwrap(), "created + interval 10 minute");
/// assert!(myqb::interval("3w", "NOW()").is_err());
/// ```
pub fn interval(diff: &str, func: &str) -> DbResult<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"([+-]?) ?([0-9]+) ?([a-zA-Z]?)").expect("invalid built-in interval regex")
    });

    let Some(caps) = re.captures(diff) else {
        return Ok(func.to_string());
    };
    let sign = caps.get(1).map_or("", |m| m.as_str());
    let sign = if sign.is_empty() { "+" } else { sign };
    let amount = &caps[2];
    let unit = match caps.get(3).map_or("", |m| m.as_str()) {
        "s" => "second",
        "m" => "minute",
        "h" => "hour",
        "" | "d" => "day",
        "M" => "month",
        "Y" => "year",
        _ => {
            return Err(DbError::validation(format!("invalid interval type in '{diff}'")));
        }
    };
    Ok(format!("{func} {sign} interval {amount} {unit}"))
}
