//! Placeholder-safe SQL text buffer and identifier sanitizing.

use crate::builder::SubqueryHandle;
use crate::value::{Params, Value};
use regex::Regex;
use std::sync::OnceLock;

/// SQL text with its bound parameters.
///
/// Every `?` written through [`SqlBuf::push_bind`] is paired with its value in
/// the same call, and subqueries are spliced with their parameters at the
/// position of their text, so placeholders and parameters never drift apart.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use]
pub struct SqlBuf {
    sql: String,
    params: Params,
}

impl SqlBuf {
    pub fn new(initial_sql: impl Into<String>) -> Self {
        Self {
            sql: initial_sql.into(),
            params: Params::new(),
        }
    }

    /// Append raw SQL (no parameters).
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a `?` placeholder and bind its value.
    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.sql.push('?');
        self.params.push(value);
        self
    }

    /// Append `?, ?, ...` for every value. An empty list renders `NULL`.
    pub fn push_bind_list<'a>(&mut self, values: impl IntoIterator<Item = &'a Value>) -> &mut Self {
        let mut iter = values.into_iter();
        let Some(first) = iter.next() else {
            return self.push("NULL");
        };
        self.push_bind(first.clone());
        for v in iter {
            self.push(", ");
            self.push_bind(v.clone());
        }
        self
    }

    /// Append `(subquery) alias` and splice its parameters.
    pub fn push_subquery(&mut self, sub: &SubqueryHandle) -> &mut Self {
        self.sql.push('(');
        self.sql.push_str(&sub.query);
        self.sql.push(')');
        if let Some(alias) = &sub.alias {
            self.sql.push(' ');
            self.sql.push_str(alias);
        }
        self.params.extend(&sub.params);
        self
    }

    /// Append a caller-written expression that carries its own placeholders.
    pub fn push_raw_bound(&mut self, expr: &str, params: &Params) -> &mut Self {
        self.sql.push_str(expr);
        self.params.extend(params);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn into_parts(self) -> (String, Params) {
        (self.sql, self.params)
    }

    /// Number of `?` placeholders outside quoted literals.
    pub fn placeholder_count(&self) -> usize {
        count_placeholders(&self.sql)
    }
}

pub(crate) fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in sql.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '?') => count += 1,
            (None, _) => {}
        }
    }
    count
}

/// Replace each `?` with its parameter as a quoted literal (`NULL` unquoted).
///
/// For diagnostics only; the result is never executed.
pub fn interpolate(sql: &str, params: &Params) -> String {
    let mut out = String::with_capacity(sql.len() + params.len() * 4);
    let mut values = params.iter();
    for c in sql.chars() {
        if c != '?' {
            out.push(c);
            continue;
        }
        match values.next() {
            Some(Value::Null) => out.push_str("NULL"),
            Some(v) => {
                out.push('\'');
                out.push_str(&v.to_string());
                out.push('\'');
            }
            None => out.push('?'),
        }
    }
    out
}

/// MySQL string-literal escaping (`real_escape_string` semantics).
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out
}

/// Strip characters not allowed in an ORDER BY expression.
pub(crate) fn sanitize_order_field(field: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"[^A-Za-z0-9 .(),_`*'"-]+"#).expect("invalid built-in order-by regex")
    })
    .replace_all(field, "")
    .into_owned()
}

/// Strip characters not allowed in a GROUP BY expression.
pub(crate) fn sanitize_group_field(field: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[^A-Za-z0-9 .(),_*<>=!-]+").expect("invalid built-in group-by regex")
    })
    .replace_all(field, "")
    .into_owned()
}

/// Strip characters not allowed in a `FIELD(...)` custom-order value.
/// Non-ASCII letters are kept.
pub(crate) fn sanitize_field_value(value: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[^\p{L}\p{N} .(),_`-]+").expect("invalid built-in field-value regex")
    })
    .replace_all(value, "")
    .into_owned()
}

/// Insert `prefix` into backtick-qualified table references: `` `users`.id ``
/// becomes `` `p_users`.id ``.
pub(crate) fn prefix_quoted_tables(field: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return field.to_string();
    }
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([`a-zA-Z0-9_]*\.)").expect("invalid built-in prefix regex"))
        .replace_all(field, |caps: &regex::Captures<'_>| format!("`{prefix}{}", &caps[1]))
        .into_owned()
}

/// Prefix a table name unless it is schema-qualified.
pub(crate) fn prefixed_table(prefix: &str, table: &str) -> String {
    if table.contains('.') {
        table.to_string()
    } else {
        format!("{prefix}{table}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_bind_pairs_placeholder_and_value() {
        let mut sql = SqlBuf::new("SELECT * FROM t WHERE a = ");
        sql.push_bind(1_i64).push(" AND b IN (");
        sql.push_bind_list(&[Value::from("x"), Value::from("y")]);
        sql.push(")");
        assert_eq!(sql.sql(), "SELECT * FROM t WHERE a = ? AND b IN (?, ?)");
        assert_eq!(sql.params().len(), 3);
        assert_eq!(sql.placeholder_count(), 3);
    }

    #[test]
    fn empty_bind_list_renders_null() {
        let mut sql = SqlBuf::new("x IN (");
        sql.push_bind_list(&[]).push(")");
        assert_eq!(sql.sql(), "x IN (NULL)");
        assert!(sql.params().is_empty());
    }

    #[test]
    fn placeholders_inside_literals_are_not_counted() {
        assert_eq!(count_placeholders("SELECT '?', \"?\", `?` FROM t WHERE a = ?"), 1);
        assert_eq!(count_placeholders(r"SELECT 'it\'s ?' , ?"), 1);
    }

    #[test]
    fn interpolate_quotes_values() {
        let params: Params = vec![Value::from(5_i32), Value::Null, Value::from("bob")].into();
        assert_eq!(
            interpolate("UPDATE t SET a = ?, b = ? WHERE c = ?", &params),
            "UPDATE t SET a = '5', b = NULL WHERE c = 'bob'"
        );
    }

    #[test]
    fn escapes_specials() {
        assert_eq!(escape_string("it's\n\\"), r"it\'s\n\\");
    }

    #[test]
    fn sanitizers() {
        assert_eq!(sanitize_order_field("name; DROP TABLE x"), "name DROP TABLE x");
        assert_eq!(sanitize_group_field("count(id) > 1; --"), "count(id) > 1 --");
        assert_eq!(sanitize_field_value("jürgen'\""), "jürgen");
    }

    #[test]
    fn prefixes_backtick_tables() {
        assert_eq!(prefix_quoted_tables("`users`.id", "p_"), "`p_users`.id");
        assert_eq!(prefix_quoted_tables("users.id", "p_"), "users.id");
        assert_eq!(prefixed_table("p_", "users"), "p_users");
        assert_eq!(prefixed_table("p_", "information_schema.tables"), "information_schema.tables");
    }
}
