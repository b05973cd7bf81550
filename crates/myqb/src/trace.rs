//! Statement trace log and `tracing` events.

use std::panic::Location;
use std::time::{Duration, Instant};

/// Longest SQL (in bytes) written to log events.
const MAX_LOGGED_SQL: usize = 200;

/// The type of SQL statement being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Replace,
    Update,
    Delete,
    /// LOCK / LOAD DATA / DDL / anything else
    Other,
}

impl QueryType {
    /// Detect the statement type from its leading keyword, skipping
    /// whitespace, comments and opening parentheses.
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = strip_sql_prefix(sql);
        if starts_with_keyword(trimmed, "SELECT") {
            QueryType::Select
        } else if starts_with_keyword(trimmed, "INSERT") {
            QueryType::Insert
        } else if starts_with_keyword(trimmed, "REPLACE") {
            QueryType::Replace
        } else if starts_with_keyword(trimmed, "UPDATE") {
            QueryType::Update
        } else if starts_with_keyword(trimmed, "DELETE") {
            QueryType::Delete
        } else {
            QueryType::Other
        }
    }
}

fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if s.starts_with("--") || s.starts_with('#') {
            match s.find('\n') {
                Some(pos) => s = &s[pos + 1..],
                None => return "",
            }
            continue;
        }
        if s.starts_with("/*") {
            match s.find("*/") {
                Some(pos) => s = &s[pos + 2..],
                None => return "",
            }
            continue;
        }
        if let Some(rest) = s.strip_prefix('(') {
            s = rest;
            continue;
        }
        if s == before {
            return s;
        }
    }
}

fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    s.get(0..keyword.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(keyword))
}

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

/// Emit the debug event for a statement about to run.
pub(crate) fn log_statement(connection: &str, sql: &str, param_count: usize) {
    let shown = match truncate_sql_bytes(sql, MAX_LOGGED_SQL) {
        cut if cut.len() < sql.len() => format!("{cut}..."),
        _ => sql.to_string(),
    };
    tracing::debug!(
        target: "myqb.sql",
        query_type = ?QueryType::from_sql(sql),
        connection,
        param_count,
        sql = %shown,
    );
}

/// One executed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    /// SQL with parameters interpolated.
    pub sql: String,
    pub elapsed: Duration,
    /// `file:line` of the call that ran the statement.
    pub caller: String,
}

/// Ordered record of executed statements, kept while tracing is enabled.
#[derive(Debug, Clone, Default)]
pub struct TraceLog {
    enabled: bool,
    strip_prefix: Option<String>,
    entries: Vec<TraceEntry>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn tracing on or off. `strip_prefix` is removed from caller paths.
    pub fn set_enabled(&mut self, enabled: bool, strip_prefix: Option<&str>) {
        self.enabled = enabled;
        self.strip_prefix = strip_prefix.map(str::to_string);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a statement that started at `started`. No-op when disabled.
    pub fn record(&mut self, sql: &str, started: Instant, caller: &Location<'_>) {
        if !self.enabled {
            return;
        }
        let file = caller.file();
        let file = self
            .strip_prefix
            .as_deref()
            .and_then(|prefix| file.strip_prefix(prefix))
            .unwrap_or(file);
        self.entries.push(TraceEntry {
            sql: sql.to_string(),
            elapsed: started.elapsed(),
            caller: format!("{file}:{}", caller.line()),
        });
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
