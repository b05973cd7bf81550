//! Statement assembly.
//!
//! Clause order is fixed: JOIN, payload (VALUES / SET), WHERE, GROUP BY,
//! HAVING, ORDER BY, LIMIT, ON DUPLICATE KEY UPDATE, FOR UPDATE,
//! LOCK IN SHARE MODE.

use crate::condition::write_conditions;
use crate::data::{Data, DataValue, Func};
use crate::error::{DbError, DbResult};
use crate::sql::{SqlBuf, prefixed_table};
use crate::state::{Direction, DuplicateColumn, JoinTable, Limit, OnDuplicate, QueryState};

/// `INSERT` or `REPLACE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InsertVerb {
    Insert,
    Replace,
}

impl InsertVerb {
    fn as_sql(self) -> &'static str {
        match self {
            InsertVerb::Insert => "INSERT",
            InsertVerb::Replace => "REPLACE",
        }
    }
}

#[derive(Clone, Copy)]
enum Payload<'a> {
    None,
    Insert(&'a Data),
    Update(&'a Data),
}

pub(crate) fn select(
    state: &QueryState,
    prefix: &str,
    table: &str,
    limit: Limit,
    columns: &str,
) -> SqlBuf {
    let mut sql = SqlBuf::new("SELECT ");
    write_options(&mut sql, state);
    sql.push(columns).push(" FROM ").push(&prefixed_table(prefix, table));
    write_clauses(&mut sql, state, Payload::None, limit);
    sql
}

pub(crate) fn insert(
    state: &QueryState,
    prefix: &str,
    verb: InsertVerb,
    table: &str,
    data: &Data,
) -> DbResult<SqlBuf> {
    if let Some(dup) = &state.on_duplicate {
        for column in &dup.columns {
            if let DuplicateColumn::Reuse(name) = column
                && data.get(name).is_none()
            {
                return Err(DbError::validation(format!(
                    "ON DUPLICATE KEY UPDATE column {name} is not part of the inserted data"
                )));
            }
        }
    }
    let mut sql = SqlBuf::new(verb.as_sql());
    sql.push(" ");
    write_options(&mut sql, state);
    sql.push("INTO ").push(prefix).push(table);
    write_clauses(&mut sql, state, Payload::Insert(data), Limit::All);
    Ok(sql)
}

pub(crate) fn update(
    state: &QueryState,
    prefix: &str,
    table: &str,
    data: &Data,
    limit: Limit,
) -> DbResult<SqlBuf> {
    if data.is_empty() {
        return Err(DbError::operation(format!("UPDATE {table} without data")));
    }
    let mut sql = SqlBuf::new("UPDATE ");
    sql.push(prefix).push(table);
    write_clauses(&mut sql, state, Payload::Update(data), limit);
    Ok(sql)
}

pub(crate) fn delete(state: &QueryState, prefix: &str, table: &str, limit: Limit) -> SqlBuf {
    let table = format!("{prefix}{table}");
    let mut sql = if state.joins.is_empty() {
        SqlBuf::new(format!("DELETE FROM {table}"))
    } else {
        let alias = table.rsplit(' ').next().unwrap_or(&table);
        SqlBuf::new(format!("DELETE {alias} FROM {table}"))
    };
    write_clauses(&mut sql, state, Payload::None, limit);
    sql
}

fn write_options(sql: &mut SqlBuf, state: &QueryState) {
    for option in &state.options {
        sql.push(option.as_sql()).push(" ");
    }
}

fn write_clauses(sql: &mut SqlBuf, state: &QueryState, payload: Payload<'_>, limit: Limit) {
    write_joins(sql, state);

    match payload {
        Payload::Insert(data) => write_insert_values(sql, data),
        Payload::Update(data) => {
            sql.push(" SET ");
            for (i, (column, value)) in data.iter().enumerate() {
                if i > 0 {
                    sql.push(", ");
                }
                write_assignment(sql, column, value);
            }
        }
        Payload::None => {}
    }

    if !state.wheres.is_empty() {
        sql.push(" WHERE ");
        write_conditions(sql, &state.wheres);
    }

    if !state.group_by.is_empty() {
        sql.push(" GROUP BY ").push(&state.group_by.join(", "));
    }

    if !state.havings.is_empty() {
        sql.push(" HAVING ");
        write_conditions(sql, &state.havings);
    }

    if !state.order_by.is_empty() {
        sql.push(" ORDER BY ");
        for (i, order) in state.order_by.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push(&order.expr);
            if order.direction != Direction::None {
                sql.push(" ").push(order.direction.as_sql());
            }
        }
    }

    match limit {
        Limit::All => {}
        Limit::Count(count) => {
            sql.push(&format!(" LIMIT {count}"));
        }
        Limit::Range { offset, count } => {
            sql.push(&format!(" LIMIT {offset}, {count}"));
        }
    }

    if let (Payload::Insert(data), Some(dup)) = (payload, &state.on_duplicate) {
        write_on_duplicate(sql, data, dup);
    }

    if state.for_update {
        sql.push(" FOR UPDATE");
    }
    if state.lock_in_share_mode {
        sql.push(" LOCK IN SHARE MODE");
    }
}

fn write_joins(sql: &mut SqlBuf, state: &QueryState) {
    for join in &state.joins {
        sql.push(" ");
        let kind = join.kind.as_sql();
        if !kind.is_empty() {
            sql.push(kind).push(" ");
        }
        sql.push("JOIN ");
        let key = match &join.table {
            JoinTable::Name(name) => {
                sql.push(name);
                Some(name.as_str())
            }
            JoinTable::Subquery(sub) => {
                sql.push_subquery(sub);
                None
            }
        };
        if join.condition.to_ascii_lowercase().contains("using") {
            sql.push(" ");
        } else {
            sql.push(" ON ");
        }
        sql.push(&join.condition);

        if let Some(key) = key {
            for cond in state.join_conditions_for(key) {
                sql.push(" ").push(cond.connective.as_sql()).push(" ");
                cond.predicate.write(sql);
            }
        }
    }
}

fn write_insert_values(sql: &mut SqlBuf, data: &Data) {
    if data.is_empty() {
        // A row of column defaults.
        sql.push(" () VALUES ()");
        return;
    }
    let columns: Vec<&str> = data.columns().collect();
    sql.push(" (`").push(&columns.join("`, `")).push("`) VALUES (");
    for (i, (column, value)) in data.iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        write_value(sql, column, value);
    }
    sql.push(")");
}

/// `` `col` = value ``; a qualified `t.col` becomes `` t.`col` ``.
fn write_assignment(sql: &mut SqlBuf, column: &str, value: &DataValue) {
    match column.split_once('.') {
        Some((table, col)) => sql.push(table).push(".`").push(col).push("` = "),
        None => sql.push("`").push(column).push("` = "),
    };
    write_value(sql, column, value);
}

fn write_value(sql: &mut SqlBuf, column: &str, value: &DataValue) {
    match value {
        DataValue::Value(v) => {
            sql.push_bind(v.clone());
        }
        DataValue::Subquery(sub) => {
            sql.push_subquery(sub);
        }
        DataValue::Func(Func::Increment(n)) => {
            sql.push(&format!("{column}{n:+}"));
        }
        DataValue::Func(Func::Expr { sql: expr, params }) => {
            sql.push_raw_bound(expr, params);
        }
        DataValue::Func(Func::Not(None)) => {
            sql.push("!").push(column);
        }
        DataValue::Func(Func::Not(Some(expr))) => {
            sql.push("!").push(expr);
        }
    }
}

fn write_on_duplicate(sql: &mut SqlBuf, data: &Data, dup: &OnDuplicate) {
    if dup.columns.is_empty() {
        return;
    }
    sql.push(" ON DUPLICATE KEY UPDATE ");
    if let Some(id) = &dup.last_insert_id {
        sql.push(&format!("{id}=LAST_INSERT_ID ({id}), "));
    }
    for (i, column) in dup.columns.iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        match column {
            // Presence checked in `insert`.
            DuplicateColumn::Reuse(name) => match data.get(name) {
                Some(value) => write_assignment(sql, name, value),
                None => {
                    sql.push("`").push(name).push("` = NULL");
                }
            },
            DuplicateColumn::Set(name, value) => write_assignment(sql, name, value),
        }
    }
}
