use super::{Caller, Db, Dispatch, shape};
use crate::builder::{Clauses, compile};
use crate::client::Connector;
use crate::error::{DbError, DbResult};
use crate::row::{Fetched, QueryValue, Row};
use crate::sql::prefixed_table;
use crate::state::{Limit, QueryOption, QueryState};
use crate::value::{Params, Value};
use regex::Regex;
use std::future::Future;
use std::panic::Location;
use std::sync::OnceLock;

/// Whether a raw query asks for exactly one row.
fn is_single_row(sql: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)limit\s+1;?$").expect("invalid built-in limit regex"))
        .is_match(sql.trim_end())
}

impl<C: Connector> Db<C> {
    /// `SELECT columns FROM table` with the accumulated clauses.
    ///
    /// The result is shaped by the return-shape selectors
    /// ([`Db::object_builder`], [`Db::json_builder`], [`Db::map`]).
    #[track_caller]
    pub fn get(
        &mut self,
        table: &str,
        limit: impl Into<Limit>,
        columns: &str,
    ) -> impl Future<Output = DbResult<Fetched>> {
        let caller = Location::caller();
        let limit = limit.into();
        async move {
            let state = self.begin();
            let result = self.get_with(state, table, limit, columns, caller).await;
            self.finish();
            result
        }
    }

    /// First matching row; empty when nothing matched.
    #[track_caller]
    pub fn get_one(&mut self, table: &str, columns: &str) -> impl Future<Output = DbResult<Row>> {
        let caller = Location::caller();
        async move {
            let state = self.begin();
            let result = self.select_rows(state, table, Limit::Count(1), columns, caller).await;
            self.finish();
            Ok(result?.into_iter().next().unwrap_or_default())
        }
    }

    /// Value of `column` in the first matching row.
    #[track_caller]
    pub fn get_value(&mut self, table: &str, column: &str) -> impl Future<Output = DbResult<Option<Value>>> {
        let caller = Location::caller();
        async move {
            let state = self.begin();
            let columns = format!("{column} AS retval");
            let result = self.select_rows(state, table, Limit::Count(1), &columns, caller).await;
            self.finish();
            Ok(result?
                .into_iter()
                .next()
                .and_then(|row| row.get("retval").cloned()))
        }
    }

    /// Values of `column` across up to `limit` rows.
    #[track_caller]
    pub fn get_values(
        &mut self,
        table: &str,
        column: &str,
        limit: impl Into<Limit>,
    ) -> impl Future<Output = DbResult<Vec<Value>>> {
        let caller = Location::caller();
        let limit = limit.into();
        async move {
            let state = self.begin();
            let columns = format!("{column} AS retval");
            let result = self.select_rows(state, table, limit, &columns, caller).await;
            self.finish();
            Ok(result?
                .into_iter()
                .filter_map(|row| row.get("retval").cloned())
                .collect())
        }
    }

    /// Whether any row matches the accumulated conditions.
    #[track_caller]
    pub fn has(&mut self, table: &str) -> impl Future<Output = DbResult<bool>> {
        let caller = Location::caller();
        async move {
            let state = self.begin();
            let result = self.select_rows(state, table, Limit::Count(1), "1", caller).await;
            self.finish();
            Ok(!result?.is_empty())
        }
    }

    /// Run caller-written SQL with `params` bound to its `?` placeholders.
    /// Table names are used as written.
    #[track_caller]
    pub fn raw_query(&mut self, sql: &str, params: impl Into<Params>) -> impl Future<Output = DbResult<Fetched>> {
        let caller = Location::caller();
        let params = params.into();
        async move {
            let state = self.begin();
            let result = match self.raw_rows(&state, sql, &params, caller).await {
                Ok(rows) => shape(&state, rows),
                Err(err) => Err(err),
            };
            self.finish();
            result
        }
    }

    /// First row of a raw query.
    #[track_caller]
    pub fn raw_query_one(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
    ) -> impl Future<Output = DbResult<Option<Row>>> {
        let caller = Location::caller();
        let params = params.into();
        async move {
            let state = self.begin();
            let result = self.raw_rows(&state, sql, &params, caller).await;
            self.finish();
            Ok(result?.into_iter().next())
        }
    }

    /// First column of a raw query: one value when the SQL ends in
    /// `LIMIT 1`, otherwise the column across all rows.
    #[track_caller]
    pub fn raw_query_value(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
    ) -> impl Future<Output = DbResult<QueryValue>> {
        let caller = Location::caller();
        let params = params.into();
        async move {
            let state = self.begin();
            let result = self.raw_rows(&state, sql, &params, caller).await;
            self.finish();

            let rows = result?;
            let Some(first) = rows.first() else {
                return Ok(QueryValue::None);
            };
            let Some((key, _)) = first.columns().next() else {
                return Ok(QueryValue::None);
            };
            let key = key.to_string();
            let mut values = rows.into_iter().filter_map(|row| row.get(&key).cloned());
            if is_single_row(sql) {
                return Ok(values.next().map_or(QueryValue::None, QueryValue::One));
            }
            Ok(QueryValue::Many(values.collect()))
        }
    }

    /// Page `page` (1-based) of the matching rows, `page_limit` rows per page.
    /// Sets [`Db::total_count`] and [`Db::total_pages`].
    #[track_caller]
    pub fn paginate(&mut self, table: &str, page: u64, columns: &str) -> impl Future<Output = DbResult<Fetched>> {
        let caller = Location::caller();
        async move {
            let mut state = self.begin();
            state.add_option(QueryOption::SqlCalcFoundRows);
            let page_limit = self.page_limit;
            let offset = page_limit.saturating_mul(page.max(1) - 1);
            let result = self
                .get_with(state, table, Limit::range(offset, page_limit), columns, caller)
                .await;
            if result.is_ok() {
                self.total_pages = self.total_count.div_ceil(page_limit);
            }
            self.finish();
            result
        }
    }

    /// Whether every table in `tables` exists in the active profile's database.
    #[track_caller]
    pub fn table_exists(&mut self, tables: &[&str]) -> impl Future<Output = DbResult<bool>> {
        let caller = Location::caller();
        async move {
            // Pending clauses are dropped, not applied to the lookup.
            self.begin();
            let schema = self.registry.profile(&self.active).map(|p| p.db.clone());
            let result = match schema {
                None => Err(DbError::configuration(format!(
                    "connection {} was not added",
                    self.active
                ))),
                Some(_) if tables.is_empty() => Ok(false),
                Some(schema) => {
                    let names: Vec<String> = tables.iter().map(|t| format!("{}{t}", self.prefix)).collect();
                    self.and_where("table_schema", schema)
                        .where_in("table_name", names);
                    let state = self.begin();
                    let limit = Limit::Count(tables.len() as u64);
                    self.select_rows(state, "information_schema.tables", limit, "1", caller)
                        .await
                        .map(|rows| rows.len() == tables.len())
                }
            };
            self.finish();
            result
        }
    }

    async fn get_with(
        &mut self,
        state: QueryState,
        table: &str,
        limit: Limit,
        columns: &str,
        caller: Caller,
    ) -> DbResult<Fetched> {
        let (state, rows) = self.select_state(state, table, limit, columns, caller).await?;
        shape(&state, rows)
    }

    /// Rows in plain form, ignoring the return-shape selectors.
    async fn select_rows(
        &mut self,
        state: QueryState,
        table: &str,
        limit: Limit,
        columns: &str,
        caller: Caller,
    ) -> DbResult<Vec<Row>> {
        let (_, rows) = self.select_state(state, table, limit, columns, caller).await?;
        Ok(rows)
    }

    async fn select_state(
        &mut self,
        mut state: QueryState,
        table: &str,
        limit: Limit,
        columns: &str,
        caller: Caller,
    ) -> DbResult<(QueryState, Vec<Row>)> {
        state.table_name = Some(prefixed_table(&self.prefix, table));
        let sql = compile::select(&state, &self.prefix, table, limit, columns);
        let outcome = self
            .dispatch(sql.sql(), sql.params(), Dispatch::Prepared, caller)
            .await?;
        let rows = self.fetch_rows(&state, outcome).await?;
        Ok((state, rows))
    }

    async fn raw_rows(
        &mut self,
        state: &QueryState,
        sql: &str,
        params: &Params,
        caller: Caller,
    ) -> DbResult<Vec<Row>> {
        let outcome = self.dispatch(sql, params, Dispatch::Prepared, caller).await?;
        self.fetch_rows(state, outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::is_single_row;

    #[test]
    fn detects_single_row_queries() {
        assert!(is_single_row("SELECT id FROM t LIMIT 1"));
        assert!(is_single_row("select id from t limit   1;"));
        assert!(!is_single_row("SELECT id FROM t LIMIT 10"));
        assert!(!is_single_row("SELECT id FROM t"));
    }
}
