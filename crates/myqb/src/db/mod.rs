//! The executing query builder.
//!
//! [`Db`] accumulates clauses through [`Clauses`] and runs them with a
//! terminal operation (`get`, `insert`, `update`, ...). Every terminal takes
//! the accumulated state, so the builder is fresh again afterwards whether
//! the statement succeeded or not.
//!
//! Terminal operations are `#[track_caller]`: with tracing enabled the
//! `file:line` of the calling code is recorded with each statement.

mod admin;
mod select;
mod write;

#[cfg(test)]
mod tests;

pub use write::InsertResult;

use crate::builder::{Clauses, SubQuery};
use crate::client::{ColumnMeta, Connection, Connector, Outcome, RowCursor};
use crate::config::{ConnectionProfile, DbConfig};
use crate::error::{DbError, DbResult};
use crate::registry::ConnectionRegistry;
use crate::row::{Fetched, KeyedRows, Materializer, Row};
use crate::sql::interpolate;
use crate::state::{DuplicateColumn, LockMethod, OnDuplicate, QueryOption, QueryState};
use crate::trace::{TraceEntry, TraceLog, log_statement};
use crate::value::{Params, Value};
use std::panic::Location;
use std::time::Instant;

pub(crate) type Cursor<C> = <<C as Connector>::Conn as Connection>::Cursor;

pub(crate) type Caller = &'static Location<'static>;

const FOUND_ROWS: &str = "SELECT FOUND_ROWS()";

/// How a statement is sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// Prepared, parameters bound to `?`.
    Prepared,
    /// Sent as text (LOCK TABLES, LOAD DATA, ...).
    Unprepared,
}

/// Query builder bound to a set of named connections.
///
/// ```no_run
/// # async fn demo<C: myqb::Connector>(connector: C) -> myqb::DbResult<()> {
/// use myqb::{Clauses, ConnectionProfile, Data, Db, DbConfig};
///
/// let config = DbConfig::new()
///     .with_connection("default", ConnectionProfile::new("localhost", "app", "secret", "shop"))
///     .with_prefix("t_");
/// let mut db = Db::new(connector, config)?;
///
/// let id = db.insert("users", Data::new().set("login", "ann")).await?;
/// db.and_where("login", "ann");
/// let user = db.get_one("users", "*").await?;
/// # Ok(()) }
/// ```
pub struct Db<C: Connector> {
    registry: ConnectionRegistry<C>,
    prefix: String,
    page_limit: u64,
    auto_reconnect: bool,
    default_connection: String,
    /// Profile the next statement runs on.
    active: String,
    state: QueryState,
    lock_method: LockMethod,
    /// Connection holding the open transaction.
    pub(crate) transaction: Option<String>,
    /// Connection whose abandoned transaction is rolled back before the next statement.
    pub(crate) pending_rollback: Option<String>,
    trace: TraceLog,
    reconnect_count: u32,
    count: u64,
    total_count: u64,
    total_pages: u64,
    insert_id: u64,
    last_query: String,
    last_error: Option<String>,
    last_errno: Option<u32>,
}

impl<C: Connector> Db<C> {
    /// Create a builder. Nothing connects until the first statement.
    pub fn new(connector: C, config: DbConfig) -> DbResult<Self> {
        config.validate()?;
        let mut registry = ConnectionRegistry::new(connector);
        for (name, profile) in config.connections {
            registry.add_profile(name, profile);
        }
        let mut trace = TraceLog::new();
        trace.set_enabled(config.trace, config.trace_strip_prefix.as_deref());

        Ok(Self {
            registry,
            prefix: config.prefix,
            page_limit: config.page_limit,
            auto_reconnect: config.auto_reconnect,
            active: config.default_connection.clone(),
            default_connection: config.default_connection,
            state: QueryState::default(),
            lock_method: LockMethod::default(),
            transaction: None,
            pending_rollback: None,
            trace,
            reconnect_count: 0,
            count: 0,
            total_count: 0,
            total_pages: 0,
            insert_id: 0,
            last_query: String::new(),
            last_error: None,
            last_errno: None,
        })
    }

    // ── Connections ──────────────────────────────────────────────────────

    /// Run the next statement on profile `name`. The selection falls back
    /// to the default profile after that statement, unless a transaction
    /// is open.
    pub fn connection(&mut self, name: &str) -> DbResult<&mut Self> {
        if !self.registry.has_profile(name) {
            return Err(DbError::configuration(format!("connection {name} was not added")));
        }
        self.active = name.to_string();
        Ok(self)
    }

    /// Add (or replace) a named profile. Does not connect.
    pub fn add_connection(&mut self, name: impl Into<String>, profile: ConnectionProfile) -> &mut Self {
        self.registry.add_profile(name, profile);
        self
    }

    /// Open (or reopen) the connection for `name` now.
    pub async fn connect(&mut self, name: &str) -> DbResult<()> {
        self.registry.connect(name).await
    }

    pub fn disconnect(&mut self, name: &str) -> bool {
        self.registry.disconnect(name)
    }

    pub fn disconnect_all(&mut self) {
        self.registry.disconnect_all();
    }

    pub fn registry(&self) -> &ConnectionRegistry<C> {
        &self.registry
    }

    pub(crate) fn registry_mut(&mut self) -> &mut ConnectionRegistry<C> {
        &mut self.registry
    }

    pub fn active_connection(&self) -> &str {
        &self.active
    }

    // ── Builders and settings ────────────────────────────────────────────

    /// A subquery builder sharing this builder's table prefix.
    pub fn sub_query(&self) -> SubQuery {
        SubQuery::new(self.prefix.clone())
    }

    /// A subquery rendered as `(...) alias`.
    pub fn sub_query_as(&self, alias: &str) -> SubQuery {
        SubQuery::aliased(self.prefix.clone(), alias)
    }

    /// Add `ON DUPLICATE KEY UPDATE` to the next insert.
    ///
    /// With `last_insert_id`, that column is refreshed through
    /// `LAST_INSERT_ID()` so an updated row reports its id.
    pub fn on_duplicate<I>(&mut self, columns: I, last_insert_id: Option<&str>) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<DuplicateColumn>,
    {
        self.state.on_duplicate = Some(OnDuplicate {
            columns: columns.into_iter().map(Into::into).collect(),
            last_insert_id: last_insert_id.map(str::to_string),
        });
        self
    }

    /// Lock mode used by [`Db::lock`]: `READ` or `WRITE`.
    pub fn set_lock_method(&mut self, method: &str) -> DbResult<&mut Self> {
        self.lock_method = method.parse()?;
        Ok(self)
    }

    /// Return rows (the default).
    pub fn array_builder(&mut self) -> &mut Self {
        self.state.materializer = Materializer::Rows;
        self
    }

    /// Return a JSON array of objects.
    pub fn object_builder(&mut self) -> &mut Self {
        self.state.materializer = Materializer::Objects;
        self
    }

    /// Return a JSON string.
    pub fn json_builder(&mut self) -> &mut Self {
        self.state.materializer = Materializer::Json;
        self
    }

    /// Key the next result by the value of `column`.
    pub fn map(&mut self, column: &str) -> &mut Self {
        self.state.map_key = Some(column.to_string());
        self
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.prefix = prefix.into();
        self
    }

    /// Rows per page for [`Db::paginate`]; zero is treated as one.
    pub fn set_page_limit(&mut self, page_limit: u64) -> &mut Self {
        self.page_limit = page_limit.max(1);
        self
    }

    pub fn page_limit(&self) -> u64 {
        self.page_limit
    }

    pub fn set_auto_reconnect(&mut self, enabled: bool) -> &mut Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Turn the statement trace on or off. `strip_prefix` is removed from
    /// caller file paths.
    pub fn set_trace(&mut self, enabled: bool, strip_prefix: Option<&str>) -> &mut Self {
        self.trace.set_enabled(enabled, strip_prefix);
        self
    }

    pub fn trace(&self) -> &[TraceEntry] {
        self.trace.entries()
    }

    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    // ── Diagnostics ──────────────────────────────────────────────────────

    /// Rows fetched or affected by the last statement.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Rows matched ignoring LIMIT, after a query with `SQL_CALC_FOUND_ROWS`.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Pages available after [`Db::paginate`].
    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }

    pub fn insert_id(&self) -> u64 {
        self.insert_id
    }

    /// The last statement with its parameters interpolated.
    pub fn last_query(&self) -> &str {
        &self.last_query
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_errno(&self) -> Option<u32> {
        self.last_errno
    }

    /// Reconnects performed by the last terminal call.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Clauses accumulated for the next terminal call.
    pub fn state(&self) -> &QueryState {
        &self.state
    }

    // ── Execution ────────────────────────────────────────────────────────

    /// Take the accumulated state for a terminal call.
    fn begin(&mut self) -> QueryState {
        self.reconnect_count = 0;
        std::mem::take(&mut self.state)
    }

    fn finish(&mut self) {
        if self.transaction.is_none() && self.active != self.default_connection {
            self.active.clone_from(&self.default_connection);
        }
    }

    /// Send one statement on the active connection.
    ///
    /// A server-gone-away failure reconnects and retries once per terminal
    /// call when auto-reconnect is on, except inside a transaction: there the
    /// transaction is over and the call fails with a connection error.
    pub(crate) async fn dispatch(
        &mut self,
        sql: &str,
        params: &Params,
        mode: Dispatch,
        caller: Caller,
    ) -> DbResult<Outcome<Cursor<C>>> {
        self.rollback_abandoned().await?;

        let name = self.active.clone();
        self.last_query = interpolate(sql, params);
        log_statement(&name, sql, params.len());

        let started = Instant::now();
        let result = self.run(&name, sql, params, mode).await;
        self.trace.record(&self.last_query, started, caller);

        match &result {
            Ok(_) => {
                self.last_error = None;
                self.last_errno = None;
            }
            Err(err) => {
                tracing::warn!(target: "myqb", connection = %name, error = %err, "statement failed");
                self.last_error = Some(err.to_string());
                self.last_errno = err.code();
            }
        }
        result
    }

    async fn run(
        &mut self,
        name: &str,
        sql: &str,
        params: &Params,
        mode: Dispatch,
    ) -> DbResult<Outcome<Cursor<C>>> {
        loop {
            let conn = self.registry.resolve(name).await?;
            let attempt = match mode {
                Dispatch::Prepared => conn.execute(sql, params).await,
                Dispatch::Unprepared => conn.execute_unprepared(sql).await,
            };
            let err = match attempt {
                Ok(outcome) => return Ok(outcome),
                Err(err) => err,
            };

            if !err.is_gone_away() || !self.auto_reconnect {
                return Err(DbError::from_driver(err, sql));
            }
            if self.transaction.as_deref() == Some(name) {
                // The server discarded the transaction with the connection; a
                // retry would run in autocommit mode.
                self.transaction = None;
                self.registry.disconnect(name);
                tracing::warn!(target: "myqb", connection = name, code = err.code, "connection lost inside a transaction");
                return Err(DbError::connection(format!(
                    "transaction lost on connection {name}: {err}"
                )));
            }
            if self.reconnect_count > 0 {
                return Err(DbError::connection(format!(
                    "connection {name} lost again after reconnecting: {err}"
                )));
            }

            tracing::warn!(target: "myqb", connection = name, code = err.code, "server has gone away, reconnecting");
            self.reconnect_count += 1;
            self.registry.connect(name).await?;
        }
    }

    /// Read every row of `outcome`, applying nest-join and the found-rows count.
    async fn fetch_rows(&mut self, state: &QueryState, outcome: Outcome<Cursor<C>>) -> DbResult<Vec<Row>> {
        self.count = outcome.affected_rows;
        let Some(mut cursor) = outcome.cursor else {
            return Ok(Vec::new());
        };

        let columns = cursor.columns().to_vec();
        if columns.iter().any(ColumnMeta::is_long) {
            cursor
                .store_result()
                .await
                .map_err(|e| DbError::from_driver(e, &self.last_query))?;
        }

        let main_table = state
            .nest_join
            .then(|| state.table_name.clone().unwrap_or_default());
        let mut rows = Vec::new();
        while let Some(values) = cursor
            .fetch()
            .await
            .map_err(|e| DbError::from_driver(e, &self.last_query))?
        {
            let mut row = Row::new();
            for (meta, value) in columns.iter().zip(values) {
                match &main_table {
                    Some(main) if !meta.table.is_empty() && meta.table != *main => {
                        let table = meta
                            .table
                            .strip_prefix(self.prefix.as_str())
                            .unwrap_or(&meta.table);
                        row.push_nested(table, meta.name.clone(), value);
                    }
                    _ => row.push(meta.name.clone(), value),
                }
            }
            rows.push(row);
        }
        self.count = rows.len() as u64;

        if state.has_option(QueryOption::SqlCalcFoundRows) {
            self.total_count = self.found_rows().await?;
        }
        Ok(rows)
    }

    async fn found_rows(&mut self) -> DbResult<u64> {
        let conn = self.registry.resolve(&self.active).await?;
        let outcome = conn
            .execute_unprepared(FOUND_ROWS)
            .await
            .map_err(|e| DbError::from_driver(e, FOUND_ROWS))?;
        let Some(mut cursor) = outcome.cursor else {
            return Ok(0);
        };
        let row = cursor
            .fetch()
            .await
            .map_err(|e| DbError::from_driver(e, FOUND_ROWS))?;
        Ok(row
            .and_then(|values| values.first().and_then(Value::as_u64))
            .unwrap_or(0))
    }
}

/// Shape rows per the materializer and map key of `state`.
pub(crate) fn shape(state: &QueryState, rows: Vec<Row>) -> DbResult<Fetched> {
    let fetched = match (state.map_key.as_deref(), state.materializer) {
        (None, Materializer::Rows) => Fetched::Rows(rows),
        (None, Materializer::Objects) => Fetched::Objects(serde_json::to_value(&rows)?),
        (None, Materializer::Json) => Fetched::Json(serde_json::to_string(&rows)?),
        (Some(key), Materializer::Rows) => Fetched::Keyed(KeyedRows::from_rows(rows, key)),
        (Some(key), Materializer::Objects) => {
            Fetched::Objects(serde_json::to_value(KeyedRows::from_rows(rows, key))?)
        }
        (Some(key), Materializer::Json) => {
            Fetched::Json(serde_json::to_string(&KeyedRows::from_rows(rows, key))?)
        }
    };
    Ok(fetched)
}

impl<C: Connector> Clauses for Db<C> {
    fn state_mut(&mut self) -> &mut QueryState {
        &mut self.state
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl<C: Connector> std::fmt::Debug for Db<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("active", &self.active)
            .field("prefix", &self.prefix)
            .field("state", &self.state)
            .field("in_transaction", &self.transaction.is_some())
            .finish_non_exhaustive()
    }
}
