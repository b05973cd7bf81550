use super::{Caller, Db, Dispatch};
use crate::builder::compile::{self, InsertVerb};
use crate::client::Connector;
use crate::data::Data;
use crate::error::{DbError, DbResult};
use crate::state::{Limit, QueryState};
use crate::value::Value;
use std::future::Future;
use std::panic::Location;

/// Outcome of an insert or replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// No row was written.
    NotInserted,
    /// A row was written (or updated through ON DUPLICATE KEY UPDATE) and
    /// the table has no auto-increment id.
    Inserted,
    /// A row was written with this auto-increment id.
    Id(u64),
}

impl InsertResult {
    pub fn is_inserted(self) -> bool {
        !matches!(self, InsertResult::NotInserted)
    }

    pub fn id(self) -> Option<u64> {
        match self {
            InsertResult::Id(id) => Some(id),
            _ => None,
        }
    }
}

impl<C: Connector> Db<C> {
    /// `INSERT INTO table (...) VALUES (...)`, plus ON DUPLICATE KEY UPDATE
    /// when [`Db::on_duplicate`] was called.
    #[track_caller]
    pub fn insert(&mut self, table: &str, data: Data) -> impl Future<Output = DbResult<InsertResult>> {
        let caller = Location::caller();
        async move {
            let state = self.begin();
            let result = self
                .insert_with(&state, InsertVerb::Insert, table, &data, caller)
                .await;
            self.finish();
            result
        }
    }

    /// `REPLACE INTO table (...) VALUES (...)`
    #[track_caller]
    pub fn replace(&mut self, table: &str, data: Data) -> impl Future<Output = DbResult<InsertResult>> {
        let caller = Location::caller();
        async move {
            let state = self.begin();
            let result = self
                .insert_with(&state, InsertVerb::Replace, table, &data, caller)
                .await;
            self.finish();
            result
        }
    }

    /// Insert every row or none.
    ///
    /// Runs inside a transaction of its own unless one is already open. When
    /// a row fails the transaction is rolled back, the server error is left
    /// in [`Db::last_error`] and `Ok(None)` is returned. Other failures,
    /// including a connection lost mid-batch, are returned as errors.
    #[track_caller]
    pub fn insert_multi(
        &mut self,
        table: &str,
        rows: &[Data],
    ) -> impl Future<Output = DbResult<Option<Vec<InsertResult>>>> {
        let caller = Location::caller();
        async move {
            let state = self.begin();
            let result = self.insert_rows(&state, table, rows, caller).await;
            self.finish();
            result
        }
    }

    /// [`Db::insert_multi`] with the column names given once.
    #[track_caller]
    pub fn insert_multi_keys(
        &mut self,
        table: &str,
        keys: &[&str],
        rows: &[Vec<Value>],
    ) -> impl Future<Output = DbResult<Option<Vec<InsertResult>>>> {
        let caller = Location::caller();
        async move {
            let state = self.begin();
            let result = match rows_with_keys(keys, rows) {
                Ok(rows) => self.insert_rows(&state, table, &rows, caller).await,
                Err(err) => Err(err),
            };
            self.finish();
            result
        }
    }

    /// `UPDATE table SET ...` with the accumulated conditions.
    ///
    /// Returns `true` once the statement ran; [`Db::count`] holds the
    /// number of changed rows.
    #[track_caller]
    pub fn update(
        &mut self,
        table: &str,
        data: Data,
        limit: impl Into<Limit>,
    ) -> impl Future<Output = DbResult<bool>> {
        let caller = Location::caller();
        let limit = limit.into();
        async move {
            let state = self.begin();
            let result = self.update_with(&state, table, &data, limit, caller).await;
            self.finish();
            result
        }
    }

    /// `DELETE FROM table` with the accumulated conditions.
    ///
    /// With joins the statement becomes `DELETE alias FROM table ...`, where
    /// `alias` is the last word of `table` (`"users u"` deletes from `u`).
    #[track_caller]
    pub fn delete(&mut self, table: &str, limit: impl Into<Limit>) -> impl Future<Output = DbResult<bool>> {
        let caller = Location::caller();
        let limit = limit.into();
        async move {
            let state = self.begin();
            let sql = compile::delete(&state, &self.prefix, table, limit);
            let result = self
                .dispatch(sql.sql(), sql.params(), Dispatch::Prepared, caller)
                .await
                .map(|outcome| {
                    self.count = outcome.affected_rows;
                    true
                });
            self.finish();
            result
        }
    }

    async fn insert_with(
        &mut self,
        state: &QueryState,
        verb: InsertVerb,
        table: &str,
        data: &Data,
        caller: Caller,
    ) -> DbResult<InsertResult> {
        let sql = compile::insert(state, &self.prefix, verb, table, data)?;
        let outcome = self
            .dispatch(sql.sql(), sql.params(), Dispatch::Prepared, caller)
            .await?;
        self.count = outcome.affected_rows;
        self.insert_id = outcome.insert_id;

        let result = if outcome.affected_rows < 1 {
            // ON DUPLICATE KEY UPDATE that changed nothing still counts.
            if state.on_duplicate.is_some() {
                InsertResult::Inserted
            } else {
                InsertResult::NotInserted
            }
        } else if outcome.insert_id > 0 {
            InsertResult::Id(outcome.insert_id)
        } else {
            InsertResult::Inserted
        };
        Ok(result)
    }

    async fn insert_rows(
        &mut self,
        state: &QueryState,
        table: &str,
        rows: &[Data],
        caller: Caller,
    ) -> DbResult<Option<Vec<InsertResult>>> {
        let implicit = self.transaction.is_none();
        if implicit {
            self.start_transaction().await?;
        }

        let mut results = Vec::with_capacity(rows.len());
        for (index, data) in rows.iter().enumerate() {
            let failure = match self
                .insert_with(state, InsertVerb::Insert, table, data, caller)
                .await
            {
                Ok(InsertResult::NotInserted) => None,
                Ok(result) => {
                    results.push(result);
                    continue;
                }
                Err(err) if err.is_query_execution() => None,
                Err(err) => Some(err),
            };

            tracing::warn!(target: "myqb", table, row = index, "multi-row insert failed");
            // A lost connection has already ended the transaction.
            if implicit
                && self.in_transaction()
                && let Err(rollback_err) = self.rollback().await
            {
                let message = match failure {
                    Some(err) => format!("{err} (rollback failed: {rollback_err})"),
                    None => format!("row {index} was not inserted (rollback failed: {rollback_err})"),
                };
                return Err(DbError::Other(message));
            }
            return match failure {
                Some(err) => Err(err),
                None => Ok(None),
            };
        }

        if implicit {
            self.commit().await?;
        }
        Ok(Some(results))
    }

    async fn update_with(
        &mut self,
        state: &QueryState,
        table: &str,
        data: &Data,
        limit: Limit,
        caller: Caller,
    ) -> DbResult<bool> {
        let sql = compile::update(state, &self.prefix, table, data, limit)?;
        let outcome = self
            .dispatch(sql.sql(), sql.params(), Dispatch::Prepared, caller)
            .await?;
        self.count = outcome.affected_rows;
        Ok(true)
    }
}

/// Pair each value row with `keys`; every row must have one value per key.
fn rows_with_keys(keys: &[&str], rows: &[Vec<Value>]) -> DbResult<Vec<Data>> {
    rows.iter()
        .enumerate()
        .map(|(index, values)| {
            if values.len() != keys.len() {
                return Err(DbError::validation(format!(
                    "row {index} has {} values for {} keys",
                    values.len(),
                    keys.len()
                )));
            }
            Ok(keys.iter().copied().zip(values.iter().cloned()).collect())
        })
        .collect()
}
