use super::{Caller, Db, Dispatch};
use crate::bulk::{LoadDataOptions, LoadXmlOptions, load_data_sql, load_xml_sql};
use crate::client::{Connection, Connector};
use crate::error::{DbError, DbResult};
use crate::sql::escape_string;
use crate::value::Params;
use std::future::Future;
use std::panic::Location;
use std::path::Path;

impl<C: Connector> Db<C> {
    /// `LOCK TABLES t1 <method>, t2 <method>` with the method chosen by
    /// [`Db::set_lock_method`].
    #[track_caller]
    pub fn lock(&mut self, tables: &[&str]) -> impl Future<Output = DbResult<()>> {
        let caller = Location::caller();
        async move {
            self.begin();
            let result = if tables.is_empty() {
                Err(DbError::validation("no tables to lock"))
            } else {
                let method = self.lock_method.as_sql();
                let list: Vec<String> = tables
                    .iter()
                    .map(|t| format!("{}{t} {method}", self.prefix))
                    .collect();
                let sql = format!("LOCK TABLES {}", list.join(", "));
                self.run_unprepared(&sql, caller).await
            };
            self.finish();
            result
        }
    }

    /// `UNLOCK TABLES`. The server commits an open transaction on unlock,
    /// so the transaction is closed as well.
    #[track_caller]
    pub fn unlock(&mut self) -> impl Future<Output = DbResult<()>> {
        let caller = Location::caller();
        async move {
            self.begin();
            let mut result = self.run_unprepared("UNLOCK TABLES", caller).await;
            if result.is_ok()
                && let Some(name) = self.transaction.take()
            {
                result = match self.registry.resolve(&name).await {
                    Ok(conn) => conn
                        .set_autocommit(true)
                        .await
                        .map_err(|e| DbError::from_driver(e, "SET autocommit=1")),
                    Err(err) => Err(err),
                };
            }
            self.finish();
            result
        }
    }

    /// `LOAD DATA INFILE` a delimited file into `table`.
    #[track_caller]
    pub fn load_data(
        &mut self,
        table: &str,
        path: impl AsRef<Path>,
        options: &LoadDataOptions,
    ) -> impl Future<Output = DbResult<()>> {
        let caller = Location::caller();
        async move {
            self.begin();
            let path = path.as_ref();
            let result = match check_file(path).await {
                Ok(()) => {
                    let table = format!("{}{table}", self.prefix);
                    let sql = load_data_sql(&table, path, options);
                    self.run_unprepared(&sql, caller).await
                }
                Err(err) => Err(err),
            };
            self.finish();
            result
        }
    }

    /// `LOAD XML INFILE` into `table`.
    #[track_caller]
    pub fn load_xml(
        &mut self,
        table: &str,
        path: impl AsRef<Path>,
        options: &LoadXmlOptions,
    ) -> impl Future<Output = DbResult<()>> {
        let caller = Location::caller();
        async move {
            self.begin();
            let path = path.as_ref();
            let result = match check_file(path).await {
                Ok(()) => {
                    let table = format!("{}{table}", self.prefix);
                    let sql = load_xml_sql(&table, path, options);
                    self.run_unprepared(&sql, caller).await
                }
                Err(err) => Err(err),
            };
            self.finish();
            result
        }
    }

    /// Check that the active connection is alive, connecting if needed.
    pub async fn ping(&mut self) -> DbResult<bool> {
        let conn = self.registry.resolve(&self.active).await?;
        match conn.ping().await {
            Ok(()) => Ok(true),
            Err(err) => {
                tracing::warn!(target: "myqb", connection = %self.active, error = %err, "ping failed");
                Ok(false)
            }
        }
    }

    /// Escape `value` for a quoted SQL literal, using the active connection
    /// when it is open.
    pub fn escape(&self, value: &str) -> String {
        match self.registry.live(&self.active) {
            Some(conn) => conn.escape(value),
            None => escape_string(value),
        }
    }

    /// A builder with the same settings and pending clauses but no open
    /// connections; it connects again on first use.
    pub fn copy(&self) -> Self
    where
        C: Clone,
    {
        Self {
            registry: self.registry.detached(),
            prefix: self.prefix.clone(),
            page_limit: self.page_limit,
            auto_reconnect: self.auto_reconnect,
            default_connection: self.default_connection.clone(),
            active: self.active.clone(),
            state: self.state.clone(),
            lock_method: self.lock_method,
            transaction: None,
            pending_rollback: None,
            trace: self.trace.clone(),
            reconnect_count: 0,
            count: self.count,
            total_count: self.total_count,
            total_pages: self.total_pages,
            insert_id: self.insert_id,
            last_query: self.last_query.clone(),
            last_error: self.last_error.clone(),
            last_errno: self.last_errno,
        }
    }

    async fn run_unprepared(&mut self, sql: &str, caller: Caller) -> DbResult<()> {
        let outcome = self
            .dispatch(sql, &Params::new(), Dispatch::Unprepared, caller)
            .await?;
        self.count = outcome.affected_rows;
        Ok(())
    }
}

async fn check_file(path: &Path) -> DbResult<()> {
    if tokio::fs::try_exists(path).await? {
        Ok(())
    } else {
        Err(DbError::FileNotFound(path.to_path_buf()))
    }
}
