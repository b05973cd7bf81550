//! Driver traits: the seam between the query builder and a MySQL client.
//!
//! myqb never speaks the wire protocol itself. A driver implements
//! [`Connector`] (open a connection for a profile), [`Connection`] (run one
//! statement at a time) and [`RowCursor`] (walk the result set).

use crate::config::ConnectionProfile;
use crate::error::DriverError;
use crate::sql::escape_string;
use crate::value::{Params, Value};
use std::future::Future;

/// Column type families reported with result metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnType {
    Integer,
    Float,
    Decimal,
    #[default]
    String,
    /// BLOB / TEXT family (wire type 252)
    Blob,
    Temporal,
    Json,
    Null,
    Other,
}

/// Result column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnMeta {
    pub name: String,
    /// Table the column came from, as reported by the server (may be empty).
    pub table: String,
    pub column_type: ColumnType,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, table: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            column_type,
        }
    }

    /// Long columns need the whole result buffered before fetching.
    pub fn is_long(&self) -> bool {
        self.column_type == ColumnType::Blob
    }
}

/// What a statement produced.
#[derive(Debug)]
pub struct Outcome<R> {
    pub affected_rows: u64,
    pub insert_id: u64,
    /// `None` for statements without a result set.
    pub cursor: Option<R>,
}

impl<R> Outcome<R> {
    /// A statement that produced no rows.
    pub fn done(affected_rows: u64, insert_id: u64) -> Self {
        Self {
            affected_rows,
            insert_id,
            cursor: None,
        }
    }

    /// A statement that produced a result set.
    pub fn rows(cursor: R) -> Self {
        Self {
            affected_rows: 0,
            insert_id: 0,
            cursor: Some(cursor),
        }
    }
}

/// Opens connections for named profiles.
pub trait Connector: Send + Sync {
    type Conn: Connection;

    /// Open a new connection.
    fn connect(
        &self,
        profile: &ConnectionProfile,
    ) -> impl Future<Output = Result<Self::Conn, DriverError>> + Send;
}

/// One open server connection. Statements are strictly sequential.
pub trait Connection: Send {
    type Cursor: RowCursor;

    /// Prepare `sql`, bind `params` to its `?` placeholders in order, execute.
    fn execute(
        &mut self,
        sql: &str,
        params: &Params,
    ) -> impl Future<Output = Result<Outcome<Self::Cursor>, DriverError>> + Send;

    /// Execute `sql` as-is, without preparing it (LOCK, LOAD DATA, ...).
    fn execute_unprepared(
        &mut self,
        sql: &str,
    ) -> impl Future<Output = Result<Outcome<Self::Cursor>, DriverError>> + Send;

    fn set_autocommit(
        &mut self,
        enabled: bool,
    ) -> impl Future<Output = Result<(), DriverError>> + Send;

    fn commit(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;

    fn rollback(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;

    fn ping(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;

    /// Select the connection character set.
    ///
    /// The default implementation issues `SET NAMES <charset>`.
    fn set_charset(
        &mut self,
        charset: &str,
    ) -> impl Future<Output = Result<(), DriverError>> + Send {
        let sql = format!("SET NAMES {charset}");
        async move { self.execute_unprepared(&sql).await.map(|_| ()) }
    }

    /// Escape a string for inclusion inside a quoted SQL literal.
    fn escape(&self, value: &str) -> String {
        escape_string(value)
    }
}

/// Forward-only cursor over a result set.
pub trait RowCursor: Send {
    fn columns(&self) -> &[ColumnMeta];

    /// Buffer the remaining rows client-side. Called before fetching when the
    /// result contains long columns.
    fn store_result(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send {
        async { Ok(()) }
    }

    /// Next row, `None` when exhausted. Values are in column order.
    fn fetch(&mut self) -> impl Future<Output = Result<Option<Vec<Value>>, DriverError>> + Send;
}
