//! # myqb
//!
//! A MySQL query builder with parameter tracking, named connection
//! profiles and transactions.
//!
//! ## Features
//!
//! - **Placeholder-safe**: every `?` in a compiled statement is paired with
//!   its bound value, including values carried by subqueries
//! - **Fluent clauses**: `where`, `join`, `order_by`, `group_by`, `having`,
//!   query options and locking through the [`Clauses`] trait
//! - **Driver-agnostic**: the server connection is a [`Connector`] /
//!   [`Connection`] pair implemented by the caller's MySQL client
//! - **Named connections**: profiles connect lazily and reconnect once when
//!   the server has gone away
//! - **Transactions**: explicit start/commit/rollback, a scoped
//!   [`Transaction`] guard and the [`transaction!`] macro
//! - **Tracing**: statements are logged through `tracing` and can be
//!   recorded with timing and caller location
//!
//! ## Building queries
//!
//! ```no_run
//! use myqb::{Clauses, Data, Db, DbResult, Func};
//!
//! # async fn demo<C: myqb::Connector>(db: &mut Db<C>) -> DbResult<()> {
//! // SELECT
//! db.and_where("status", "active")
//!     .order_by("created_at", "DESC")?;
//! let users = db.get("users", 10, "id, login").await?;
//!
//! // INSERT
//! db.insert("users", Data::new().set("login", "alice")).await?;
//!
//! // UPDATE
//! db.and_where("id", 1);
//! db.update("users", Data::new().set("visits", Func::inc(1)), None::<u64>).await?;
//!
//! // DELETE
//! db.and_where("id", 1);
//! db.delete("users", 1).await?;
//! # Ok(()) }
//! ```

pub mod builder;
pub mod bulk;
pub mod client;
pub mod condition;
pub mod config;
pub mod data;
pub mod db;
pub mod error;
pub mod registry;
pub mod row;
pub mod sql;
pub mod state;
pub mod trace;
pub mod transaction;
pub mod value;

#[cfg(test)]
mod testing;

pub use builder::{Clauses, CustomOrder, SubQuery, SubqueryHandle};
pub use bulk::{LoadDataOptions, LoadXmlOptions};
pub use client::{ColumnMeta, ColumnType, Connection, Connector, Outcome, RowCursor};
pub use condition::{Condition, Connective, Op, Operand, Predicate};
pub use config::{ConnectionProfile, DbConfig};
pub use data::{Data, DataValue, Func, interval};
pub use db::{Db, InsertResult};
pub use error::{DbError, DbResult, DriverError};
pub use registry::ConnectionRegistry;
pub use row::{Fetched, KeyedRows, Mapped, Materializer, QueryValue, Row};
pub use sql::{SqlBuf, escape_string, interpolate};
pub use state::{
    Direction, DuplicateColumn, Join, JoinTable, JoinType, Limit, LockMethod, OnDuplicate,
    OrderBy, QueryOption, QueryState,
};
pub use trace::{QueryType, TraceEntry, TraceLog};
pub use transaction::Transaction;
pub use value::{ParamType, Params, Value};
