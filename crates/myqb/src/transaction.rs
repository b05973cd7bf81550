//! Transactions: explicit start/commit/rollback, a scoped guard and the
//! [`transaction!`] macro.
//!
//! A transaction belongs to the connection that was active when it started;
//! until it ends, statements keep running on that connection.
//!
//! # Example
//!
//! ```no_run
//! use myqb::{Data, Db, DbResult};
//!
//! # async fn demo<C: myqb::Connector>(db: &mut Db<C>) -> DbResult<()> {
//! myqb::transaction!(db, tx, {
//!     tx.insert("orders", Data::new().set("total", 10)).await?;
//!     tx.insert("order_items", Data::new().set("sku", "A-1")).await?;
//!     Ok(())
//! })?;
//! # Ok(()) }
//! ```

use crate::client::{Connection, Connector};
use crate::db::Db;
use crate::error::{DbError, DbResult};
use std::ops::{Deref, DerefMut};

/// Runs the given block inside a transaction on `$db`.
///
/// - Starts a transaction via `Db::transaction()`.
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`.
///
/// The block must evaluate to `myqb::DbResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($db:expr, $tx:ident, $body:block) => {{
        let mut $tx = ($db).transaction().await?;

        let __myqb_tx_body_result: $crate::DbResult<_> = async { $body }.await;
        match __myqb_tx_body_result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(error) => match $tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::DbError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}

impl<C: Connector> Db<C> {
    /// Turn off autocommit on the active connection. Starting again while a
    /// transaction is open keeps the same transaction.
    pub async fn start_transaction(&mut self) -> DbResult<()> {
        self.rollback_abandoned().await?;
        let name = self.active_connection().to_string();
        let conn = self.registry_mut().resolve(&name).await?;
        conn.set_autocommit(false)
            .await
            .map_err(|e| DbError::from_driver(e, "SET autocommit=0"))?;
        tracing::debug!(target: "myqb", connection = %name, "transaction started");
        self.transaction = Some(name);
        Ok(())
    }

    /// Commit and restore autocommit. The transaction is over even if the
    /// commit fails.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.rollback_abandoned().await?;
        let name = self.end_transaction();
        let conn = self.registry_mut().resolve(&name).await?;
        let committed = conn.commit().await;
        let restored = conn.set_autocommit(true).await;
        tracing::debug!(target: "myqb", connection = %name, ok = committed.is_ok(), "transaction committed");
        committed
            .and(restored)
            .map_err(|e| DbError::from_driver(e, "COMMIT"))
    }

    /// Roll back and restore autocommit. The transaction is over even if
    /// the rollback fails.
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.rollback_abandoned().await?;
        let name = self.end_transaction();
        let conn = self.registry_mut().resolve(&name).await?;
        let rolled_back = conn.rollback().await;
        let restored = conn.set_autocommit(true).await;
        tracing::debug!(target: "myqb", connection = %name, ok = rolled_back.is_ok(), "transaction rolled back");
        rolled_back
            .and(restored)
            .map_err(|e| DbError::from_driver(e, "ROLLBACK"))
    }

    /// Start a transaction and return a guard for it.
    ///
    /// Dropping the guard without calling [`Transaction::commit`] or
    /// [`Transaction::rollback`] rolls the transaction back before the next
    /// statement runs.
    pub async fn transaction(&mut self) -> DbResult<Transaction<'_, C>> {
        self.start_transaction().await?;
        Ok(Transaction { db: self })
    }

    /// Connection of the transaction being ended (the active one if none is open).
    fn end_transaction(&mut self) -> String {
        self.transaction
            .take()
            .unwrap_or_else(|| self.active_connection().to_string())
    }

    /// Roll back a transaction whose guard was dropped.
    pub(crate) async fn rollback_abandoned(&mut self) -> DbResult<()> {
        let Some(name) = self.pending_rollback.take() else {
            return Ok(());
        };
        if !self.registry().is_connected(&name) {
            return Ok(());
        }
        tracing::warn!(target: "myqb", connection = %name, "rolling back abandoned transaction");
        let conn = self.registry_mut().resolve(&name).await?;
        let rolled_back = conn.rollback().await;
        let restored = conn.set_autocommit(true).await;
        rolled_back
            .and(restored)
            .map_err(|e| DbError::from_driver(e, "ROLLBACK"))
    }
}

impl<C: Connector> Drop for Db<C> {
    fn drop(&mut self) {
        if let Some(name) = &self.transaction {
            // The connection closes with the builder; the server discards the work.
            tracing::warn!(target: "myqb", connection = %name, "builder dropped with an open transaction");
        }
    }
}

/// An open transaction. Dereferences to the [`Db`] it runs on.
#[must_use = "dropping the guard rolls the transaction back"]
pub struct Transaction<'a, C: Connector> {
    db: &'a mut Db<C>,
}

impl<C: Connector> Transaction<'_, C> {
    pub async fn commit(self) -> DbResult<()> {
        self.db.commit().await
    }

    pub async fn rollback(self) -> DbResult<()> {
        self.db.rollback().await
    }
}

impl<C: Connector> Deref for Transaction<'_, C> {
    type Target = Db<C>;

    fn deref(&self) -> &Db<C> {
        &*self.db
    }
}

impl<C: Connector> DerefMut for Transaction<'_, C> {
    fn deref_mut(&mut self) -> &mut Db<C> {
        &mut *self.db
    }
}

impl<C: Connector> Drop for Transaction<'_, C> {
    fn drop(&mut self) {
        if let Some(name) = self.db.transaction.take() {
            tracing::warn!(target: "myqb", connection = %name, "transaction dropped without commit, rolling back");
            self.db.pending_rollback = Some(name);
        }
    }
}
