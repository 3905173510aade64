//! Sessions that may issue DDL.
//!
//! This is the capability the migrator needs on top of read-only
//! introspection. It only exists in this crate.

use std::future::Future;
use std::time::Duration;
use vestnik_db_schema::Change;
use vestnik_schema::{Connection, ConnectionExt, Introspect, PgIntrospector, Result};

/// A catalog session that can run transactions, DDL and advisory locks.
pub trait DdlSession: Introspect {
    /// Open a transaction for one table's changes.
    fn begin(&self) -> impl Future<Output = Result<()>> + Send;

    /// Issue one change inside the open transaction.
    fn apply(&self, change: &Change) -> impl Future<Output = Result<()>> + Send;

    fn commit(&self) -> impl Future<Output = Result<()>> + Send;

    fn rollback(&self) -> impl Future<Output = Result<()>> + Send;

    /// Try to take the session-level advisory lock `key` without waiting.
    fn try_lock(&self, key: i64) -> impl Future<Output = Result<bool>> + Send;

    /// Release the advisory lock `key`. False if it was not held.
    fn unlock(&self, key: i64) -> impl Future<Output = Result<bool>> + Send;
}

/// Default bound on how long one DDL statement may wait for table locks.
pub const DEFAULT_DDL_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// [`DdlSession`] over a Postgres connection.
pub struct PgSession<'a, C: Connection> {
    conn: &'a C,
    ddl_lock_timeout: Duration,
}

impl<'a, C: Connection> PgSession<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self {
            conn,
            ddl_lock_timeout: DEFAULT_DDL_LOCK_TIMEOUT,
        }
    }

    /// `ALTER TABLE` needs an exclusive lock; behind a long-running query it
    /// would queue and block every later reader. Fail instead after `timeout`.
    pub fn with_ddl_lock_timeout(mut self, timeout: Duration) -> Self {
        self.ddl_lock_timeout = timeout;
        self
    }

    fn introspector(&self) -> PgIntrospector<'a, C> {
        PgIntrospector::new(self.conn)
    }
}

impl<C: Connection> Introspect for PgSession<'_, C> {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        self.introspector().table_exists(table).await
    }

    async fn existing_columns(&self, table: &str) -> Result<std::collections::BTreeSet<String>> {
        self.introspector().existing_columns(table).await
    }

    async fn existing_indexes(&self, table: &str) -> Result<std::collections::BTreeSet<String>> {
        self.introspector().existing_indexes(table).await
    }

    async fn relation_owner(&self, name: &str) -> Result<Option<String>> {
        self.introspector().relation_owner(name).await
    }
}

impl<C: Connection> DdlSession for PgSession<'_, C> {
    async fn begin(&self) -> Result<()> {
        let sql = format!(
            "BEGIN; SET LOCAL lock_timeout = '{}ms'",
            self.ddl_lock_timeout.as_millis()
        );
        Ok(self.conn.traced().batch_execute(&sql).await?)
    }

    async fn apply(&self, change: &Change) -> Result<()> {
        let sql = change.to_sql();
        Ok(self.conn.traced().batch_execute(&sql).await?)
    }

    async fn commit(&self) -> Result<()> {
        Ok(self.conn.traced().batch_execute("COMMIT").await?)
    }

    async fn rollback(&self) -> Result<()> {
        Ok(self.conn.traced().batch_execute("ROLLBACK").await?)
    }

    async fn try_lock(&self, key: i64) -> Result<bool> {
        let row = self
            .conn
            .traced()
            .query_one("SELECT pg_try_advisory_lock($1)", &[&key])
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn unlock(&self, key: i64) -> Result<bool> {
        let row = self
            .conn
            .traced()
            .query_one("SELECT pg_advisory_unlock($1)", &[&key])
            .await?;
        Ok(row.try_get(0)?)
    }
}

#[cfg(any(test, feature = "memory"))]
mod memory {
    use super::DdlSession;
    use vestnik_db_schema::Change;
    use vestnik_schema::Result;
    use vestnik_schema::memory::MemoryCatalog;

    // Each step yields so concurrent runs interleave like separate connections.
    impl DdlSession for MemoryCatalog {
        async fn begin(&self) -> Result<()> {
            tokio::task::yield_now().await;
            MemoryCatalog::begin(self);
            Ok(())
        }

        async fn apply(&self, change: &Change) -> Result<()> {
            tokio::task::yield_now().await;
            MemoryCatalog::apply(self, change)
        }

        async fn commit(&self) -> Result<()> {
            MemoryCatalog::commit(self)
        }

        async fn rollback(&self) -> Result<()> {
            MemoryCatalog::rollback(self);
            Ok(())
        }

        async fn try_lock(&self, key: i64) -> Result<bool> {
            Ok(self.try_advisory_lock(key))
        }

        async fn unlock(&self, key: i64) -> Result<bool> {
            Ok(self.advisory_unlock(key))
        }
    }
}
