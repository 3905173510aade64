//! Read-only catalog introspection.
//!
//! The [`Introspect`] trait is the seam between the reconciler and the live
//! catalog. The Postgres implementation only ever issues `SELECT`s against
//! `information_schema` and `pg_indexes`, scoped to `current_schema()`.
//! Nothing here is cached: callers fetch fresh state for every pass.

use crate::Result;
use crate::traced::{Connection, ConnectionExt};
use std::collections::BTreeSet;
use std::future::Future;

/// Read access to the live catalog.
pub trait Introspect: Sync {
    /// Whether `table` exists in the current schema.
    fn table_exists(&self, table: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Column names of `table`; empty if the table does not exist.
    fn existing_columns(&self, table: &str) -> impl Future<Output = Result<BTreeSet<String>>> + Send;

    /// Index names on `table`; empty if the table does not exist.
    fn existing_indexes(&self, table: &str) -> impl Future<Output = Result<BTreeSet<String>>> + Send;

    /// The table a relation called `name` belongs to: the indexed table for
    /// an index, the relation itself for anything else. `None` if no
    /// relation in the current schema has that name.
    ///
    /// Index names share one namespace per schema, so `CREATE INDEX IF NOT
    /// EXISTS` silently skips a name that is taken anywhere in it.
    fn relation_owner(&self, name: &str) -> impl Future<Output = Result<Option<String>>> + Send;
}

/// The live state of one table, fetched for a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveTable {
    pub exists: bool,
    pub columns: BTreeSet<String>,
    pub indexes: BTreeSet<String>,
}

impl LiveTable {
    /// Fetch the live state of `table`.
    pub async fn fetch<I: Introspect>(catalog: &I, table: &str) -> Result<Self> {
        if !catalog.table_exists(table).await? {
            return Ok(Self::default());
        }
        Ok(Self {
            exists: true,
            columns: catalog.existing_columns(table).await?,
            indexes: catalog.existing_indexes(table).await?,
        })
    }
}

const TABLE_EXISTS_SQL: &str = "SELECT EXISTS (\
     SELECT 1 FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_name = $1)";

const COLUMNS_SQL: &str = "SELECT column_name::text \
     FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1";

const INDEXES_SQL: &str = "SELECT indexname::text \
     FROM pg_indexes \
     WHERE schemaname = current_schema() AND tablename = $1";

const RELATION_OWNER_SQL: &str = "SELECT coalesce(i.tablename, c.relname)::text \
     FROM pg_class c \
     JOIN pg_namespace n ON n.oid = c.relnamespace \
     LEFT JOIN pg_indexes i ON i.schemaname = n.nspname AND i.indexname = c.relname \
     WHERE n.nspname = current_schema() AND c.relname = $1";

const FINGERPRINT_COLUMNS_SQL: &str = "SELECT table_name::text, column_name::text, data_type::text, \
     is_nullable::text, coalesce(column_default, '')::text \
     FROM information_schema.columns \
     WHERE table_schema = current_schema() \
     ORDER BY table_name, column_name";

const FINGERPRINT_INDEXES_SQL: &str = "SELECT tablename::text, indexname::text, indexdef::text \
     FROM pg_indexes \
     WHERE schemaname = current_schema() \
     ORDER BY tablename, indexname";

/// Postgres implementation of [`Introspect`].
pub struct PgIntrospector<'a, C: Connection> {
    conn: &'a C,
}

impl<'a, C: Connection> PgIntrospector<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// A blake3 digest of every column and index definition in the current
    /// schema. Two equal fingerprints mean the catalog did not change.
    pub async fn fingerprint(&self) -> Result<String> {
        let conn = self.conn.traced();
        let mut hasher = blake3::Hasher::new();
        for row in conn.query(FINGERPRINT_COLUMNS_SQL, &[]).await? {
            for i in 0..5 {
                let field: String = row.try_get(i)?;
                hasher.update(field.as_bytes());
                hasher.update(b"\0");
            }
            hasher.update(b"\n");
        }
        for row in conn.query(FINGERPRINT_INDEXES_SQL, &[]).await? {
            for i in 0..3 {
                let field: String = row.try_get(i)?;
                hasher.update(field.as_bytes());
                hasher.update(b"\0");
            }
            hasher.update(b"\n");
        }
        Ok(hasher.finalize().to_hex().to_string())
    }

    async fn names(&self, sql: &str, table: &str) -> Result<BTreeSet<String>> {
        let rows = self.conn.traced().query(sql, &[&table]).await?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(Into::into))
            .collect()
    }
}

impl<C: Connection> Introspect for PgIntrospector<'_, C> {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let row = self
            .conn
            .traced()
            .query_one(TABLE_EXISTS_SQL, &[&table])
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn existing_columns(&self, table: &str) -> Result<BTreeSet<String>> {
        self.names(COLUMNS_SQL, table).await
    }

    async fn existing_indexes(&self, table: &str) -> Result<BTreeSet<String>> {
        self.names(INDEXES_SQL, table).await
    }

    async fn relation_owner(&self, name: &str) -> Result<Option<String>> {
        // relation names are unique per schema
        let rows = self
            .conn
            .traced()
            .query(RELATION_OWNER_SQL, &[&name])
            .await?;
        Ok(rows.first().map(|row| row.try_get(0)).transpose()?)
    }
}
