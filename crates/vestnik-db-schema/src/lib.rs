//! Declarative schema types for vestnik.
//!
//! This crate contains the plain-data description of the tables the vestnik
//! services expect (`TableSpec`, `ColumnSpec`, `IndexSpec`), the validated
//! [`SchemaModel`] built from them, and the rendering of the additive DDL
//! statements that bring a live database in line with the model.
//!
//! Everything here is pure: no I/O, no database handle. The specs are
//! `const`-constructible so an application's model is a `static` slice:
//!
//! ```
//! use vestnik_db_schema::{ColumnSpec, IndexColumn::Asc, IndexSpec, SqlType, TableSpec};
//!
//! const USER_COLUMNS: &[ColumnSpec] = &[
//!     ColumnSpec::new("id", SqlType::Serial).primary_key(),
//!     ColumnSpec::new("tg_id", SqlType::BigInt).not_null(),
//! ];
//! const USER_INDEXES: &[IndexSpec] = &[IndexSpec::new("ux_users_tg_id", "users", &[Asc("tg_id")]).unique()];
//!
//! static TABLES: &[TableSpec] = &[TableSpec::new("users", USER_COLUMNS, USER_INDEXES)];
//! ```
//!
//! Adding a column is appending one `ColumnSpec` entry.

use std::fmt;

mod change;
mod model;
mod sql;

pub use change::{Change, DdlObject};
pub use model::{ModelError, SchemaModel};
pub use sql::{Ident, is_safe_ident, quote_ident};

/// Column types used by the vestnik schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    /// SERIAL (auto-incrementing INTEGER)
    Serial,
    /// INTEGER (4 bytes)
    Integer,
    /// BIGINT (8 bytes)
    BigInt,
    /// NUMERIC (arbitrary precision)
    Numeric,
    /// BOOLEAN
    Boolean,
    /// TEXT
    Text,
    /// VARCHAR, optionally length-limited
    Varchar(Option<u32>),
    /// TIMESTAMPTZ
    Timestamptz,
    /// TIME
    Time,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Serial => write!(f, "SERIAL"),
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::BigInt => write!(f, "BIGINT"),
            SqlType::Numeric => write!(f, "NUMERIC"),
            SqlType::Boolean => write!(f, "BOOLEAN"),
            SqlType::Text => write!(f, "TEXT"),
            SqlType::Varchar(None) => write!(f, "VARCHAR"),
            SqlType::Varchar(Some(len)) => write!(f, "VARCHAR({})", len),
            SqlType::Timestamptz => write!(f, "TIMESTAMPTZ"),
            SqlType::Time => write!(f, "TIME"),
        }
    }
}

/// An expected column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name
    pub name: &'static str,
    /// Declared type
    pub sql_type: SqlType,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Default value expression (if any), rendered verbatim
    pub default: Option<&'static str>,
    /// Whether this is the (single-column) primary key
    pub primary_key: bool,
}

impl ColumnSpec {
    /// A nullable column without default.
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            nullable: true,
            default: None,
            primary_key: false,
        }
    }

    /// Mark the column NOT NULL.
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the default value expression, e.g. `"now()"` or `"'guest'"`.
    pub const fn with_default(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }

    /// Mark the column as the table's primary key (implies NOT NULL).
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// The column definition used inside `CREATE TABLE`.
    pub fn definition(&self) -> String {
        let mut def = format!("{} {}", quote_ident(self.name), self.sql_type);
        if self.primary_key {
            def.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = self.default {
            def.push_str(&format!(" DEFAULT {}", default));
        }
        def
    }

    /// The column definition used by `ALTER TABLE ... ADD COLUMN`.
    ///
    /// NOT NULL is only kept when a default is declared, so the statement
    /// succeeds on a table that already holds rows. PRIMARY KEY is never added
    /// after creation.
    pub fn additive_definition(&self) -> String {
        let mut def = format!("{} {}", quote_ident(self.name), self.sql_type);
        if let Some(default) = self.default {
            if !self.nullable {
                def.push_str(" NOT NULL");
            }
            def.push_str(&format!(" DEFAULT {}", default));
        }
        def
    }

    /// `ALTER TABLE ... ADD COLUMN IF NOT EXISTS ...` for this column.
    pub fn add_column_sql(&self, table: &str) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {};",
            quote_ident(table),
            self.additive_definition()
        )
    }
}

/// A column of an index, with its sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexColumn {
    /// Ascending (the default)
    Asc(&'static str),
    /// Descending
    Desc(&'static str),
}

impl IndexColumn {
    /// The indexed column's name.
    pub fn name(&self) -> &'static str {
        match self {
            IndexColumn::Asc(name) | IndexColumn::Desc(name) => name,
        }
    }

    /// Returns the SQL fragment for this index column (name + order).
    pub fn to_sql(&self) -> String {
        match self {
            IndexColumn::Asc(name) => quote_ident(name),
            IndexColumn::Desc(name) => format!("{} DESC", quote_ident(name)),
        }
    }
}

/// An expected index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name (unique within the database schema)
    pub name: &'static str,
    /// Owning table
    pub table: &'static str,
    /// Indexed columns, in order
    pub columns: &'static [IndexColumn],
    /// Whether this is a unique index
    pub unique: bool,
    /// Optional WHERE clause for partial indexes
    pub predicate: Option<&'static str>,
}

impl IndexSpec {
    /// A plain (non-unique, non-partial) index.
    pub const fn new(
        name: &'static str,
        table: &'static str,
        columns: &'static [IndexColumn],
    ) -> Self {
        Self {
            name,
            table,
            columns,
            unique: false,
            predicate: None,
        }
    }

    /// Make this a unique index.
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Make this a partial index with the given predicate.
    pub const fn partial(mut self, predicate: &'static str) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Names of the columns this index references.
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name())
    }

    /// `CREATE [UNIQUE] INDEX IF NOT EXISTS ...` for this index.
    pub fn create_sql(&self) -> String {
        let unique = if self.unique { "UNIQUE " } else { "" };
        let cols: Vec<String> = self.columns.iter().map(IndexColumn::to_sql).collect();
        let where_clause = self
            .predicate
            .map(|p| format!(" WHERE {}", p))
            .unwrap_or_default();
        format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({}){};",
            unique,
            quote_ident(self.name),
            quote_ident(self.table),
            cols.join(", "),
            where_clause
        )
    }
}

/// An expected table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name
    pub name: &'static str,
    /// Columns, in declaration order
    pub columns: &'static [ColumnSpec],
    /// Indexes, in declaration order
    pub indexes: &'static [IndexSpec],
    /// Table-level constraints rendered into the creation DDL,
    /// e.g. `UNIQUE (channel_ref, message_id)`
    pub constraints: &'static [&'static str],
}

impl TableSpec {
    pub const fn new(
        name: &'static str,
        columns: &'static [ColumnSpec],
        indexes: &'static [IndexSpec],
    ) -> Self {
        Self {
            name,
            columns,
            indexes,
            constraints: &[],
        }
    }

    /// Attach table-level constraints to the creation DDL.
    pub const fn with_constraints(mut self, constraints: &'static [&'static str]) -> Self {
        self.constraints = constraints;
        self
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&'static ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Generate the `CREATE TABLE IF NOT EXISTS` statement.
    ///
    /// Every modeled column is part of the creation DDL, so a freshly created
    /// table needs no follow-up `ADD COLUMN`.
    pub fn create_table_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|col| format!("    {}", col.definition()))
            .collect();
        parts.extend(self.constraints.iter().map(|c| format!("    {}", c)));

        let mut sql = format!("CREATE TABLE IF NOT EXISTS {} (\n", quote_ident(self.name));
        sql.push_str(&parts.join(",\n"));
        sql.push_str("\n);");
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use IndexColumn::{Asc, Desc};

    const COLUMNS: &[ColumnSpec] = &[
        ColumnSpec::new("id", SqlType::Serial).primary_key(),
        ColumnSpec::new("tg_id", SqlType::BigInt).not_null(),
        ColumnSpec::new("username", SqlType::Varchar(None)),
        ColumnSpec::new("role", SqlType::Varchar(Some(32)))
            .not_null()
            .with_default("'guest'"),
        ColumnSpec::new("created_at", SqlType::Timestamptz)
            .not_null()
            .with_default("now()"),
    ];

    const TABLE: TableSpec = TableSpec::new("users", COLUMNS, &[]);

    #[test]
    fn snapshot_create_table() {
        insta::assert_snapshot!(TABLE.create_table_sql(), @r#"
CREATE TABLE IF NOT EXISTS "users" (
    "id" SERIAL PRIMARY KEY,
    "tg_id" BIGINT NOT NULL,
    "username" VARCHAR,
    "role" VARCHAR(32) NOT NULL DEFAULT 'guest',
    "created_at" TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#);
    }

    #[test]
    fn test_create_table_with_constraints() {
        const FACTS: &[ColumnSpec] = &[
            ColumnSpec::new("channel_ref", SqlType::Text).not_null(),
            ColumnSpec::new("message_id", SqlType::Text).not_null(),
        ];
        let table = TableSpec::new("post_facts", FACTS, &[])
            .with_constraints(&["UNIQUE (channel_ref, message_id)"]);
        let sql = table.create_table_sql();
        assert!(sql.ends_with("    UNIQUE (channel_ref, message_id)\n);"), "{sql}");
    }

    #[test]
    fn test_additive_column_sql() {
        // NOT NULL without default would fail on a populated table, so it is dropped
        assert_eq!(
            COLUMNS[1].add_column_sql("users"),
            "ALTER TABLE \"users\" ADD COLUMN IF NOT EXISTS \"tg_id\" BIGINT;"
        );
        assert_eq!(
            COLUMNS[3].add_column_sql("users"),
            "ALTER TABLE \"users\" ADD COLUMN IF NOT EXISTS \"role\" VARCHAR(32) NOT NULL DEFAULT 'guest';"
        );
        // PRIMARY KEY is never added after the fact
        assert_eq!(
            COLUMNS[0].add_column_sql("users"),
            "ALTER TABLE \"users\" ADD COLUMN IF NOT EXISTS \"id\" SERIAL;"
        );
    }

    #[test]
    fn test_create_index_sql() {
        let idx = IndexSpec::new("ux_users_tg_id", "users", &[Asc("tg_id")]).unique();
        insta::assert_snapshot!(
            idx.create_sql(),
            @r#"CREATE UNIQUE INDEX IF NOT EXISTS "ux_users_tg_id" ON "users" ("tg_id");"#
        );

        let idx = IndexSpec::new("ux_channels_tg_channel_id", "channels", &[Asc("tg_channel_id")])
            .unique()
            .partial("tg_channel_id IS NOT NULL");
        assert_eq!(
            idx.create_sql(),
            "CREATE UNIQUE INDEX IF NOT EXISTS \"ux_channels_tg_channel_id\" ON \"channels\" (\"tg_channel_id\") WHERE tg_channel_id IS NOT NULL;"
        );

        let idx = IndexSpec::new("idx_post_facts_updated_at", "post_facts", &[Desc("updated_at")]);
        assert_eq!(
            idx.create_sql(),
            "CREATE INDEX IF NOT EXISTS \"idx_post_facts_updated_at\" ON \"post_facts\" (\"updated_at\" DESC);"
        );
    }

    #[test]
    fn test_sql_type_display() {
        assert_eq!(SqlType::Varchar(None).to_string(), "VARCHAR");
        assert_eq!(SqlType::Varchar(Some(255)).to_string(), "VARCHAR(255)");
        assert_eq!(SqlType::Timestamptz.to_string(), "TIMESTAMPTZ");
    }
}
