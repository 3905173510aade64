//! Additive schema changes.
//!
//! A [`Change`] is one DDL statement the migrator may issue. There are only
//! three kinds, all additive and all existence-guarded, so replaying a change
//! that has already been applied is a no-op.

use crate::{ColumnSpec, IndexSpec, TableSpec};
use std::fmt;

/// A single additive schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Create a missing table with its base DDL.
    CreateTable(&'static TableSpec),
    /// Add a missing column to an existing table.
    AddColumn {
        table: &'static str,
        column: &'static ColumnSpec,
    },
    /// Create a missing index.
    CreateIndex(&'static IndexSpec),
}

/// The object a change creates, used to report exactly what failed.
///
/// `Commit` stands for the closing `COMMIT` of a table's transaction, which
/// can fail after every change in it succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlObject {
    Table,
    Column(String),
    Index(String),
    Commit,
}

impl fmt::Display for DdlObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DdlObject::Table => write!(f, "table"),
            DdlObject::Column(name) => write!(f, "column {}", name),
            DdlObject::Index(name) => write!(f, "index {}", name),
            DdlObject::Commit => write!(f, "commit"),
        }
    }
}

impl Change {
    /// Generate the SQL statement for this change.
    pub fn to_sql(&self) -> String {
        match self {
            Change::CreateTable(t) => t.create_table_sql(),
            Change::AddColumn { table, column } => column.add_column_sql(table),
            Change::CreateIndex(idx) => idx.create_sql(),
        }
    }

    /// The table this change applies to.
    pub fn table(&self) -> &'static str {
        match self {
            Change::CreateTable(t) => t.name,
            Change::AddColumn { table, .. } => table,
            Change::CreateIndex(idx) => idx.table,
        }
    }

    /// The object this change creates.
    pub fn object(&self) -> DdlObject {
        match self {
            Change::CreateTable(_) => DdlObject::Table,
            Change::AddColumn { column, .. } => DdlObject::Column(column.name.to_string()),
            Change::CreateIndex(idx) => DdlObject::Index(idx.name.to_string()),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::CreateTable(t) => write!(f, "+ table {}", t.name),
            Change::AddColumn { column, .. } => {
                let nullable = if column.nullable { " (nullable)" } else { "" };
                write!(f, "+ {}: {}{}", column.name, column.sql_type, nullable)
            }
            Change::CreateIndex(idx) => {
                let unique = if idx.unique { "UNIQUE " } else { "" };
                let cols: Vec<&str> = idx.column_names().collect();
                write!(f, "+ {}INDEX {} ({})", unique, idx.name, cols.join(", "))
            }
        }
    }
}
