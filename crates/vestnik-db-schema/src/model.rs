//! The validated schema model.
//!
//! A [`SchemaModel`] is built once from a static slice of [`TableSpec`]s and is
//! immutable afterwards. Construction checks the invariants the migrator and
//! checker rely on, most importantly that every index only references columns
//! declared on its own table, which is what lets the migrator ensure columns
//! before creating indexes.

use crate::{ColumnSpec, IndexSpec, TableSpec, is_safe_ident};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised while building or querying a [`SchemaModel`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("table '{0}' is not part of the schema model")]
    UnknownTable(String),

    #[error("column '{table}.{column}' is not part of the schema model")]
    UnknownColumn { table: String, column: String },

    #[error("table '{0}' is declared more than once")]
    DuplicateTable(String),

    #[error("column '{table}.{column}' is declared more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("index '{0}' is declared more than once")]
    DuplicateIndex(String),

    #[error("table '{0}' declares no columns")]
    EmptyTable(String),

    #[error("index '{0}' has no columns")]
    EmptyIndex(String),

    #[error("index '{index}' is declared on table '{declared_on}' but targets '{table}'")]
    IndexTableMismatch {
        index: String,
        declared_on: String,
        table: String,
    },

    #[error("index '{index}' references column '{table}.{column}' which the model does not declare")]
    UnknownIndexColumn {
        index: String,
        table: String,
        column: String,
    },

    #[error("unsafe identifier: {0:?}")]
    UnsafeIdentifier(String),
}

/// Declarative, versioned registry of expected tables, columns and indexes.
#[derive(Debug, Clone)]
pub struct SchemaModel {
    version: u32,
    tables: IndexMap<&'static str, &'static TableSpec>,
}

impl SchemaModel {
    /// Build and validate a model. Tables keep their declaration order.
    pub fn new(version: u32, tables: &'static [TableSpec]) -> Result<Self, ModelError> {
        let mut by_name = IndexMap::with_capacity(tables.len());
        let mut index_names: HashSet<&str> = HashSet::new();

        for table in tables {
            validate_table(table, &mut index_names)?;
            if by_name.insert(table.name, table).is_some() {
                return Err(ModelError::DuplicateTable(table.name.to_string()));
            }
        }

        Ok(Self {
            version,
            tables: by_name,
        })
    }

    /// Model version, bumped whenever an entry is appended.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Tables in declaration order.
    pub fn tables(&self) -> impl Iterator<Item = &'static TableSpec> + '_ {
        self.tables.values().copied()
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Result<&'static TableSpec, ModelError> {
        self.tables
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::UnknownTable(name.to_string()))
    }

    /// Column names the table must have, in declaration order.
    pub fn required_columns(&self, table: &str) -> Result<IndexSet<&'static str>, ModelError> {
        Ok(self.table(table)?.columns.iter().map(|c| c.name).collect())
    }

    /// Indexes the table must have, in declaration order.
    pub fn required_indexes(&self, table: &str) -> Result<&'static [IndexSpec], ModelError> {
        Ok(self.table(table)?.indexes)
    }

    /// The additive DDL that adds `column` to `table`.
    pub fn ddl_for_column(&self, table: &str, column: &str) -> Result<String, ModelError> {
        let spec = self.column(table, column)?;
        Ok(spec.add_column_sql(table))
    }

    /// The base creation DDL for `table`.
    pub fn ddl_for_table(&self, table: &str) -> Result<String, ModelError> {
        Ok(self.table(table)?.create_table_sql())
    }

    fn column(&self, table: &str, column: &str) -> Result<&'static ColumnSpec, ModelError> {
        self.table(table)?
            .column(column)
            .ok_or_else(|| ModelError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    /// One line per modeled object: `table.column` and `index:name`.
    ///
    /// The model may only ever grow, so a manifest recorded at any earlier
    /// version must remain a subset of the current one.
    pub fn manifest(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for table in self.tables() {
            for col in table.columns {
                lines.push(format!("{}.{}", table.name, col.name));
            }
            for idx in table.indexes {
                lines.push(format!("index:{}", idx.name));
            }
        }
        lines
    }
}

fn validate_table<'a>(
    table: &'a TableSpec,
    index_names: &mut HashSet<&'a str>,
) -> Result<(), ModelError> {
    check_ident(table.name)?;
    if table.columns.is_empty() {
        return Err(ModelError::EmptyTable(table.name.to_string()));
    }

    let mut columns: HashSet<&str> = HashSet::new();
    for col in table.columns {
        check_ident(col.name)?;
        if !columns.insert(col.name) {
            return Err(ModelError::DuplicateColumn {
                table: table.name.to_string(),
                column: col.name.to_string(),
            });
        }
    }

    for idx in table.indexes {
        check_ident(idx.name)?;
        if idx.table != table.name {
            return Err(ModelError::IndexTableMismatch {
                index: idx.name.to_string(),
                declared_on: table.name.to_string(),
                table: idx.table.to_string(),
            });
        }
        if idx.columns.is_empty() {
            return Err(ModelError::EmptyIndex(idx.name.to_string()));
        }
        for col in idx.column_names() {
            if !columns.contains(col) {
                return Err(ModelError::UnknownIndexColumn {
                    index: idx.name.to_string(),
                    table: table.name.to_string(),
                    column: col.to_string(),
                });
            }
        }
        if !index_names.insert(idx.name) {
            return Err(ModelError::DuplicateIndex(idx.name.to_string()));
        }
    }

    Ok(())
}

fn check_ident(name: &str) -> Result<(), ModelError> {
    if is_safe_ident(name) {
        Ok(())
    } else {
        Err(ModelError::UnsafeIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexColumn::Asc;
    use crate::SqlType;

    const SUB_COLUMNS: &[ColumnSpec] = &[
        ColumnSpec::new("id", SqlType::Serial).primary_key(),
        ColumnSpec::new("user_id", SqlType::Integer).not_null(),
        ColumnSpec::new("ends_at", SqlType::Timestamptz),
    ];
    const SUB_INDEXES: &[IndexSpec] = &[
        IndexSpec::new("ix_subscriptions_user_id", "subscriptions", &[Asc("user_id")]),
        IndexSpec::new("ix_subscriptions_ends_at", "subscriptions", &[Asc("ends_at")]),
    ];
    static TABLES: &[TableSpec] = &[TableSpec::new("subscriptions", SUB_COLUMNS, SUB_INDEXES)];

    #[test]
    fn test_contract_queries() {
        let model = SchemaModel::new(3, TABLES).unwrap();
        assert_eq!(model.version(), 3);

        let cols: Vec<_> = model
            .required_columns("subscriptions")
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(cols, vec!["id", "user_id", "ends_at"]);
        assert_eq!(model.required_indexes("subscriptions").unwrap().len(), 2);
        assert_eq!(
            model.ddl_for_column("subscriptions", "ends_at").unwrap(),
            "ALTER TABLE \"subscriptions\" ADD COLUMN IF NOT EXISTS \"ends_at\" TIMESTAMPTZ;"
        );
        assert!(
            model
                .ddl_for_table("subscriptions")
                .unwrap()
                .starts_with("CREATE TABLE IF NOT EXISTS \"subscriptions\" (")
        );
    }

    #[test]
    fn test_unknown_lookups() {
        let model = SchemaModel::new(1, TABLES).unwrap();
        assert_eq!(
            model.required_columns("nope").unwrap_err(),
            ModelError::UnknownTable("nope".to_string())
        );
        assert!(matches!(
            model.ddl_for_column("subscriptions", "nope"),
            Err(ModelError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_manifest() {
        let model = SchemaModel::new(1, TABLES).unwrap();
        assert_eq!(
            model.manifest(),
            vec![
                "subscriptions.id",
                "subscriptions.user_id",
                "subscriptions.ends_at",
                "index:ix_subscriptions_user_id",
                "index:ix_subscriptions_ends_at",
            ]
        );
    }

    #[test]
    fn test_rejects_index_on_undeclared_column() {
        const COLS: &[ColumnSpec] = &[ColumnSpec::new("id", SqlType::Serial).primary_key()];
        const IDX: &[IndexSpec] = &[IndexSpec::new("ix_t_missing", "t", &[Asc("missing")])];
        static BAD: &[TableSpec] = &[TableSpec::new("t", COLS, IDX)];
        assert_eq!(
            SchemaModel::new(1, BAD).unwrap_err(),
            ModelError::UnknownIndexColumn {
                index: "ix_t_missing".to_string(),
                table: "t".to_string(),
                column: "missing".to_string(),
            }
        );
    }

    #[test]
    fn test_rejects_index_declared_on_other_table() {
        const COLS: &[ColumnSpec] = &[ColumnSpec::new("id", SqlType::Serial).primary_key()];
        const IDX: &[IndexSpec] = &[IndexSpec::new("ix_other_id", "other", &[Asc("id")])];
        static BAD: &[TableSpec] = &[TableSpec::new("t", COLS, IDX)];
        assert!(matches!(
            SchemaModel::new(1, BAD),
            Err(ModelError::IndexTableMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicates() {
        const COLS: &[ColumnSpec] = &[ColumnSpec::new("id", SqlType::Serial).primary_key()];
        static TWICE: &[TableSpec] = &[
            TableSpec::new("t", COLS, &[]),
            TableSpec::new("t", COLS, &[]),
        ];
        assert_eq!(
            SchemaModel::new(1, TWICE).unwrap_err(),
            ModelError::DuplicateTable("t".to_string())
        );

        const IDX_A: &[IndexSpec] = &[IndexSpec::new("ix_id", "a", &[Asc("id")])];
        const IDX_B: &[IndexSpec] = &[IndexSpec::new("ix_id", "b", &[Asc("id")])];
        static SHARED_INDEX: &[TableSpec] = &[
            TableSpec::new("a", COLS, IDX_A),
            TableSpec::new("b", COLS, IDX_B),
        ];
        assert_eq!(
            SchemaModel::new(1, SHARED_INDEX).unwrap_err(),
            ModelError::DuplicateIndex("ix_id".to_string())
        );

        const DUP_COLS: &[ColumnSpec] = &[
            ColumnSpec::new("id", SqlType::Serial).primary_key(),
            ColumnSpec::new("id", SqlType::Integer),
        ];
        static DUP: &[TableSpec] = &[TableSpec::new("t", DUP_COLS, &[])];
        assert!(matches!(
            SchemaModel::new(1, DUP),
            Err(ModelError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        const COLS: &[ColumnSpec] = &[ColumnSpec::new("id", SqlType::Serial).primary_key()];
        static BAD: &[TableSpec] = &[TableSpec::new("users; --", COLS, &[])];
        assert_eq!(
            SchemaModel::new(1, BAD).unwrap_err(),
            ModelError::UnsafeIdentifier("users; --".to_string())
        );
    }
}
