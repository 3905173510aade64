//! Drift checking - compare the schema model against the live catalog.
//!
//! The check is strictly read-only: it only calls [`Introspect`] methods and
//! takes no locks, so it is safe to run at any time, including while an
//! `init` is in flight (it then reports the intermediate state as drift).

use crate::Result;
use crate::introspect::{Introspect, LiveTable, PgIntrospector};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use vestnik_db_schema::{SchemaModel, TableSpec};

/// How far a table has progressed towards the model.
///
/// Transitions are only ever made by `init` and only go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TableState {
    /// The table does not exist.
    Unknown,
    /// The table exists but some required columns are missing.
    ExistsNoRequiredColumns,
    /// All required columns exist but some indexes are missing.
    ExistsColumnsComplete,
    /// Columns and indexes are all present.
    Ready,
}

impl TableState {
    /// Determine the state of `spec` given its live catalog state.
    pub fn of(spec: &TableSpec, live: &LiveTable) -> Self {
        if !live.exists {
            TableState::Unknown
        } else if spec.columns.iter().any(|c| !live.columns.contains(c.name)) {
            TableState::ExistsNoRequiredColumns
        } else if spec.indexes.iter().any(|i| !live.indexes.contains(i.name)) {
            TableState::ExistsColumnsComplete
        } else {
            TableState::Ready
        }
    }
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableState::Unknown => "UNKNOWN",
            TableState::ExistsNoRequiredColumns => "EXISTS_NO_REQUIRED_COLUMNS",
            TableState::ExistsColumnsComplete => "EXISTS_COLUMNS_COMPLETE",
            TableState::Ready => "READY",
        };
        f.write_str(s)
    }
}

/// Missing columns of one table. An absent table lists every required column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftEntry {
    pub table: &'static str,
    pub missing_columns: Vec<&'static str>,
}

/// Aggregated drift, in model order. Empty means no drift.
///
/// Serializes as `{"table": ["column", ...], ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    pub entries: Vec<DriftEntry>,
}

impl DriftReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Missing columns for `table`, if it drifted.
    pub fn missing(&self, table: &str) -> Option<&[&'static str]> {
        self.entries
            .iter()
            .find(|e| e.table == table)
            .map(|e| e.missing_columns.as_slice())
    }
}

impl Serialize for DriftReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(entry.table, &entry.missing_columns)?;
        }
        map.end()
    }
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: [{}]", entry.table, entry.missing_columns.join(", "))?;
        }
        write!(f, "}}")
    }
}

/// Per-table result of a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatus {
    pub table: &'static str,
    pub state: TableState,
    pub missing_columns: Vec<&'static str>,
    pub missing_indexes: Vec<&'static str>,
}

impl TableStatus {
    fn compute(spec: &'static TableSpec, live: &LiveTable) -> Self {
        let missing_columns = spec
            .columns
            .iter()
            .map(|c| c.name)
            .filter(|name| !live.exists || !live.columns.contains(*name))
            .collect();
        let missing_indexes = spec
            .indexes
            .iter()
            .map(|i| i.name)
            .filter(|name| !live.exists || !live.indexes.contains(*name))
            .collect();
        Self {
            table: spec.name,
            state: TableState::of(spec, live),
            missing_columns,
            missing_indexes,
        }
    }
}

/// Result of a check: every modeled table's status, in model order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub model_version: u32,
    pub tables: Vec<TableStatus>,
}

impl CheckReport {
    /// Missing tables and columns. This is what decides the overall result.
    pub fn drift(&self) -> DriftReport {
        DriftReport {
            entries: self
                .tables
                .iter()
                .filter(|t| !t.missing_columns.is_empty())
                .map(|t| DriftEntry {
                    table: t.table,
                    missing_columns: t.missing_columns.clone(),
                })
                .collect(),
        }
    }

    /// True iff no table or column is missing.
    pub fn is_ok(&self) -> bool {
        self.tables.iter().all(|t| t.missing_columns.is_empty())
    }

    /// True iff every table is [`TableState::Ready`], indexes included.
    pub fn is_ready(&self) -> bool {
        self.tables.iter().all(|t| t.state == TableState::Ready)
    }

    /// Tables whose columns are complete but which still miss indexes.
    pub fn index_drift(&self) -> impl Iterator<Item = &TableStatus> {
        self.tables
            .iter()
            .filter(|t| t.missing_columns.is_empty() && !t.missing_indexes.is_empty())
    }
}

/// Compare `model` against the live catalog.
///
/// Errors only if the catalog cannot be read; drift is part of the report.
pub async fn check<I: Introspect>(model: &SchemaModel, catalog: &I) -> Result<CheckReport> {
    let mut tables = Vec::new();
    for spec in model.tables() {
        let live = LiveTable::fetch(catalog, spec.name).await?;
        let status = TableStatus::compute(spec, &live);
        tracing::debug!(table = spec.name, state = %status.state, "checked table");
        tables.push(status);
    }
    Ok(CheckReport {
        model_version: model.version(),
        tables,
    })
}

/// Refuse to proceed unless the schema has no drift.
///
/// Runtime services call this at startup (or from a readiness probe) instead
/// of creating anything themselves.
pub async fn require_ready<I: Introspect>(model: &SchemaModel, catalog: &I) -> Result<CheckReport> {
    let report = check(model, catalog).await?;
    if report.is_ok() {
        Ok(report)
    } else {
        let drift = report.drift();
        tracing::warn!(%drift, "schema is not ready, run `vestnik-schema init`");
        Err(crate::Error::DriftDetected(drift))
    }
}

/// Readiness probe over a connection pool.
pub async fn probe(pool: &deadpool_postgres::Pool, model: &SchemaModel) -> Result<CheckReport> {
    let client = pool.get().await?;
    require_ready(model, &PgIntrospector::new(&client)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCatalog;
    use vestnik_db_schema::IndexColumn::Asc;
    use vestnik_db_schema::{ColumnSpec, IndexSpec, SqlType};

    const SUB_COLUMNS: &[ColumnSpec] = &[
        ColumnSpec::new("id", SqlType::Serial).primary_key(),
        ColumnSpec::new("user_id", SqlType::Integer).not_null(),
        ColumnSpec::new("ends_at", SqlType::Timestamptz),
    ];
    const SUB_INDEXES: &[IndexSpec] = &[IndexSpec::new(
        "ix_subscriptions_ends_at",
        "subscriptions",
        &[Asc("ends_at")],
    )];
    const DEL_COLUMNS: &[ColumnSpec] = &[
        ColumnSpec::new("id", SqlType::Serial).primary_key(),
        ColumnSpec::new("user_id", SqlType::Integer).not_null(),
    ];
    static TABLES: &[TableSpec] = &[
        TableSpec::new("deliveries", DEL_COLUMNS, &[]),
        TableSpec::new("subscriptions", SUB_COLUMNS, SUB_INDEXES),
    ];

    fn model() -> SchemaModel {
        SchemaModel::new(1, TABLES).unwrap()
    }

    #[tokio::test]
    async fn test_missing_column_is_drift() {
        let catalog = MemoryCatalog::new();
        catalog.create_raw_table("deliveries", &["id", "user_id"]);
        catalog.create_raw_table("subscriptions", &["id", "user_id"]);

        let report = check(&model(), &catalog).await.unwrap();
        assert!(!report.is_ok());
        assert_eq!(
            serde_json::to_string(&report.drift()).unwrap(),
            r#"{"subscriptions":["ends_at"]}"#
        );
        assert_eq!(report.tables[0].state, TableState::Ready);
        assert_eq!(report.tables[1].state, TableState::ExistsNoRequiredColumns);
    }

    #[tokio::test]
    async fn test_missing_table_lists_every_column() {
        let catalog = MemoryCatalog::new();
        catalog.create_raw_table("deliveries", &["id", "user_id"]);

        let report = check(&model(), &catalog).await.unwrap();
        let drift = report.drift();
        assert_eq!(
            drift.missing("subscriptions"),
            Some(&["id", "user_id", "ends_at"][..])
        );
        assert_eq!(report.tables[1].state, TableState::Unknown);
        assert_eq!(report.tables[1].missing_indexes, vec!["ix_subscriptions_ends_at"]);
        assert_eq!(drift.to_string(), "{subscriptions: [id, user_id, ends_at]}");
    }

    #[tokio::test]
    async fn test_missing_index_only_is_not_drift() {
        let catalog = MemoryCatalog::new();
        catalog.create_raw_table("deliveries", &["id", "user_id"]);
        catalog.create_raw_table("subscriptions", &["id", "user_id", "ends_at"]);

        let report = check(&model(), &catalog).await.unwrap();
        assert!(report.is_ok());
        assert!(!report.is_ready());
        assert_eq!(report.tables[1].state, TableState::ExistsColumnsComplete);
        let pending: Vec<_> = report.index_drift().map(|t| t.table).collect();
        assert_eq!(pending, vec!["subscriptions"]);
    }

    #[tokio::test]
    async fn test_extra_live_columns_are_ignored() {
        let catalog = MemoryCatalog::new();
        catalog.create_raw_table("deliveries", &["id", "user_id", "legacy_flag"]);
        catalog.create_raw_table("subscriptions", &["id", "user_id", "ends_at", "note"]);
        catalog.create_raw_index("subscriptions", "ix_subscriptions_ends_at");

        let report = check(&model(), &catalog).await.unwrap();
        assert!(report.is_ok());
        assert!(report.is_ready());
        assert!(report.drift().is_empty());
        assert_eq!(serde_json::to_string(&report.drift()).unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_check_is_read_only() {
        let catalog = MemoryCatalog::new();
        catalog.create_raw_table("subscriptions", &["id"]);
        let before = catalog.fingerprint();

        check(&model(), &catalog).await.unwrap();

        assert_eq!(catalog.fingerprint(), before);
        assert!(catalog.statements().is_empty());
    }

    #[tokio::test]
    async fn test_require_ready() {
        let catalog = MemoryCatalog::new();
        catalog.create_raw_table("deliveries", &["id", "user_id"]);

        let err = require_ready(&model(), &catalog).await.unwrap_err();
        match err {
            crate::Error::DriftDetected(drift) => {
                assert_eq!(drift.entries.len(), 1);
                assert_eq!(drift.entries[0].table, "subscriptions");
            }
            other => panic!("expected drift, got {other}"),
        }

        catalog.create_raw_table("subscriptions", &["id", "user_id", "ends_at"]);
        assert!(require_ready(&model(), &catalog).await.is_ok());
    }
}
