//! Per-table planning: what must be issued to bring one table to the model.

use vestnik_db_schema::{Change, TableSpec};
use vestnik_schema::LiveTable;

/// Ordered changes for one table. Every column change precedes every index
/// change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePlan {
    pub table: &'static str,
    pub changes: Vec<Change>,
}

impl TablePlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn creates_table(&self) -> bool {
        self.changes
            .iter()
            .any(|c| matches!(c, Change::CreateTable(_)))
    }

    pub fn added_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.changes.iter().filter_map(|c| match c {
            Change::AddColumn { column, .. } => Some(column.name),
            _ => None,
        })
    }

    pub fn created_indexes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.changes.iter().filter_map(|c| match c {
            Change::CreateIndex(idx) => Some(idx.name),
            _ => None,
        })
    }
}

/// Plan the changes that bring `live` up to `spec`.
///
/// An absent table gets its full base DDL, so no column changes follow.
/// Live columns and indexes the model does not know about are left alone.
pub fn plan_table(spec: &'static TableSpec, live: &LiveTable) -> TablePlan {
    let mut changes = Vec::new();

    if !live.exists {
        changes.push(Change::CreateTable(spec));
    } else {
        for column in spec.columns {
            if !live.columns.contains(column.name) {
                changes.push(Change::AddColumn {
                    table: spec.name,
                    column,
                });
            }
        }
    }

    for index in spec.indexes {
        if !live.exists || !live.indexes.contains(index.name) {
            changes.push(Change::CreateIndex(index));
        }
    }

    TablePlan {
        table: spec.name,
        changes,
    }
}
