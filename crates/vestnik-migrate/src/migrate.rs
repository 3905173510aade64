//! The migrator: reconcile the live catalog with the schema model.
//!
//! Tables are processed one at a time in model order. For each table the
//! live state is fetched fresh, a [`TablePlan`] is computed, and a non-empty
//! plan runs inside its own transaction. The first failure rolls back that
//! table and ends the run; tables committed before it stay committed, which
//! is safe because every plan is recomputed from the catalog on the next run.

use crate::error::MigrateError;
use crate::lock::{CoordinationLock, DEFAULT_LOCK_TIMEOUT, INIT_LOCK_NAME};
use crate::plan::{TablePlan, plan_table};
use crate::session::DdlSession;
use std::time::Duration;
use vestnik_db_schema::TableSpec;
use vestnik_schema::{LiveTable, SchemaModel};

#[derive(Debug, Clone, Copy)]
pub struct MigrateOptions {
    /// How long to wait for a concurrent `init` before giving up.
    pub lock_timeout: Duration,
    pub lock_name: &'static str,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_name: INIT_LOCK_NAME,
        }
    }
}

/// What `init` did to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOutcome {
    pub table: &'static str,
    pub created: bool,
    pub added_columns: Vec<&'static str>,
    pub created_indexes: Vec<&'static str>,
    pub statements: usize,
}

impl TableOutcome {
    fn from_plan(plan: &TablePlan) -> Self {
        Self {
            table: plan.table,
            created: plan.creates_table(),
            added_columns: plan.added_columns().collect(),
            created_indexes: plan.created_indexes().collect(),
            statements: plan.changes.len(),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.statements == 0
    }
}

/// Result of a successful `init` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub model_version: u32,
    pub tables: Vec<TableOutcome>,
}

impl InitReport {
    /// Number of DDL statements issued.
    pub fn statement_count(&self) -> usize {
        self.tables.iter().map(|t| t.statements).sum()
    }

    pub fn is_noop(&self) -> bool {
        self.statement_count() == 0
    }

    pub fn changed(&self) -> impl Iterator<Item = &TableOutcome> {
        self.tables.iter().filter(|t| !t.is_unchanged())
    }
}

/// Brings a database up to a [`SchemaModel`] with additive DDL only.
pub struct Migrator<'a, S: DdlSession> {
    model: &'a SchemaModel,
    session: &'a S,
    options: MigrateOptions,
}

impl<'a, S: DdlSession> Migrator<'a, S> {
    pub fn new(model: &'a SchemaModel, session: &'a S, options: MigrateOptions) -> Self {
        Self {
            model,
            session,
            options,
        }
    }

    /// Compute every table's plan without taking the lock or issuing DDL.
    pub async fn plan(&self) -> Result<Vec<TablePlan>, MigrateError> {
        let mut plans = Vec::new();
        for spec in self.model.tables() {
            plans.push(self.plan_for(spec).await?);
        }
        Ok(plans)
    }

    /// Plan one table against fresh catalog state.
    ///
    /// A missing index whose name already belongs to another relation would
    /// be skipped by `CREATE INDEX IF NOT EXISTS` on every run, so it fails
    /// the plan instead.
    async fn plan_for(&self, spec: &'static TableSpec) -> Result<TablePlan, MigrateError> {
        let live = LiveTable::fetch(self.session, spec.name).await?;
        let plan = plan_table(spec, &live);
        for index in plan.created_indexes() {
            if let Some(owner) = self.session.relation_owner(index).await? {
                if owner != spec.name {
                    return Err(MigrateError::IndexNameTaken {
                        table: spec.name,
                        index,
                        owner,
                    });
                }
            }
        }
        Ok(plan)
    }

    /// Run the migration under the coordination lock.
    pub async fn init(&self) -> Result<InitReport, MigrateError> {
        let lock = CoordinationLock::new(self.options.lock_name);
        lock.acquire(self.session, self.options.lock_timeout).await?;

        let result = self.run().await;

        if let Err(e) = lock.release(self.session).await {
            tracing::warn!(lock = lock.name(), error = %e, "failed to release coordination lock");
        }
        result
    }

    async fn run(&self) -> Result<InitReport, MigrateError> {
        let mut tables = Vec::new();
        for spec in self.model.tables() {
            let plan = self.plan_for(spec).await?;
            if !plan.is_empty() {
                self.apply(&plan).await?;
            }
            let outcome = TableOutcome::from_plan(&plan);
            if outcome.is_unchanged() {
                tracing::debug!(table = spec.name, "table up to date");
            } else {
                tracing::info!(
                    table = spec.name,
                    created = outcome.created,
                    columns = ?outcome.added_columns,
                    indexes = ?outcome.created_indexes,
                    "migrated table"
                );
            }
            tables.push(outcome);
        }
        Ok(InitReport {
            model_version: self.model.version(),
            tables,
        })
    }

    async fn apply(&self, plan: &TablePlan) -> Result<(), MigrateError> {
        self.session.begin().await?;
        for change in &plan.changes {
            tracing::debug!(table = plan.table, %change, "applying");
            if let Err(source) = self.session.apply(change).await {
                tracing::error!(table = plan.table, %change, error = %source, "DDL failed, rolling back table");
                if let Err(e) = self.session.rollback().await {
                    tracing::warn!(table = plan.table, error = %e, "rollback failed");
                }
                return Err(MigrateError::MigrationFailed {
                    table: plan.table,
                    object: change.object(),
                    source,
                });
            }
        }
        self.session
            .commit()
            .await
            .map_err(|source| MigrateError::MigrationFailed {
                table: plan.table,
                object: vestnik_db_schema::DdlObject::Commit,
                source,
            })
    }
}
