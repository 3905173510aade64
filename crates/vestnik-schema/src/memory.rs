//! In-memory catalog for tests.
//!
//! Behaves like a single Postgres schema as far as reconciliation can tell:
//! tables with column and index names, existence-guarded DDL applied
//! structurally, transactions with rollback, and session-level advisory locks
//! shared between all sessions opened with [`MemoryCatalog::connect`].
//!
//! Every DDL and transaction-control statement a session issues is recorded,
//! so tests can assert that a run issued nothing at all.

use crate::Result;
use crate::introspect::Introspect;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use vestnik_db_schema::{Change, DdlObject};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct MemTable {
    columns: BTreeSet<String>,
    indexes: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: BTreeMap<String, MemTable>,
    locks: HashMap<i64, u64>,
    failures: Vec<(String, DdlObject)>,
    statements: Vec<String>,
    next_session: u64,
}

/// One session on a shared in-memory catalog.
#[derive(Debug)]
pub struct MemoryCatalog {
    shared: Arc<Mutex<Shared>>,
    session: u64,
    /// Prior state of each table touched by the open transaction.
    undo: Mutex<Option<Vec<(String, Option<MemTable>)>>>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    /// An empty catalog and a first session on it.
    pub fn new() -> Self {
        Self::with_shared(Arc::new(Mutex::new(Shared::default())))
    }

    fn with_shared(shared: Arc<Mutex<Shared>>) -> Self {
        let session = {
            let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
            state.next_session += 1;
            state.next_session
        };
        Self {
            shared,
            session,
            undo: Mutex::new(None),
        }
    }

    /// Open another session on the same catalog.
    pub fn connect(&self) -> Self {
        Self::with_shared(Arc::clone(&self.shared))
    }

    fn state(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn undo_log(&self) -> MutexGuard<'_, Option<Vec<(String, Option<MemTable>)>>> {
        self.undo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a transaction. Changes applied until [`commit`](Self::commit)
    /// can be undone with [`rollback`](Self::rollback).
    pub fn begin(&self) {
        self.state().statements.push("BEGIN".to_string());
        *self.undo_log() = Some(Vec::new());
    }

    /// Commit the open transaction. An injected [`DdlObject::Commit`]
    /// failure on a table it touched aborts it instead, as Postgres does.
    pub fn commit(&self) -> Result<()> {
        let mut state = self.state();
        state.statements.push("COMMIT".to_string());
        let undo = self.undo_log().take();
        let failed = undo.as_ref().and_then(|undo| {
            undo.iter()
                .map(|(table, _)| table)
                .find(|table| {
                    state
                        .failures
                        .iter()
                        .any(|(t, o)| t == *table && *o == DdlObject::Commit)
                })
                .cloned()
        });
        match failed {
            Some(table) => {
                undo_into(&mut state, undo);
                Err(crate::Error::Rejected(format!(
                    "injected commit failure on {}",
                    table
                )))
            }
            None => Ok(()),
        }
    }

    pub fn rollback(&self) {
        let mut state = self.state();
        state.statements.push("ROLLBACK".to_string());
        let undo = self.undo_log().take();
        undo_into(&mut state, undo);
    }

    /// Apply one change the way Postgres would run its existence-guarded DDL.
    pub fn apply(&self, change: &Change) -> Result<()> {
        let mut state = self.state();
        state.statements.push(change.to_sql());

        let table = change.table();
        let object = change.object();
        if state
            .failures
            .iter()
            .any(|(t, o)| t == table && *o == object)
        {
            return Err(crate::Error::Rejected(format!(
                "injected failure for {} on {}",
                object, table
            )));
        }

        let prior = state.tables.get(table).cloned();
        match change {
            Change::CreateTable(spec) => {
                if prior.is_none() {
                    let mut created = MemTable::default();
                    for col in spec.columns {
                        created.columns.insert(col.name.to_string());
                    }
                    if spec.columns.iter().any(|c| c.primary_key) {
                        created.indexes.insert(format!("{}_pkey", spec.name));
                    }
                    state.tables.insert(table.to_string(), created);
                }
            }
            Change::AddColumn { column, .. } => {
                let live = state
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| missing_relation(table))?;
                live.columns.insert(column.name.to_string());
            }
            Change::CreateIndex(idx) => {
                let live = state
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| missing_relation(table))?;
                if let Some(col) = idx.column_names().find(|c| !live.columns.contains(*c)) {
                    return Err(crate::Error::Rejected(format!(
                        "column \"{}\" does not exist",
                        col
                    )));
                }
                live.indexes.insert(idx.name.to_string());
            }
        }
        drop(state);

        if let Some(undo) = self.undo_log().as_mut() {
            if !undo.iter().any(|(t, _)| t == table) {
                undo.push((table.to_string(), prior));
            }
        }
        Ok(())
    }

    /// Non-blocking session-level advisory lock. Re-entrant for the owner.
    pub fn try_advisory_lock(&self, key: i64) -> bool {
        let mut state = self.state();
        match state.locks.get(&key) {
            Some(owner) => *owner == self.session,
            None => {
                state.locks.insert(key, self.session);
                true
            }
        }
    }

    /// Release an advisory lock. False if this session did not hold it.
    pub fn advisory_unlock(&self, key: i64) -> bool {
        let mut state = self.state();
        if state.locks.get(&key) == Some(&self.session) {
            state.locks.remove(&key);
            true
        } else {
            false
        }
    }

    /// Whether any session holds `key`.
    pub fn is_locked(&self, key: i64) -> bool {
        self.state().locks.contains_key(&key)
    }

    /// Make every future statement creating `object` on `table` fail.
    pub fn fail_on(&self, table: &str, object: DdlObject) {
        self.state().failures.push((table.to_string(), object));
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Statements issued so far, across all sessions.
    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    pub fn clear_statements(&self) {
        self.state().statements.clear();
    }

    /// Digest of the whole catalog.
    pub fn fingerprint(&self) -> String {
        let state = self.state();
        let mut hasher = blake3::Hasher::new();
        for (name, table) in &state.tables {
            hasher.update(name.as_bytes());
            hasher.update(b"\0");
            for col in &table.columns {
                hasher.update(b"c:");
                hasher.update(col.as_bytes());
                hasher.update(b"\0");
            }
            for idx in &table.indexes {
                hasher.update(b"i:");
                hasher.update(idx.as_bytes());
                hasher.update(b"\0");
            }
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Names of all existing tables.
    pub fn table_names(&self) -> Vec<String> {
        self.state().tables.keys().cloned().collect()
    }

    // Fixture helpers: change the catalog behind the migrator's back, the
    // way an operator or an older deployment would. Nothing is recorded.

    pub fn create_raw_table(&self, table: &str, columns: &[&str]) {
        let mut state = self.state();
        let live = state.tables.entry(table.to_string()).or_default();
        live.columns.extend(columns.iter().map(|c| c.to_string()));
    }

    pub fn create_raw_index(&self, table: &str, index: &str) {
        let mut state = self.state();
        if let Some(live) = state.tables.get_mut(table) {
            live.indexes.insert(index.to_string());
        }
    }

    pub fn drop_raw_table(&self, table: &str) {
        self.state().tables.remove(table);
    }

    pub fn drop_raw_column(&self, table: &str, column: &str) {
        if let Some(live) = self.state().tables.get_mut(table) {
            live.columns.remove(column);
        }
    }

    pub fn drop_raw_index(&self, table: &str, index: &str) {
        if let Some(live) = self.state().tables.get_mut(table) {
            live.indexes.remove(index);
        }
    }
}

impl Drop for MemoryCatalog {
    fn drop(&mut self) {
        // session-level locks die with the connection
        let session = self.session;
        self.state().locks.retain(|_, owner| *owner != session);
    }
}

fn undo_into(state: &mut Shared, undo: Option<Vec<(String, Option<MemTable>)>>) {
    for (table, prior) in undo.into_iter().flatten().rev() {
        match prior {
            Some(t) => state.tables.insert(table, t),
            None => state.tables.remove(&table),
        };
    }
}

fn missing_relation(table: &str) -> crate::Error {
    crate::Error::Rejected(format!("relation \"{}\" does not exist", table))
}

impl Introspect for MemoryCatalog {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.state().tables.contains_key(table))
    }

    async fn existing_columns(&self, table: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .state()
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn existing_indexes(&self, table: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .state()
            .tables
            .get(table)
            .map(|t| t.indexes.clone())
            .unwrap_or_default())
    }

    async fn relation_owner(&self, name: &str) -> Result<Option<String>> {
        let state = self.state();
        if state.tables.contains_key(name) {
            return Ok(Some(name.to_string()));
        }
        Ok(state
            .tables
            .iter()
            .find(|(_, t)| t.indexes.contains(name))
            .map(|(table, _)| table.clone()))
    }
}
