//! Additive schema reconciliation for vestnik.
//!
//! This crate is the only place that issues DDL, and only the administrative
//! `vestnik-schema` binary depends on it. Runtime services link
//! `vestnik-schema` for the read-only check and never see a [`Migrator`].
//!
//! ```ignore
//! let session = PgSession::new(&client).with_ddl_lock_timeout(Duration::from_secs(10));
//! let report = Migrator::new(&model, &session, MigrateOptions::default()).init().await?;
//! println!("applied {} statement(s)", report.statement_count());
//! ```

mod error;
mod legacy;
mod lock;
mod migrate;
mod plan;
mod session;

pub use error::MigrateError;
#[allow(deprecated)]
pub use legacy::maybe_ensure_schema;
pub use lock::{CoordinationLock, DEFAULT_LOCK_TIMEOUT, INIT_LOCK_NAME, lock_key};
pub use migrate::{InitReport, MigrateOptions, Migrator, TableOutcome};
pub use plan::{TablePlan, plan_table};
pub use session::{DEFAULT_DDL_LOCK_TIMEOUT, DdlSession, PgSession};
