//! Vestnik schema: model, introspection and drift checking.
//!
//! This crate provides:
//! - The Vestnik [`SchemaModel`] (see [`vestnik_model`])
//! - Read-only catalog introspection ([`Introspect`], [`PgIntrospector`])
//! - The drift [`check`] and the [`require_ready`] / [`probe`] helpers runtime
//!   services call before starting
//! - The auto-DDL [`Gate`]
//!
//! Nothing in this crate issues DDL. Creating or altering schema is the job of
//! `vestnik-migrate`, which only the administrative CLI depends on.
//!
//! ```ignore
//! let model = vestnik_schema::vestnik_model()?;
//! let report = vestnik_schema::check(&model, &PgIntrospector::new(&client)).await?;
//! if !report.is_ok() {
//!     eprintln!("{}", report.drift());
//! }
//! ```

mod check;
mod error;
mod gate;
mod introspect;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
mod model;
mod traced;

pub use check::{
    CheckReport, DriftEntry, DriftReport, TableState, TableStatus, check, probe, require_ready,
};
pub use error::Error;
pub use gate::{Gate, SCHEMA_AUTO_ENV, SchemaAutoFlag};
pub use introspect::{Introspect, LiveTable, PgIntrospector};
pub use model::{MODEL_VERSION, VESTNIK_TABLES, vestnik_model};
pub use traced::{Connection, ConnectionExt, TracedConn};

pub use vestnik_db_schema::{
    Change, ColumnSpec, DdlObject, IndexColumn, IndexSpec, ModelError, SchemaModel, SqlType,
    TableSpec,
};

pub type Result<T> = std::result::Result<T, Error>;
