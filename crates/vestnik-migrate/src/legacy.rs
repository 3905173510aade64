//! The implicit schema-creation path services used to call at startup.

use crate::error::MigrateError;
use crate::migrate::{InitReport, MigrateOptions, Migrator};
use crate::session::DdlSession;
use vestnik_schema::{Gate, SCHEMA_AUTO_ENV, SchemaModel};

/// Run `init` only if the gate allows implicit DDL.
///
/// Returns `Ok(None)` without issuing anything when the gate is closed.
#[deprecated(note = "run `vestnik-schema init` before starting services instead")]
pub async fn maybe_ensure_schema<S: DdlSession>(
    gate: &Gate,
    model: &SchemaModel,
    session: &S,
) -> Result<Option<InitReport>, MigrateError> {
    if !gate.is_auto_ddl_allowed() {
        tracing::warn!(
            "implicit schema creation refused: {} is off, run `vestnik-schema init`",
            SCHEMA_AUTO_ENV
        );
        return Ok(None);
    }
    tracing::warn!("implicit schema creation is deprecated, {} should be off", SCHEMA_AUTO_ENV);
    Migrator::new(model, session, MigrateOptions::default())
        .init()
        .await
        .map(Some)
}
