use std::time::Duration;
use thiserror::Error;
use vestnik_db_schema::DdlObject;

#[derive(Debug, Error)]
pub enum MigrateError {
    /// A DDL statement failed. The table's transaction was rolled back and
    /// no later table was attempted.
    #[error("migration of table '{table}' failed at {object}: {source}")]
    MigrationFailed {
        table: &'static str,
        object: DdlObject,
        source: vestnik_schema::Error,
    },

    /// An index the model declares on `table` is missing there, but its name
    /// is already taken by `owner` in the same schema.
    #[error("index '{index}' for table '{table}' cannot be created: the name belongs to '{owner}'")]
    IndexNameTaken {
        table: &'static str,
        index: &'static str,
        owner: String,
    },

    /// Another `init` holds the coordination lock. Retry later.
    #[error("could not acquire lock '{lock}' within {waited:?}")]
    LockTimeout {
        lock: &'static str,
        waited: Duration,
    },

    #[error(transparent)]
    Schema(#[from] vestnik_schema::Error),
}

impl MigrateError {
    /// Lock timeouts and lost connections are worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            MigrateError::LockTimeout { .. } => true,
            MigrateError::IndexNameTaken { .. } => false,
            MigrateError::Schema(e) => e.is_connectivity(),
            MigrateError::MigrationFailed { source, .. } => source.is_connectivity(),
        }
    }
}
